use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to list inputs: {0}")]
    Listing(String),

    #[error("Failed to retrieve input '{name}': {message}")]
    Retrieval { name: String, message: String },

    #[error("Input '{name}' is not a JSON array of records: {message}")]
    Parse { name: String, message: String },

    #[error("Could not extract correlation id: {0}")]
    CorrelationExtraction(String),

    #[error("Persistence failed for '{key}': {message}")]
    Persistence { key: String, message: String },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown run: {0}")]
    UnknownRun(String),

    #[error("Internal state error: {0}")]
    State(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl PipelineError {
    pub fn retrieval(name: impl Into<String>, message: impl ToString) -> Self {
        PipelineError::Retrieval {
            name: name.into(),
            message: message.to_string(),
        }
    }

    pub fn persistence(key: impl Into<String>, message: impl ToString) -> Self {
        PipelineError::Persistence {
            key: key.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrieval_names_the_input() {
        let err = PipelineError::retrieval("batch1.json", "permission denied");
        assert_eq!(
            err.to_string(),
            "Failed to retrieve input 'batch1.json': permission denied"
        );
    }
}
