use crate::constants;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Runtime configuration. Every field has a default so an empty (or missing)
/// file yields a usable local setup under `data/`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Root directory that holds the containers and the audit database
    pub data_root: PathBuf,
    /// Container the input files are discovered in
    pub raw_container: String,
    pub valid_container: String,
    pub invalid_container: String,
    /// SQLite file (relative to `data_root`) holding the audit table
    pub audit_db: String,
    pub audit_table: String,
    pub schema_path: PathBuf,
    /// Upper bound on inputs processed at the same time
    pub concurrency: usize,
    /// JSON pointer to the correlation id inside each record
    pub correlation_pointer: String,
    pub log_dir: PathBuf,
    pub metrics_port: Option<u16>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from(constants::DEFAULT_DATA_ROOT),
            raw_container: constants::DEFAULT_RAW_CONTAINER.to_string(),
            valid_container: constants::DEFAULT_VALID_CONTAINER.to_string(),
            invalid_container: constants::DEFAULT_INVALID_CONTAINER.to_string(),
            audit_db: constants::DEFAULT_AUDIT_DB.to_string(),
            audit_table: constants::DEFAULT_AUDIT_TABLE.to_string(),
            schema_path: PathBuf::from(constants::DEFAULT_SCHEMA_PATH),
            concurrency: constants::DEFAULT_CONCURRENCY,
            correlation_pointer: constants::DEFAULT_CORRELATION_POINTER.to_string(),
            log_dir: PathBuf::from(constants::DEFAULT_LOG_DIR),
            metrics_port: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from `path` (if it exists) and apply environment
    /// overrides on top.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                PipelineError::Config(format!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            Self::from_toml_str(&content)?
        } else {
            tracing::debug!("Config file {} not found, using defaults", path.display());
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply `VALIDATOR_*` overrides resolved through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("VALIDATOR_DATA_ROOT") {
            self.data_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("VALIDATOR_RAW_CONTAINER") {
            self.raw_container = v;
        }
        if let Some(v) = lookup("VALIDATOR_VALID_CONTAINER") {
            self.valid_container = v;
        }
        if let Some(v) = lookup("VALIDATOR_INVALID_CONTAINER") {
            self.invalid_container = v;
        }
        if let Some(v) = lookup("VALIDATOR_AUDIT_DB") {
            self.audit_db = v;
        }
        if let Some(v) = lookup("VALIDATOR_AUDIT_TABLE") {
            self.audit_table = v;
        }
        if let Some(v) = lookup("VALIDATOR_SCHEMA_PATH") {
            self.schema_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("VALIDATOR_CONCURRENCY") {
            self.concurrency = v.trim().parse().map_err(|_| {
                PipelineError::Config(format!("VALIDATOR_CONCURRENCY must be a number, got '{}'", v))
            })?;
        }
        if let Some(v) = lookup("VALIDATOR_CORRELATION_POINTER") {
            self.correlation_pointer = v;
        }
        if let Some(v) = lookup("VALIDATOR_METRICS_PORT") {
            let port = v.trim().parse().map_err(|_| {
                PipelineError::Config(format!("VALIDATOR_METRICS_PORT must be a port, got '{}'", v))
            })?;
            self.metrics_port = Some(port);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("raw_container", &self.raw_container),
            ("valid_container", &self.valid_container),
            ("invalid_container", &self.invalid_container),
            ("audit_db", &self.audit_db),
            ("audit_table", &self.audit_table),
        ] {
            if value.trim().is_empty() {
                return Err(PipelineError::Config(format!("{} must not be empty", field)));
            }
        }
        if self.valid_container == self.invalid_container {
            return Err(PipelineError::Config(
                "valid_container and invalid_container must differ".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(PipelineError::Config("concurrency must be at least 1".to_string()));
        }
        if !self.correlation_pointer.starts_with('/') {
            return Err(PipelineError::Config(format!(
                "correlation_pointer must be a JSON pointer starting with '/', got '{}'",
                self.correlation_pointer
            )));
        }
        // Table names end up in SQL text, keep them to identifier characters
        if !self
            .audit_table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(PipelineError::Config(format!(
                "audit_table may only contain letters, digits and '_', got '{}'",
                self.audit_table
            )));
        }
        Ok(())
    }

    pub fn container_path(&self, container: &str) -> PathBuf {
        self.data_root.join(container)
    }

    pub fn audit_db_path(&self) -> PathBuf {
        self.data_root.join(&self.audit_db)
    }
}
