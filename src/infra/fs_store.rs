use crate::app::ports::RecordStorePort;
use crate::config::AppConfig;
use crate::error::{PipelineError, Result};
use crate::types::SinkKind;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Record store backed by local directories, one per container.
#[derive(Debug, Clone)]
pub struct FsRecordStore {
    raw_dir: PathBuf,
    valid_dir: PathBuf,
    invalid_dir: PathBuf,
}

impl FsRecordStore {
    pub fn new<P: Into<PathBuf>>(raw_dir: P, valid_dir: P, invalid_dir: P) -> Self {
        Self {
            raw_dir: raw_dir.into(),
            valid_dir: valid_dir.into(),
            invalid_dir: invalid_dir.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.container_path(&config.raw_container),
            config.container_path(&config.valid_container),
            config.container_path(&config.invalid_container),
        )
    }

    fn sink_dir(&self, sink: SinkKind) -> &Path {
        match sink {
            SinkKind::Valid => &self.valid_dir,
            SinkKind::Invalid => &self.invalid_dir,
        }
    }
}

/// A derived name must stay inside its container.
fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(components.next(), Some(Component::Normal(_))) && components.next().is_none()
}

#[async_trait]
impl RecordStorePort for FsRecordStore {
    async fn list_inputs(&self) -> Result<Vec<String>> {
        let mut entries = fs::read_dir(&self.raw_dir).await.map_err(|e| {
            PipelineError::Listing(format!("cannot read {}: {}", self.raw_dir.display(), e))
        })?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PipelineError::Listing(format!("cannot read {}: {}", self.raw_dir.display(), e)))?
        {
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        info!("Found {} inputs in {}", names.len(), self.raw_dir.display());
        Ok(names)
    }

    async fn read_input(&self, name: &str) -> String {
        if !is_plain_file_name(name) {
            warn!("{}", PipelineError::retrieval(name, "name has path components"));
            return String::new();
        }
        let path = self.raw_dir.join(name);
        match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                warn!("{}", PipelineError::retrieval(name, e));
                String::new()
            }
        }
    }

    async fn write_output(&self, sink: SinkKind, derived_name: &str, content: &str) -> Result<()> {
        if !is_plain_file_name(derived_name) {
            return Err(PipelineError::persistence(
                derived_name,
                "derived name must be a plain file name",
            ));
        }
        let dir = self.sink_dir(sink);
        fs::create_dir_all(dir)
            .await
            .map_err(|e| PipelineError::persistence(derived_name, e))?;
        let path = dir.join(derived_name);
        fs::write(&path, content)
            .await
            .map_err(|e| PipelineError::persistence(derived_name, e))?;
        debug!("Stored record in {} sink as {}", sink, path.display());
        Ok(())
    }
}
