use super::ObservationStore;
use crate::{error::Result, types::Observation};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// One JSON record per line, written with O_APPEND.
///
/// Each append is a single write of one short line, so concurrent writers in
/// different processes do not clobber each other.
#[derive(Debug, Clone)]
pub struct JsonLinesStore {
    path: PathBuf,
}

impl JsonLinesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ObservationStore for JsonLinesStore {
    async fn append(&self, observation: &Observation) -> Result<()> {
        let mut line = serde_json::to_vec(observation)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;

        Ok(())
    }

    async fn load_entries(&self) -> Result<Vec<Option<Observation>>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Observation>(line) {
                Ok(record) => entries.push(Some(record)),
                // A torn final line after a crash lands here
                Err(e) => {
                    warn!("Malformed line {} of {}: {}", line_no + 1, self.path.display(), e);
                    entries.push(None);
                }
            }
        }

        Ok(entries)
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
