use super::ObservationStore;
use crate::{error::Result, types::Observation};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use tracing::{error, warn};

/// The reference log format: one JSON array rewritten on every append.
///
/// Appends are read-modify-write without a lock. Within one process route
/// writes through the `Recorder`; separate processes sharing a file can still
/// lose updates.
#[derive(Debug, Clone)]
pub struct JsonArrayStore {
    path: PathBuf,
}

impl JsonArrayStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Current contents for an append: anything unreadable counts as empty
    async fn read_for_append(&self) -> Vec<Value> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                error!("Error reading existing benchmark data: {}", e);
                return Vec::new();
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Array(records)) => records,
            Ok(_) => {
                warn!("{} does not hold a JSON array, starting over", self.path.display());
                Vec::new()
            }
            Err(e) => {
                error!("Error reading existing benchmark data: {}", e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl ObservationStore for JsonArrayStore {
    async fn append(&self, observation: &Observation) -> Result<()> {
        let mut records = self.read_for_append().await;
        records.push(serde_json::to_value(observation)?);

        let content = serde_json::to_string_pretty(&records)?;
        tokio::fs::write(&self.path, content).await?;

        Ok(())
    }

    async fn load_entries(&self) -> Result<Vec<Option<Observation>>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<Value>(&content)? {
            Value::Array(records) => Ok(parse_entries(records)),
            _ => Ok(Vec::new()),
        }
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// One entry per array element, `None` for elements that are not observations
fn parse_entries(records: Vec<Value>) -> Vec<Option<Observation>> {
    let entries: Vec<Option<Observation>> = records
        .into_iter()
        .map(|record| serde_json::from_value(record).ok())
        .collect();

    let malformed = entries.iter().filter(|entry| entry.is_none()).count();
    if malformed > 0 {
        warn!("Found {} malformed observation record(s)", malformed);
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::analyze;
    use crate::types::Source;

    #[tokio::test]
    async fn test_append_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonArrayStore::new(dir.path().join("benchmark-data.json"));

        assert!(store.load().await.unwrap().is_empty());

        store.append(&Observation::new("tokenA", 100, Source::Grpc)).await.unwrap();
        store.append(&Observation::new("tokenA", 150, Source::Wss)).await.unwrap();

        let records = store.load().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], Observation::new("tokenA", 150, Source::Wss));
    }

    #[tokio::test]
    async fn test_written_file_is_pretty_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        let store = JsonArrayStore::new(&path);
        store.append(&Observation::new("tokenA", 1, Source::Grpc)).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("[\n  {"));
        assert!(content.contains("\"source\": \"grpc\""));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_replaced_on_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonArrayStore::new(&path);
        assert!(store.load().await.is_err());

        store.append(&Observation::new("tokenA", 1, Source::Wss)).await.unwrap();
        assert_eq!(store.load().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_non_array_contents_count_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        std::fs::write(&path, r#"{"token":"x"}"#).unwrap();

        let store = JsonArrayStore::new(&path);
        assert!(store.load().await.unwrap().is_empty());

        store.append(&Observation::new("tokenA", 1, Source::Grpc)).await.unwrap();
        assert_eq!(store.load().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_records_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        std::fs::write(
            &path,
            r#"[{"token":"a","timestamp":1,"source":"grpc"},{"token":"b","source":"ftp"},{"token":"c","timestamp":3,"source":"wss"}]"#,
        )
        .unwrap();

        let store = JsonArrayStore::new(&path);
        let records = store.load().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].token, "c");

        let entries = store.load_entries().await.unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[1].is_none());
    }

    #[tokio::test]
    async fn test_malformed_trailing_record_is_the_one_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        std::fs::write(
            &path,
            r#"[
  {"token":"tokenA","timestamp":100,"source":"grpc"},
  {"token":"tokenA","timestamp":150,"source":"wss"},
  {"token":"tokenB","timestamp":200,"source":"grpc"},
  {"token":"tokenC","source":"wss"}
]"#,
        )
        .unwrap();

        let entries = JsonArrayStore::new(&path).load_entries().await.unwrap();
        let stats = analyze(&entries).unwrap();
        assert_eq!(stats.total_tokens, 2);
        assert_eq!(stats.complete_pairs, 1);
        assert_eq!(stats.incomplete_pairs, 1);
    }

    #[tokio::test]
    async fn test_write_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonArrayStore::new(dir.path().join("missing").join("log.json"));

        let result = store.append(&Observation::new("tokenA", 1, Source::Grpc)).await;
        assert!(result.is_err());
    }
}
