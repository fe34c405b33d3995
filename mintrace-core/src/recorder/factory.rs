use crate::error::Result;
use std::sync::Arc;

use super::ObservationStore;

/// Create an observation store from its location.
///
/// `sqlite:<path>` selects SQLite, a `.jsonl` path selects JSON lines and
/// anything else is the JSON array file.
pub async fn create_store(location: &str) -> Result<Arc<dyn ObservationStore>> {
    if location.starts_with("sqlite:") {
        let store = super::sqlite::SqliteStore::new(location).await?;
        Ok(Arc::new(store))
    } else if location.ends_with(".jsonl") {
        Ok(Arc::new(super::jsonl::JsonLinesStore::new(location)))
    } else {
        Ok(Arc::new(super::json::JsonArrayStore::new(location)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_selection() {
        let dir = tempfile::tempdir().unwrap();

        let json = dir.path().join("benchmark-data.json");
        let store = create_store(json.to_str().unwrap()).await.unwrap();
        assert_eq!(store.location(), json.display().to_string());

        let lines = dir.path().join("benchmark-data.jsonl");
        let store = create_store(lines.to_str().unwrap()).await.unwrap();
        assert!(store.location().ends_with(".jsonl"));

        let db = format!("sqlite:{}", dir.path().join("obs.db").display());
        let store = create_store(&db).await.unwrap();
        assert!(store.location().starts_with("sqlite:"));
    }
}
