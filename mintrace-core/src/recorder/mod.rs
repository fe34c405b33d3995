use crate::{
    error::{MintraceError, Result},
    types::Observation,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub mod factory;
pub mod json;
pub mod jsonl;
pub mod sqlite;

pub use factory::create_store;
pub use json::JsonArrayStore;
pub use jsonl::JsonLinesStore;
pub use sqlite::SqliteStore;

/// Trait defining an observation log backend
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Append one observation at the end of the log
    async fn append(&self, observation: &Observation) -> Result<()>;

    /// Read every raw entry in append order, `None` where an entry is
    /// not a well-formed observation
    async fn load_entries(&self) -> Result<Vec<Option<Observation>>>;

    /// Well-formed observations in append order
    async fn load(&self) -> Result<Vec<Observation>> {
        Ok(self.load_entries().await?.into_iter().flatten().collect())
    }

    /// Human readable location, for logs
    fn location(&self) -> String;
}

struct AppendRequest {
    observation: Observation,
    reply: oneshot::Sender<Result<()>>,
}

/// Single-writer owner of an observation store.
///
/// Every in-process append goes through one task, so the two adapters can
/// never interleave a read-modify-write on the same file.
pub struct Recorder {
    store: Arc<dyn ObservationStore>,
    rx: mpsc::Receiver<AppendRequest>,
}

/// Cloneable sender side of the recorder
#[derive(Clone)]
pub struct RecorderHandle {
    tx: mpsc::Sender<AppendRequest>,
}

impl Recorder {
    /// Spawn the recorder task and return a handle to it
    pub fn spawn(store: Arc<dyn ObservationStore>, capacity: usize) -> (RecorderHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let recorder = Recorder { store, rx };
        let task = tokio::spawn(recorder.run());

        (RecorderHandle { tx }, task)
    }

    async fn run(mut self) {
        info!("Recording observations to {}", self.store.location());

        while let Some(request) = self.rx.recv().await {
            let result = self.store.append(&request.observation).await;
            if let Err(e) = &result {
                error!("Failed to append observation for {}: {}", request.observation.token, e);
            }
            // Caller may have given up waiting
            let _ = request.reply.send(result);
        }

        debug!("All recorder handles dropped, recorder stopped");
    }
}

impl RecorderHandle {
    /// Append an observation and wait until the store has written it
    pub async fn record(&self, observation: Observation) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(AppendRequest { observation, reply })
            .await
            .map_err(|_| MintraceError::RecorderClosed)?;

        response.await.map_err(|_| MintraceError::RecorderClosed)?
    }
}
