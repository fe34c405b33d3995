use crate::extractor::MintExtractor;
use crate::matcher::ProgramMatcher;
use crate::metrics::Metrics;
use crate::recorder::RecorderHandle;
use crate::types::{ChainEvent, EventOutcome, Observation, Rejection, Source};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Shared verify → extract → record path used by both adapters
pub struct MintPipeline {
    source: Source,
    matcher: ProgramMatcher,
    extractor: MintExtractor,
    recorder: RecorderHandle,
    metrics: Arc<Metrics>,
}

impl MintPipeline {
    pub fn new(
        source: Source,
        matcher: ProgramMatcher,
        extractor: MintExtractor,
        recorder: RecorderHandle,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            source,
            matcher,
            extractor,
            recorder,
            metrics,
        }
    }

    pub fn matcher(&self) -> &ProgramMatcher {
        &self.matcher
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Count and log an item dropped before it became an event
    pub fn reject(&self, rejection: Rejection) -> EventOutcome {
        self.metrics.record_rejection(&rejection);
        if rejection.is_extraction_failure() {
            warn!("[{}] Failed to log token balances: {}", self.source, rejection);
        } else {
            debug!("[{}] Skipping message: {}", self.source, rejection);
        }
        EventOutcome::Rejected(rejection)
    }

    /// Run one normalised event through verification, extraction and recording
    pub async fn handle(&self, event: ChainEvent) -> EventOutcome {
        if !self.matcher.matches(&event) {
            return self.reject(Rejection::NotProgramMatch);
        }
        self.metrics.record_match();

        let token = match self.extractor.extract(&event, &self.matcher) {
            Ok(token) => token,
            Err(rejection) => return self.reject(rejection),
        };

        let observation = Observation::now(token, self.source);
        match self.recorder.record(observation.clone()).await {
            Ok(()) => {
                self.metrics.record_observation(false);
                info!("[{}] New mint detected", self.source);
                info!("[{}] Signature: {}", self.source, event.signature);
                info!("[{}] Token CA: {}", self.source, observation.token);
                EventOutcome::Recorded(observation)
            }
            Err(e) => {
                self.metrics.record_observation(true);
                error!("[{}] Failed to record {}: {}", self.source, observation.token, e);
                EventOutcome::StorageFailed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProgramConfig, DEFAULT_LOG_SIGNATURE};
    use crate::error::Result;
    use crate::extractor::ExtractionMode;
    use crate::recorder::{ObservationStore, Recorder};
    use crate::types::{CompiledInstruction, TokenBalanceEntry};
    use async_trait::async_trait;
    use std::sync::atomic::Ordering;
    use tokio::sync::Mutex;

    const TOKEN_A: &str = "7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr";

    #[derive(Default)]
    struct MemoryStore {
        records: Mutex<Vec<Observation>>,
        fail: bool,
    }

    #[async_trait]
    impl ObservationStore for MemoryStore {
        async fn append(&self, observation: &Observation) -> Result<()> {
            if self.fail {
                return Err(std::io::Error::other("read-only").into());
            }
            self.records.lock().await.push(observation.clone());
            Ok(())
        }

        async fn load_entries(&self) -> Result<Vec<Option<Observation>>> {
            Ok(self.records.lock().await.iter().cloned().map(Some).collect())
        }

        fn location(&self) -> String {
            "memory".to_string()
        }
    }

    fn pipeline(source: Source, store: Arc<MemoryStore>) -> MintPipeline {
        let config = ProgramConfig::default();
        let (recorder, _task) = Recorder::spawn(store, 4);
        MintPipeline::new(
            source,
            ProgramMatcher::new(&config),
            MintExtractor::new(config.wsol_mint.clone(), ExtractionMode::TokenBalances),
            recorder,
            Arc::new(Metrics::new(source)),
        )
    }

    fn mint_event() -> ChainEvent {
        ChainEvent {
            signature: "sig1".to_string(),
            logs: vec![DEFAULT_LOG_SIGNATURE.to_string()],
            pre_token_balances: vec![
                TokenBalanceEntry::new(1, TOKEN_A),
                TokenBalanceEntry::new(2, crate::config::WSOL_MINT),
            ],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_handle_records_observation() {
        let store = Arc::new(MemoryStore::default());
        let pipeline = pipeline(Source::Wss, store.clone());

        let outcome = pipeline.handle(mint_event()).await;
        let EventOutcome::Recorded(obs) = outcome else {
            panic!("expected a recorded observation, got {:?}", outcome);
        };
        assert_eq!(obs.token, TOKEN_A);
        assert_eq!(obs.source, Source::Wss);

        let records = store.load().await.unwrap();
        assert_eq!(records, vec![obs]);
        assert_eq!(pipeline.metrics().observations_recorded.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_handle_rejects_unrelated_event() {
        let store = Arc::new(MemoryStore::default());
        let pipeline = pipeline(Source::Grpc, store.clone());

        let event = ChainEvent {
            logs: vec!["Program log: Instruction: Transfer".to_string()],
            instructions: vec![CompiledInstruction {
                program_id_index: 0,
                accounts: vec![],
                data: vec![0u8; 16],
            }],
            ..mint_event()
        };

        assert_eq!(
            pipeline.handle(event).await,
            EventOutcome::Rejected(Rejection::NotProgramMatch)
        );
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_handle_no_token_balances() {
        let store = Arc::new(MemoryStore::default());
        let pipeline = pipeline(Source::Wss, store.clone());

        let event = ChainEvent {
            pre_token_balances: vec![],
            ..mint_event()
        };
        assert_eq!(
            pipeline.handle(event).await,
            EventOutcome::Rejected(Rejection::NoTokenBalances)
        );
        let snapshot = pipeline.metrics().snapshot();
        assert_eq!(snapshot.rejections.get("no_token_balances"), Some(&1));
        assert_eq!(snapshot.events_matched, 1);
    }

    #[tokio::test]
    async fn test_handle_storage_failure() {
        let store = Arc::new(MemoryStore {
            fail: true,
            ..Default::default()
        });
        let pipeline = pipeline(Source::Grpc, store);

        let outcome = pipeline.handle(mint_event()).await;
        assert!(matches!(outcome, EventOutcome::StorageFailed(_)));
        assert_eq!(pipeline.metrics().storage_failures.load(Ordering::Relaxed), 1);
    }
}
