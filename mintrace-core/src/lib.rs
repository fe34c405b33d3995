mod error;
mod types;

pub mod config;
pub mod extractor;
pub mod matcher;
pub mod metrics;
pub mod pipeline;
pub mod recorder;
pub mod report;
pub mod retry;
pub mod stats;
pub mod validation;

pub use error::{MintraceError, Result};
pub use types::{
    ChainEvent, CompiledInstruction, Discriminator, EventOutcome, Observation, Rejection, Slot,
    Source, TimestampMs, TokenBalanceEntry,
};
pub use config::{GrpcConfig, ProgramConfig, WssConfig};
pub use extractor::{extract_mint, ExtractionMode, MintExtractor};
pub use matcher::ProgramMatcher;
pub use metrics::{HealthCheck, HealthStatus, Metrics, MetricsSnapshot};
pub use pipeline::MintPipeline;
pub use recorder::{create_store, ObservationStore, Recorder, RecorderHandle};
pub use retry::{retry_until_some, Backoff, ReconnectPolicy, RetryPolicy};
pub use stats::{analyze, compute_stats, pair_observations, BenchmarkStats, TokenPair};
