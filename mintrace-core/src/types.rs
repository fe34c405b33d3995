use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type Slot = u64;
pub type Discriminator = [u8; 8];

/// Milliseconds since the Unix epoch.
pub type TimestampMs = i64;

/// Which delivery path produced an observation.
///
/// Declaration order matters: the binary stream is the first-listed source
/// and wins ties in the statistics engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Grpc,
    Wss,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::Grpc, Source::Wss];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Grpc => "grpc",
            Source::Wss => "wss",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grpc" => Ok(Source::Grpc),
            "wss" => Ok(Source::Wss),
            other => Err(format!("unknown source '{}'", other)),
        }
    }
}

/// One entry of a transaction's pre- or post-state token balance list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalanceEntry {
    pub account_index: u32,
    pub mint: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub program_id: Option<String>,
    /// Raw amount ignoring decimals
    #[serde(default)]
    pub amount: String,
}

impl TokenBalanceEntry {
    pub fn new(account_index: u32, mint: impl Into<String>) -> Self {
        Self {
            account_index,
            mint: mint.into(),
            owner: None,
            program_id: None,
            amount: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledInstruction {
    pub program_id_index: u32,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

/// A transaction normalized from either upstream delivery path.
///
/// Only the binary stream carries instructions and account keys; the push
/// socket path leaves them empty.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChainEvent {
    pub signature: String,
    pub slot: Option<Slot>,
    pub logs: Vec<String>,
    pub instructions: Vec<CompiledInstruction>,
    pub account_keys: Vec<String>,
    pub pre_token_balances: Vec<TokenBalanceEntry>,
    pub post_token_balances: Vec<TokenBalanceEntry>,
}

impl ChainEvent {
    /// Pre-state balances when present, otherwise post-state
    pub fn token_balances(&self) -> &[TokenBalanceEntry] {
        if !self.pre_token_balances.is_empty() {
            &self.pre_token_balances
        } else {
            &self.post_token_balances
        }
    }
}

/// A persisted "this source saw this token at this time" record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub token: String,
    pub timestamp: TimestampMs,
    pub source: Source,
}

impl Observation {
    pub fn new(token: impl Into<String>, timestamp: TimestampMs, source: Source) -> Self {
        Self {
            token: token.into(),
            timestamp,
            source,
        }
    }

    /// Stamp an observation with the current wall clock
    pub fn now(token: impl Into<String>, source: Source) -> Self {
        Self::new(token, chrono::Utc::now().timestamp_millis(), source)
    }
}

/// Why an inbound item did not become an observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NotTransactionUpdate,
    FilterMismatch,
    MissingField(&'static str),
    MalformedPayload,
    SubscriptionAck,
    NotProgramMatch,
    TransactionUnavailable,
    NoTokenBalances,
    NoMintFound,
    InvalidMint(String),
}

impl Rejection {
    /// Stable label used as a metrics key
    pub fn label(&self) -> &'static str {
        match self {
            Rejection::NotTransactionUpdate => "not_transaction_update",
            Rejection::FilterMismatch => "filter_mismatch",
            Rejection::MissingField(_) => "missing_field",
            Rejection::MalformedPayload => "malformed_payload",
            Rejection::SubscriptionAck => "subscription_ack",
            Rejection::NotProgramMatch => "not_program_match",
            Rejection::TransactionUnavailable => "transaction_unavailable",
            Rejection::NoTokenBalances => "no_token_balances",
            Rejection::NoMintFound => "no_mint_found",
            Rejection::InvalidMint(_) => "invalid_mint",
        }
    }

    /// Extraction failures are worth a warning; everything else is feed noise
    pub fn is_extraction_failure(&self) -> bool {
        matches!(
            self,
            Rejection::NoTokenBalances | Rejection::NoMintFound | Rejection::InvalidMint(_)
        )
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::MissingField(field) => write!(f, "missing field '{}'", field),
            Rejection::InvalidMint(mint) => write!(f, "invalid mint address '{}'", mint),
            other => f.write_str(other.label()),
        }
    }
}

/// Result of pushing one event through the handling pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Recorded(Observation),
    Rejected(Rejection),
    StorageFailed(String),
}
