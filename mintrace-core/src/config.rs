use crate::error::{MintraceError, Result};
use crate::types::Discriminator;
use crate::validation::{
    parse_discriminator, validate_address, validate_grpc_url, validate_rpc_url, validate_ws_url,
};

pub const DEFAULT_PROGRAM_ID: &str = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P";
pub const DEFAULT_LOG_SIGNATURE: &str = "Program log: Instruction: InitializeMint2";
pub const DEFAULT_DISCRIMINATOR: Discriminator = [0x18, 0x1e, 0xc8, 0x28, 0x05, 0x1c, 0x07, 0x77];
pub const DEFAULT_MINT_INDEX: usize = 1;
pub const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const DEFAULT_LOG_LOCATION: &str = "benchmark-data.json";
pub const DEFAULT_FILTER_LABEL: &str = "svsgrpc";

/// The monitored on-chain program and how to recognise its mint events
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramConfig {
    pub program_id: String,
    /// Literal log lines that mark a mint event
    pub log_signatures: Vec<String>,
    /// Instruction data prefixes that mark a mint event
    pub discriminators: Vec<Discriminator>,
    /// Index of the new mint in the account key list (account-keys extraction only)
    pub mint_index: usize,
    pub wsol_mint: String,
}

impl Default for ProgramConfig {
    fn default() -> Self {
        Self {
            program_id: DEFAULT_PROGRAM_ID.to_string(),
            log_signatures: vec![DEFAULT_LOG_SIGNATURE.to_string()],
            discriminators: vec![DEFAULT_DISCRIMINATOR],
            mint_index: DEFAULT_MINT_INDEX,
            wsol_mint: WSOL_MINT.to_string(),
        }
    }
}

impl ProgramConfig {
    /// Build from the comma-separated forms used on the command line
    pub fn from_parts(
        program_id: &str,
        log_signatures: &str,
        discriminators: &str,
        mint_index: usize,
        wsol_mint: &str,
    ) -> Result<Self> {
        let discriminators = discriminators
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(parse_discriminator)
            .collect::<Result<Vec<_>>>()?;

        let config = Self {
            program_id: program_id.trim().to_string(),
            log_signatures: log_signatures
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            discriminators,
            mint_index,
            wsol_mint: wsol_mint.trim().to_string(),
        };
        config.validate()?;

        Ok(config)
    }

    /// Validate all configuration fields
    pub fn validate(&self) -> Result<()> {
        validate_address(&self.program_id)?;
        validate_address(&self.wsol_mint)?;

        if self.log_signatures.is_empty() && self.discriminators.is_empty() {
            return Err(MintraceError::Config(
                "At least one log signature or instruction discriminator must be specified"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

/// Binary-stream (Yellowstone gRPC) endpoint settings
#[derive(Debug, Clone, Default)]
pub struct GrpcConfig {
    pub endpoint: Option<String>,
    pub x_token: Option<String>,
    /// Name of the transaction filter in the subscription request
    pub filter_label: String,
}

impl GrpcConfig {
    pub fn new(endpoint: Option<String>, x_token: Option<String>) -> Self {
        Self {
            endpoint: non_empty(endpoint),
            x_token: non_empty(x_token),
            filter_label: DEFAULT_FILTER_LABEL.to_string(),
        }
    }

    /// Endpoint and token, or a configuration error naming what is missing
    pub fn credentials(&self) -> Result<(&str, &str)> {
        match (self.endpoint.as_deref(), self.x_token.as_deref()) {
            (Some(endpoint), Some(token)) => {
                validate_grpc_url(endpoint)?;
                Ok((endpoint, token))
            }
            _ => Err(MintraceError::Config(
                "Missing gRPC endpoint or x-token".to_string(),
            )),
        }
    }
}

/// Push-socket endpoint plus the RPC endpoint used to materialise transactions
#[derive(Debug, Clone, Default)]
pub struct WssConfig {
    pub ws_url: Option<String>,
    pub rpc_url: Option<String>,
}

impl WssConfig {
    pub fn new(ws_url: Option<String>, rpc_url: Option<String>) -> Self {
        Self {
            ws_url: non_empty(ws_url),
            rpc_url: non_empty(rpc_url),
        }
    }

    pub fn endpoints(&self) -> Result<(&str, &str)> {
        let ws_url = self
            .ws_url
            .as_deref()
            .ok_or_else(|| MintraceError::Config("Missing WebSocket endpoint".to_string()))?;
        let rpc_url = self
            .rpc_url
            .as_deref()
            .ok_or_else(|| MintraceError::Config("Missing RPC url".to_string()))?;

        validate_ws_url(ws_url)?;
        validate_rpc_url(rpc_url)?;

        Ok((ws_url, rpc_url))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
