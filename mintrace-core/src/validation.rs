use crate::error::{MintraceError, Result};
use crate::types::Discriminator;
use solana_sdk::pubkey::Pubkey;
use std::path::Path;

/// Validate a Solana address string (program id, mint, account key)
pub fn validate_address(address: &str) -> Result<Pubkey> {
    address.trim().parse::<Pubkey>().map_err(|e| {
        MintraceError::InvalidAddress(format!("'{}': {}", address, e))
    })
}

/// Validate a URL and require one of the given schemes
fn validate_url_scheme(url: &str, kind: &str, schemes: &[&str]) -> Result<()> {
    if url.trim().is_empty() {
        return Err(MintraceError::Config(format!("{} URL cannot be empty", kind)));
    }

    let parsed = url::Url::parse(url)
        .map_err(|e| MintraceError::Config(format!("Invalid {} URL '{}': {}", kind, url, e)))?;

    if !schemes.contains(&parsed.scheme()) {
        return Err(MintraceError::Config(format!(
            "Invalid {} URL '{}': must start with {}",
            kind,
            url,
            schemes
                .iter()
                .map(|s| format!("{}://", s))
                .collect::<Vec<_>>()
                .join(" or ")
        )));
    }

    Ok(())
}

/// Validate an RPC URL
pub fn validate_rpc_url(url: &str) -> Result<()> {
    validate_url_scheme(url, "RPC", &["http", "https"])
}

/// Validate a WebSocket URL
pub fn validate_ws_url(url: &str) -> Result<()> {
    validate_url_scheme(url, "WebSocket", &["ws", "wss"])
}

/// Validate a gRPC endpoint URL
pub fn validate_grpc_url(url: &str) -> Result<()> {
    validate_url_scheme(url, "gRPC", &["http", "https"])
}

/// Parse a hex instruction discriminator ("181ec828051c0777" or "0x18 1e ...")
pub fn parse_discriminator(raw: &str) -> Result<Discriminator> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();

    let bytes = hex::decode(&cleaned).map_err(|e| {
        MintraceError::Config(format!("Invalid discriminator '{}': {}", raw, e))
    })?;

    bytes.as_slice().try_into().map_err(|_| {
        MintraceError::Config(format!(
            "Invalid discriminator '{}': expected 8 bytes, got {}",
            raw,
            bytes.len()
        ))
    })
}

/// Validate the location of the observation log
pub fn validate_log_location(location: &str) -> Result<()> {
    if location.trim().is_empty() {
        return Err(MintraceError::Config(
            "Observation log location cannot be empty".to_string(),
        ));
    }

    let path = location.strip_prefix("sqlite:").unwrap_or(location);

    // The file itself may not exist yet, its directory must
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(MintraceError::Config(format!(
                "Observation log directory does not exist: {}",
                parent.display()
            )));
        }
    }

    Ok(())
}
