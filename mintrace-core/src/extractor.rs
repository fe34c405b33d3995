//! Picks the newly created token out of a transaction.
//!
//! Mint transactions of the monitored program usually carry exactly two
//! balance entries, the new token and wrapped SOL. Anything else falls back
//! to "last non-native entry wins", which depends on list order and can
//! pick the wrong token when several non-native mints are present.

use crate::matcher::ProgramMatcher;
use crate::types::{ChainEvent, Rejection, TokenBalanceEntry};
use crate::validation::validate_address;

/// Where the mint address is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractionMode {
    #[default]
    TokenBalances,
    /// Account key at a fixed index of the message (binary stream only)
    AccountKeys { mint_index: usize },
}

#[derive(Debug, Clone)]
pub struct MintExtractor {
    wsol_mint: String,
    mode: ExtractionMode,
}

impl MintExtractor {
    pub fn new(wsol_mint: impl Into<String>, mode: ExtractionMode) -> Self {
        Self {
            wsol_mint: wsol_mint.into(),
            mode,
        }
    }

    /// Extract and validate the new mint of an already verified event
    pub fn extract(&self, event: &ChainEvent, matcher: &ProgramMatcher) -> Result<String, Rejection> {
        let mint = match self.mode {
            ExtractionMode::TokenBalances => {
                let balances = event.token_balances();
                if balances.is_empty() {
                    return Err(Rejection::NoTokenBalances);
                }
                extract_mint(balances, &self.wsol_mint).ok_or(Rejection::NoMintFound)?
            }
            ExtractionMode::AccountKeys { mint_index } => {
                extract_from_account_keys(event, matcher, mint_index).ok_or(Rejection::NoMintFound)?
            }
        };

        // Normalise through a pubkey round-trip
        validate_address(&mint)
            .map(|pubkey| pubkey.to_string())
            .map_err(|_| Rejection::InvalidMint(mint))
    }
}

/// Choose the new token's mint from a balance list.
///
/// Returns `None` when every entry is the wrapped-native mint.
pub fn extract_mint(balances: &[TokenBalanceEntry], wsol_mint: &str) -> Option<String> {
    match balances {
        [first, second] => {
            if first.mint == wsol_mint {
                (second.mint != wsol_mint).then(|| second.mint.clone())
            } else if second.mint == wsol_mint {
                Some(first.mint.clone())
            } else {
                last_non_native(balances, wsol_mint)
            }
        }
        _ => last_non_native(balances, wsol_mint),
    }
}

fn last_non_native(balances: &[TokenBalanceEntry], wsol_mint: &str) -> Option<String> {
    balances
        .iter()
        .rev()
        .find(|balance| balance.mint != wsol_mint)
        .map(|balance| balance.mint.clone())
}

/// Account key at `mint_index`, only when a discriminator-matching instruction is present
pub fn extract_from_account_keys(
    event: &ChainEvent,
    matcher: &ProgramMatcher,
    mint_index: usize,
) -> Option<String> {
    matcher.find_instruction(&event.instructions)?;
    event.account_keys.get(mint_index).cloned()
}
