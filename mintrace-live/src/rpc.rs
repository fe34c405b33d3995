use async_trait::async_trait;
use mintrace_core::{MintraceError, Result, TokenBalanceEntry};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_commitment_config::CommitmentConfig;
use solana_sdk::signature::Signature;
use solana_transaction_status::{UiTransactionEncoding, UiTransactionTokenBalance};
use tracing::debug;

/// The parts of a fetched transaction the pipeline needs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedTransaction {
    pub logs: Vec<String>,
    pub pre_token_balances: Vec<TokenBalanceEntry>,
    pub post_token_balances: Vec<TokenBalanceEntry>,
}

/// Looks up a transaction's metadata by signature
#[async_trait]
pub trait TransactionFetcher: Send + Sync {
    /// `Ok(None)` when the node has no metadata for the signature yet
    async fn fetch(&self, signature: &str) -> Result<Option<FetchedTransaction>>;
}

pub struct RpcTransactionFetcher {
    client: RpcClient,
}

impl RpcTransactionFetcher {
    pub fn new(rpc_url: &str) -> Self {
        Self {
            client: RpcClient::new(rpc_url.to_string()),
        }
    }

    pub fn url(&self) -> String {
        self.client.url()
    }
}

#[async_trait]
impl TransactionFetcher for RpcTransactionFetcher {
    async fn fetch(&self, signature: &str) -> Result<Option<FetchedTransaction>> {
        let sig = signature
            .parse::<Signature>()
            .map_err(|e| MintraceError::Rpc(format!("invalid signature {}: {}", signature, e)))?;

        let transaction = self
            .client
            .get_transaction_with_config(
                &sig,
                RpcTransactionConfig {
                    encoding: Some(UiTransactionEncoding::JsonParsed),
                    commitment: Some(CommitmentConfig::confirmed()),
                    max_supported_transaction_version: Some(0),
                },
            )
            .await
            .map_err(|e| MintraceError::Rpc(e.to_string()))?;

        let Some(meta) = transaction.transaction.meta else {
            debug!("Transaction {} has no metadata", signature);
            return Ok(None);
        };

        let logs: Option<Vec<String>> = meta.log_messages.into();
        let pre: Option<Vec<UiTransactionTokenBalance>> = meta.pre_token_balances.into();
        let post: Option<Vec<UiTransactionTokenBalance>> = meta.post_token_balances.into();

        Ok(Some(FetchedTransaction {
            logs: logs.unwrap_or_default(),
            pre_token_balances: convert_balances(pre.unwrap_or_default()),
            post_token_balances: convert_balances(post.unwrap_or_default()),
        }))
    }
}

fn convert_balances(balances: Vec<UiTransactionTokenBalance>) -> Vec<TokenBalanceEntry> {
    balances
        .into_iter()
        .map(|balance| {
            let owner: Option<String> = balance.owner.into();
            let program_id: Option<String> = balance.program_id.into();
            TokenBalanceEntry {
                account_index: u32::from(balance.account_index),
                mint: balance.mint,
                owner,
                program_id,
                amount: balance.ui_token_amount.amount,
            }
        })
        .collect()
}
