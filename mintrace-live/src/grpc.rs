use crate::session::Session;
use futures::{SinkExt, StreamExt};
use mintrace_core::{
    ChainEvent, CompiledInstruction, GrpcConfig, MintPipeline, MintraceError, Rejection, Result,
    TokenBalanceEntry,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use yellowstone_grpc_client::GeyserGrpcClient;
use yellowstone_grpc_proto::prelude::{
    subscribe_update::UpdateOneof, CommitmentLevel, SubscribeRequest,
    SubscribeRequestFilterTransactions, SubscribeRequestPing, SubscribeUpdate, TokenBalance,
};

/// Transactions mentioning `program_id`, confirmed commitment, under `label`
pub fn build_subscribe_request(program_id: &str, label: &str) -> SubscribeRequest {
    let mut transactions = HashMap::new();
    transactions.insert(
        label.to_string(),
        SubscribeRequestFilterTransactions {
            account_include: vec![program_id.to_string()],
            account_exclude: Vec::new(),
            account_required: Vec::new(),
            ..Default::default()
        },
    );

    SubscribeRequest {
        accounts: HashMap::new(),
        slots: HashMap::new(),
        transactions,
        commitment: Some(CommitmentLevel::Confirmed as i32),
        ..Default::default()
    }
}

/// Normalise a stream update into a chain event, or say why it was dropped
pub fn chain_event_from_update(
    update: SubscribeUpdate,
    label: &str,
) -> std::result::Result<ChainEvent, Rejection> {
    let Some(UpdateOneof::Transaction(tx_update)) = update.update_oneof else {
        return Err(Rejection::NotTransactionUpdate);
    };
    if !update.filters.iter().any(|filter| filter == label) {
        return Err(Rejection::FilterMismatch);
    }
    if tx_update.slot == 0 {
        return Err(Rejection::MissingField("slot"));
    }

    let info = tx_update
        .transaction
        .ok_or(Rejection::MissingField("transaction"))?;
    let transaction = info
        .transaction
        .ok_or(Rejection::MissingField("transaction.transaction"))?;
    let message = transaction
        .message
        .ok_or(Rejection::MissingField("message"))?;
    let meta = info.meta.ok_or(Rejection::MissingField("meta"))?;
    if meta.log_messages_none {
        return Err(Rejection::MissingField("log_messages"));
    }

    Ok(ChainEvent {
        signature: bs58::encode(&info.signature).into_string(),
        slot: Some(tx_update.slot),
        logs: meta.log_messages,
        instructions: message
            .instructions
            .into_iter()
            .map(|ix| CompiledInstruction {
                program_id_index: ix.program_id_index,
                accounts: ix.accounts,
                data: ix.data,
            })
            .collect(),
        account_keys: message
            .account_keys
            .iter()
            .map(|key| bs58::encode(key).into_string())
            .collect(),
        pre_token_balances: convert_balances(meta.pre_token_balances),
        post_token_balances: convert_balances(meta.post_token_balances),
    })
}

fn convert_balances(balances: Vec<TokenBalance>) -> Vec<TokenBalanceEntry> {
    balances
        .into_iter()
        .map(|balance| TokenBalanceEntry {
            account_index: balance.account_index,
            mint: balance.mint,
            owner: (!balance.owner.is_empty()).then_some(balance.owner),
            program_id: (!balance.program_id.is_empty()).then_some(balance.program_id),
            amount: balance
                .ui_token_amount
                .map(|amount| amount.amount)
                .unwrap_or_default(),
        })
        .collect()
}

/// Binary-stream ingestion over Yellowstone gRPC.
///
/// A single subscription per run. Stream errors end the run with an error;
/// restarting is left to whoever launched the adapter.
pub struct GrpcAdapter {
    config: GrpcConfig,
    program_id: String,
    pipeline: Arc<MintPipeline>,
    session: Arc<Session>,
}

impl GrpcAdapter {
    pub fn new(
        config: GrpcConfig,
        program_id: String,
        pipeline: Arc<MintPipeline>,
        session: Arc<Session>,
    ) -> Self {
        Self {
            config,
            program_id,
            pipeline,
            session,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let (endpoint, x_token) = match self.config.credentials() {
            Ok(credentials) => credentials,
            Err(e) => {
                error!("Could not start gRPC stream: {}", e);
                return Ok(());
            }
        };

        let result = self.stream(endpoint, x_token).await;
        self.session.mark_disconnected();
        result
    }

    async fn stream(&self, endpoint: &str, x_token: &str) -> Result<()> {
        let mut client = GeyserGrpcClient::build_from_shared(endpoint.to_string())
            .map_err(|e| MintraceError::Transport(format!("invalid gRPC endpoint: {}", e)))?
            .x_token(Some(x_token.to_string()))
            .map_err(|e| MintraceError::Transport(format!("invalid x-token: {}", e)))?
            .connect()
            .await
            .map_err(|e| MintraceError::Transport(format!("failed to connect: {}", e)))?;

        let request = build_subscribe_request(&self.program_id, &self.config.filter_label);
        let (mut subscribe_tx, mut stream) = client
            .subscribe_with_request(Some(request))
            .await
            .map_err(|e| MintraceError::Transport(format!("failed to subscribe: {}", e)))?;

        self.session.mark_connected();
        info!("[grpc] Subscription request sent for program {}", self.program_id);

        loop {
            let message = tokio::select! {
                _ = self.session.stopped() => {
                    info!("[grpc] Stop requested, closing stream");
                    return Ok(());
                }
                message = stream.next() => message,
            };

            let update = match message {
                Some(Ok(update)) => update,
                Some(Err(status)) => {
                    error!("[grpc] An error occurred during data streaming: {}", status);
                    return Err(MintraceError::Transport(status.to_string()));
                }
                None => {
                    info!("[grpc] Stream ended");
                    return Ok(());
                }
            };
            self.pipeline.metrics().record_message();

            if matches!(update.update_oneof, Some(UpdateOneof::Ping(_))) {
                let ping = SubscribeRequest {
                    ping: Some(SubscribeRequestPing { id: 1 }),
                    ..Default::default()
                };
                if let Err(e) = subscribe_tx.send(ping).await {
                    warn!("[grpc] Failed to answer ping: {}", e);
                }
                continue;
            }

            match chain_event_from_update(update, &self.config.filter_label) {
                Ok(event) => {
                    self.pipeline.handle(event).await;
                }
                Err(rejection) => {
                    self.pipeline.reject(rejection);
                }
            }
        }
    }
}
