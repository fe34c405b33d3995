use crate::rpc::TransactionFetcher;
use crate::session::Session;
use futures::{SinkExt, StreamExt};
use mintrace_core::{
    retry_until_some, ChainEvent, EventOutcome, MintPipeline, MintraceError, ReconnectPolicy,
    Rejection, Result, RetryPolicy, WssConfig,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// `logsSubscribe` request for transactions mentioning `program_id`
pub fn subscribe_request(program_id: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": program_id,
        "method": "logsSubscribe",
        "params": [
            {"mentions": [program_id]},
            {"commitment": "processed"}
        ]
    })
}

/// A decoded inbound text frame
#[derive(Debug, Clone, PartialEq)]
pub enum WssMessage {
    /// Reply to our subscription request
    Ack,
    Notification { signature: String, logs: Vec<String> },
}

pub fn parse_message(text: &str) -> std::result::Result<WssMessage, Rejection> {
    let value: Value = serde_json::from_str(text).map_err(|_| Rejection::MalformedPayload)?;

    let has_error = value.get("error").is_some_and(|e| !e.is_null());
    if value.get("result").is_some() && !has_error {
        return Ok(WssMessage::Ack);
    }

    let is_notification = value.get("jsonrpc").is_some()
        && value.get("method").and_then(Value::as_str) == Some("logsNotification")
        && value.get("params").is_some_and(Value::is_object);
    if !is_notification {
        return Err(Rejection::MalformedPayload);
    }

    let payload = &value["params"]["result"]["value"];
    let logs = payload["logs"]
        .as_array()
        .ok_or(Rejection::MissingField("logs"))?
        .iter()
        .filter_map(|log| log.as_str().map(str::to_string))
        .collect();
    let signature = payload["signature"]
        .as_str()
        .filter(|sig| !sig.is_empty())
        .ok_or(Rejection::MissingField("signature"))?
        .to_string();

    Ok(WssMessage::Notification { signature, logs })
}

enum StreamEnd {
    Closed,
    Stopped,
}

/// Push-socket ingestion: log notifications plus an RPC lookup per match
pub struct WssAdapter {
    config: WssConfig,
    program_id: String,
    pipeline: Arc<MintPipeline>,
    fetcher: Arc<dyn TransactionFetcher>,
    session: Arc<Session>,
    fetch_retry: RetryPolicy,
    reconnect: ReconnectPolicy,
}

impl WssAdapter {
    pub fn new(
        config: WssConfig,
        program_id: String,
        pipeline: Arc<MintPipeline>,
        fetcher: Arc<dyn TransactionFetcher>,
        session: Arc<Session>,
    ) -> Self {
        Self {
            config,
            program_id,
            pipeline,
            fetcher,
            session,
            fetch_retry: RetryPolicy::none(),
            reconnect: ReconnectPolicy::default(),
        }
    }

    pub fn with_fetch_retry(mut self, policy: RetryPolicy) -> Self {
        self.fetch_retry = policy;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Connect, stream and reconnect until stopped or out of attempts
    pub async fn run(&self) -> Result<()> {
        let (ws_url, _) = match self.config.endpoints() {
            Ok(endpoints) => endpoints,
            Err(e) => {
                error!("Could not start Websocket stream: {}", e);
                return Ok(());
            }
        };

        let mut failures = 0u32;
        while !self.session.is_stopped() {
            match self.stream(ws_url).await {
                Ok(StreamEnd::Stopped) => break,
                Ok(StreamEnd::Closed) => {
                    failures = 0;
                    info!("[wss] Websocket closed");
                }
                Err(e) => error!("[wss] {}", e),
            }
            self.session.mark_disconnected();

            let Some(delay) = self.reconnect.next_delay(failures) else {
                error!("[wss] Giving up after {} failed connection attempts", failures);
                return Err(MintraceError::Transport(
                    "reconnect attempts exhausted".to_string(),
                ));
            };
            failures += 1;
            self.pipeline.metrics().record_reconnection();
            info!("[wss] Trying to open connection again in {:?}", delay);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.session.stopped() => break,
            }
        }

        self.session.mark_disconnected();
        info!("[wss] Stopped");
        Ok(())
    }

    async fn stream(&self, ws_url: &str) -> Result<StreamEnd> {
        let (mut ws, _response) = connect_async(ws_url)
            .await
            .map_err(|e| MintraceError::Transport(format!("failed connecting to {}: {}", ws_url, e)))?;

        let request = subscribe_request(&self.program_id);
        ws.send(Message::Text(request.to_string().into()))
            .await
            .map_err(|e| MintraceError::Transport(format!("failed sending logsSubscribe: {}", e)))?;

        self.session.mark_connected();
        info!("[wss] Connected to {}", ws_url);

        loop {
            let next = tokio::select! {
                _ = self.session.stopped() => None,
                next = ws.next() => Some(next),
            };
            let Some(next) = next else {
                if let Err(e) = ws.close(None).await {
                    debug!("[wss] Close handshake failed: {}", e);
                }
                return Ok(StreamEnd::Stopped);
            };

            match next {
                Some(Ok(Message::Text(text))) => {
                    self.handle_text(text.as_str()).await;
                }
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(e) = ws.send(Message::Pong(payload)).await {
                        warn!("[wss] Failed to send pong: {}", e);
                        return Ok(StreamEnd::Closed);
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!("[wss] Close frame: {:?}", frame);
                    return Ok(StreamEnd::Closed);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("[wss] An error occurred during data streaming: {}", e);
                    return Ok(StreamEnd::Closed);
                }
                None => return Ok(StreamEnd::Closed),
            }
        }
    }

    /// Process one text frame to completion
    pub async fn handle_text(&self, text: &str) -> EventOutcome {
        self.pipeline.metrics().record_message();

        let (signature, logs) = match parse_message(text) {
            Ok(WssMessage::Ack) => {
                info!("[wss] Subscription request confirmed");
                return self.pipeline.reject(Rejection::SubscriptionAck);
            }
            Ok(WssMessage::Notification { signature, logs }) => (signature, logs),
            Err(rejection) => return self.pipeline.reject(rejection),
        };

        if !self.pipeline.matcher().matches_logs(&logs) {
            return self.pipeline.reject(Rejection::NotProgramMatch);
        }

        let metrics = self.pipeline.metrics();
        let fetched = retry_until_some(&self.fetch_retry, || async {
            let result = self.fetcher.fetch(&signature).await;
            metrics.record_rpc_call(result.is_err());
            result
        })
        .await;

        let transaction = match fetched {
            Ok(Some(transaction)) => transaction,
            Ok(None) => return self.pipeline.reject(Rejection::TransactionUnavailable),
            Err(e) => {
                warn!("[wss] Failed to fetch transaction {}: {}", signature, e);
                return self.pipeline.reject(Rejection::TransactionUnavailable);
            }
        };

        let event = ChainEvent {
            signature,
            logs,
            pre_token_balances: transaction.pre_token_balances,
            post_token_balances: transaction.post_token_balances,
            ..Default::default()
        };
        self.pipeline.handle(event).await
    }
}
