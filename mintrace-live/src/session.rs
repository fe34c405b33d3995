use mintrace_core::Source;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Connection state of one adapter, shared with whoever coordinates it
#[derive(Debug)]
pub struct Session {
    source: Source,
    connected: AtomicBool,
    connects: AtomicU64,
    stop_tx: watch::Sender<bool>,
}

/// Point-in-time view of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub source: Source,
    pub connected: bool,
    pub connects: u64,
    pub stopped: bool,
}

impl Session {
    pub fn new(source: Source) -> Arc<Self> {
        let (stop_tx, _) = watch::channel(false);
        Arc::new(Self {
            source,
            connected: AtomicBool::new(false),
            connects: AtomicU64::new(0),
            stop_tx,
        })
    }

    pub fn mark_connected(&self) {
        self.connected.store(true, Ordering::SeqCst);
        self.connects.fetch_add(1, Ordering::SeqCst);
    }

    pub fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Ask the adapter to wind down; idempotent
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Resolves once `stop` has been called
    pub async fn stopped(&self) {
        let mut rx = self.stop_tx.subscribe();
        // Sender lives in self, so wait_for can only fail after drop
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            source: self.source,
            connected: self.is_connected(),
            connects: self.connects.load(Ordering::SeqCst),
            stopped: self.is_stopped(),
        }
    }
}
