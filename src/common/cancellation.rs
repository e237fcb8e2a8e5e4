//! Cancellation and deadlines for calls across the ledger boundary
//!
//! Every ledger call (UTXO query, hash computation, finalize, submit, fetch) is
//! a suspension point. The caller supplies a [`CallContext`] and each boundary
//! honors it: a cancelled context surfaces [`DraftError::Cancelled`], an elapsed
//! per-call deadline surfaces [`LedgerError::Timeout`].

use std::future::Future;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Notify};

use crate::errors::{DraftError, DraftResult, LedgerError};

/// Generic cancellation token
#[async_trait]
pub trait CancellationToken: Send + Sync + std::fmt::Debug {
    /// Check if cancellation has been requested
    fn is_cancelled(&self) -> bool;

    /// Request cancellation of the operation
    fn cancel(&self);

    /// Resolves once cancellation has been requested; never resolves otherwise
    async fn cancelled(&self);
}

#[derive(Debug, Default)]
struct AtomicFlag {
    cancelled: AtomicBool,
    notify: Notify,
}

impl AtomicFlag {
    fn set(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    fn is_set(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Atomic boolean-based cancellation token
#[derive(Debug, Clone, Default)]
pub struct AtomicCancellationToken {
    flag: Arc<AtomicFlag>,
}

impl AtomicCancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pair of (token, handle) where the handle can be used to cancel
    pub fn create_pair() -> (Self, CancellationHandle) {
        let token = Self::new();
        let handle = CancellationHandle {
            flag: token.flag.clone(),
        };
        (token, handle)
    }
}

#[async_trait]
impl CancellationToken for AtomicCancellationToken {
    fn is_cancelled(&self) -> bool {
        self.flag.is_set()
    }

    fn cancel(&self) {
        self.flag.set();
    }

    async fn cancelled(&self) {
        loop {
            let notified = self.flag.notify.notified();
            tokio::pin!(notified);
            // Register before re-checking so a concurrent cancel is not missed
            notified.as_mut().enable();
            if self.flag.is_set() {
                return;
            }
            notified.await;
        }
    }
}

/// Handle for cancelling an operation from another task
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    flag: Arc<AtomicFlag>,
}

impl CancellationHandle {
    pub fn cancel(&self) {
        self.flag.set();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.is_set()
    }
}

/// Cancellation token over a `tokio::sync::watch` channel
#[derive(Debug)]
pub struct TokioCancellationToken {
    receiver: watch::Receiver<bool>,
    sender: Option<watch::Sender<bool>>,
}

impl TokioCancellationToken {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            receiver,
            sender: Some(sender),
        }
    }

    /// Observe an existing channel; such a token cannot cancel by itself
    pub fn from_receiver(receiver: watch::Receiver<bool>) -> Self {
        Self {
            receiver,
            sender: None,
        }
    }

    pub fn create_pair() -> (Self, TokioCancellationHandle) {
        let (sender, receiver) = watch::channel(false);
        (
            Self::from_receiver(receiver),
            TokioCancellationHandle { sender },
        )
    }
}

impl Default for TokioCancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CancellationToken for TokioCancellationToken {
    fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    fn cancel(&self) {
        if let Some(sender) = &self.sender {
            sender.send_replace(true);
        }
    }

    async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        let closed = receiver.wait_for(|cancelled| *cancelled).await.is_err();
        if closed {
            // Sender gone without cancelling: cancellation can no longer happen
            std::future::pending::<()>().await;
        }
    }
}

#[derive(Debug)]
pub struct TokioCancellationHandle {
    sender: watch::Sender<bool>,
}

impl TokioCancellationHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Whether every token observing this handle has been dropped
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// A cancellation token that never cancels
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancelToken;

#[async_trait]
impl CancellationToken for NeverCancelToken {
    fn is_cancelled(&self) -> bool {
        false
    }

    fn cancel(&self) {}

    async fn cancelled(&self) {
        std::future::pending::<()>().await
    }
}

/// Cancellation token plus an optional per-call deadline
#[derive(Debug, Clone)]
pub struct CallContext {
    token: Arc<dyn CancellationToken>,
    call_timeout: Option<Duration>,
}

impl Default for CallContext {
    fn default() -> Self {
        Self::background()
    }
}

impl CallContext {
    /// A context that is never cancelled and has no deadline
    pub fn background() -> Self {
        Self {
            token: Arc::new(NeverCancelToken),
            call_timeout: None,
        }
    }

    pub fn with_token(token: Arc<dyn CancellationToken>) -> Self {
        Self {
            token,
            call_timeout: None,
        }
    }

    /// Apply a deadline to every individual ledger call
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fail fast if the context is already cancelled
    pub fn check(&self, step: &'static str) -> DraftResult<()> {
        if self.token.is_cancelled() {
            return Err(DraftError::Cancelled { step });
        }
        Ok(())
    }

    /// Run one boundary call under this context
    pub async fn run<F, T>(&self, step: &'static str, call: F) -> DraftResult<T>
    where
        F: Future<Output = DraftResult<T>>,
    {
        self.check(step)?;

        let guarded = async {
            tokio::select! {
                result = call => result,
                _ = self.token.cancelled() => Err(DraftError::Cancelled { step }),
            }
        };

        match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, guarded)
                .await
                .map_err(|_| DraftError::Ledger(LedgerError::Timeout { step }))?,
            None => guarded.await,
        }
    }
}
