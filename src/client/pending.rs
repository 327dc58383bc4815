//! Pending-call registry.
//!
//! Maps each in-flight request id to the oneshot sender that completes the
//! caller's future. The map is shared by callers (register / cancel on
//! timeout), the reader task (complete), and the process-exit path
//! (fail all), so it sits behind an async mutex.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};
use tracing::debug;

use crate::protocol::Response;
use crate::{AppError, Result};

/// Outcome delivered to a waiting caller.
pub type CallOutcome = Result<Response>;

/// Thread-safe map of pending-call completions keyed by request id.
#[derive(Debug, Clone, Default)]
pub struct PendingCalls {
    inner: Arc<Mutex<HashMap<String, oneshot::Sender<CallOutcome>>>>,
}

impl PendingCalls {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` and return the receiver its outcome arrives on.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] if `id` is already pending; two calls
    /// may never share an id.
    pub async fn register(&self, id: &str) -> Result<oneshot::Receiver<CallOutcome>> {
        let mut guard = self.inner.lock().await;
        if guard.contains_key(id) {
            return Err(AppError::Protocol(format!("request id '{id}' already pending")));
        }
        let (tx, rx) = oneshot::channel();
        guard.insert(id.to_owned(), tx);
        Ok(rx)
    }

    /// Deliver `response` to the call registered under its id.
    ///
    /// Returns `false` when no call is waiting (unknown id, timed out, or
    /// already answered).
    pub async fn complete(&self, response: Response) -> bool {
        let Some(tx) = self.inner.lock().await.remove(&response.id) else {
            return false;
        };
        if tx.send(Ok(response)).is_err() {
            // Caller gave up between our removal and the send.
            debug!("pending: caller dropped before completion");
        }
        true
    }

    /// Guard that stops tracking `id` when dropped.
    ///
    /// Keeps the registry clean when the caller's future is dropped before
    /// the response arrives (`select!`, an outer timeout, task abort).
    #[must_use]
    pub fn guard(&self, id: &str) -> PendingGuard {
        PendingGuard {
            calls: self.clone(),
            id: id.to_owned(),
        }
    }

    /// Stop tracking `id`. Returns `true` if it was pending.
    pub async fn cancel(&self, id: &str) -> bool {
        self.inner.lock().await.remove(id).is_some()
    }

    /// Fail every pending call with [`AppError::ProcessExited`] carrying
    /// `cause`. Returns how many calls were failed.
    pub async fn fail_all(&self, cause: &str) -> usize {
        let drained: Vec<_> = self.inner.lock().await.drain().collect();
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Err(AppError::ProcessExited(cause.to_owned())));
        }
        count
    }

    /// Number of calls currently awaiting a response.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Whether no calls are awaiting a response.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

/// Removes its call from [`PendingCalls`] on drop. Removal is a no-op once
/// the call has been completed, cancelled, or failed.
#[derive(Debug)]
pub struct PendingGuard {
    calls: PendingCalls,
    id: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if let Ok(mut map) = self.calls.inner.try_lock() {
            if map.remove(&self.id).is_some() {
                debug!(id = self.id.as_str(), "pending: call abandoned by caller");
            }
            return;
        }
        // Lock is busy; finish the removal off the dropping thread.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let calls = self.calls.clone();
            let id = std::mem::take(&mut self.id);
            handle.spawn(async move {
                calls.cancel(&id).await;
            });
        }
    }
}
