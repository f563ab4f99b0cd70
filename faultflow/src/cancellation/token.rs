//! Cancellation token with callbacks, async waiting, and linked children.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::warn;

/// A token for cooperative cancellation.
///
/// Cancellation is idempotent: only the first reason is kept. Callbacks
/// registered before cancellation run exactly once; callbacks registered
/// after run immediately. Waiters parked on [`cancelled`](Self::cancelled)
/// are woken on the first cancel.
pub struct CancellationToken {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
    callbacks: Mutex<Vec<Box<dyn FnOnce(String) + Send>>>,
    children: Mutex<Vec<Weak<CancellationToken>>>,
    signal: watch::Sender<bool>,
}

impl CancellationToken {
    /// Creates a new token.
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (signal, _) = watch::channel(false);
        Arc::new(Self {
            cancelled: AtomicBool::new(false),
            reason: RwLock::new(None),
            callbacks: Mutex::new(Vec::new()),
            children: Mutex::new(Vec::new()),
            signal,
        })
    }

    /// Returns true if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if cancelled.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }

    /// Requests cancellation with a reason.
    ///
    /// Idempotent: only the first reason is stored. Panics in callbacks
    /// are logged and suppressed. Linked children are cancelled with the
    /// same reason.
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();

        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.reason.write() = Some(reason.clone());
        let _ = self.signal.send(true);

        let callbacks: Vec<_> = std::mem::take(&mut *self.callbacks.lock());
        for callback in callbacks {
            let r = reason.clone();
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(r))).is_err() {
                warn!("cancellation callback panicked");
            }
        }

        let children: Vec<_> = std::mem::take(&mut *self.children.lock());
        for child in children {
            if let Some(child) = child.upgrade() {
                child.cancel(reason.clone());
            }
        }
    }

    /// Registers a callback to run on cancellation.
    ///
    /// If already cancelled, the callback runs immediately.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: FnOnce(String) + Send + 'static,
    {
        if self.is_cancelled() {
            let reason = self.reason().unwrap_or_default();
            callback(reason);
        } else {
            self.callbacks.lock().push(Box::new(callback));
        }
    }

    /// Waits until cancellation is requested.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        let mut rx = self.signal.subscribe();
        if *rx.borrow() {
            return;
        }
        // The sender lives in self, so changed() cannot error while the
        // token is alive.
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }

    /// Creates a child token linked to this one.
    ///
    /// Cancelling the parent cancels the child; cancelling the child
    /// leaves the parent untouched. A child created from an already
    /// cancelled parent starts cancelled.
    #[must_use]
    pub fn child(self: &Arc<Self>) -> Arc<CancellationToken> {
        let child = CancellationToken::new();
        if self.is_cancelled() {
            child.cancel(self.reason().unwrap_or_default());
        } else {
            self.children.lock().push(Arc::downgrade(&child));
            // Re-check: the parent may have cancelled between the check
            // and the registration.
            if self.is_cancelled() {
                child.cancel(self.reason().unwrap_or_default());
            }
        }
        child
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}
