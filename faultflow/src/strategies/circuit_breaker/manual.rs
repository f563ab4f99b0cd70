//! Manual circuit control and the read-only state view.

use super::controller::BreakerController;
use super::CircuitState;
use crate::errors::FaultError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// A handle that manually drives one or more circuit breakers.
///
/// Controllers are held weakly: dropping a breaker detaches it. One
/// handle may be attached to several related breakers and fans
/// `isolate`/`close` out to all of them.
#[derive(Default)]
pub struct ManualControl {
    attachments: Mutex<Vec<Weak<BreakerController>>>,
    disposed: AtomicBool,
}

impl ManualControl {
    /// Creates a new manual control handle.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn attach(&self, controller: &Arc<BreakerController>) {
        self.attachments.lock().push(Arc::downgrade(controller));
    }

    /// Holds every attached circuit open until [`close`](Self::close).
    ///
    /// Idempotent and safe to call concurrently.
    pub async fn isolate(&self) -> Result<(), FaultError> {
        if self.is_disposed() {
            return Err(FaultError::Disposed);
        }
        for controller in self.live_controllers() {
            controller.isolate();
        }
        Ok(())
    }

    /// Closes every attached circuit and resets its statistics.
    ///
    /// Idempotent and safe to call concurrently.
    pub async fn close(&self) -> Result<(), FaultError> {
        if self.is_disposed() {
            return Err(FaultError::Disposed);
        }
        for controller in self.live_controllers() {
            controller.close();
        }
        Ok(())
    }

    /// Disposes the handle. Attached strategies reject subsequent
    /// executions with a disposed error.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.attachments.lock().clear();
    }

    /// Returns true once disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn live_controllers(&self) -> Vec<Arc<BreakerController>> {
        let mut attachments = self.attachments.lock();
        attachments.retain(|weak| weak.strong_count() > 0);
        attachments.iter().filter_map(Weak::upgrade).collect()
    }
}

impl std::fmt::Debug for ManualControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualControl")
            .field("disposed", &self.is_disposed())
            .field("attachments", &self.attachments.lock().len())
            .finish()
    }
}

/// Read-only view onto a breaker's state.
#[derive(Clone)]
pub struct StateView {
    controller: Arc<BreakerController>,
}

impl StateView {
    pub(crate) fn new(controller: Arc<BreakerController>) -> Self {
        Self { controller }
    }

    /// Returns the current circuit state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.controller.state()
    }

    /// Returns a description of the last handled outcome, if any.
    #[must_use]
    pub fn last_handled_outcome(&self) -> Option<String> {
        self.controller.last_outcome()
    }
}

impl std::fmt::Debug for StateView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateView")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::super::controller::TransitionHooks;
    use super::super::health::HealthTracker;
    use super::*;
    use crate::events::NoOpEventSink;
    use crate::time::SystemClock;
    use std::time::Duration;

    fn controller() -> Arc<BreakerController> {
        BreakerController::new(
            HealthTracker::consecutive(2),
            Duration::from_secs(60),
            Arc::new(SystemClock),
            TransitionHooks::default(),
            Arc::new(NoOpEventSink),
        )
    }

    #[tokio::test]
    async fn test_fan_out_over_attachments() {
        let control = ManualControl::new();
        let a = controller();
        let b = controller();
        control.attach(&a);
        control.attach(&b);

        control.isolate().await.unwrap();
        assert_eq!(a.state(), CircuitState::Isolated);
        assert_eq!(b.state(), CircuitState::Isolated);

        control.close().await.unwrap();
        assert_eq!(a.state(), CircuitState::Closed);
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_dropped_controller_detaches() {
        let control = ManualControl::new();
        let a = controller();
        control.attach(&a);
        {
            let short_lived = controller();
            control.attach(&short_lived);
        }

        control.isolate().await.unwrap();
        assert_eq!(a.state(), CircuitState::Isolated);
    }

    #[tokio::test]
    async fn test_disposed_close_errors() {
        let control = ManualControl::new();
        control.dispose();
        assert!(control.is_disposed());
        assert!(matches!(
            control.close().await,
            Err(FaultError::Disposed)
        ));
    }

    #[tokio::test]
    async fn test_state_view() {
        let c = controller();
        let view = StateView::new(c.clone());
        assert_eq!(view.state(), CircuitState::Closed);
        assert!(view.last_handled_outcome().is_none());
    }
}
