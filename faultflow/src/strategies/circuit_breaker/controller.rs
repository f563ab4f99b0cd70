//! The shared state machine behind circuit breaker strategies.

use super::health::HealthTracker;
use super::CircuitState;
use crate::errors::FaultError;
use crate::events::EventSink;
use crate::time::Clock;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A state transition observed by the controller.
#[derive(Debug, Clone)]
pub struct TransitionEvent {
    /// State before the transition.
    pub from: CircuitState,
    /// State after the transition.
    pub to: CircuitState,
    /// True when the transition came from manual control.
    pub manual: bool,
    /// Description of the outcome driving the transition, if any.
    pub outcome: Option<String>,
}

/// Hook invoked on circuit state transitions.
pub type TransitionHook = Arc<dyn Fn(&TransitionEvent) + Send + Sync>;

/// Transition hooks, one slot per destination state.
#[derive(Clone, Default)]
pub struct TransitionHooks {
    /// Fired when the circuit opens (including manual isolation).
    pub on_opened: Option<TransitionHook>,
    /// Fired when the circuit closes.
    pub on_closed: Option<TransitionHook>,
    /// Fired when the circuit half-opens.
    pub on_half_opened: Option<TransitionHook>,
}

/// How a call was admitted through the circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A regular call through a closed circuit.
    Normal,
    /// The single probe admitted while half-open.
    Probe,
}

struct ControllerState {
    circuit: CircuitState,
    health: HealthTracker,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    last_outcome: Option<String>,
}

/// Serializes circuit transitions and owns the failure statistics.
///
/// One controller may back several strategy instances; transitions are
/// linearized under a single mutex. Transition events are queued under
/// the state lock and drained under a separate dispatch lock, so hooks
/// observe transitions in order without the state lock being held
/// across them.
pub struct BreakerController {
    break_duration: Duration,
    clock: Arc<dyn Clock>,
    state: Mutex<ControllerState>,
    queue: Mutex<VecDeque<TransitionEvent>>,
    dispatch: Mutex<()>,
    hooks: TransitionHooks,
    sink: Arc<dyn EventSink>,
}

impl BreakerController {
    pub(crate) fn new(
        health: HealthTracker,
        break_duration: Duration,
        clock: Arc<dyn Clock>,
        hooks: TransitionHooks,
        sink: Arc<dyn EventSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            break_duration,
            clock,
            state: Mutex::new(ControllerState {
                circuit: CircuitState::Closed,
                health,
                opened_at: None,
                probe_in_flight: false,
                last_outcome: None,
            }),
            queue: Mutex::new(VecDeque::new()),
            dispatch: Mutex::new(()),
            hooks,
            sink,
        })
    }

    /// Returns the current circuit state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.state.lock().circuit
    }

    /// Returns a description of the last handled outcome, if any.
    #[must_use]
    pub fn last_outcome(&self) -> Option<String> {
        self.state.lock().last_outcome.clone()
    }

    /// Decides whether a call may proceed, transitioning state first if
    /// the break timer expired or the statistics warrant a trip.
    pub(crate) fn admit(&self) -> Result<Admission, FaultError> {
        let result = {
            let mut state = self.state.lock();
            let now = self.clock.now();

            match state.circuit {
                CircuitState::Isolated => Err(FaultError::IsolatedCircuit),
                CircuitState::Closed => {
                    if state.health.should_trip(now) {
                        self.transition(&mut state, CircuitState::Open, false);
                        state.opened_at = Some(now);
                        Err(self.broken(&state, now))
                    } else {
                        Ok(Admission::Normal)
                    }
                }
                CircuitState::Open => {
                    let opened_at = state.opened_at.unwrap_or(now);
                    if now.saturating_duration_since(opened_at) >= self.break_duration {
                        self.transition(&mut state, CircuitState::HalfOpen, false);
                        state.probe_in_flight = true;
                        Ok(Admission::Probe)
                    } else {
                        Err(self.broken(&state, now))
                    }
                }
                CircuitState::HalfOpen => {
                    if state.probe_in_flight {
                        Err(self.broken(&state, now))
                    } else {
                        state.probe_in_flight = true;
                        Ok(Admission::Probe)
                    }
                }
            }
        };
        self.dispatch_events();
        result
    }

    /// Records the outcome of an admitted call.
    pub(crate) fn record(&self, admission: Admission, handled: bool, description: String) {
        {
            let mut state = self.state.lock();
            let now = self.clock.now();

            if handled {
                state.last_outcome = Some(description);
            }

            match admission {
                Admission::Probe => {
                    state.probe_in_flight = false;
                    if state.circuit == CircuitState::HalfOpen {
                        if handled {
                            self.transition(&mut state, CircuitState::Open, false);
                            state.opened_at = Some(now);
                        } else {
                            self.transition(&mut state, CircuitState::Closed, false);
                            state.health.reset(now);
                        }
                    }
                }
                Admission::Normal => {
                    if state.circuit == CircuitState::Closed {
                        state.health.record(handled, now);
                        if handled && state.health.should_trip(now) {
                            self.transition(&mut state, CircuitState::Open, false);
                            state.opened_at = Some(now);
                        }
                    }
                }
            }
        }
        self.dispatch_events();
    }

    /// Manually holds the circuit open. Idempotent.
    pub(crate) fn isolate(&self) {
        {
            let mut state = self.state.lock();
            if state.circuit != CircuitState::Isolated {
                self.transition(&mut state, CircuitState::Isolated, true);
                state.probe_in_flight = false;
            }
        }
        self.dispatch_events();
    }

    /// Manually closes the circuit and resets statistics. Idempotent.
    pub(crate) fn close(&self) {
        {
            let mut state = self.state.lock();
            let now = self.clock.now();
            if state.circuit != CircuitState::Closed {
                self.transition(&mut state, CircuitState::Closed, true);
                state.health.reset(now);
                state.probe_in_flight = false;
                state.opened_at = None;
            }
        }
        self.dispatch_events();
    }

    fn broken(&self, state: &ControllerState, now: Instant) -> FaultError {
        let retry_after = match (state.circuit, state.opened_at) {
            (CircuitState::Open, Some(opened_at)) => self
                .break_duration
                .saturating_sub(now.saturating_duration_since(opened_at)),
            _ => Duration::ZERO,
        };
        FaultError::BrokenCircuit {
            retry_after,
            last_outcome: state.last_outcome.clone().unwrap_or_default(),
        }
    }

    fn transition(&self, state: &mut ControllerState, to: CircuitState, manual: bool) {
        let from = state.circuit;
        state.circuit = to;
        self.queue.lock().push_back(TransitionEvent {
            from,
            to,
            manual,
            outcome: state.last_outcome.clone(),
        });
    }

    fn dispatch_events(&self) {
        let _order = self.dispatch.lock();
        loop {
            let event = self.queue.lock().pop_front();
            let Some(event) = event else { break };

            let hook = match event.to {
                CircuitState::Open | CircuitState::Isolated => &self.hooks.on_opened,
                CircuitState::Closed => &self.hooks.on_closed,
                CircuitState::HalfOpen => &self.hooks.on_half_opened,
            };
            if let Some(hook) = hook {
                hook(&event);
            }

            let name = match event.to {
                CircuitState::Open => "circuit.opened",
                CircuitState::Closed => "circuit.closed",
                CircuitState::HalfOpen => "circuit.half_opened",
                CircuitState::Isolated => "circuit.isolated",
            };
            self.sink.try_emit(
                name,
                Some(serde_json::json!({
                    "from": format!("{:?}", event.from),
                    "to": format!("{:?}", event.to),
                    "manual": event.manual,
                    "outcome": event.outcome,
                })),
            );
            tracing::debug!(from = ?event.from, to = ?event.to, manual = event.manual, "circuit transition");
        }
    }
}

impl std::fmt::Debug for BreakerController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerController")
            .field("state", &self.state())
            .field("break_duration", &self.break_duration)
            .finish()
    }
}
