//! Hedging: parallel speculative attempts, first acceptable outcome wins.

use super::{Next, Operation, Strategy};
use crate::context::ExecutionContext;
use crate::errors::FaultError;
use crate::outcome::Outcome;
use crate::predicate::{handle_exceptions, Predicate};
use crate::time::{Clock, SystemClock};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Produces the operation for a given attempt index (0 = primary).
pub type ActionGenerator<T> = Arc<dyn Fn(usize) -> Operation<T> + Send + Sync>;

/// Computes the hedging delay before launching the given attempt.
pub type DelayGenerator = Arc<dyn Fn(usize) -> Duration + Send + Sync>;

/// Hook invoked when a hedged attempt launches (index >= 1).
pub type HedgeHook = Arc<dyn Fn(usize) + Send + Sync>;

/// Configuration for the hedging strategy.
#[derive(Clone)]
pub struct HedgingOptions<T> {
    /// Total attempts that may launch, including the primary.
    pub max_hedged_attempts: usize,
    /// How long to wait for an attempt before launching the next.
    pub hedging_delay: Duration,
    /// Optional per-attempt delay override.
    pub delay_generator: Option<DelayGenerator>,
    /// Decides which outcomes are unacceptable and keep the race going.
    pub should_handle: Predicate<T>,
    /// Optional per-attempt operation override. When unset, every
    /// attempt re-invokes the continuation.
    pub action_generator: Option<ActionGenerator<T>>,
    /// Invoked when a hedged attempt launches.
    pub on_hedge: Option<HedgeHook>,
}

impl<T> HedgingOptions<T> {
    /// Creates options with the given attempt budget and a one second
    /// hedging delay.
    #[must_use]
    pub fn new(max_hedged_attempts: usize) -> Self {
        Self {
            max_hedged_attempts,
            hedging_delay: Duration::from_secs(1),
            delay_generator: None,
            should_handle: handle_exceptions(),
            action_generator: None,
            on_hedge: None,
        }
    }

    /// Sets the hedging delay.
    #[must_use]
    pub fn with_hedging_delay(mut self, delay: Duration) -> Self {
        self.hedging_delay = delay;
        self
    }

    /// Sets a per-attempt delay generator.
    #[must_use]
    pub fn with_delay_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(usize) -> Duration + Send + Sync + 'static,
    {
        self.delay_generator = Some(Arc::new(generator));
        self
    }

    /// Sets the handled-outcome predicate.
    #[must_use]
    pub fn with_should_handle(mut self, predicate: Predicate<T>) -> Self {
        self.should_handle = predicate;
        self
    }

    /// Sets a per-attempt operation generator.
    #[must_use]
    pub fn with_action_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(usize) -> Operation<T> + Send + Sync + 'static,
    {
        self.action_generator = Some(Arc::new(generator));
        self
    }

    /// Sets the hedge hook.
    #[must_use]
    pub fn with_on_hedge<F>(mut self, hook: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.on_hedge = Some(Arc::new(hook));
        self
    }

    pub(crate) fn validate(&self, violations: &mut Vec<String>) {
        if self.max_hedged_attempts < 1 {
            violations.push(format!(
                "hedging: max_hedged_attempts ({}) must be at least 1",
                self.max_hedged_attempts
            ));
        }
    }
}

/// Launches the primary attempt and, after each hedging delay without a
/// decision, another speculative attempt. The first outcome the
/// predicate does not handle wins; all other in-flight attempts are
/// cancelled through their forked contexts and joined before returning.
pub struct HedgingStrategy<T> {
    options: HedgingOptions<T>,
    clock: Arc<dyn Clock>,
}

impl<T> HedgingStrategy<T> {
    /// Creates a hedging strategy with the production clock.
    #[must_use]
    pub fn new(options: HedgingOptions<T>) -> Self {
        Self {
            options,
            clock: Arc::new(SystemClock),
        }
    }

    /// Substitutes the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        match self.options.delay_generator {
            Some(ref generator) => generator(attempt),
            None => self.options.hedging_delay,
        }
    }

    fn announce(&self, ctx: &ExecutionContext, attempt: usize) {
        if attempt == 0 {
            return;
        }
        if let Some(ref hook) = self.options.on_hedge {
            hook(attempt);
        }
        ctx.try_emit_event(
            "hedging.attempt",
            Some(serde_json::json!({ "attempt": attempt })),
        );
        tracing::debug!(attempt, "launching hedged attempt");
    }
}

#[async_trait]
impl<T> Strategy<T> for HedgingStrategy<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "hedging"
    }

    async fn execute(&self, ctx: Arc<ExecutionContext>, next: Next<T>) -> Outcome<T> {
        let max = self.options.max_hedged_attempts.max(1);
        let (tx, mut rx) = mpsc::unbounded_channel::<Outcome<T>>();
        let mut children: Vec<Arc<ExecutionContext>> = Vec::new();
        let mut handles = Vec::new();

        let spawn = |attempt: usize,
                     children: &mut Vec<Arc<ExecutionContext>>,
                     handles: &mut Vec<tokio::task::JoinHandle<()>>| {
            let child = ctx.fork();
            children.push(child.clone());
            let action = self.options.action_generator.clone();
            let attempt_next = next.clone();
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                let outcome = match action {
                    Some(generator) => generator(attempt)(child).await,
                    None => attempt_next.run(child).await,
                };
                let _ = tx.send(outcome);
            }));
        };

        let mut launched = 1usize;
        let mut completed = 0usize;
        spawn(0, &mut children, &mut handles);

        let winner = loop {
            let delay = self.delay_for(launched);
            tokio::select! {
                received = rx.recv() => {
                    let Some(outcome) = received else {
                        break Outcome::Exception(FaultError::canceled(None));
                    };
                    completed += 1;
                    if !(self.options.should_handle)(&outcome) {
                        break outcome;
                    }
                    if launched < max {
                        // A handled outcome frees the race to hedge
                        // immediately instead of waiting out the delay.
                        self.announce(&ctx, launched);
                        spawn(launched, &mut children, &mut handles);
                        launched += 1;
                    } else if completed >= launched {
                        // Budget spent and every attempt handled: the
                        // last outcome is the answer.
                        break outcome;
                    }
                }
                () = self.clock.sleep(delay), if launched < max => {
                    self.announce(&ctx, launched);
                    spawn(launched, &mut children, &mut handles);
                    launched += 1;
                }
                () = ctx.cancellation().cancelled() => {
                    break Outcome::Exception(FaultError::canceled(
                        ctx.cancellation().reason(),
                    ));
                }
            }
        };

        // Cancel the losers and join every attempt: no leaked work.
        for child in &children {
            child.cancellation().cancel("hedging attempt superseded");
        }
        drop(tx);
        for handle in handles {
            let _ = handle.await;
        }
        winner
    }
}
