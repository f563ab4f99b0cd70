//! Per-execution state carried through every strategy.

mod properties;

pub use properties::{Properties, PropertyKey};

use crate::cancellation::CancellationToken;
use crate::events::{default_event_sink, EventSink};
use crate::utils::iso_timestamp;
use std::sync::Arc;
use uuid::Uuid;

/// The mutable context for one pipeline execution.
///
/// Allocated fresh at the outer entry point, shared into strategies by
/// `Arc`, and dropped when the execution returns. Callers never receive
/// the `Arc`, so references cannot outlive the call.
pub struct ExecutionContext {
    execution_id: Uuid,
    operation_key: Option<String>,
    is_synchronous: bool,
    continue_on_captured_context: bool,
    cancellation: Arc<CancellationToken>,
    properties: Properties,
    event_sink: Arc<dyn EventSink>,
}

impl ExecutionContext {
    /// Creates a context from caller options.
    #[must_use]
    pub fn from_options(options: ContextOptions, event_sink: Arc<dyn EventSink>) -> Self {
        let properties = Properties::new();
        for seed in options.seeds {
            seed(&properties);
        }
        Self {
            execution_id: Uuid::new_v4(),
            operation_key: options.operation_key,
            is_synchronous: options.is_synchronous,
            continue_on_captured_context: options.continue_on_captured_context,
            cancellation: options
                .cancellation
                .unwrap_or_else(CancellationToken::new),
            properties,
            event_sink,
        }
    }

    /// Returns the unique id of this execution.
    #[must_use]
    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    /// Returns the logical operation key, if set.
    #[must_use]
    pub fn operation_key(&self) -> Option<&str> {
        self.operation_key.as_deref()
    }

    /// Returns true when the caller entered through the blocking surface.
    ///
    /// Advisory: strategies may use it to prefer blocking primitives.
    #[must_use]
    pub fn is_synchronous(&self) -> bool {
        self.is_synchronous
    }

    /// Returns the captured-context continuation flag.
    ///
    /// Carried for API fidelity with platforms that have UI-thread
    /// affinity; a no-op here.
    #[must_use]
    pub fn continue_on_captured_context(&self) -> bool {
        self.continue_on_captured_context
    }

    /// Returns the cancellation token for this execution.
    #[must_use]
    pub fn cancellation(&self) -> &Arc<CancellationToken> {
        &self.cancellation
    }

    /// Returns the property bag.
    #[must_use]
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Returns the event sink.
    #[must_use]
    pub fn event_sink(&self) -> &Arc<dyn EventSink> {
        &self.event_sink
    }

    /// Creates a child context for a speculative or bounded attempt.
    ///
    /// The child shares the operation key, a snapshot of the properties,
    /// and the event sink. Its cancellation token is a linked child:
    /// canceling the parent cancels the fork, never the reverse.
    #[must_use]
    pub fn fork(&self) -> Arc<Self> {
        Arc::new(Self {
            execution_id: self.execution_id,
            operation_key: self.operation_key.clone(),
            is_synchronous: self.is_synchronous,
            continue_on_captured_context: self.continue_on_captured_context,
            cancellation: self.cancellation.child(),
            properties: self.properties.clone(),
            event_sink: self.event_sink.clone(),
        })
    }

    /// Emits an event enriched with execution metadata.
    ///
    /// Never fails the caller.
    pub fn try_emit_event(&self, event_type: &str, data: Option<serde_json::Value>) {
        let mut enriched = data.unwrap_or_else(|| serde_json::json!({}));

        if let serde_json::Value::Object(ref mut map) = enriched {
            map.insert(
                "execution_id".to_string(),
                serde_json::json!(self.execution_id.to_string()),
            );
            if let Some(ref key) = self.operation_key {
                map.insert("operation_key".to_string(), serde_json::json!(key));
            }
            map.insert("timestamp".to_string(), serde_json::json!(iso_timestamp()));
        }

        self.event_sink.try_emit(event_type, Some(enriched));
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("execution_id", &self.execution_id)
            .field("operation_key", &self.operation_key)
            .field("is_synchronous", &self.is_synchronous)
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}

type PropertySeed = Box<dyn FnOnce(&Properties) + Send>;

/// Caller-supplied options for one execution.
#[derive(Default)]
pub struct ContextOptions {
    operation_key: Option<String>,
    is_synchronous: bool,
    continue_on_captured_context: bool,
    cancellation: Option<Arc<CancellationToken>>,
    seeds: Vec<PropertySeed>,
}

impl ContextOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the logical operation key (used for cache keys and events).
    #[must_use]
    pub fn with_operation_key(mut self, key: impl Into<String>) -> Self {
        self.operation_key = Some(key.into());
        self
    }

    /// Attaches a caller-owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Sets the captured-context continuation flag.
    #[must_use]
    pub fn with_continue_on_captured_context(mut self, value: bool) -> Self {
        self.continue_on_captured_context = value;
        self
    }

    /// Seeds a property into the context before execution begins.
    #[must_use]
    pub fn with_property<V>(mut self, key: PropertyKey<V>, value: V) -> Self
    where
        V: Send + Sync + 'static,
    {
        self.seeds.push(Box::new(move |props| props.set(key, value)));
        self
    }

    pub(crate) fn mark_synchronous(mut self) -> Self {
        self.is_synchronous = true;
        self
    }
}

/// Builds a context with the process-default event sink. Convenience
/// for tests and standalone strategy use.
#[must_use]
pub fn context_from(options: ContextOptions) -> Arc<ExecutionContext> {
    Arc::new(ExecutionContext::from_options(options, default_event_sink()))
}
