//! Event emission for strategy observability.
//!
//! Strategies report what they do (retries scheduled, circuits opened,
//! cache hits) through an [`EventSink`]. Sinks must never influence the
//! outcome of a call: emission failures are logged and suppressed.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use parking_lot::RwLock;
use std::sync::Arc;

static DEFAULT_SINK: RwLock<Option<Arc<dyn EventSink>>> = RwLock::new(None);

/// Returns the process-wide default event sink.
///
/// Defaults to [`NoOpEventSink`] until one is configured.
#[must_use]
pub fn default_event_sink() -> Arc<dyn EventSink> {
    DEFAULT_SINK
        .read()
        .clone()
        .unwrap_or_else(|| Arc::new(NoOpEventSink))
}

/// Sets the process-wide default event sink.
pub fn set_default_event_sink(sink: Arc<dyn EventSink>) {
    *DEFAULT_SINK.write() = Some(sink);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sink_is_noop_until_configured() {
        let sink = default_event_sink();
        // Emitting through the default must not panic.
        sink.try_emit("test.event", None);
    }
}
