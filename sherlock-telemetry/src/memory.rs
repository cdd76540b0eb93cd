//! In-memory event capture for tests.
//!
//! [`CaptureLayer`] records every event with its level, target, message and
//! fields. Correlation ids (`session.id`, `request.id`) set on an enclosing
//! span are copied onto the event unless the event sets them itself.
//!
//! ```rust
//! let (events, _guard) = sherlock_telemetry::memory::capture();
//! tracing::warn!(attempt = 2, "web search failed");
//! assert!(events.contains(tracing::Level::WARN, "web search failed"));
//! assert_eq!(events.all()[0].fields["attempt"], 2);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde_json::Value;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Span fields inherited by events recorded inside the span.
const CORRELATION_KEYS: [&str; 2] = ["session.id", "request.id"];

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapturedEvent {
    /// `TRACE` to `ERROR`.
    pub level: String,
    /// Module path of the emitting code.
    pub target: String,
    /// The event message.
    pub message: String,
    /// Structured fields, plus inherited correlation ids.
    pub fields: BTreeMap<String, Value>,
}

/// Shared, cloneable storage behind a [`CaptureLayer`].
#[derive(Debug, Clone, Default)]
pub struct CapturedEvents {
    events: Arc<RwLock<Vec<CapturedEvent>>>,
}

impl CapturedEvents {
    /// Every event recorded so far, oldest first.
    pub fn all(&self) -> Vec<CapturedEvent> {
        self.events.read().map(|e| e.clone()).unwrap_or_default()
    }

    /// Whether an event at `level` has a message containing `needle`.
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        let level = level.to_string();
        self.events
            .read()
            .map(|events| events.iter().any(|e| e.level == level && e.message.contains(needle)))
            .unwrap_or(false)
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        if let Ok(mut events) = self.events.write() {
            events.clear();
        }
    }

    fn push(&self, event: CapturedEvent) {
        if let Ok(mut events) = self.events.write() {
            events.push(event);
        }
    }
}

/// A layer that appends every event to a [`CapturedEvents`].
#[derive(Debug, Clone, Default)]
pub struct CaptureLayer {
    events: CapturedEvents,
}

impl CaptureLayer {
    /// Record into `events`.
    pub fn new(events: CapturedEvents) -> Self {
        Self { events }
    }
}

/// Install a capturing subscriber as the default for the current thread.
///
/// Capture stops when the guard is dropped. Works with the current-thread
/// runtime used by `#[tokio::test]`.
pub fn capture() -> (CapturedEvents, DefaultGuard) {
    let events = CapturedEvents::default();
    let guard = tracing_subscriber::registry().with(CaptureLayer::new(events.clone())).set_default();
    (events, guard)
}

#[derive(Debug, Clone, Default)]
struct SpanFields(BTreeMap<String, Value>);

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut visitor = JsonVisitor::default();
        attrs.record(&mut visitor);
        let mut fields = visitor.0;

        if let Some(parent) = span.parent() {
            if let Some(inherited) = parent.extensions().get::<SpanFields>() {
                for key in CORRELATION_KEYS {
                    if !fields.contains_key(key) {
                        if let Some(value) = inherited.0.get(key) {
                            fields.insert(key.to_string(), value.clone());
                        }
                    }
                }
            }
        }
        span.extensions_mut().insert(SpanFields(fields));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut extensions = span.extensions_mut();
        if let Some(fields) = extensions.get_mut::<SpanFields>() {
            let mut visitor = JsonVisitor::default();
            values.record(&mut visitor);
            fields.0.extend(visitor.0);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);
        let mut fields = visitor.0;
        let message = match fields.remove("message") {
            Some(Value::String(message)) => message,
            Some(other) => other.to_string(),
            None => String::new(),
        };

        if let Some(span) = ctx.event_span(event) {
            if let Some(inherited) = span.extensions().get::<SpanFields>() {
                for key in CORRELATION_KEYS {
                    if !fields.contains_key(key) {
                        if let Some(value) = inherited.0.get(key) {
                            fields.insert(key.to_string(), value.clone());
                        }
                    }
                }
            }
        }

        let metadata = event.metadata();
        self.events.push(CapturedEvent {
            level: metadata.level().to_string(),
            target: metadata.target().to_string(),
            message,
            fields,
        });
    }
}

#[derive(Default)]
struct JsonVisitor(BTreeMap<String, Value>);

impl Visit for JsonVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), Value::String(value.to_string()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().to_string(), Value::Bool(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }
}

#[cfg(test)]
mod tests {
    use tracing::{error, info, info_span};

    use super::*;

    #[test]
    fn events_keep_level_message_and_fields() {
        let (events, _guard) = capture();
        info!(chunks = 4usize, provider = "hashing", "indexed upload batch");

        let all = events.all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].level, "INFO");
        assert_eq!(all[0].message, "indexed upload batch");
        assert_eq!(all[0].fields["chunks"], 4);
        assert_eq!(all[0].fields["provider"], "hashing");
    }

    #[test]
    fn correlation_ids_flow_from_spans() {
        let (events, _guard) = capture();
        let outer = info_span!("session", session.id = "s-1");
        let _outer = outer.enter();
        let inner = info_span!("query", request.id = "r-9", top_k = 3);
        let _inner = inner.enter();
        error!("query failed");

        let event = &events.all()[0];
        assert_eq!(event.fields["session.id"], "s-1");
        assert_eq!(event.fields["request.id"], "r-9");
        assert!(!event.fields.contains_key("top_k"));
    }

    #[test]
    fn event_fields_win_over_span_fields() {
        let (events, _guard) = capture();
        let span = info_span!("query", request.id = "from-span");
        let _entered = span.enter();
        info!(request.id = "from-event", "query stage");
        assert_eq!(events.all()[0].fields["request.id"], "from-event");
    }

    #[test]
    fn clear_forgets_events() {
        let (events, _guard) = capture();
        info!("one");
        assert!(events.contains(Level::INFO, "one"));
        events.clear();
        assert!(events.all().is_empty());
    }
}
