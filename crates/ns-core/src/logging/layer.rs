//! Custom tracing layer for JSONL output.
//!
//! This layer produces machine-parseable JSONL logs on stderr while
//! keeping stdout clean for command payloads.

use std::io::{self, Write};
use std::sync::Mutex;

use chrono::Utc;
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use super::events::Level;

/// Field names whose values never reach the log.
const SECRET_FIELDS: &[&str] = &["mnemonic", "password", "passphrase", "priv_key", "private_key"];

const REDACTED: &str = "[redacted]";

fn is_secret(name: &str) -> bool {
    SECRET_FIELDS.contains(&name)
}

/// Storage for span context data.
#[derive(Debug, Clone, Default)]
struct SpanContext {
    run_id: Option<String>,
    host_id: Option<String>,
    stage: Option<String>,
}

/// A visitor that extracts field values from tracing events.
struct JsonFieldVisitor {
    fields: serde_json::Map<String, serde_json::Value>,
    message: Option<String>,
}

impl JsonFieldVisitor {
    fn new() -> Self {
        JsonFieldVisitor {
            fields: serde_json::Map::new(),
            message: None,
        }
    }

    fn insert_str(&mut self, name: &str, value: String) {
        let value = if is_secret(name) {
            REDACTED.to_string()
        } else {
            value
        };
        self.fields
            .insert(name.to_string(), serde_json::Value::String(value));
    }
}

impl tracing::field::Visit for JsonFieldVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.insert_str(field.name(), value.to_string());
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let s = format!("{:?}", value);
        if field.name() == "message" {
            self.message = Some(s);
        } else {
            self.insert_str(field.name(), s);
        }
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.fields.insert(
            field.name().to_string(),
            serde_json::Value::Number(value.into()),
        );
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.fields.insert(
            field.name().to_string(),
            serde_json::Value::Number(serde_json::Number::from(value)),
        );
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        if let Some(n) = serde_json::Number::from_f64(value) {
            self.fields
                .insert(field.name().to_string(), serde_json::Value::Number(n));
        }
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Bool(value));
    }
}

/// A visitor for extracting span context.
struct SpanContextVisitor {
    context: SpanContext,
}

impl tracing::field::Visit for SpanContextVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        match field.name() {
            "run_id" => self.context.run_id = Some(value.to_string()),
            "host_id" => self.context.host_id = Some(value.to_string()),
            "stage" => self.context.stage = Some(value.to_string()),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        // Display-formatted (`%`) fields arrive here
        let s = format!("{:?}", value);
        match field.name() {
            "run_id" => self.context.run_id = Some(s),
            "host_id" => self.context.host_id = Some(s),
            "stage" => self.context.stage = Some(s),
            _ => {}
        }
    }
}

/// JSONL tracing layer that outputs to stderr.
pub struct JsonlLayer<W = io::Stderr> {
    writer: Mutex<W>,
}

impl JsonlLayer<io::Stderr> {
    /// Create a new JSONL layer writing to stderr.
    pub fn stderr() -> Self {
        JsonlLayer {
            writer: Mutex::new(io::stderr()),
        }
    }
}

impl<W: Write> JsonlLayer<W> {
    /// Create a new JSONL layer with a custom writer.
    pub fn new(writer: W) -> Self {
        JsonlLayer {
            writer: Mutex::new(writer),
        }
    }
}

impl<S, W> Layer<S> for JsonlLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: Write + 'static,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = SpanContextVisitor {
            context: SpanContext::default(),
        };
        attrs.record(&mut visitor);

        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(visitor.context);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let ts = Utc::now();

        // Innermost span wins for each correlation field
        let mut span_ctx = SpanContext::default();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if let Some(found) = span.extensions().get::<SpanContext>() {
                    if span_ctx.run_id.is_none() {
                        span_ctx.run_id.clone_from(&found.run_id);
                    }
                    if span_ctx.host_id.is_none() {
                        span_ctx.host_id.clone_from(&found.host_id);
                    }
                    if span_ctx.stage.is_none() {
                        span_ctx.stage.clone_from(&found.stage);
                    }
                }
            }
        }

        let mut visitor = JsonFieldVisitor::new();
        event.record(&mut visitor);

        let level: Level = (*event.metadata().level()).into();
        let mut obj = serde_json::Map::new();

        obj.insert("ts".to_string(), serde_json::json!(ts.to_rfc3339()));
        obj.insert("level".to_string(), serde_json::json!(level));
        obj.insert(
            "event".to_string(),
            serde_json::json!(event.metadata().target()),
        );

        // Correlation fields recorded on the event itself override span values
        for key in ["run_id", "host_id", "stage"] {
            if let Some(v) = visitor.fields.remove(key) {
                obj.insert(key.to_string(), v);
            }
        }
        let from_spans = [
            ("run_id", span_ctx.run_id),
            ("host_id", span_ctx.host_id),
            ("stage", span_ctx.stage),
        ];
        for (key, value) in from_spans {
            if let Some(v) = value {
                obj.entry(key.to_string()).or_insert(serde_json::json!(v));
            }
        }

        if let Some(msg) = visitor.message {
            obj.insert("message".to_string(), serde_json::json!(msg));
        }

        if !visitor.fields.is_empty() {
            obj.insert(
                "fields".to_string(),
                serde_json::Value::Object(visitor.fields),
            );
        }

        let json = serde_json::to_string(&serde_json::Value::Object(obj)).unwrap_or_default();
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", json);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tracing_subscriber::layer::SubscriberExt;

    struct BufWriter(Arc<Mutex<Vec<u8>>>);

    impl Write for BufWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture(f: impl FnOnce()) -> serde_json::Value {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let layer = JsonlLayer::new(BufWriter(buffer.clone()));
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, f);
        let output = buffer.lock().unwrap();
        let text = String::from_utf8_lossy(&output);
        serde_json::from_str(text.trim()).expect("one JSON line")
    }

    #[test]
    fn test_jsonl_layer_output() {
        let parsed = capture(|| {
            tracing::info!(target: "stage.started", message = "test message");
        });
        assert_eq!(parsed["level"], "info");
        assert_eq!(parsed["event"], "stage.started");
        assert_eq!(parsed["message"], "test message");
        assert!(parsed["ts"].is_string());
    }

    #[test]
    fn test_extra_fields_nested() {
        let parsed = capture(|| {
            tracing::warn!(target: "test.fields", count = 42, active = true, message = "hi");
        });
        assert_eq!(parsed["level"], "warn");
        assert_eq!(parsed["fields"]["count"], 42);
        assert_eq!(parsed["fields"]["active"], true);
    }

    #[test]
    fn test_correlation_fields_promoted() {
        let parsed = capture(|| {
            tracing::info!(
                target: "stage.finished",
                run_id = "run-1",
                stage = %"emit",
                message = "done"
            );
        });
        assert_eq!(parsed["run_id"], "run-1");
        assert_eq!(parsed["stage"], "emit");
        assert!(parsed.get("fields").is_none());
    }

    #[test]
    fn test_span_context_inherited() {
        let parsed = capture(|| {
            let span = tracing::info_span!("install", run_id = "run-9", host_id = "host-1");
            let _enter = span.enter();
            tracing::info!(target: "stage.started", message = "inside");
        });
        assert_eq!(parsed["run_id"], "run-9");
        assert_eq!(parsed["host_id"], "host-1");
    }

    #[test]
    fn test_secret_fields_redacted() {
        let parsed = capture(|| {
            tracing::info!(
                target: "keys.added",
                mnemonic = "abandon abandon about",
                message = "key"
            );
        });
        assert_eq!(parsed["fields"]["mnemonic"], REDACTED);
    }
}
