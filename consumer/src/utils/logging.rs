use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_error::ErrorLayer;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::Context;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

const DEFAULT_LOG_DIRECTIVE: &str = "changestream_consumer=info";

const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[90m";
const TIMESTAMP: &str = "\x1b[96m";
const COLUMN: &str = "\x1b[92m";
const MESSAGE: &str = "\x1b[97m";

fn level_color(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "\x1b[90m",
        Level::DEBUG => "\x1b[34m",
        Level::INFO => "\x1b[32m",
        Level::WARN => "\x1b[33m",
        Level::ERROR => "\x1b[31m",
    }
}

fn debug_string(value: &dyn std::fmt::Debug) -> String {
    format!("{:?}", value).trim_matches('"').to_string()
}

/// Span fields copied into every event of the span, keyed by name
#[derive(Debug, Clone, Default)]
pub struct SpanFields(HashMap<String, String>);

impl SpanFields {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

impl Visit for SpanFields {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), debug_string(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }
}

/// Collects span fields when spans are created or recorded into, so formatters can read them
pub struct FieldCollectorLayer;

impl<S> Layer<S> for FieldCollectorLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, attrs: &tracing::span::Attributes<'_>, id: &tracing::span::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };

        // nested spans keep the component of their parent
        let mut fields = span
            .parent()
            .and_then(|parent| parent.extensions().get::<SpanFields>().cloned())
            .unwrap_or_default();
        attrs.record(&mut fields);
        span.extensions_mut().insert(fields);
    }

    fn on_record(&self, id: &tracing::span::Id, values: &tracing::span::Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };

        let mut extensions = span.extensions_mut();
        let mut fields = extensions.remove::<SpanFields>().unwrap_or_default();
        values.record(&mut fields);
        extensions.insert(fields);
    }
}

fn current_span_fields<S, N>(ctx: &FmtContext<'_, S, N>) -> Option<(&'static str, SpanFields)>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    let span = ctx.lookup_current()?;
    let fields = span.extensions().get::<SpanFields>().cloned().unwrap_or_default();
    Some((span.metadata().name(), fields))
}

/// Message and fields of one event. Numbers and booleans keep their JSON type.
#[derive(Default)]
struct EventFields {
    message: String,
    fields: Map<String, Value>,
}

impl EventFields {
    fn of(event: &Event<'_>) -> Self {
        let mut visitor = Self::default();
        event.record(&mut visitor);
        visitor
    }

    fn put(&mut self, field: &Field, value: Value) {
        match (field.name(), value) {
            ("message", Value::String(message)) => self.message = message,
            (name, value) => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for EventFields {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.put(field, Value::String(debug_string(value)));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Value::from(value));
    }
}

/// `key=value` pairs for the console, strings unquoted
fn render_fields(fields: &Map<String, Value>) -> String {
    let mut rendered = String::new();
    for (name, value) in fields {
        if !rendered.is_empty() {
            rendered.push_str(", ");
        }
        let value = match value {
            Value::String(value) => value.clone(),
            other => other.to_string(),
        };
        rendered.push_str(&format!("{}={}", name, value));
    }
    rendered
}

/// Columnar console output: time | level | component | job | source | message (fields)
pub struct PrettyFormatter;

impl<S, N> FormatEvent<S, N> for PrettyFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> std::fmt::Result {
        let meta = event.metadata();
        let span_fields = current_span_fields(ctx).map(|(_, fields)| fields).unwrap_or_default();
        let component = component_label(span_fields.get("component"));
        let job_id = span_fields.get("job_id").unwrap_or("-");
        let event_fields = EventFields::of(event);

        let columns = [
            (TIMESTAMP, Utc::now().format("%y-%m-%d %H:%M:%S").to_string(), 17_usize),
            (level_color(meta.level()), meta.level().to_string(), 5),
            (COLUMN, component, 10),
            (COLUMN, job_id.to_string(), 24),
            (COLUMN, extract_service_name(meta.target()).to_string(), 8),
        ];
        for (color, value, width) in columns {
            write!(writer, "{color}{value:<width$}{RESET} {DIM}|{RESET} ")?;
        }
        write!(writer, "{MESSAGE}{}{RESET}", event_fields.message)?;
        if !event_fields.fields.is_empty() {
            write!(writer, " ({DIM}{}{RESET})", render_fields(&event_fields.fields))?;
        }
        writeln!(writer)
    }
}

/// One JSON object per line, span fields merged under `fields`
pub struct JsonEventFormatter;

impl<S, N> FormatEvent<S, N> for JsonEventFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> std::fmt::Result {
        let meta = event.metadata();
        let event_fields = EventFields::of(event);

        let mut merged = Map::new();
        if let Some((span_name, span_fields)) = current_span_fields(ctx) {
            merged.insert("span_name".to_string(), json!(span_name));
            merged.extend(span_fields.0.into_iter().map(|(key, value)| (key, Value::String(value))));
        }
        // event fields win on a name clash
        merged.extend(event_fields.fields);

        let mut line = json!({
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            "level": meta.level().to_string(),
            "target": meta.target(),
            "service": extract_service_name(meta.target()),
            "filename": meta.file(),
            "line_number": meta.line(),
            "message": event_fields.message,
        });
        if !merged.is_empty() {
            line["fields"] = Value::Object(merged);
        }

        writeln!(writer, "{}", serde_json::to_string(&line).map_err(|_| std::fmt::Error)?)
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` drives the filter (default `changestream_consumer=info`), `LOG_FORMAT=json`
/// switches from the console layout to JSON lines. Also installs color_eyre for panics.
pub fn init_logging() {
    color_eyre::install().expect("Unable to install color_eyre");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(Level::INFO.into())
            .parse(DEFAULT_LOG_DIRECTIVE)
            .expect("Invalid filter directive and Logger control")
    });

    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json");
    let json_layer =
        json.then(|| fmt::layer().with_target(true).with_file(true).with_line_number(true).event_format(JsonEventFormatter));
    let pretty_layer =
        (!json).then(|| fmt::layer().with_target(true).with_file(true).with_line_number(true).event_format(PrettyFormatter));

    let subscriber = Registry::default()
        .with(env_filter)
        .with(FieldCollectorLayer)
        .with(json_layer)
        .with(pretty_layer)
        .with(ErrorLayer::default());
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set global default subscriber");
}

/// Short name of the crate an event comes from, for the source column
fn extract_service_name(target: &str) -> &'static str {
    if target.starts_with("changestream_consumer") {
        "-"
    } else if target.starts_with("mongodb") {
        "MONGODB"
    } else if target.starts_with("redis") || target.starts_with("deadpool") {
        "REDIS"
    } else {
        "EXTERNAL"
    }
}

/// Upper-cased component for the component column, `-` outside any worker span
pub fn component_label(component: Option<&str>) -> String {
    match component {
        Some(component) if !component.is_empty() => component.to_uppercase(),
        _ => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("changestream_consumer::worker::listener", "-")]
    #[case("mongodb::connection", "MONGODB")]
    #[case("redis::aio", "REDIS")]
    #[case("deadpool_redis", "REDIS")]
    #[case("hyper::proto", "EXTERNAL")]
    fn service_name_from_target(#[case] target: &str, #[case] expected: &str) {
        assert_eq!(extract_service_name(target), expected);
    }

    #[rstest]
    #[case(Some("catchup"), "CATCHUP")]
    #[case(Some(""), "-")]
    #[case(None, "-")]
    fn component_column(#[case] component: Option<&str>, #[case] expected: &str) {
        assert_eq!(component_label(component), expected);
    }

    #[test]
    fn console_fields_are_unquoted_pairs() {
        let mut fields = Map::new();
        fields.insert("job_id".to_string(), json!("65f0c0ffee"));
        fields.insert("matched".to_string(), json!(3));
        fields.insert("resuming".to_string(), json!(false));

        assert_eq!(render_fields(&fields), "job_id=65f0c0ffee, matched=3, resuming=false");
    }
}
