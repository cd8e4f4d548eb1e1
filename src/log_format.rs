use std::fmt;

use chrono::{SecondsFormat, Utc};
use opentelemetry::trace::{SpanId, TraceContextExt, TraceId};
use serde_json::{Map, Number, Value};
use tracing::{field::Field, Event, Subscriber};
use tracing_opentelemetry::OtelData;
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields, MakeWriter},
    filter::filter_fn,
    registry::{LookupSpan, SpanRef},
    Layer,
};

/// Target of events meant only for the exported span, such as recorded
/// exceptions. They are not written as log lines.
pub const SPAN_EVENT_TARGET: &str = "otel::span_event";

/// Event formatter producing one JSON object per line.
///
/// Every event is rendered with `ts`, `level` and `msg`. Events emitted inside
/// a span known to the OpenTelemetry layer also carry `trace_id` and `span_id`.
/// All other event fields are copied as extra keys.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonLines;

/// A `fmt` layer writing [`JsonLines`] to `writer`, skipping
/// [`SPAN_EVENT_TARGET`] events.
pub fn layer<S, W>(writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .event_format(JsonLines)
        .with_writer(writer)
        .with_filter(filter_fn(|metadata| metadata.target() != SPAN_EVENT_TARGET))
}

impl<S, N> FormatEvent<S, N> for JsonLines
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);

        let mut line = Map::new();
        line.insert(
            "ts".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)),
        );
        line.insert(
            "level".to_string(),
            Value::String(event.metadata().level().as_str().to_ascii_lowercase()),
        );
        let msg = visitor
            .fields
            .remove("message")
            .unwrap_or_else(|| Value::String(String::new()));
        line.insert("msg".to_string(), msg);

        let span = event
            .parent()
            .and_then(|id| ctx.span(id))
            .or_else(|| ctx.lookup_current());
        if let Some((trace_id, span_id)) = span.as_ref().and_then(|span| trace_ids(span)) {
            line.insert("trace_id".to_string(), Value::String(trace_id.to_string()));
            line.insert("span_id".to_string(), Value::String(span_id.to_string()));
        }

        line.extend(visitor.fields);

        let json = serde_json::to_string(&line).map_err(|_| fmt::Error)?;
        writeln!(writer, "{json}")
    }
}

/// Trace and span identifiers the OpenTelemetry layer assigned to `span`.
fn trace_ids<S>(span: &SpanRef<'_, S>) -> Option<(TraceId, SpanId)>
where
    S: for<'a> LookupSpan<'a>,
{
    let extensions = span.extensions();
    let otel = extensions.get::<OtelData>()?;
    let span_id = otel.builder.span_id?;

    // A parent (local or extracted from headers) decides the trace id; a root
    // span keeps the one generated for it.
    let parent = otel.parent_cx.span();
    let parent_context = parent.span_context();
    let trace_id = if parent_context.is_valid() {
        parent_context.trace_id()
    } else {
        otel.builder.trace_id?
    };

    Some((trace_id, span_id))
}

#[derive(Default)]
struct JsonVisitor {
    fields: Map<String, Value>,
}

impl JsonVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl tracing::field::Visit for JsonVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::Number(value.into()));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        // NaN and infinities have no JSON representation.
        let value = Number::from_f64(value).map_or(Value::Null, Value::Number);
        self.insert(field, value);
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Value::String(value.to_string()));
    }
}
