use http::{HeaderMap, HeaderName, Request};
use opentelemetry::{
    global,
    propagation::{Extractor, Injector},
};
use tracing::{field::Empty, Span};
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Injects the [`opentelemetry::Context`] of `span` into `headers` to allow
/// propagation to whoever receives them.
pub fn inject_opentelemetry_context_into_headers(span: &Span, headers: &mut HeaderMap) {
    let context = span.context();

    global::get_text_map_propagator(|injector| {
        injector.inject_context(&context, &mut HeaderInjector::new(headers))
    });
}

/// Constructs a [`opentelemetry::Context`] from [`Request`] headers
/// and assigns it as parent of the returned server [`Span`].
///
/// The span leaves `http.response.status_code` and `otel.status_code` empty,
/// to be recorded once the response is known.
#[track_caller]
pub fn extract_opentelemetry_context_from_request<T>(request: &Request<T>) -> Span {
    let context = global::get_text_map_propagator(|extractor| {
        extractor.extract(&HeaderExtractor::new(request.headers()))
    });

    let span = tracing::info_span!(
        "http-server",
        otel.kind = "server",
        http.request.method = %request.method(),
        url.path = request.uri().path(),
        http.response.status_code = Empty,
        otel.status_code = Empty,
    );
    span.set_parent(context);

    span
}

// "traceparent" => https://www.w3.org/TR/trace-context/#trace-context-http-headers-format

/// Injector used via opentelemetry propagator to tell it how to insert the
/// propagation headers, e.g. a "traceparent" value of
/// "{version}-{trace_id}-{span_id}-{trace_flags}". Receivers can then
/// re-hydrate the context to add additional spans to the same trace.
pub struct HeaderInjector<'a> {
    headers: &'a mut HeaderMap,
}

impl<'a> HeaderInjector<'a> {
    pub fn new(headers: &'a mut HeaderMap) -> Self {
        HeaderInjector { headers }
    }
}

impl<'a> Injector for HeaderInjector<'a> {
    fn set(&mut self, key: &str, value: String) {
        let Ok(key) = key.parse::<HeaderName>() else {
            tracing::debug!(%key, "failed to parse header name");
            return;
        };
        let Ok(value) = value.parse() else {
            tracing::debug!(%value, "failed to parse header value");
            return;
        };
        self.headers.insert(key, value);
    }
}

pub struct HeaderExtractor<'a> {
    headers: &'a HeaderMap,
}

impl<'a> HeaderExtractor<'a> {
    pub fn new(headers: &'a HeaderMap) -> Self {
        HeaderExtractor { headers }
    }
}

impl<'a> Extractor for HeaderExtractor<'a> {
    fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|h| h.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.headers.keys().map(|s| s.as_str()).collect()
    }
}
