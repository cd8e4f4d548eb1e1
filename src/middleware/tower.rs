use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use http::{Request, Response};
use tower::Service;
use tower_layer::Layer;
use tracing::Instrument;

use crate::http_injector;

/// Injects tracing data to route handlers.
///
/// Generally, the middleware should be used on every http route, this usually
/// means that it can be registered globally and in the last position, to be the
/// first to run, even before general logging layers.
///
/// The parent context is extracted from the request headers. Once the inner
/// service answers, the response status is recorded on the server span, 5xx
/// responses mark it as failed, and the span context is injected into the
/// response headers.
///
/// The `TraceLayer` will not log http requests. For that, another solution
/// needs to be added additionally.
///
/// ```ignore
/// let app = Router::new()
///     .route("/foo", get(|| async {}))
///     .route("/bar", get(|| async {}))
///     .layer(TraceLayer);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceLayer;

impl<S> Layer<S> for TraceLayer {
    type Service = TraceService<S>;

    fn layer(&self, service: S) -> Self::Service {
        TraceService { service }
    }
}

/// This service implements the Trace behavior
#[derive(Debug, Clone)]
pub struct TraceService<S> {
    service: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for TraceService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: 'static,
    ResBody: 'static,
{
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = S::Response;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let span = http_injector::extract_opentelemetry_context_from_request(&request);
        let response = self.service.call(request).instrument(span.clone());

        Box::pin(async move {
            let mut response = response.await?;

            let status = response.status();
            span.record("http.response.status_code", status.as_u16());
            if status.is_server_error() {
                span.record("otel.status_code", "ERROR");
            }
            http_injector::inject_opentelemetry_context_into_headers(&span, response.headers_mut());

            Ok(response)
        })
    }
}
