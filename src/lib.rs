//! # Grafana demo app
//! A small HTTP service whose only job is to produce traces, metrics and logs
//! for an observability stack. Each request to `/` runs a simulated
//! three-tier pipeline (business logic, database call, template render) with
//! artificial latency and optional chaos-injected failures.
//!
//! ## Setup
//! Tracing and logging are set up using [`setup::setup`], from an
//! [`config::AppConfig`] read once from the environment. This should be the
//! first call of the server binary. [`setup::teardown`] flushes spans on the
//! way out.
//!
//! ## Http Trace Propagation
//! [`http_injector`] provides functions for extracting tracing data from
//! request headers and injecting it into response headers.
//! [`middleware::tower::TraceLayer`] applies them to every route of the
//! [`server::router`].
//!
//! ## Metrics
//! [`metrics::RequestMetrics`] counts requests and observes their latency; it
//! is scraped through `/metrics`.

pub mod config;
pub mod error;
pub mod http_injector;
pub mod log_format;
pub mod metrics;
pub mod middleware;
pub mod pipeline;
pub mod server;
pub mod setup;
