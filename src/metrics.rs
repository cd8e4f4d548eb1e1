use std::{sync::Arc, time::Duration};

use http::StatusCode;
use metrics::{Key, Label, Level, Metadata, Recorder};
use metrics_exporter_prometheus::{
    Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder,
};

use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::error::MetricsError;

pub const REQUESTS_TOTAL: &str = "http_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

/// Content type of the text exposition format.
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Default Prometheus client buckets, in seconds.
pub const DEFAULT_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

static METADATA: Metadata<'static> =
    Metadata::new(module_path!(), Level::INFO, Some(module_path!()));

/// Request counter and latency histogram with their Prometheus exposition.
///
/// The recorder is owned here instead of being installed as the global
/// `metrics` recorder, so every server (and every test) gets its own registry.
pub struct RequestMetrics {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
}

impl RequestMetrics {
    pub fn new() -> Result<Self, MetricsError> {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(REQUEST_DURATION_SECONDS.to_string()),
                DEFAULT_BUCKETS,
            )?
            .build_recorder();
        let handle = recorder.handle();

        recorder.describe_counter(
            REQUESTS_TOTAL.into(),
            None,
            "Total number of HTTP requests".into(),
        );
        recorder.describe_histogram(
            REQUEST_DURATION_SECONDS.into(),
            None,
            "Duration of HTTP requests in seconds".into(),
        );

        Ok(Self { recorder, handle })
    }

    /// Records one completed request: a counter increment and a latency
    /// observation.
    pub fn record(&self, path: &str, method: &str, status: StatusCode, elapsed: Duration) {
        let counter_key = Key::from_parts(
            REQUESTS_TOTAL,
            vec![
                Label::new("path", path.to_string()),
                Label::new("method", method.to_string()),
                Label::new("status", status.as_u16().to_string()),
            ],
        );
        self.recorder
            .register_counter(&counter_key, &METADATA)
            .increment(1);

        let histogram_key = Key::from_parts(
            REQUEST_DURATION_SECONDS,
            vec![
                Label::new("path", path.to_string()),
                Label::new("method", method.to_string()),
            ],
        );
        self.recorder
            .register_histogram(&histogram_key, &METADATA)
            .record(elapsed.as_secs_f64());
    }

    /// Renders every metric in the text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Drains pending histogram samples into their aggregated buckets.
    pub fn run_upkeep(&self) {
        self.handle.run_upkeep();
    }

    /// Runs [`RequestMetrics::run_upkeep`] every `period` until the returned
    /// task is aborted. Without it, samples pile up between scrapes.
    pub fn spawn_upkeep(metrics: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                metrics.run_upkeep();
            }
        })
    }
}
