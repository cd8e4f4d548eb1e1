//! Shared helpers for the HTTP integration tests.

#![allow(dead_code)]

use std::{
    io,
    ops::Range,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    body::{to_bytes, Body},
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use grafana_demo_app::{
    config::ChaosConfig,
    metrics::RequestMetrics,
    pipeline::{DelaySource, Pipeline, RandomDelays},
    server::{router, AppState},
};
use tower::ServiceExt;

/// No latency; faults fire as configured.
pub struct NoDelay {
    pub fires: bool,
}

impl DelaySource for NoDelay {
    fn delay(&self, _millis: Range<u64>) -> Duration {
        Duration::ZERO
    }

    fn fires(&self, _one_in: u32) -> bool {
        self.fires
    }
}

/// Router plus the state it serves, so tests can issue several requests
/// against the same metrics registry.
pub fn app_state(chaos: ChaosConfig, delays: Arc<dyn DelaySource>) -> AppState {
    AppState::new(
        Pipeline::new(chaos, delays),
        RequestMetrics::new().unwrap(),
    )
}

pub fn random_app(chaos: ChaosConfig) -> Router {
    router(app_state(chaos, Arc::new(RandomDelays)))
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

pub async fn send(app: Router, request: Request<Body>) -> Reply {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    Reply {
        status,
        headers,
        body: String::from_utf8(body.to_vec()).unwrap(),
    }
}

pub async fn call(app: Router, method: &str, uri: &str) -> Reply {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

/// Value of the first sample named `name` whose labels include all of `labels`.
pub fn sample(rendered: &str, name: &str, labels: &[&str]) -> Option<f64> {
    rendered
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter(|line| line.starts_with(&format!("{name}{{")))
        .find(|line| labels.iter().all(|label| line.contains(label)))
        .and_then(|line| line.rsplit(' ').next())
        .and_then(|value| value.parse().ok())
}

/// In-memory log sink.
#[derive(Clone, Default)]
pub struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    pub fn lines(&self) -> Vec<serde_json::Value> {
        let buf = self.0.lock().unwrap();
        String::from_utf8_lossy(&buf)
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

impl io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
