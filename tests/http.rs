use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use grafana_demo_app::{
    config::ChaosConfig,
    log_format,
    metrics::{REQUESTS_TOTAL, REQUEST_DURATION_SECONDS},
    pipeline::DB_FAILURE_STALL,
    server::router,
};
use opentelemetry::{global, trace::TracerProvider as _};
use opentelemetry_sdk::{propagation::TraceContextPropagator, trace::TracerProvider};
use tokio::time::{Duration, Instant};
use tracing_subscriber::layer::SubscriberExt;

mod common;

use common::{call, random_app, sample, send, Capture, NoDelay};

const ALL_CHAOS: ChaosConfig = ChaosConfig {
    error: true,
    db_failure: true,
    slow_db: true,
};

#[tokio::test(start_paused = true)]
async fn health_is_always_ok() {
    for chaos in [ChaosConfig::default(), ALL_CHAOS] {
        for method in ["GET", "POST", "HEAD"] {
            let reply = call(random_app(chaos), method, "/health").await;
            assert_eq!(reply.status, StatusCode::OK);
            if method != "HEAD" {
                assert_eq!(reply.body, "ok");
            }
        }
    }
}

#[tokio::test(start_paused = true)]
async fn root_answers_with_greeting_after_simulated_stages() {
    let start = Instant::now();
    let reply = call(random_app(ChaosConfig::default()), "GET", "/").await;
    let elapsed = start.elapsed();

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, r#"{"message":"hello from grafana demo"}"#);
    assert_eq!(reply.headers[header::CONTENT_TYPE], "application/json");
    // 50..150 + 20..70 + 10..40 ms
    assert!(elapsed >= Duration::from_millis(80), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(270), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn db_failure_stalls_but_succeeds() {
    let chaos = ChaosConfig {
        db_failure: true,
        ..Default::default()
    };
    let start = Instant::now();
    let reply = call(random_app(chaos), "GET", "/").await;

    assert_eq!(reply.status, StatusCode::OK);
    assert!(start.elapsed() >= DB_FAILURE_STALL);
}

#[tokio::test(start_paused = true)]
async fn no_errors_without_chaos_error() {
    let chaos = ChaosConfig {
        error: false,
        ..ALL_CHAOS
    };
    let state = common::app_state(chaos, Arc::new(NoDelay { fires: true }));
    for _ in 0..50 {
        let reply = call(router(state.clone()), "GET", "/").await;
        assert_eq!(reply.status, StatusCode::OK);
    }
}

#[tokio::test(start_paused = true)]
async fn chaos_error_fails_about_one_request_in_five() {
    let chaos = ChaosConfig {
        error: true,
        ..Default::default()
    };
    let app = random_app(chaos);

    let trials = 2_000;
    let mut failures = 0;
    for _ in 0..trials {
        let reply = call(app.clone(), "GET", "/").await;
        match reply.status {
            StatusCode::OK => {}
            StatusCode::INTERNAL_SERVER_ERROR => {
                assert_eq!(reply.body, "internal failure");
                failures += 1;
            }
            other => panic!("unexpected status {other}"),
        }
    }

    let rate = failures as f64 / trials as f64;
    assert!((0.15..0.25).contains(&rate), "error rate {rate}");
}

#[tokio::test(start_paused = true)]
async fn metrics_count_every_request_once() {
    let state = common::app_state(ChaosConfig::default(), Arc::new(NoDelay { fires: false }));

    let n = 7;
    for _ in 0..n {
        call(router(state.clone()), "GET", "/").await;
    }
    call(router(state.clone()), "DELETE", "/items").await;
    call(router(state.clone()), "GET", "/health").await;

    let reply = call(router(state.clone()), "GET", "/metrics").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));

    let root_get = ["path=\"/\"", "method=\"GET\"", "status=\"200\""];
    assert_eq!(sample(&reply.body, REQUESTS_TOTAL, &root_get), Some(n as f64));
    let items = ["path=\"/items\"", "method=\"DELETE\"", "status=\"200\""];
    assert_eq!(sample(&reply.body, REQUESTS_TOTAL, &items), Some(1.0));
    assert_eq!(sample(&reply.body, REQUESTS_TOTAL, &["path=\"/health\""]), None);

    let count = format!("{REQUEST_DURATION_SECONDS}_count");
    assert_eq!(
        sample(&reply.body, &count, &["path=\"/\"", "method=\"GET\""]),
        Some(n as f64)
    );
}

#[tokio::test(start_paused = true)]
async fn failed_requests_are_counted_as_500() {
    let chaos = ChaosConfig {
        error: true,
        ..Default::default()
    };
    let state = common::app_state(chaos, Arc::new(NoDelay { fires: true }));

    for _ in 0..3 {
        let reply = call(router(state.clone()), "POST", "/").await;
        assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    let rendered = state.metrics.render();
    let failed = ["path=\"/\"", "method=\"POST\"", "status=\"500\""];
    assert_eq!(sample(&rendered, REQUESTS_TOTAL, &failed), Some(3.0));
}

#[tokio::test(start_paused = true)]
async fn trace_context_flows_from_request_to_logs_and_response() {
    global::set_text_map_propagator(TraceContextPropagator::new());
    let provider = TracerProvider::builder().build();
    let capture = Capture::default();
    let sink = capture.clone();
    let subscriber = tracing_subscriber::registry()
        .with(tracing_opentelemetry::layer().with_tracer(provider.tracer("http-test")))
        .with(log_format::layer(move || sink.clone()));
    let _guard = tracing::subscriber::set_default(subscriber);

    let trace_id = "0af7651916cd43dd8448eb211c80319c";
    let request = Request::builder()
        .uri("/")
        .header("traceparent", format!("00-{trace_id}-b7ad6b7169203331-01"))
        .body(Body::empty())
        .unwrap();
    let reply = send(random_app(ChaosConfig::default()), request).await;
    assert_eq!(reply.status, StatusCode::OK);

    let traceparent = reply.headers["traceparent"].to_str().unwrap();
    assert_eq!(traceparent.split('-').nth(1), Some(trace_id));
    assert_ne!(traceparent.split('-').nth(2), Some("b7ad6b7169203331"));

    let lines = capture.lines();
    let handled = lines
        .iter()
        .find(|line| line["msg"] == "handled request")
        .expect("request log line");
    assert_eq!(handled["trace_id"], trace_id);
    assert_eq!(handled["span_id"].as_str().unwrap().len(), 16);
}
