//! Adaptive dispatch of HTTP backend requests
//!
//! Drives [`Backend`] with [`BackendWorker`] against a mock server and checks
//! that every input produces exactly one request.

mod common;

use common::MetricsHarness;
use docweave::context::Context;
use docweave::workers::{BackendWorker, WorkerInput};
use docweave::{Backend, Error};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn inputs(server: &MockServer, count: usize) -> Vec<WorkerInput> {
    (0..count)
        .map(|_| WorkerInput::new(format!("{}/api", server.uri())))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn four_workers_send_four_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(4)
        .mount(&server)
        .await;

    let harness = MetricsHarness::new();
    let worker = BackendWorker::new(reqwest::Client::new(), 1024, Arc::new(harness.metrics()));
    let backend = Backend::new(4, 4, worker).unwrap();

    backend
        .dispatch(&Context::background(), inputs(&server, 4))
        .await
        .unwrap();

    let recorded = harness.collect();
    assert_eq!(recorded.requests, 4);
    assert_eq!(recorded.errors, 0);
    assert_eq!(recorded.in_flight, 0);
    assert_eq!(recorded.observed, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn adaptive_pool_handles_more_inputs_than_workers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(20)))
        .expect(20)
        .mount(&server)
        .await;

    let harness = MetricsHarness::new();
    let worker = BackendWorker::new(reqwest::Client::new(), 1024, Arc::new(harness.metrics()));
    let backend = Backend::new(1, 5, worker).unwrap();

    backend
        .dispatch(&Context::background(), inputs(&server, 20))
        .await
        .unwrap();

    assert_eq!(harness.collect().requests, 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn error_status_fails_dispatch_with_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let harness = MetricsHarness::new();
    let worker = BackendWorker::new(reqwest::Client::new(), 1024, Arc::new(harness.metrics()));
    let backend = Backend::new(2, 2, worker).unwrap();

    let err = backend
        .dispatch(&Context::background(), inputs(&server, 2))
        .await
        .unwrap_err();

    match err {
        Error::Worker(e) => assert_eq!(e.code(), 503),
        other => panic!("unexpected error: {other}"),
    }
    assert!(harness.collect().errors >= 1);
}
