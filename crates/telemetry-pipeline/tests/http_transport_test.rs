// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod common;

use std::time::Duration;

use common::helpers::channel_config;
use mockito::{Matcher, Server};
use telemetry_pipeline::{
    HttpTransport, HttpTransportConfig, PipelineConfig, ScopeStack, TelemetryPipeline,
};

const INPUT_PATH: &str = "/v1/input";

fn http_pipeline(config: HttpTransportConfig) -> TelemetryPipeline {
    let transport = HttpTransport::new(config).expect("failed to create HTTP transport");
    let config = PipelineConfig {
        channel: channel_config(100, 10),
        ..PipelineConfig::default()
    };
    TelemetryPipeline::new(config, transport).expect("failed to create pipeline")
}

fn transport_config(url: &str) -> HttpTransportConfig {
    let mut config = HttpTransportConfig::new(format!("{url}{INPUT_PATH}"));
    config.api_key = Some("mock-api-key".to_string());
    config.timeout = Duration::from_secs(2);
    config
}

#[tokio::test]
async fn test_batch_is_posted_as_json() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", INPUT_PATH)
        .match_header("X-Api-Key", "mock-api-key")
        .match_header("Content-Type", "application/json")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#""sequence":0"#.to_string()),
            Matcher::Regex(r#""message":"Logger is working""#.to_string()),
            Matcher::Regex(r#""Method":"Main""#.to_string()),
        ]))
        .with_status(202)
        .expect(1)
        .create_async()
        .await;

    let pipeline = http_pipeline(transport_config(&server.url()));
    let mut scopes = ScopeStack::new();
    let scope = scopes.scoped([("Method", "Main")]).unwrap();
    pipeline
        .logger("ConsoleApp")
        .info(&scope, "Logger is working", &[])
        .await
        .unwrap();
    let report = pipeline.flush(None).await.unwrap();

    assert_eq!(report.delivered, 1);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_api_key_header_name_is_configurable() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", INPUT_PATH)
        .match_header("Authorization-Token", "mock-api-key")
        .match_header("X-Api-Key", Matcher::Missing)
        .with_status(202)
        .expect(1)
        .create_async()
        .await;

    let mut config = transport_config(&server.url());
    config.api_key_header = "Authorization-Token".to_string();
    let pipeline = http_pipeline(config);
    pipeline
        .logger("App")
        .info(&ScopeStack::new(), "custom header", &[])
        .await
        .unwrap();
    let report = pipeline.flush(None).await.unwrap();

    assert_eq!(report.delivered, 1);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_compressed_batch_sets_content_encoding() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", INPUT_PATH)
        .match_header("Content-Encoding", "zstd")
        .with_status(202)
        .expect(1)
        .create_async()
        .await;

    let mut config = transport_config(&server.url());
    config.compression_level = Some(3);
    let pipeline = http_pipeline(config);
    let scopes = ScopeStack::new();
    let logger = pipeline.logger("App");
    for i in 0..3 {
        logger.info(&scopes, "item {Index}", &[&i]).await.unwrap();
    }
    let report = pipeline.flush(None).await.unwrap();

    assert_eq!(report.delivered, 3);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_forbidden_is_not_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", INPUT_PATH)
        .with_status(403)
        .with_body("Forbidden")
        .expect(1)
        .create_async()
        .await;

    let pipeline = http_pipeline(transport_config(&server.url()));
    pipeline
        .logger("App")
        .error(&ScopeStack::new(), "rejected", &[])
        .await
        .unwrap();
    let report = pipeline.flush(None).await.unwrap();

    assert_eq!(report.delivered, 0);
    assert_eq!(report.dropped_on_failure, 1);
    assert_eq!(pipeline.stats().send_failures, 1);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_server_errors_are_retried_until_exhausted() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", INPUT_PATH)
        .with_status(503)
        .with_body("Service Unavailable")
        .expect(3)
        .create_async()
        .await;

    let pipeline = http_pipeline(transport_config(&server.url()));
    pipeline
        .logger("App")
        .warn(&ScopeStack::new(), "retried", &[])
        .await
        .unwrap();
    let report = pipeline.flush(None).await.unwrap();

    assert_eq!(report.dropped_on_failure, 1);
    assert_eq!(pipeline.stats().send_failures, 3);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_unreachable_collector_drops_after_retries() {
    // Nothing listens on the discard port.
    let pipeline = http_pipeline(transport_config("http://127.0.0.1:9"));
    pipeline
        .logger("App")
        .info(&ScopeStack::new(), "lost", &[])
        .await
        .unwrap();
    let report = pipeline.close().await.unwrap();

    assert_eq!(report.delivered, 0);
    assert_eq!(report.dropped_on_failure, 1);
}
