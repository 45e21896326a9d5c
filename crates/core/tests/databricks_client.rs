//! Databricks Jobs API クライアントの HTTP 結合テスト。
//!
//! wiremock でエンドポイントを模擬し、パス・認証ヘッダ・クエリ・エラー変換を確認する。

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ab_core::domain::run::{JobRequest, LifeCycleState, ResultState};
use ab_core::domain::settings::RemoteConfig;
use ab_core::infra::remote::{DatabricksClient, JobRunner, RemoteError};

fn client(server: &MockServer) -> DatabricksClient {
    DatabricksClient::new(&RemoteConfig {
        host: server.uri(),
        token: "dapi-test".to_string(),
        job_id: 42,
        payload_param: "file_b64".to_string(),
        http_timeout: Duration::from_secs(5),
    })
    .unwrap()
}

fn request() -> JobRequest {
    JobRequest {
        job_id: 42,
        file_name: "mini.csv".to_string(),
        payload_b64: "dHhfaWQsZGF0ZQo=".to_string(),
        payload_param: "file_b64".to_string(),
    }
}

#[tokio::test]
async fn test_submit_posts_run_now_with_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/2.2/jobs/run-now"))
        .and(header("authorization", "Bearer dapi-test"))
        .and(body_partial_json(json!({
            "job_id": 42,
            "notebook_params": {"file_b64": "dHhfaWQsZGF0ZQo=", "file_name": "mini.csv"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"run_id": 77})))
        .expect(1)
        .mount(&server)
        .await;

    let run_id = client(&server).submit(&request()).await.unwrap();
    assert_eq!(run_id, 77);
}

#[tokio::test]
async fn test_submit_rejection_keeps_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/2.2/jobs/run-now"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Invalid access token"))
        .mount(&server)
        .await;

    let err = client(&server).submit(&request()).await.unwrap_err();
    match err {
        RemoteError::Http { status, body } => {
            assert_eq!(status, 403);
            assert_eq!(body, "Invalid access token");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_poll_state_reads_life_cycle_and_result() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/2.2/jobs/runs/get"))
        .and(query_param("run_id", "77"))
        .and(header("authorization", "Bearer dapi-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "run_id": 77,
            "state": {"life_cycle_state": "TERMINATED", "result_state": "SUCCESS"}
        })))
        .mount(&server)
        .await;

    let state = client(&server).poll_state(77).await.unwrap();
    assert_eq!(state.life_cycle, LifeCycleState::Terminated);
    assert_eq!(state.result, Some(ResultState::Success));
}

#[tokio::test]
async fn test_poll_state_unknown_life_cycle_is_not_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/2.2/jobs/runs/get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "state": {"life_cycle_state": "WAITING_FOR_RETRY"}
        })))
        .mount(&server)
        .await;

    let state = client(&server).poll_state(1).await.unwrap();
    assert_eq!(
        state.life_cycle,
        LifeCycleState::Other("WAITING_FOR_RETRY".to_string())
    );
    assert!(!state.life_cycle.is_terminal());
    assert!(state.result.is_none());
}

#[tokio::test]
async fn test_poll_state_undecodable_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/2.2/jobs/runs/get"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let err = client(&server).poll_state(1).await.unwrap_err();
    assert!(matches!(err, RemoteError::Decode(_)));
}

#[tokio::test]
async fn test_fetch_result_returns_notebook_result() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/2.1/jobs/runs/get-output"))
        .and(query_param("run_id", "77"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "notebook_output": {"result": "{\"rows\":3}", "truncated": false}
        })))
        .mount(&server)
        .await;

    let output = client(&server).fetch_result(77).await.unwrap();
    assert_eq!(output, r#"{"rows":3}"#);
}

#[tokio::test]
async fn test_fetch_result_absent_output_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/2.1/jobs/runs/get-output"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"metadata": {}})))
        .mount(&server)
        .await;

    assert_eq!(client(&server).fetch_result(77).await.unwrap(), "");
}

#[tokio::test]
async fn test_run_reference_uses_host() {
    let server = MockServer::start().await;
    let reference = client(&server).run_reference(77);
    assert_eq!(reference, Some(format!("{}/jobs/runs/77", server.uri())));
}
