use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::encoder;
use super::{JobRunner, RemoteError};
use crate::domain::error::AppError;
use crate::domain::run::{JobRequest, LifeCycleState, ResultState, RunState};
use crate::domain::settings::RemoteConfig;

const RUN_NOW_PATH: &str = "/api/2.2/jobs/run-now";
const RUN_GET_PATH: &str = "/api/2.2/jobs/runs/get";
const RUN_OUTPUT_PATH: &str = "/api/2.1/jobs/runs/get-output";

/// Databricks Jobs API クライアント（Bearer 認証）
pub struct DatabricksClient {
    client: reqwest::Client,
    host: String,
    token: String,
}

#[derive(Serialize)]
struct RunNowRequest {
    job_id: i64,
    notebook_params: serde_json::Value,
}

#[derive(Deserialize)]
struct RunNowResponse {
    run_id: i64,
}

#[derive(Deserialize)]
struct RunGetResponse {
    state: RemoteRunState,
}

#[derive(Deserialize)]
struct RemoteRunState {
    life_cycle_state: String,
    result_state: Option<String>,
}

#[derive(Deserialize)]
struct RunOutputResponse {
    #[serde(default)]
    notebook_output: Option<NotebookOutput>,
}

#[derive(Deserialize)]
struct NotebookOutput {
    result: Option<String>,
}

impl DatabricksClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| AppError::configuration(format!("HTTPクライアント作成に失敗: {e}")))?;

        Ok(Self {
            client,
            host: config.host.clone(),
            token: config.token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }

    /// 非 2xx はステータスと本文を保持したエラーにする
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::Http { status, body })
    }
}

fn transport_error(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Transport(e.to_string())
    }
}

#[async_trait]
impl JobRunner for DatabricksClient {
    async fn submit(&self, request: &JobRequest) -> Result<i64, RemoteError> {
        let body = RunNowRequest {
            job_id: request.job_id,
            notebook_params: encoder::notebook_params(request),
        };

        let response = self
            .client
            .post(self.url(RUN_NOW_PATH))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let parsed: RunNowResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        log::info!(
            "ジョブ投入: job_id={} file={} run_id={}",
            request.job_id,
            request.file_name,
            parsed.run_id
        );
        Ok(parsed.run_id)
    }

    async fn poll_state(&self, run_id: i64) -> Result<RunState, RemoteError> {
        let response = self
            .client
            .get(self.url(RUN_GET_PATH))
            .bearer_auth(&self.token)
            .query(&[("run_id", run_id)])
            .send()
            .await
            .map_err(transport_error)?;

        let parsed: RunGetResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        Ok(RunState {
            life_cycle: LifeCycleState::from_remote(&parsed.state.life_cycle_state),
            result: parsed
                .state
                .result_state
                .as_deref()
                .map(ResultState::from_remote),
        })
    }

    async fn fetch_result(&self, run_id: i64) -> Result<String, RemoteError> {
        let response = self
            .client
            .get(self.url(RUN_OUTPUT_PATH))
            .bearer_auth(&self.token)
            .query(&[("run_id", run_id)])
            .send()
            .await
            .map_err(transport_error)?;

        let parsed: RunOutputResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        Ok(parsed
            .notebook_output
            .and_then(|o| o.result)
            .unwrap_or_default())
    }

    fn run_reference(&self, run_id: i64) -> Option<String> {
        Some(format!("{}/jobs/runs/{run_id}", self.host))
    }

    fn name(&self) -> &str {
        "databricks"
    }
}
