pub mod databricks;
pub mod encoder;
#[cfg(any(test, feature = "test-util"))]
mod scripted;

pub use databricks::DatabricksClient;
#[cfg(any(test, feature = "test-util"))]
pub use scripted::ScriptedRunner;

use async_trait::async_trait;

use crate::domain::error::AppError;
use crate::domain::run::{JobRequest, RunState};

/// リモートジョブサービスのエラー
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Request timeout")]
    Timeout,
    #[error("Response decode error: {0}")]
    Decode(String),
}

impl From<RemoteError> for AppError {
    fn from(e: RemoteError) -> Self {
        AppError::remote(e.to_string())
    }
}

/// リモートのバッチジョブ実行サービス。
///
/// 実装は呼び出し間で可変状態を持たない。リトライはオーケストレータの責務。
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// ジョブを投入し、ラン ID を返す
    async fn submit(&self, request: &JobRequest) -> Result<i64, RemoteError>;

    /// ランの状態を1回だけ取得する
    async fn poll_state(&self, run_id: i64) -> Result<RunState, RemoteError>;

    /// ランの出力を取得する。未公開なら空文字列（エラーではない）。
    async fn fetch_result(&self, run_id: i64) -> Result<String, RemoteError>;

    /// ランを参照する URL
    fn run_reference(&self, run_id: i64) -> Option<String>;

    fn name(&self) -> &str;
}
