use std::time::Duration;

use serde::Serialize;

/// リモートジョブに投入する1回分のリクエスト（投入後は破棄される）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub job_id: i64,
    pub file_name: String,
    /// base64 エンコード済みのファイル内容
    pub payload_b64: String,
    /// ペイロードを渡すノートブックパラメータ名
    pub payload_param: String,
}

/// ライフサイクル状態（リモートの粗い実行フェーズ）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifeCycleState {
    Pending,
    Running,
    Terminated,
    InternalError,
    Skipped,
    /// ローカルで合成する状態。リモートからは受け取らない。
    TimedOut,
    /// QUEUED / TERMINATING / BLOCKED など、一覧にない実行中フェーズ
    #[serde(untagged)]
    Other(String),
}

impl LifeCycleState {
    /// リモートの文字列表現から変換する。
    pub fn from_remote(s: &str) -> Self {
        match s {
            "PENDING" => Self::Pending,
            "RUNNING" => Self::Running,
            "TERMINATED" => Self::Terminated,
            "INTERNAL_ERROR" => Self::InternalError,
            "SKIPPED" => Self::Skipped,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Terminated | Self::InternalError | Self::Skipped | Self::TimedOut
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Terminated => "TERMINATED",
            Self::InternalError => "INTERNAL_ERROR",
            Self::Skipped => "SKIPPED",
            Self::TimedOut => "TIMED_OUT",
            Self::Other(s) => s,
        }
    }
}

/// 終了したランの結果分類
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultState {
    Success,
    Failed,
    Canceled,
    #[serde(untagged)]
    Unknown(String),
}

impl ResultState {
    pub fn from_remote(s: &str) -> Self {
        match s {
            "SUCCESS" => Self::Success,
            "FAILED" => Self::Failed,
            "CANCELED" => Self::Canceled,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
            Self::Unknown(s) => s,
        }
    }
}

/// ステータス取得1回分の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    pub life_cycle: LifeCycleState,
    pub result: Option<ResultState>,
}

/// 実行中ランの記録。ポーリングループだけが更新する。
#[derive(Debug, Clone, Serialize)]
pub struct JobRun {
    pub run_id: i64,
    pub run_url: Option<String>,
    pub life_cycle: LifeCycleState,
    pub result_state: Option<ResultState>,
    pub waited: Duration,
    pub polls: u32,
    pub fetch_attempts: u32,
    pub output: Option<String>,
}

/// ランの最終的な扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// 終了状態に達し、出力を取得できた
    Completed,
    /// 終了したがリトライ後も出力が空
    OutputUnavailable,
    /// 待機上限までに終了状態に達しなかった
    TimedOut,
}

impl JobRun {
    pub fn submitted(run_id: i64, run_url: Option<String>) -> Self {
        Self {
            run_id,
            run_url,
            life_cycle: LifeCycleState::Pending,
            result_state: None,
            waited: Duration::ZERO,
            polls: 0,
            fetch_attempts: 0,
            output: None,
        }
    }

    /// 状態を記録する。終了状態に達したランは変更しない（false を返す）。
    pub fn record_state(&mut self, state: RunState) -> bool {
        if self.life_cycle.is_terminal() {
            return false;
        }
        self.life_cycle = state.life_cycle;
        self.result_state = state.result;
        true
    }

    /// 待機上限到達。TIMED_OUT を合成する。
    pub fn mark_timed_out(&mut self) {
        if !self.life_cycle.is_terminal() {
            self.life_cycle = LifeCycleState::TimedOut;
        }
    }

    pub fn outcome(&self) -> RunOutcome {
        match (&self.life_cycle, &self.output) {
            (LifeCycleState::TimedOut, _) => RunOutcome::TimedOut,
            (_, Some(out)) if !out.is_empty() => RunOutcome::Completed,
            _ => RunOutcome::OutputUnavailable,
        }
    }

    /// "TERMINATED/SUCCESS" 形式の状態表示
    pub fn status_line(&self) -> String {
        match &self.result_state {
            Some(r) => format!("{}/{}", self.life_cycle.as_str(), r.as_str()),
            None => self.life_cycle.as_str().to_string(),
        }
    }
}
