use serde::Serialize;

use crate::domain::types::ConversationId;

/// ワーカープール上のジョブ状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }
}

/// ジョブメタデータ
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub job_id: String,
    pub conversation_id: ConversationId,
    pub file_name: String,
    pub status: JobStatus,
    pub created_at: String,
    pub error: Option<String>,
}

impl JobInfo {
    pub fn new(
        job_id: String,
        conversation_id: ConversationId,
        file_name: String,
        now: String,
    ) -> Self {
        Self {
            job_id,
            conversation_id,
            file_name,
            status: JobStatus::Queued,
            created_at: now,
            error: None,
        }
    }
}
