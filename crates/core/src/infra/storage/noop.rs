use super::AuditStore;
use crate::domain::error::AppError;
use crate::domain::types::{AuditRecord, ConversationId, NewAuditRecord};

/// NoopAuditStore: 永続化を無効にしたときのストア。
/// 追記は受け付けるが何も保存しない。
pub struct NoopAuditStore;

impl AuditStore for NoopAuditStore {
    fn init(&self) -> Result<(), AppError> {
        Ok(())
    }

    fn append(&self, record: NewAuditRecord) -> Result<i64, AppError> {
        log::debug!(
            "永続化無効のため破棄: chat_id={} file={}",
            record.conversation_id,
            record.file_name
        );
        Ok(0)
    }

    fn list_recent(
        &self,
        _conversation_id: ConversationId,
        _limit: u32,
    ) -> Result<Vec<AuditRecord>, AppError> {
        Ok(vec![])
    }

    fn persistent(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "noop"
    }
}
