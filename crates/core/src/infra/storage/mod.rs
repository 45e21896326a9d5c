mod noop;
mod repository;

pub use noop::NoopAuditStore;
pub use repository::SqliteAuditStore;

use crate::domain::error::AppError;
use crate::domain::types::{AuditRecord, ConversationId, NewAuditRecord};

/// 監査ログの永続化 trait（追記と読み出しのみ。更新・削除はしない）
pub trait AuditStore: Send + Sync {
    /// スキーマ作成。何度呼んでもよい。
    fn init(&self) -> Result<(), AppError>;

    /// レコードを追記し、採番された ID を返す
    fn append(&self, record: NewAuditRecord) -> Result<i64, AppError>;

    /// 会話ごとの最新 `limit` 件（新しい順）
    fn list_recent(
        &self,
        conversation_id: ConversationId,
        limit: u32,
    ) -> Result<Vec<AuditRecord>, AppError>;

    /// 追記したレコードが実際に残るか。Noop は false。
    fn persistent(&self) -> bool {
        true
    }

    fn name(&self) -> &str;
}
