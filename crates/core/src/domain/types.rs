use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 会話（チャット）ID。監査レコードはこの単位で検索される。
pub type ConversationId = i64;

/// チャットから受け取ったファイル
#[derive(Debug, Clone)]
pub struct InboundFile {
    pub conversation_id: ConversationId,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// 監査サマリー。構造化JSONか、解析できなかった生テキスト。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Summary {
    Structured(serde_json::Value),
    Text(String),
}

impl Summary {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Structured(_) => "json",
            Self::Text(_) => "text",
        }
    }
}

/// 挿入前の監査レコード
#[derive(Debug, Clone)]
pub struct NewAuditRecord {
    pub conversation_id: ConversationId,
    pub file_name: String,
    pub run_id: Option<i64>,
    pub run_url: Option<String>,
    pub summary: Summary,
}

/// 永続化済みの監査レコード（不変）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub conversation_id: ConversationId,
    pub file_name: String,
    pub run_id: Option<i64>,
    pub run_url: Option<String>,
    pub summary: Summary,
    pub created_at: DateTime<Utc>,
}
