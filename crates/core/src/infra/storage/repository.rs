use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};

use super::AuditStore;
use crate::domain::error::AppError;
use crate::domain::types::{AuditRecord, ConversationId, NewAuditRecord, Summary};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLiteストレージ（audits テーブル、追記専用）
pub struct SqliteAuditStore {
    conn: Mutex<Connection>,
}

impl SqliteAuditStore {
    /// 新規接続（ファイルパス指定）。親ディレクトリがなければ作成する。
    pub fn open(path: &Path) -> Result<Self, AppError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|e| AppError::storage(format!("DBディレクトリ作成に失敗: {e}")))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| AppError::storage(format!("DB接続に失敗: {e}")))?;
        Self::from_connection(conn)
    }

    /// in-memory DB（テスト用）
    pub fn open_in_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::storage(format!("in-memory DB作成に失敗: {e}")))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, AppError> {
        Self::configure(&conn)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    /// WAL + synchronous=NORMAL + busy_timeout
    fn configure(conn: &Connection) -> Result<(), AppError> {
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| AppError::storage(format!("busy_timeout 設定失敗: {e}")))?;
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(|e| AppError::storage(format!("journal_mode 設定失敗: {e}")))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| AppError::storage(format!("synchronous 設定失敗: {e}")))?;
        log::debug!("SQLite journal_mode={mode}");
        Ok(())
    }

    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<AuditRecord> {
        let summary_json: String = row.get(5)?;
        let summary_kind: String = row.get(6)?;
        let created_at: String = row.get(7)?;

        Ok(AuditRecord {
            id: row.get(0)?,
            conversation_id: row.get(1)?,
            file_name: row.get(2)?,
            run_id: row.get(3)?,
            run_url: row.get(4)?,
            summary: decode_summary(&summary_kind, summary_json),
            created_at: parse_timestamp(&created_at),
        })
    }
}

impl AuditStore for SqliteAuditStore {
    fn init(&self) -> Result<(), AppError> {
        self.conn
            .lock()
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS audits (
                    id           INTEGER PRIMARY KEY AUTOINCREMENT,
                    chat_id      INTEGER NOT NULL,
                    file_name    TEXT NOT NULL,
                    run_id       INTEGER,
                    run_url      TEXT,
                    summary_json TEXT NOT NULL,
                    summary_kind TEXT NOT NULL DEFAULT 'json',
                    created_at   TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_audits_chat_created
                    ON audits(chat_id, created_at DESC);
                ",
            )
            .map_err(|e| AppError::storage(format!("マイグレーション失敗: {e}")))?;
        Ok(())
    }

    fn append(&self, record: NewAuditRecord) -> Result<i64, AppError> {
        let summary_json = match &record.summary {
            Summary::Structured(value) => serde_json::to_string(value)
                .map_err(|e| AppError::internal(format!("summary serialize: {e}")))?,
            Summary::Text(text) => text.clone(),
        };
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO audits (chat_id, file_name, run_id, run_url, summary_json, summary_kind, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.conversation_id,
                record.file_name,
                record.run_id,
                record.run_url,
                summary_json,
                record.summary.kind(),
                now,
            ],
        )
        .map_err(|e| AppError::storage(format!("監査レコード挿入失敗: {e}")))?;

        Ok(conn.last_insert_rowid())
    }

    fn list_recent(
        &self,
        conversation_id: ConversationId,
        limit: u32,
    ) -> Result<Vec<AuditRecord>, AppError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, chat_id, file_name, run_id, run_url, summary_json, summary_kind, created_at
                 FROM audits
                 WHERE chat_id = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2",
            )
            .map_err(|e| AppError::storage(format!("クエリ準備失敗: {e}")))?;

        let records = stmt
            .query_map(params![conversation_id, limit], Self::map_row)
            .map_err(|e| AppError::storage(format!("クエリ実行失敗: {e}")))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::storage(format!("行読み取り失敗: {e}")))?;

        Ok(records)
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

/// 構造化として保存したものは JSON に戻す。壊れていればテキスト扱い。
fn decode_summary(kind: &str, raw: String) -> Summary {
    if kind == "text" {
        return Summary::Text(raw);
    }
    match serde_json::from_str(&raw) {
        Ok(value) => Summary::Structured(value),
        Err(_) => Summary::Text(raw),
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}
