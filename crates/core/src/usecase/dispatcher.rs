use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::domain::error::{AppError, ErrorCode};
use crate::domain::types::{ConversationId, InboundFile};
use crate::infra::formatter::ResultFormatter;
use crate::infra::storage::AuditStore;
use crate::usecase::audit_service::AuditService;
use crate::usecase::job_queue::JobQueue;

/// /audits の既定件数と上限
pub const DEFAULT_HISTORY_LIMIT: u32 = 5;
pub const MAX_HISTORY_LIMIT: u32 = 20;

/// チャット面から届くイベント
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// `/name args...` 形式のテキスト
    Command {
        conversation_id: ConversationId,
        text: String,
    },
    Document(InboundFile),
}

/// チャット面へ返すメッセージ
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub conversation_id: ConversationId,
    pub text: String,
    pub markdown: bool,
}

impl OutboundMessage {
    pub fn plain(conversation_id: ConversationId, text: impl Into<String>) -> Self {
        Self {
            conversation_id,
            text: text.into(),
            markdown: false,
        }
    }
}

/// 解析済みコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Help,
    Health,
    Audit,
    Audits(Option<String>),
    Unknown(String),
}

impl BotCommand {
    /// `/audits@bot 3` のようなボット名サフィックスも受け付ける
    pub fn parse(text: &str) -> Self {
        let mut parts = text.split_whitespace();
        let head = parts.next().unwrap_or_default();
        let name = head
            .trim_start_matches('/')
            .split('@')
            .next()
            .unwrap_or_default()
            .to_lowercase();

        match name.as_str() {
            "start" => Self::Start,
            "help" => Self::Help,
            "health" => Self::Health,
            "audit" => Self::Audit,
            "audits" => Self::Audits(parts.next().map(str::to_string)),
            _ => Self::Unknown(head.to_string()),
        }
    }
}

const HELP_TEXT: &str = "Comandos:\n\
    /start — saludo\n\
    /help — ayuda\n\
    /health — estado\n\
    /audit — cómo enviar un archivo para auditar\n\
    /audits [n] — últimas auditorías";

/// イベントを1件ずつ処理し、監査ジョブはワーカーに回す
pub struct Dispatcher {
    audit: Result<Arc<AuditService>, AppError>,
    store: Arc<dyn AuditStore>,
    queue: JobQueue,
    outbound: mpsc::UnboundedSender<OutboundMessage>,
}

impl Dispatcher {
    /// `audit` が `Err` の場合は監査機能を無効化し、その理由を返信に使う
    pub fn new(
        audit: Result<Arc<AuditService>, AppError>,
        store: Arc<dyn AuditStore>,
        queue: JobQueue,
        outbound: mpsc::UnboundedSender<OutboundMessage>,
    ) -> Self {
        if let Err(e) = &audit {
            log::warn!("監査機能は無効です: {e}");
        }
        Self {
            audit,
            store,
            queue,
            outbound,
        }
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// 受信チャネルが閉じるまで処理し、最後に実行中のジョブを待つ
    pub async fn run(self, mut inbound: mpsc::Receiver<InboundEvent>) {
        while let Some(event) = inbound.recv().await {
            self.handle(event).await;
        }
        log::info!("受信チャネル終了。実行中ジョブの完了を待ちます");
        self.queue.wait_idle().await;
    }

    pub async fn handle(&self, event: InboundEvent) {
        match event {
            InboundEvent::Command {
                conversation_id,
                text,
            } => self.handle_command(conversation_id, BotCommand::parse(&text)).await,
            InboundEvent::Document(file) => self.handle_document(file).await,
        }
    }

    async fn handle_command(&self, conversation_id: ConversationId, command: BotCommand) {
        log::debug!("command chat_id={conversation_id} {command:?}");
        let text = match command {
            BotCommand::Start => "¡Hola! Bot de auditoría contable ✅ (usa /help)".to_string(),
            BotCommand::Help => HELP_TEXT.to_string(),
            BotCommand::Health => {
                let in_flight = self.queue.in_flight(None).await;
                format!("OK\nAuditorías en curso: {in_flight}")
            }
            BotCommand::Audit => match &self.audit {
                Ok(service) => format!(
                    "🔎 Auditoría contable: envíame tu archivo ({}) como documento.\n\
                     Validaré fechas, duplicados, desbalances y campos obligatorios. ⚖️",
                    service.limits().allowed_extensions.join(", ")
                ),
                Err(e) => format!("⚠️ {}", e.message),
            },
            BotCommand::Audits(arg) => match parse_limit(arg.as_deref()) {
                Some(limit) => self.history(conversation_id, limit).await,
                None => format!("Uso: /audits [n] (1-{MAX_HISTORY_LIMIT})"),
            },
            BotCommand::Unknown(name) => format!("Comando desconocido: {name}. Usa /help"),
        };
        self.send(OutboundMessage::plain(conversation_id, text));
    }

    async fn history(&self, conversation_id: ConversationId, limit: u32) -> String {
        let store = self.store.clone();
        let result = tokio::task::spawn_blocking(move || store.list_recent(conversation_id, limit))
            .await
            .map_err(|e| AppError::internal(format!("履歴タスク失敗: {e}")))
            .and_then(|r| r);

        match result {
            Ok(records) => ResultFormatter::render_history(&records),
            Err(e) => {
                log::error!("履歴の取得に失敗 chat_id={conversation_id}: {e}");
                "⚠️ No se pudo leer el historial de auditorías.".to_string()
            }
        }
    }

    async fn handle_document(&self, file: InboundFile) {
        let conversation_id = file.conversation_id;
        let service = match &self.audit {
            Ok(service) => service.clone(),
            Err(e) => {
                self.send(OutboundMessage::plain(conversation_id, format!("⚠️ {}", e.message)));
                return;
            }
        };

        if let Err(e) = service.validate(&file) {
            log::info!("入力拒否 chat_id={conversation_id} file={}: {e}", file.file_name);
            self.send(OutboundMessage::plain(conversation_id, format!("⚠️ {}", e.message)));
            return;
        }

        self.send(OutboundMessage::plain(
            conversation_id,
            format!("🚀 Ejecutando auditoría de {}…\nTe aviso al terminar.", file.file_name),
        ));

        let outbound = self.outbound.clone();
        let file_name = file.file_name.clone();
        let job_id = self
            .queue
            .spawn(conversation_id, file_name, async move {
                match service.process_file(file).await {
                    Ok(report) => {
                        deliver(
                            &outbound,
                            OutboundMessage {
                                conversation_id,
                                text: report.text,
                                markdown: report.markdown,
                            },
                        );
                        Ok(())
                    }
                    Err(e) => {
                        deliver(&outbound, OutboundMessage::plain(conversation_id, user_message(&e)));
                        Err(e.to_string())
                    }
                }
            })
            .await;
        log::debug!("ジョブ発行 job_id={job_id} chat_id={conversation_id}");
    }

    fn send(&self, message: OutboundMessage) {
        deliver(&self.outbound, message);
    }
}

fn deliver(outbound: &mpsc::UnboundedSender<OutboundMessage>, message: OutboundMessage) {
    if outbound.send(message).is_err() {
        log::warn!("送信チャネルが閉じています。メッセージを破棄しました");
    }
}

/// `/audits` の引数。省略時は既定値、範囲外は上限で丸める。
fn parse_limit(arg: Option<&str>) -> Option<u32> {
    match arg {
        None => Some(DEFAULT_HISTORY_LIMIT),
        Some(raw) => match raw.parse::<u32>() {
            Ok(0) | Err(_) => None,
            Ok(n) => Some(n.min(MAX_HISTORY_LIMIT)),
        },
    }
}

fn user_message(error: &AppError) -> String {
    match error.code {
        ErrorCode::RemoteService => format!("❌ Error al ejecutar el Job: {}", error.message),
        _ => format!("⚠️ {}", error.message),
    }
}
