use std::path::Path;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use ab_core::domain::types::{ConversationId, InboundFile};
use ab_core::usecase::dispatcher::InboundEvent;

/// コンソール入力の解析エラー
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("invalid conversation id: {0}")]
    InvalidConversation(String),
    #[error("expected `<chat_id> /command` or `<chat_id> <file path>`")]
    MissingBody,
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

type CmdResult<T> = Result<T, CommandError>;

/// 1行を InboundEvent に変換する。空行と `#` コメントは `None`。
///
/// - `<chat_id> /audits 3` → コマンド
/// - `<chat_id> ./ledger.csv` → ファイルを読み込んで Document
pub async fn parse_line(line: &str) -> CmdResult<Option<InboundEvent>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (head, body) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let conversation_id: ConversationId = head
        .parse()
        .map_err(|_| CommandError::InvalidConversation(head.to_string()))?;
    let body = body.trim();
    if body.is_empty() {
        return Err(CommandError::MissingBody);
    }

    if body.starts_with('/') {
        return Ok(Some(InboundEvent::Command {
            conversation_id,
            text: body.to_string(),
        }));
    }

    let file = read_document(conversation_id, Path::new(body)).await?;
    Ok(Some(InboundEvent::Document(file)))
}

async fn read_document(conversation_id: ConversationId, path: &Path) -> CmdResult<InboundFile> {
    let bytes = tokio::fs::read(path).await.map_err(|source| CommandError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    Ok(InboundFile {
        conversation_id,
        file_name,
        bytes,
    })
}

/// 標準入力を読み、EOF まで dispatcher へ送る
pub async fn read_console(inbound: mpsc::Sender<InboundEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                log::error!("標準入力の読み込みに失敗: {e}");
                break;
            }
        };

        match parse_line(&line).await {
            Ok(Some(event)) => {
                if inbound.send(event).await.is_err() {
                    log::warn!("dispatcher が停止しています");
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => log::warn!("入力を無視しました: {e}"),
        }
    }
    log::info!("コンソール入力終了");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_parse_command_line() {
        let event = parse_line("42 /audits 3").await.unwrap().unwrap();
        match event {
            InboundEvent::Command {
                conversation_id,
                text,
            } => {
                assert_eq!(conversation_id, 42);
                assert_eq!(text, "/audits 3");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_parse_document_line() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(b"tx_id,date\n").unwrap();
        let line = format!("7 {}", file.path().display());

        let event = parse_line(&line).await.unwrap().unwrap();
        match event {
            InboundEvent::Document(doc) => {
                assert_eq!(doc.conversation_id, 7);
                assert!(doc.file_name.ends_with(".csv"));
                assert_eq!(doc.bytes, b"tx_id,date\n");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_blank_and_comment_lines_skipped() {
        assert!(parse_line("").await.unwrap().is_none());
        assert!(parse_line("   ").await.unwrap().is_none());
        assert!(parse_line("# note").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_parse_errors() {
        assert!(matches!(
            parse_line("abc /start").await,
            Err(CommandError::InvalidConversation(_))
        ));
        assert!(matches!(parse_line("12").await, Err(CommandError::MissingBody)));
        assert!(matches!(
            parse_line("12 /no/such/file.csv").await,
            Ok(Some(InboundEvent::Command { .. }))
        ));
        assert!(matches!(
            parse_line("12 no_such_file.csv").await,
            Err(CommandError::Read { .. })
        ));
    }
}
