use std::io::Write;

use serde::Serialize;
use tokio::sync::mpsc;

use ab_core::usecase::dispatcher::OutboundMessage;

/// イベント名定数
pub const MESSAGE: &str = "message";

#[derive(Debug, Serialize)]
struct Envelope<'a, S> {
    event: &'a str,
    payload: S,
}

/// 統一イベント送信関数（1イベント = JSON 1行）
pub fn emit_event<W: Write, S: Serialize>(out: &mut W, event_name: &str, payload: S) {
    let envelope = Envelope {
        event: event_name,
        payload,
    };
    let written = serde_json::to_writer(&mut *out, &envelope)
        .map_err(std::io::Error::from)
        .and_then(|_| writeln!(out))
        .and_then(|_| out.flush());
    if let Err(e) = written {
        log::error!("イベント送信失敗 [{event_name}]: {e}");
    }
}

/// 送信チャネルが閉じるまで標準出力へ書き出す
pub async fn forward(mut outbound: mpsc::UnboundedReceiver<OutboundMessage>) {
    while let Some(message) = outbound.recv().await {
        let mut stdout = std::io::stdout().lock();
        emit_event(&mut stdout, MESSAGE, &message);
    }
}
