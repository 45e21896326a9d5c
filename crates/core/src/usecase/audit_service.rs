use std::sync::Arc;

use serde::Serialize;

use crate::domain::error::{AppError, ErrorCode};
use crate::domain::run::{JobRun, RunOutcome};
use crate::domain::settings::{InputLimits, RemoteConfig, RunPolicy};
use crate::domain::types::{InboundFile, NewAuditRecord, Summary};
use crate::infra::formatter::ResultFormatter;
use crate::infra::remote::{encoder, JobRunner};
use crate::infra::storage::AuditStore;
use crate::usecase::orchestrator::Orchestrator;

/// 出力が得られなかったランに保存するプレースホルダ
pub const NO_RESULT_PLACEHOLDER: &str = "(sin resultado)";
/// タイムアウトしたランに保存するプレースホルダ
pub const TIMEOUT_PLACEHOLDER: &str = "(timeout)";

/// 1ラン分の結果（チャットへ返す1メッセージ + 付随情報）
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub text: String,
    pub markdown: bool,
    pub outcome: RunOutcome,
    /// 成功以外の注意事項（タイムアウト・出力なし・解析不能）
    pub caveat: Option<ErrorCode>,
    pub run_id: i64,
    pub run_url: Option<String>,
    pub record_id: Option<i64>,
}

/// 監査サービス: 検証 → エンコード → 実行 → 整形 → 永続化
pub struct AuditService {
    job_id: i64,
    payload_param: String,
    limits: InputLimits,
    policy: RunPolicy,
    orchestrator: Orchestrator,
    store: Arc<dyn AuditStore>,
}

impl AuditService {
    pub fn new(
        remote: &RemoteConfig,
        limits: InputLimits,
        policy: RunPolicy,
        runner: Arc<dyn JobRunner>,
        store: Arc<dyn AuditStore>,
    ) -> Self {
        Self {
            job_id: remote.job_id,
            payload_param: remote.payload_param.clone(),
            limits,
            policy,
            orchestrator: Orchestrator::new(runner),
            store,
        }
    }

    pub fn limits(&self) -> &InputLimits {
        &self.limits
    }

    /// リモート呼び出し前の入力検証
    pub fn validate(&self, file: &InboundFile) -> Result<(), AppError> {
        encoder::validate_input(file, &self.limits)
    }

    /// ファイルを1件監査する。
    ///
    /// `Err` になるのは入力拒否と投入失敗（ステータス照会の連続失敗を含む）のみ。
    /// それ以外は注意事項付きのレポートとして返す。
    pub async fn process_file(&self, file: InboundFile) -> Result<AuditReport, AppError> {
        self.validate(&file)?;

        let request = encoder::build_request(&file, self.job_id, &self.payload_param);
        log::info!(
            "監査開始: chat_id={} file={} bytes={} runner={}",
            file.conversation_id,
            file.file_name,
            file.bytes.len(),
            self.orchestrator.runner().name()
        );

        let run = self.orchestrator.run_job(request, &self.policy).await?;
        let (report, summary) = compose_report(&run);

        let record_id = self
            .persist(NewAuditRecord {
                conversation_id: file.conversation_id,
                file_name: file.file_name,
                run_id: Some(run.run_id),
                run_url: run.run_url.clone(),
                summary,
            })
            .await;

        Ok(AuditReport {
            record_id,
            ..report
        })
    }

    /// 永続化はベストエフォート。失敗してもログに残して配信は続ける。
    /// 保存されなかった場合は `None`。
    async fn persist(&self, record: NewAuditRecord) -> Option<i64> {
        if !self.store.persistent() {
            log::debug!("永続化無効 ({}): chat_id={}", self.store.name(), record.conversation_id);
            return None;
        }
        let store = self.store.clone();
        let result = tokio::task::spawn_blocking(move || store.append(record))
            .await
            .map_err(|e| AppError::internal(format!("永続化タスク失敗: {e}")))
            .and_then(|r| r);

        match result {
            Ok(id) => Some(id),
            Err(e) => {
                log::error!("監査レコードの保存に失敗: {e}");
                None
            }
        }
    }
}

/// ランの結果から返信テキストと保存用サマリーを組み立てる
fn compose_report(run: &JobRun) -> (AuditReport, Summary) {
    let link = run.run_url.as_deref().unwrap_or_default();
    let base = AuditReport {
        text: String::new(),
        markdown: false,
        outcome: run.outcome(),
        caveat: None,
        run_id: run.run_id,
        run_url: run.run_url.clone(),
        record_id: None,
    };

    match (run.outcome(), run.output.as_deref()) {
        (RunOutcome::Completed, Some(raw)) => match ResultFormatter::format(raw) {
            Ok((_, rendering)) => {
                let structured = serde_json::from_str(raw)
                    .map(Summary::Structured)
                    .unwrap_or_else(|_| Summary::Text(raw.to_string()));
                let report = AuditReport {
                    text: format!("{rendering}\n{link}").trim_end().to_string(),
                    markdown: true,
                    ..base
                };
                (report, structured)
            }
            Err(e) => {
                log::warn!("出力を解析できません run_id={}: {e}", run.run_id);
                let report = AuditReport {
                    text: format!("⚠️ Salida no válida (no es JSON parseable): {e}\n\n{raw}\n{link}")
                        .trim_end()
                        .to_string(),
                    caveat: Some(ErrorCode::MalformedResult),
                    ..base
                };
                (report, Summary::Text(raw.to_string()))
            }
        },
        (RunOutcome::TimedOut, _) => {
            let report = AuditReport {
                text: format!(
                    "⏱️ La ejecución está tardando más de lo previsto (sigue en ejecución). \
                     Vuelve a intentar en unos minutos.\n{link}"
                )
                .trim_end()
                .to_string(),
                caveat: Some(ErrorCode::Timeout),
                ..base
            };
            (report, Summary::Text(TIMEOUT_PLACEHOLDER.to_string()))
        }
        _ => {
            let report = AuditReport {
                text: format!(
                    "⚠️ No pude leer la salida del Job todavía.\n\
                     Estado final: {}\n\
                     Asegúrate de que el notebook termine con dbutils.notebook.exit(JSON).\n{link}",
                    run.status_line()
                )
                .trim_end()
                .to_string(),
                caveat: Some(ErrorCode::OutputUnavailable),
                ..base
            };
            (report, Summary::Text(NO_RESULT_PLACEHOLDER.to_string()))
        }
    }
}
