mod commands;
mod events;

use std::sync::Arc;

use tokio::sync::mpsc;

use ab_core::domain::error::AppError;
use ab_core::domain::settings::{AppConfig, StoreLocation};
use ab_core::infra::remote::DatabricksClient;
use ab_core::infra::storage::{AuditStore, NoopAuditStore, SqliteAuditStore};
use ab_core::usecase::audit_service::AuditService;
use ab_core::usecase::dispatcher::Dispatcher;
use ab_core::usecase::job_queue::JobQueue;

const INBOUND_CAPACITY: usize = 64;

/// ロガー初期化。RUST_LOG 未設定なら info、HTTP クライアント系は warn。
fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .filter_module("reqwest", log::LevelFilter::Warn)
        .filter_module("hyper", log::LevelFilter::Warn)
        .filter_module("hyper_util", log::LevelFilter::Warn)
        .init();
}

/// ストアを開く。開けなければ Noop にフォールバックする（ログは1回だけ）。
fn open_store(location: &StoreLocation) -> Arc<dyn AuditStore> {
    match location {
        StoreLocation::Disabled => {
            log::info!("監査ログの永続化は無効です (AUDIT_DB_PATH=off)");
            Arc::new(NoopAuditStore)
        }
        StoreLocation::File(path) => match SqliteAuditStore::open(path) {
            Ok(store) => {
                log::info!("監査ストア: {}", path.display());
                Arc::new(store)
            }
            Err(e) => {
                log::error!("監査ストアを開けません ({}): {e}。永続化なしで続行します", path.display());
                Arc::new(NoopAuditStore)
            }
        },
    }
}

/// 監査サービスを構築する（リモート設定がなければ無効）
fn create_audit_service(
    config: &AppConfig,
    store: Arc<dyn AuditStore>,
) -> Result<Arc<AuditService>, AppError> {
    let remote = config.remote.clone()?;
    let client = DatabricksClient::new(&remote)?;
    log::info!("Databricks job_id={} host={}", remote.job_id, remote.host);
    Ok(Arc::new(AuditService::new(
        &remote,
        config.limits.clone(),
        config.run,
        Arc::new(client),
        store,
    )))
}

/// 起動: 設定読み込み → ストア → サービス → dispatcher。標準入力が閉じるまで動く。
pub async fn run() -> Result<(), AppError> {
    let dotenv = dotenvy::dotenv();
    init_logger();
    if let Ok(path) = dotenv {
        log::debug!(".env を読み込みました: {}", path.display());
    }

    let config = AppConfig::from_env()?;
    log::debug!("{config:?}");

    let store = open_store(&config.store);
    let audit = create_audit_service(&config, store.clone());
    let queue = JobQueue::new(config.workers);

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);

    let dispatcher = Dispatcher::new(audit, store, queue, outbound_tx);
    let printer = tokio::spawn(events::forward(outbound_rx));
    tokio::spawn(commands::read_console(inbound_tx));

    log::info!("audit-bot 起動 (workers={})", config.workers);
    dispatcher.run(inbound_rx).await;

    if let Err(e) = printer.await {
        log::error!("出力タスクが異常終了: {e}");
    }
    Ok(())
}
