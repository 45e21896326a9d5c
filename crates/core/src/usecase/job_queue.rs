use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;

use crate::domain::job::{JobInfo, JobStatus};
use crate::domain::types::ConversationId;

/// ジョブキュー: Tokioタスクの発行・追跡。同時実行数はセマフォで制限する。
#[derive(Clone)]
pub struct JobQueue {
    jobs: Arc<Mutex<HashMap<String, JobEntry>>>,
    permits: Arc<Semaphore>,
}

struct JobEntry {
    info: JobInfo,
    handle: Option<JoinHandle<()>>,
}

impl JobQueue {
    pub fn new(workers: usize) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// ジョブを登録し、ジョブ ID を返す
    pub async fn enqueue(&self, conversation_id: ConversationId, file_name: String) -> String {
        let job_id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        let info = JobInfo::new(job_id.clone(), conversation_id, file_name, now);

        let mut jobs = self.jobs.lock().await;
        jobs.insert(job_id.clone(), JobEntry { info, handle: None });

        job_id
    }

    /// ジョブを登録してワーカーで実行する。空きがなければ Queued のまま待つ。
    /// 登録前に完了済みジョブを掃除するので、追跡数は未完了 + 直近の完了分に収まる。
    pub async fn spawn<F>(&self, conversation_id: ConversationId, file_name: String, task: F) -> String
    where
        F: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.cleanup_completed().await;
        let job_id = self.enqueue(conversation_id, file_name).await;

        let queue = self.clone();
        let id = job_id.clone();
        let handle = tokio::spawn(async move {
            let _permit = match queue.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    queue.mark_failed(&id, e.to_string()).await;
                    return;
                }
            };
            queue.mark_running(&id).await;
            match task.await {
                Ok(()) => queue.mark_done(&id).await,
                Err(e) => {
                    log::warn!("ジョブ失敗 job_id={id}: {e}");
                    queue.mark_failed(&id, e).await;
                }
            }
        });

        self.set_handle(&job_id, handle).await;
        job_id
    }

    /// ジョブのJoinHandleを設定（spawn後に呼ぶ）
    async fn set_handle(&self, job_id: &str, handle: JoinHandle<()>) {
        let mut jobs = self.jobs.lock().await;
        if let Some(entry) = jobs.get_mut(job_id) {
            entry.handle = Some(handle);
        }
    }

    /// ジョブをRunning状態に変更
    pub async fn mark_running(&self, job_id: &str) {
        let mut jobs = self.jobs.lock().await;
        if let Some(entry) = jobs.get_mut(job_id) {
            entry.info.status = JobStatus::Running;
        }
    }

    /// ジョブをDone状態に変更
    pub async fn mark_done(&self, job_id: &str) {
        let mut jobs = self.jobs.lock().await;
        if let Some(entry) = jobs.get_mut(job_id) {
            entry.info.status = JobStatus::Done;
        }
    }

    /// ジョブをFailed状態に変更
    pub async fn mark_failed(&self, job_id: &str, error: String) {
        let mut jobs = self.jobs.lock().await;
        if let Some(entry) = jobs.get_mut(job_id) {
            entry.info.status = JobStatus::Failed;
            entry.info.error = Some(error);
        }
    }

    /// ジョブ情報を取得
    pub async fn get_job(&self, job_id: &str) -> Option<JobInfo> {
        let jobs = self.jobs.lock().await;
        jobs.get(job_id).map(|e| e.info.clone())
    }

    /// 未完了ジョブ数（会話を指定すればその会話のみ）
    pub async fn in_flight(&self, conversation_id: Option<ConversationId>) -> usize {
        let jobs = self.jobs.lock().await;
        jobs.values()
            .filter(|e| e.info.status.is_active())
            .filter(|e| conversation_id.map_or(true, |c| e.info.conversation_id == c))
            .count()
    }

    /// 追跡中のジョブ数（完了済みで未掃除のものを含む）
    pub async fn tracked(&self) -> usize {
        self.jobs.lock().await.len()
    }

    /// 発行済みの全タスクの終了を待つ
    pub async fn wait_idle(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut jobs = self.jobs.lock().await;
            jobs.values_mut().filter_map(|e| e.handle.take()).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                log::error!("ジョブタスクが異常終了: {e}");
            }
        }
    }

    /// 完了済みジョブを削除（メモリ解放）
    pub async fn cleanup_completed(&self) {
        let mut jobs = self.jobs.lock().await;
        jobs.retain(|_, entry| entry.info.status.is_active());
    }
}
