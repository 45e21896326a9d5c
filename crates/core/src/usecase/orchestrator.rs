use std::sync::Arc;

use crate::domain::error::AppError;
use crate::domain::run::{JobRequest, JobRun, LifeCycleState};
use crate::domain::settings::{PollPolicy, RetryPolicy, RunPolicy};
use crate::infra::remote::JobRunner;

/// 投入 → ポーリング → 出力取得 のライフサイクルを1ラン分駆動する
pub struct Orchestrator {
    runner: Arc<dyn JobRunner>,
}

impl Orchestrator {
    pub fn new(runner: Arc<dyn JobRunner>) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &Arc<dyn JobRunner> {
        &self.runner
    }

    /// ジョブを1回実行する。
    ///
    /// 投入に失敗した場合のみ `Err`（JobRun は作られない）。タイムアウトや
    /// 出力なしは `JobRun::outcome()` で表現される正常な結果。
    pub async fn run_job(
        &self,
        request: JobRequest,
        policy: &RunPolicy,
    ) -> Result<JobRun, AppError> {
        let run_id = self.runner.submit(&request).await?;
        drop(request);

        let mut run = JobRun::submitted(run_id, self.runner.run_reference(run_id));
        self.wait_for_terminal(&mut run, &policy.poll).await?;

        if run.life_cycle != LifeCycleState::TimedOut {
            self.fetch_output(&mut run, &policy.output).await;
        }

        log::info!(
            "ラン終了: run_id={} state={} polls={} waited={:?} outcome={:?}",
            run.run_id,
            run.status_line(),
            run.polls,
            run.waited,
            run.outcome()
        );
        Ok(run)
    }

    /// 終了状態まで逐次ポーリングする。上限に達したら TIMED_OUT。
    async fn wait_for_terminal(&self, run: &mut JobRun, policy: &PollPolicy) -> Result<(), AppError> {
        let max_polls = policy.max_polls();
        let mut consecutive_failures = 0u32;

        while run.polls < max_polls {
            run.polls += 1;
            match self.runner.poll_state(run.run_id).await {
                Ok(state) => {
                    consecutive_failures = 0;
                    log::debug!(
                        "run_id={} life={} result={:?}",
                        run.run_id,
                        state.life_cycle.as_str(),
                        state.result
                    );
                    run.record_state(state);
                    if run.life_cycle.is_terminal() {
                        return Ok(());
                    }
                }
                Err(e) => {
                    consecutive_failures += 1;
                    log::warn!(
                        "ステータス取得失敗 run_id={} ({consecutive_failures}/{}): {e}",
                        run.run_id,
                        policy.max_consecutive_failures
                    );
                    if consecutive_failures >= policy.max_consecutive_failures {
                        return Err(AppError::remote(format!(
                            "No se pudo consultar el estado del run {}: {e}",
                            run.run_id
                        )));
                    }
                }
            }

            tokio::time::sleep(policy.interval).await;
            run.waited += policy.interval;
        }

        log::warn!(
            "待機上限に到達: run_id={} waited={:?}",
            run.run_id,
            run.waited
        );
        run.mark_timed_out();
        Ok(())
    }

    /// 出力が公開されるまで取得をリトライする。空でも失敗扱いにはしない。
    async fn fetch_output(&self, run: &mut JobRun, policy: &RetryPolicy) {
        for attempt in 0..policy.max_attempts {
            run.fetch_attempts += 1;
            match self.runner.fetch_result(run.run_id).await {
                Ok(output) if !output.is_empty() => {
                    run.output = Some(output);
                    return;
                }
                Ok(_) => log::debug!("出力未公開 run_id={} attempt={}", run.run_id, attempt + 1),
                Err(e) => log::warn!("出力取得失敗 run_id={} attempt={}: {e}", run.run_id, attempt + 1),
            }

            if attempt + 1 < policy.max_attempts {
                tokio::time::sleep(policy.delay_after(attempt)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::domain::error::ErrorCode;
    use crate::domain::run::{ResultState, RunOutcome, RunState};
    use crate::infra::remote::{RemoteError, ScriptedRunner};

    fn request() -> JobRequest {
        JobRequest {
            job_id: 1,
            file_name: "mini.csv".to_string(),
            payload_b64: "YQ==".to_string(),
            payload_param: "file_b64".to_string(),
        }
    }

    fn policy(max_wait: u64, interval: u64, retries: u32) -> RunPolicy {
        RunPolicy {
            poll: PollPolicy {
                max_wait: Duration::from_secs(max_wait),
                interval: Duration::from_secs(interval),
                max_consecutive_failures: 3,
            },
            output: RetryPolicy {
                max_attempts: retries,
                delay: Duration::from_secs(5),
                backoff: 1.0,
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_running_running_terminated() {
        let runner = Arc::new(
            ScriptedRunner::new(77)
                .with_states(vec![
                    LifeCycleState::Running,
                    LifeCycleState::Running,
                    LifeCycleState::Terminated,
                ])
                .with_outputs(vec![r#"{"rows":3}"#]),
        );
        let orchestrator = Orchestrator::new(runner.clone());

        let run = orchestrator.run_job(request(), &policy(60, 5, 12)).await.unwrap();

        assert_eq!(run.run_id, 77);
        assert_eq!(run.life_cycle, LifeCycleState::Terminated);
        assert_eq!(run.result_state, Some(ResultState::Success));
        assert_eq!(run.polls, 3);
        assert_eq!(run.waited, Duration::from_secs(10));
        assert_eq!(run.output.as_deref(), Some(r#"{"rows":3}"#));
        assert_eq!(run.outcome(), RunOutcome::Completed);
        assert_eq!(runner.fetches(), 1);
        assert_eq!(run.run_url.as_deref(), Some("https://dbx.test/jobs/runs/77"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_terminal_times_out_after_exact_polls() {
        let runner = Arc::new(ScriptedRunner::new(1));
        let orchestrator = Orchestrator::new(runner.clone());

        let run = orchestrator.run_job(request(), &policy(60, 7, 3)).await.unwrap();

        // ceil(60 / 7) = 9
        assert_eq!(runner.polls(), 9);
        assert_eq!(run.polls, 9);
        assert_eq!(run.life_cycle, LifeCycleState::TimedOut);
        assert_eq!(run.outcome(), RunOutcome::TimedOut);
        assert_eq!(runner.fetches(), 0);
        assert!(run.output.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_uses_simulated_time() {
        let runner = Arc::new(ScriptedRunner::new(1));
        let orchestrator = Orchestrator::new(runner.clone());
        let started = tokio::time::Instant::now();

        let run = orchestrator.run_job(request(), &policy(600, 5, 3)).await.unwrap();

        assert_eq!(runner.polls(), 120);
        assert_eq!(run.waited, Duration::from_secs(600));
        assert!(started.elapsed() >= Duration::from_secs(600));
        assert!(started.elapsed() < Duration::from_secs(601));
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_terminated_fetch_bounded_by_retry_count() {
        let runner = Arc::new(ScriptedRunner::new(1).with_states(vec![LifeCycleState::Terminated]));
        let orchestrator = Orchestrator::new(runner.clone());

        let run = orchestrator.run_job(request(), &policy(60, 5, 4)).await.unwrap();

        assert_eq!(runner.polls(), 1);
        assert_eq!(runner.fetches(), 4);
        assert_eq!(run.fetch_attempts, 4);
        assert!(run.output.is_none());
        assert_eq!(run.outcome(), RunOutcome::OutputUnavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_stops_at_first_non_empty() {
        let runner = Arc::new(
            ScriptedRunner::new(1)
                .with_states(vec![LifeCycleState::Terminated])
                .with_outputs(vec!["", "", "{}"]),
        );
        let orchestrator = Orchestrator::new(runner.clone());

        let run = orchestrator.run_job(request(), &policy(60, 5, 10)).await.unwrap();

        assert_eq!(runner.fetches(), 3);
        assert_eq!(run.output.as_deref(), Some("{}"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_errors_count_as_attempts() {
        let runner = Arc::new(
            ScriptedRunner::new(1)
                .with_states(vec![LifeCycleState::Terminated])
                .push_output(Err(RemoteError::Timeout))
                .push_output(Ok("{\"rows\":1}".to_string())),
        );
        let orchestrator = Orchestrator::new(runner.clone());

        let run = orchestrator.run_job(request(), &policy(60, 5, 3)).await.unwrap();

        assert_eq!(run.fetch_attempts, 2);
        assert_eq!(run.outcome(), RunOutcome::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_internal_error_and_skipped_still_fetch() {
        for life in [LifeCycleState::InternalError, LifeCycleState::Skipped] {
            let runner = Arc::new(
                ScriptedRunner::new(1)
                    .with_states(vec![life.clone()])
                    .with_outputs(vec!["diagnostics"]),
            );
            let orchestrator = Orchestrator::new(runner.clone());

            let run = orchestrator.run_job(request(), &policy(60, 5, 2)).await.unwrap();

            assert_eq!(run.life_cycle, life);
            assert_eq!(runner.fetches(), 1);
            assert_eq!(run.output.as_deref(), Some("diagnostics"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_failure_aborts() {
        let runner = Arc::new(ScriptedRunner::new(1).failing_submit(RemoteError::Http {
            status: 400,
            body: "bad job".to_string(),
        }));
        let orchestrator = Orchestrator::new(runner.clone());

        let err = orchestrator.run_job(request(), &policy(60, 5, 2)).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::RemoteService);
        assert!(err.message.contains("400"));
        assert!(err.message.contains("bad job"));
        assert_eq!(runner.polls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_poll_failures_abort() {
        let mut runner = ScriptedRunner::new(1);
        for _ in 0..3 {
            runner = runner.push_state(Err(RemoteError::Transport("connection reset".to_string())));
        }
        let runner = Arc::new(runner);
        let orchestrator = Orchestrator::new(runner.clone());

        let err = orchestrator.run_job(request(), &policy(60, 5, 2)).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::RemoteService);
        assert_eq!(runner.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_isolated_poll_failure_is_tolerated() {
        let runner = Arc::new(
            ScriptedRunner::new(1)
                .push_state(Err(RemoteError::Timeout))
                .push_state(Ok(RunState {
                    life_cycle: LifeCycleState::Terminated,
                    result: Some(ResultState::Failed),
                }))
                .with_outputs(vec!["{}"]),
        );
        let orchestrator = Orchestrator::new(runner.clone());

        let run = orchestrator.run_job(request(), &policy(60, 5, 2)).await.unwrap();

        assert_eq!(run.polls, 2);
        assert_eq!(run.status_line(), "TERMINATED/FAILED");
    }
}
