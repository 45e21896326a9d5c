use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{JobRunner, RemoteError};
use crate::domain::run::{JobRequest, LifeCycleState, ResultState, RunState};

/// ScriptedRunner: 台本どおりに応答するスタブ実装。
/// 台本が尽きたらステータスは RUNNING、出力は空文字列を返し続ける。
pub struct ScriptedRunner {
    run_id: i64,
    submit_error: Mutex<Option<RemoteError>>,
    states: Mutex<VecDeque<Result<RunState, RemoteError>>>,
    outputs: Mutex<VecDeque<Result<String, RemoteError>>>,
    submits: AtomicU32,
    polls: AtomicU32,
    fetches: AtomicU32,
}

impl ScriptedRunner {
    pub fn new(run_id: i64) -> Self {
        Self {
            run_id,
            submit_error: Mutex::new(None),
            states: Mutex::new(VecDeque::new()),
            outputs: Mutex::new(VecDeque::new()),
            submits: AtomicU32::new(0),
            polls: AtomicU32::new(0),
            fetches: AtomicU32::new(0),
        }
    }

    /// ライフサイクル状態を順に返す。TERMINATED には SUCCESS を付ける。
    pub fn with_states(self, states: Vec<LifeCycleState>) -> Self {
        for life in states {
            let result = (life == LifeCycleState::Terminated).then_some(ResultState::Success);
            self.states.lock().push_back(Ok(RunState {
                life_cycle: life,
                result,
            }));
        }
        self
    }

    pub fn push_state(self, state: Result<RunState, RemoteError>) -> Self {
        self.states.lock().push_back(state);
        self
    }

    pub fn with_outputs(self, outputs: Vec<&str>) -> Self {
        for output in outputs {
            self.outputs.lock().push_back(Ok(output.to_string()));
        }
        self
    }

    pub fn push_output(self, output: Result<String, RemoteError>) -> Self {
        self.outputs.lock().push_back(output);
        self
    }

    pub fn failing_submit(self, error: RemoteError) -> Self {
        *self.submit_error.lock() = Some(error);
        self
    }

    pub fn submits(&self) -> u32 {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobRunner for ScriptedRunner {
    async fn submit(&self, _request: &JobRequest) -> Result<i64, RemoteError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        match self.submit_error.lock().take() {
            Some(e) => Err(e),
            None => Ok(self.run_id),
        }
    }

    async fn poll_state(&self, _run_id: i64) -> Result<RunState, RemoteError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.states.lock().pop_front().unwrap_or(Ok(RunState {
            life_cycle: LifeCycleState::Running,
            result: None,
        }))
    }

    async fn fetch_result(&self, _run_id: i64) -> Result<String, RemoteError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.outputs.lock().pop_front().unwrap_or(Ok(String::new()))
    }

    fn run_reference(&self, run_id: i64) -> Option<String> {
        Some(format!("https://dbx.test/jobs/runs/{run_id}"))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
