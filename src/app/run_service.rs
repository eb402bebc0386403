use crate::constants::DEFAULT_RETAINED_RUNS;
use crate::error::{PipelineError, Result};
use crate::pipeline::{Orchestrator, RunSummary};
use crate::sync::lock;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Opaque identifier of a started run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RunHandle(Uuid);

impl RunHandle {
    fn new() -> Self {
        RunHandle(Uuid::new_v4())
    }
}

impl fmt::Display for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for RunHandle {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(RunHandle)
            .map_err(|_| PipelineError::UnknownRun(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub run_id: RunHandle,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub inputs_discovered: usize,
    pub summary: Option<RunSummary>,
}

struct RunEntry {
    status: RunStatus,
    done: watch::Receiver<bool>,
}

/// Starts runs in the background and answers status queries about them.
#[derive(Clone)]
pub struct RunService {
    orchestrator: Arc<Orchestrator>,
    runs: Arc<Mutex<HashMap<RunHandle, RunEntry>>>,
    retain_finished: usize,
}

impl RunService {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self::with_retention(orchestrator, DEFAULT_RETAINED_RUNS)
    }

    /// Keep at most `retain_finished` finished runs; running ones are never evicted.
    pub fn with_retention(orchestrator: Arc<Orchestrator>, retain_finished: usize) -> Self {
        Self {
            orchestrator,
            runs: Arc::new(Mutex::new(HashMap::new())),
            retain_finished: retain_finished.max(1),
        }
    }

    /// Discover inputs now and dispatch them in the background.
    ///
    /// A listing failure is returned immediately and no run is recorded.
    pub async fn start_run(&self) -> Result<RunHandle> {
        let names = self.orchestrator.discover().await?;
        let handle = RunHandle::new();
        let (done_tx, done_rx) = watch::channel(false);

        lock(&self.runs).insert(
            handle,
            RunEntry {
                status: RunStatus {
                    run_id: handle,
                    state: RunState::Running,
                    started_at: Utc::now(),
                    finished_at: None,
                    inputs_discovered: names.len(),
                    summary: None,
                },
                done: done_rx,
            },
        );
        info!("Started run {} with {} inputs", handle, names.len());

        let orchestrator = self.orchestrator.clone();
        let runs = self.runs.clone();
        let retain_finished = self.retain_finished;
        tokio::spawn(async move {
            let summary = match tokio::spawn(async move { orchestrator.dispatch(names).await }).await {
                Ok(summary) => summary,
                Err(e) => {
                    error!("Run {} aborted: {}", handle, e);
                    RunSummary {
                        inputs_failed: 1,
                        ..RunSummary::default()
                    }
                }
            };
            {
                let mut runs = lock(&runs);
                if let Some(entry) = runs.get_mut(&handle) {
                    entry.status.state = if summary.success() {
                        RunState::Completed
                    } else {
                        RunState::Failed
                    };
                    entry.status.finished_at = Some(Utc::now());
                    entry.status.summary = Some(summary);
                    info!("Run {} finished as {:?}", handle, entry.status.state);
                }
                evict_finished(&mut runs, retain_finished, handle);
            }
            let _ = done_tx.send(true);
        });

        Ok(handle)
    }

    pub fn status(&self, handle: &RunHandle) -> Result<RunStatus> {
        lock(&self.runs)
            .get(handle)
            .map(|entry| entry.status.clone())
            .ok_or_else(|| PipelineError::UnknownRun(handle.to_string()))
    }

    /// Wait until the run has finished and return its final status.
    pub async fn wait(&self, handle: &RunHandle) -> Result<RunStatus> {
        let mut done = lock(&self.runs)
            .get(handle)
            .map(|entry| entry.done.clone())
            .ok_or_else(|| PipelineError::UnknownRun(handle.to_string()))?;
        let finished = done.wait_for(|finished| *finished).await.is_ok();
        if !finished {
            return Err(PipelineError::State(format!(
                "run {} stopped without reporting completion",
                handle
            )));
        }
        self.status(handle)
    }
}

/// Drop the oldest finished runs beyond `keep`. The run that just finished
/// is kept so its waiters can still read it.
fn evict_finished(runs: &mut HashMap<RunHandle, RunEntry>, keep: usize, latest: RunHandle) {
    let mut finished: Vec<(DateTime<Utc>, RunHandle)> = runs
        .values()
        .filter_map(|entry| entry.status.finished_at.map(|at| (at, entry.status.run_id)))
        .collect();
    if finished.len() <= keep {
        return;
    }
    finished.sort_by_key(|(at, _)| *at);
    let excess = finished.len() - keep;
    for (_, handle) in finished
        .into_iter()
        .filter(|(_, handle)| *handle != latest)
        .take(excess)
    {
        runs.remove(&handle);
        debug!("Evicted finished run {}", handle);
    }
}
