use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::models::{CoreError, CoreErrorKind, TaskId, TaskKind, TaskStatus};
use crate::orchestration::{OrchestrationResult, TaskCancellationToken};

/// Live wrappers and the latest-submitted slot. Shared between submitters, cancellers and the
/// wrappers themselves, so every access goes through one lock.
#[derive(Default)]
pub struct TaskRegistry {
    state: Mutex<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    next_task_id: u64,
    latest: Option<TaskId>,
    live: HashMap<TaskId, LiveTask>,
    settling: HashMap<TaskId, watch::Receiver<TaskStatus>>,
}

struct LiveTask {
    kind: TaskKind,
    token: TaskCancellationToken,
    status: watch::Receiver<TaskStatus>,
}

pub(crate) enum Chain {
    Independent,
    After(PredecessorLink),
    Latest,
}

/// Lets a wrapper wait for another one to reach a terminal state without keeping it alive.
pub(crate) struct PredecessorLink {
    pub(crate) id: TaskId,
    status: watch::Receiver<TaskStatus>,
}

impl PredecessorLink {
    pub(crate) fn new(id: TaskId, status: watch::Receiver<TaskStatus>) -> Self {
        Self { id, status }
    }

    /// Resolves once the predecessor finished, whatever its outcome.
    pub(crate) async fn finished(mut self) -> TaskStatus {
        let observed = self
            .status
            .wait_for(|status| status.is_terminal())
            .await
            .map(|status| *status);
        match observed {
            Ok(status) => status,
            Err(_) => TaskStatus::Cancelled,
        }
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn admit(
        &self,
        kind: TaskKind,
        token: TaskCancellationToken,
        status: watch::Receiver<TaskStatus>,
        chain: Chain,
    ) -> OrchestrationResult<(TaskId, Option<PredecessorLink>)> {
        let mut state = self.lock_state()?;
        let task_id = TaskId(state.next_task_id);
        state.next_task_id = state.next_task_id.saturating_add(1);

        let predecessor = match chain {
            Chain::Independent => None,
            Chain::After(link) => Some(link),
            Chain::Latest => state.latest.and_then(|latest| {
                state
                    .live
                    .get(&latest)
                    .map(|entry| PredecessorLink::new(latest, entry.status.clone()))
            }),
        };

        state.live.insert(
            task_id,
            LiveTask {
                kind,
                token,
                status,
            },
        );
        state.latest = Some(task_id);

        Ok((task_id, predecessor))
    }

    /// Removes a wrapper from the live set and settles its outcome. Cancellation requests
    /// observed here win over the run result. The wrapper stays visible to idle waits until
    /// `release`, after its terminal callback ran.
    pub(crate) fn finish(
        &self,
        task_id: TaskId,
        token: &TaskCancellationToken,
        cancelled_by_task: bool,
    ) -> TaskStatus {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = state.live.remove(&task_id) {
            state.settling.insert(task_id, entry.status);
        }
        if state.latest == Some(task_id) {
            state.latest = None;
        }

        if cancelled_by_task || token.is_cancelled() {
            TaskStatus::Cancelled
        } else {
            TaskStatus::Completed
        }
    }

    pub(crate) fn release(&self, task_id: TaskId) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.settling.remove(&task_id);
    }

    /// Requests cancellation of one live wrapper. False when it already finished.
    pub fn cancel(&self, task_id: TaskId) -> OrchestrationResult<bool> {
        let state = self.lock_state()?;
        let Some(entry) = state.live.get(&task_id) else {
            return Ok(false);
        };
        entry.token.cancel();
        tracing::debug!(task_id = task_id.0, task = entry.kind.as_str(), "task cancellation requested");
        Ok(true)
    }

    pub fn cancel_latest(&self) -> OrchestrationResult<bool> {
        let latest = self.lock_state()?.latest;
        match latest {
            Some(task_id) => self.cancel(task_id),
            None => Ok(false),
        }
    }

    /// Requests cancellation of every live wrapper, returning how many there were.
    pub fn cancel_all(&self) -> OrchestrationResult<usize> {
        let state = self.lock_state()?;
        for entry in state.live.values() {
            entry.token.cancel();
        }
        if !state.live.is_empty() {
            tracing::info!(tasks = state.live.len(), "cancelling all live tasks");
        }
        Ok(state.live.len())
    }

    pub fn is_live(&self, task_id: TaskId) -> OrchestrationResult<bool> {
        Ok(self.lock_state()?.live.contains_key(&task_id))
    }

    pub fn live_count(&self) -> OrchestrationResult<usize> {
        Ok(self.lock_state()?.live.len())
    }

    pub fn latest(&self) -> OrchestrationResult<Option<TaskId>> {
        Ok(self.lock_state()?.latest)
    }

    /// Status receivers of live wrappers and of wrappers still running their terminal callback.
    pub(crate) fn live_statuses(&self) -> OrchestrationResult<Vec<watch::Receiver<TaskStatus>>> {
        let state = self.lock_state()?;
        Ok(state
            .live
            .values()
            .map(|entry| entry.status.clone())
            .chain(state.settling.values().cloned())
            .collect())
    }

    fn lock_state(&self) -> OrchestrationResult<MutexGuard<'_, RegistryState>> {
        self.state.lock().map_err(|_| {
            CoreError::new(CoreErrorKind::Internal, "task registry mutex poisoned")
        })
    }
}
