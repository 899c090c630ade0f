use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::timeout;

use crate::collection::CollectionManager;
use crate::models::{CoreError, CoreErrorKind, TaskId, TaskKind, TaskStatus};
use crate::orchestration::execution::{Submission, execute};
use crate::orchestration::listener::OutcomeListener;
use crate::orchestration::registry::{Chain, PredecessorLink};
use crate::orchestration::worker::CollectionWorker;
use crate::orchestration::{OrchestrationResult, TaskCancellationToken, TaskListener, TaskRegistry};
use crate::tasks::{CollectionTask, TaskResult};

/// Cancellable handle to one submitted unit of work.
#[derive(Clone, Debug)]
pub struct TaskHandle {
    id: TaskId,
    kind: TaskKind,
    status: watch::Receiver<TaskStatus>,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn status(&self) -> TaskStatus {
        *self.status.borrow()
    }

    pub async fn wait_for_terminal(
        &self,
        timeout_duration: Option<Duration>,
    ) -> OrchestrationResult<TaskStatus> {
        let mut status = self.status.clone();
        let wait = async move {
            let observed = status
                .wait_for(|status| status.is_terminal())
                .await
                .map(|status| *status);
            match observed {
                Ok(terminal) => terminal,
                Err(_) => *status.borrow(),
            }
        };

        match timeout_duration {
            Some(duration) => timeout(duration, wait).await.map_err(|_| {
                CoreError::new(
                    CoreErrorKind::Timeout,
                    format!("timed out waiting for task '{}' to finish", self.id.0),
                )
                .with_task(self.kind)
            }),
            None => Ok(wait.await),
        }
    }
}

/// Admission-ordered pipeline in front of the single collection worker.
#[derive(Clone)]
pub struct CollectionTaskQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    registry: Arc<TaskRegistry>,
    worker: Arc<CollectionWorker>,
    runtime: Handle,
}

impl CollectionTaskQueue {
    /// Must be called from inside a tokio runtime; wrappers are spawned onto it.
    pub fn new(manager: CollectionManager) -> OrchestrationResult<Self> {
        let runtime = Handle::try_current().map_err(|error| {
            CoreError::new(
                CoreErrorKind::Internal,
                format!("collection task queue requires a tokio runtime: {error}"),
            )
        })?;
        Self::with_runtime(manager, runtime)
    }

    pub fn with_runtime(manager: CollectionManager, runtime: Handle) -> OrchestrationResult<Self> {
        let worker = CollectionWorker::spawn(manager)?;
        Ok(Self {
            inner: Arc::new(QueueInner {
                registry: Arc::new(TaskRegistry::new()),
                worker: Arc::new(worker),
                runtime,
            }),
        })
    }

    /// Submits a unit of work with no ordering constraint. Returns immediately.
    pub fn submit<T, L>(&self, task: T, listener: L) -> OrchestrationResult<TaskHandle>
    where
        T: CollectionTask,
        L: TaskListener<T::Progress, T::Output>,
    {
        self.admit(task, listener, Chain::Independent)
    }

    /// Submits a unit of work that starts only after `predecessor` has finished, whatever its
    /// outcome.
    pub fn submit_after<T, L>(
        &self,
        task: T,
        listener: L,
        predecessor: &TaskHandle,
    ) -> OrchestrationResult<TaskHandle>
    where
        T: CollectionTask,
        L: TaskListener<T::Progress, T::Output>,
    {
        let link = PredecessorLink::new(predecessor.id, predecessor.status.clone());
        self.admit(task, listener, Chain::After(link))
    }

    /// Submits a unit of work chained behind the latest submitted one, if it is still live.
    pub fn submit_chained<T, L>(&self, task: T, listener: L) -> OrchestrationResult<TaskHandle>
    where
        T: CollectionTask,
        L: TaskListener<T::Progress, T::Output>,
    {
        self.admit(task, listener, Chain::Latest)
    }

    /// Submits a unit of work and waits for its outcome. Cancellation surfaces as a
    /// `Cancelled` error.
    pub async fn run<T>(&self, task: T) -> TaskResult<T::Output>
    where
        T: CollectionTask,
    {
        let kind = task.kind();
        let (listener, outcome) = OutcomeListener::new(kind);
        self.admit(task, listener, Chain::Independent)?;
        outcome.await.unwrap_or_else(|_| Err(CoreError::cancelled(kind)))
    }

    pub fn cancel(&self, handle: &TaskHandle) -> OrchestrationResult<bool> {
        self.inner.registry.cancel(handle.id)
    }

    pub fn cancel_latest(&self) -> OrchestrationResult<bool> {
        self.inner.registry.cancel_latest()
    }

    pub fn cancel_all(&self) -> OrchestrationResult<usize> {
        self.inner.registry.cancel_all()
    }

    pub fn is_live(&self, handle: &TaskHandle) -> OrchestrationResult<bool> {
        self.inner.registry.is_live(handle.id)
    }

    pub fn live_count(&self) -> OrchestrationResult<usize> {
        self.inner.registry.live_count()
    }

    pub fn latest(&self) -> OrchestrationResult<Option<TaskId>> {
        self.inner.registry.latest()
    }

    /// Waits until no submitted unit of work is live.
    pub async fn wait_for_idle(&self, timeout_duration: Option<Duration>) -> OrchestrationResult<()> {
        let wait = drain(self.inner.registry.clone());

        match timeout_duration {
            Some(duration) => timeout(duration, wait).await.map_err(|_| {
                CoreError::new(
                    CoreErrorKind::Timeout,
                    "timed out waiting for the task queue to drain",
                )
            })?,
            None => wait.await,
        }
    }

    /// Cancels everything still live and waits for the wrappers to settle.
    pub async fn shutdown(&self, timeout_duration: Option<Duration>) -> OrchestrationResult<usize> {
        let cancelled = self.cancel_all()?;
        self.wait_for_idle(timeout_duration).await?;
        tracing::info!(cancelled, "collection task queue shut down");
        Ok(cancelled)
    }

    fn admit<T, L>(&self, task: T, listener: L, chain: Chain) -> OrchestrationResult<TaskHandle>
    where
        T: CollectionTask,
        L: TaskListener<T::Progress, T::Output>,
    {
        let kind = task.kind();
        let token = TaskCancellationToken::new();
        let (status_sender, status) = watch::channel(TaskStatus::Pending);
        let (task_id, predecessor) =
            self.inner
                .registry
                .admit(kind, token.clone(), status.clone(), chain)?;

        tracing::debug!(
            task_id = task_id.0,
            task = kind.as_str(),
            predecessor = ?predecessor.as_ref().map(|link| link.id.0),
            "task submitted"
        );

        let submission = Submission {
            task_id,
            task,
            listener,
            token,
            status: status_sender,
            predecessor,
        };
        self.inner.runtime.spawn(execute(
            self.inner.registry.clone(),
            self.inner.worker.clone(),
            submission,
        ));

        Ok(TaskHandle {
            id: task_id,
            kind,
            status,
        })
    }
}

async fn drain(registry: Arc<TaskRegistry>) -> OrchestrationResult<()> {
    loop {
        let pending: Vec<_> = registry
            .live_statuses()?
            .into_iter()
            .filter(|status| !status.borrow().is_terminal())
            .collect();
        if pending.is_empty() {
            return Ok(());
        }
        for mut status in pending {
            let _ = status.wait_for(|status| status.is_terminal()).await;
        }
    }
}
