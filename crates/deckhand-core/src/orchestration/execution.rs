use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use crate::collection::CollectionManager;
use crate::models::{CoreError, CoreErrorKind, TaskId, TaskKind, TaskStatus};
use crate::orchestration::registry::PredecessorLink;
use crate::orchestration::worker::{CollectionJob, CollectionWorker};
use crate::orchestration::{TaskCancellationToken, TaskContext, TaskListener, TaskRegistry};
use crate::tasks::{CollectionTask, TaskResult};

pub(crate) struct Submission<T, L> {
    pub(crate) task_id: TaskId,
    pub(crate) task: T,
    pub(crate) listener: L,
    pub(crate) token: TaskCancellationToken,
    pub(crate) status: watch::Sender<TaskStatus>,
    pub(crate) predecessor: Option<PredecessorLink>,
}

/// Runs one submitted unit of work: waits for its predecessor, hands the work to the collection
/// worker, relays progress, and settles exactly one terminal callback.
pub(crate) async fn execute<T, L>(
    registry: Arc<TaskRegistry>,
    worker: Arc<CollectionWorker>,
    submission: Submission<T, L>,
) where
    T: CollectionTask,
    L: TaskListener<T::Progress, T::Output>,
{
    let Submission {
        task_id,
        task,
        mut listener,
        token,
        status,
        predecessor,
    } = submission;
    let kind = task.kind();
    let mut guard = ExecutionGuard {
        registry,
        task_id,
        token: token.clone(),
        status,
        settled: false,
    };

    listener.on_start();

    if let Some(predecessor) = predecessor {
        let predecessor_id = predecessor.id;
        tracing::debug!(
            task_id = task_id.0,
            predecessor = predecessor_id.0,
            "waiting for previous task"
        );
        tokio::select! {
            outcome = predecessor.finished() => {
                tracing::debug!(
                    task_id = task_id.0,
                    predecessor = predecessor_id.0,
                    outcome = ?outcome,
                    "previous task finished"
                );
            }
            _ = token.cancelled() => {}
        }
    }

    if token.is_cancelled() {
        tracing::debug!(task_id = task_id.0, task = kind.as_str(), "task cancelled before it started");
        guard.settle(true);
        listener.on_cancelled();
        guard.publish(TaskStatus::Cancelled);
        return;
    }

    guard.publish(TaskStatus::Running);

    let (progress_sender, mut progress) = mpsc::unbounded_channel();
    let (result_sender, result) = oneshot::channel();
    let context = TaskContext::new(task_id, kind, token.clone(), progress_sender);
    let job: CollectionJob = Box::new(move |manager| {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            run_on_collection(task, manager, &context)
        }))
        .unwrap_or_else(|payload| Err(panic_error(kind, payload.as_ref())));
        drop(context);
        let _ = result_sender.send(outcome);
    });

    let outcome = match worker.dispatch(job) {
        Ok(()) => {
            let mut result = result;
            let outcome = loop {
                tokio::select! {
                    biased;
                    Some(value) = progress.recv() => listener.on_progress(value),
                    received = &mut result => {
                        break received.unwrap_or_else(|_| {
                            Err(CoreError::new(
                                CoreErrorKind::Internal,
                                "collection worker dropped the task",
                            )
                            .with_task(kind))
                        });
                    }
                }
            };
            while let Ok(value) = progress.try_recv() {
                listener.on_progress(value);
            }
            outcome
        }
        Err(error) => Err(error.with_task(kind)),
    };

    let cancelled_by_task = matches!(&outcome, Err(error) if error.is_cancelled());
    let terminal = guard.settle(cancelled_by_task);

    match terminal {
        TaskStatus::Cancelled => {
            tracing::debug!(task_id = task_id.0, task = kind.as_str(), "task cancelled");
            listener.on_cancelled();
        }
        _ => {
            if let Err(error) = &outcome {
                tracing::warn!(
                    task_id = task_id.0,
                    task = kind.as_str(),
                    kind = ?error.kind,
                    message = %error.message,
                    resource = ?error.resource,
                    "task failed"
                );
            }
            listener.on_complete(outcome);
        }
    }

    guard.publish(terminal);
}

fn run_on_collection<T: CollectionTask>(
    task: T,
    manager: &mut CollectionManager,
    context: &TaskContext<T::Progress>,
) -> TaskResult<T::Output> {
    let kind = task.kind();
    context.check_cancelled()?;

    if task.requires_open_collection()
        && let Err(error) = manager.open_on_demand()
    {
        tracing::warn!(
            task_id = context.task_id().0,
            task = kind.as_str(),
            message = %error.message,
            "skipping task, collection unavailable"
        );
        return Err(error.with_task(kind));
    }

    task.run(manager, context).map_err(|error| match error.task {
        Some(_) => error,
        None => error.with_task(kind),
    })
}

fn panic_error(kind: TaskKind, payload: &(dyn Any + Send)) -> CoreError {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!(task = kind.as_str(), message = %detail, "task panicked on collection worker");
    CoreError::new(CoreErrorKind::Internal, format!("task panicked: {detail}")).with_task(kind)
}

/// Deregisters and publishes a terminal status even when the wrapper unwinds or is dropped.
struct ExecutionGuard {
    registry: Arc<TaskRegistry>,
    task_id: TaskId,
    token: TaskCancellationToken,
    status: watch::Sender<TaskStatus>,
    settled: bool,
}

impl ExecutionGuard {
    fn settle(&mut self, cancelled_by_task: bool) -> TaskStatus {
        self.settled = true;
        self.registry
            .finish(self.task_id, &self.token, cancelled_by_task)
    }

    fn publish(&self, status: TaskStatus) {
        self.status.send_replace(status);
        if status.is_terminal() {
            self.registry.release(self.task_id);
        }
    }
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!(task_id = self.task_id.0, "task wrapper dropped before settling");
            self.settle(true);
        }
        if !self.status.borrow().is_terminal() {
            self.publish(TaskStatus::Cancelled);
        }
    }
}
