use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Notify, mpsc};

use crate::models::{CoreError, TaskId, TaskKind};
use crate::tasks::TaskResult;

#[derive(Clone, Debug, Default)]
pub struct TaskCancellationToken {
    inner: Arc<CancellationState>,
}

#[derive(Debug, Default)]
struct CancellationState {
    flag: AtomicBool,
    notify: Notify,
}

impl TaskCancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag. Returns false when it was already set.
    pub fn cancel(&self) -> bool {
        let already = self.inner.flag.swap(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
        !already
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// What a running unit of work sees of its wrapper: a cancellation flag to poll and a
/// non-blocking progress sink.
pub struct TaskContext<P> {
    task_id: TaskId,
    kind: TaskKind,
    token: TaskCancellationToken,
    progress: mpsc::UnboundedSender<P>,
}

impl<P> TaskContext<P> {
    pub(crate) fn new(
        task_id: TaskId,
        kind: TaskKind,
        token: TaskCancellationToken,
        progress: mpsc::UnboundedSender<P>,
    ) -> Self {
        Self {
            task_id,
            kind,
            token,
            progress,
        }
    }

    /// A context that is not attached to any queue, for running a unit of work directly.
    pub fn detached(
        kind: TaskKind,
        token: TaskCancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<P>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(TaskId(u64::MAX), kind, token, sender), receiver)
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn emit(&self, progress: P) {
        // A listener that went away does not stop the work.
        let _ = self.progress.send(progress);
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn check_cancelled(&self) -> TaskResult<()> {
        if self.token.is_cancelled() {
            return Err(CoreError::cancelled(self.kind));
        }
        Ok(())
    }
}
