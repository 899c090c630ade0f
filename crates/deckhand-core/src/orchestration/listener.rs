use tokio::sync::{mpsc, oneshot};

use crate::models::{CoreError, TaskKind};
use crate::tasks::TaskResult;

/// Lifecycle callbacks for one submitted unit of work.
///
/// `on_start` comes first, then any number of `on_progress`, then exactly one of `on_complete`
/// or `on_cancelled`. Callbacks run on the task's wrapper; use [`ChannelListener`] to receive
/// them on the submitter's own context instead.
pub trait TaskListener<P, R>: Send + 'static {
    fn on_start(&mut self) {}

    fn on_progress(&mut self, _progress: P) {}

    fn on_complete(&mut self, result: TaskResult<R>);

    fn on_cancelled(&mut self) {}
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopListener;

impl<P, R> TaskListener<P, R> for NoopListener {
    fn on_complete(&mut self, _result: TaskResult<R>) {}
}

#[derive(Debug)]
pub enum ListenerEvent<P, R> {
    Started,
    Progress(P),
    Completed(TaskResult<R>),
    Cancelled,
}

impl<P, R> ListenerEvent<P, R> {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Cancelled)
    }
}

pub struct ChannelListener<P, R> {
    sender: mpsc::UnboundedSender<ListenerEvent<P, R>>,
}

pub fn listener_channel<P, R>() -> (
    ChannelListener<P, R>,
    mpsc::UnboundedReceiver<ListenerEvent<P, R>>,
) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (ChannelListener { sender }, receiver)
}

impl<P, R> ChannelListener<P, R> {
    fn forward(&self, event: ListenerEvent<P, R>) {
        let _ = self.sender.send(event);
    }
}

impl<P, R> TaskListener<P, R> for ChannelListener<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    fn on_start(&mut self) {
        self.forward(ListenerEvent::Started);
    }

    fn on_progress(&mut self, progress: P) {
        self.forward(ListenerEvent::Progress(progress));
    }

    fn on_complete(&mut self, result: TaskResult<R>) {
        self.forward(ListenerEvent::Completed(result));
    }

    fn on_cancelled(&mut self) {
        self.forward(ListenerEvent::Cancelled);
    }
}

/// Collapses the terminal callback into a single result for awaiting submitters.
pub(crate) struct OutcomeListener<R> {
    kind: TaskKind,
    sender: Option<oneshot::Sender<TaskResult<R>>>,
}

impl<R> OutcomeListener<R> {
    pub(crate) fn new(kind: TaskKind) -> (Self, oneshot::Receiver<TaskResult<R>>) {
        let (sender, receiver) = oneshot::channel();
        (
            Self {
                kind,
                sender: Some(sender),
            },
            receiver,
        )
    }

    fn deliver(&mut self, result: TaskResult<R>) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(result);
        }
    }
}

impl<P, R> TaskListener<P, R> for OutcomeListener<R>
where
    R: Send + 'static,
{
    fn on_complete(&mut self, result: TaskResult<R>) {
        self.deliver(result);
    }

    fn on_cancelled(&mut self) {
        let kind = self.kind;
        self.deliver(Err(CoreError::cancelled(kind)));
    }
}
