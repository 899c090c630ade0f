mod context;
mod execution;
mod listener;
mod registry;
mod task_queue;
mod worker;

pub use context::{TaskCancellationToken, TaskContext};
pub use listener::{ChannelListener, ListenerEvent, NoopListener, TaskListener, listener_channel};
pub use registry::TaskRegistry;
pub use task_queue::{CollectionTaskQueue, TaskHandle};

use crate::models::CoreError;

pub type OrchestrationResult<T> = Result<T, CoreError>;
