use std::thread;

use tokio::sync::mpsc;

use crate::collection::CollectionManager;
use crate::models::{CoreError, CoreErrorKind};
use crate::orchestration::OrchestrationResult;

pub(crate) type CollectionJob = Box<dyn FnOnce(&mut CollectionManager) + Send + 'static>;

/// The one thread that touches the collection. Jobs run strictly one after another.
pub(crate) struct CollectionWorker {
    sender: mpsc::UnboundedSender<CollectionJob>,
}

impl CollectionWorker {
    pub(crate) fn spawn(manager: CollectionManager) -> OrchestrationResult<Self> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<CollectionJob>();

        thread::Builder::new()
            .name("deckhand-collection".to_string())
            .spawn(move || {
                let mut manager = manager;
                while let Some(job) = receiver.blocking_recv() {
                    job(&mut manager);
                }
                if let Err(error) = manager.close("collection worker stopped") {
                    tracing::warn!(
                        kind = ?error.kind,
                        message = %error.message,
                        "failed to close collection on worker exit"
                    );
                }
            })
            .map_err(|error| {
                CoreError::new(
                    CoreErrorKind::Internal,
                    format!("failed to start collection worker: {error}"),
                )
            })?;

        Ok(Self { sender })
    }

    pub(crate) fn dispatch(&self, job: CollectionJob) -> OrchestrationResult<()> {
        self.sender.send(job).map_err(|_| {
            CoreError::new(
                CoreErrorKind::StoreUnavailable,
                "collection worker has stopped",
            )
        })
    }
}
