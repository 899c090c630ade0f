use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::models::TaskKind;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CoreErrorKind {
    StoreUnavailable,
    PreconditionFailure,
    TransactionFailure,
    ExternalResource,
    ExternalResourceAfterCommit,
    Cancelled,
    Timeout,
    InvalidInput,
    StorageFailure,
    Internal,
}

impl CoreErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StoreUnavailable => "store_unavailable",
            Self::PreconditionFailure => "precondition_failure",
            Self::TransactionFailure => "transaction_failure",
            Self::ExternalResource => "external_resource",
            Self::ExternalResourceAfterCommit => "external_resource_after_commit",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
            Self::InvalidInput => "invalid_input",
            Self::StorageFailure => "storage_failure",
            Self::Internal => "internal",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CoreError {
    pub task: Option<TaskKind>,
    pub kind: CoreErrorKind,
    pub message: String,
    /// File name of the external resource that caused the failure, when there is one.
    pub resource: Option<String>,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            task: None,
            kind,
            message: message.into(),
            resource: None,
        }
    }

    pub fn cancelled(task: TaskKind) -> Self {
        Self::new(CoreErrorKind::Cancelled, format!("task '{}' was cancelled", task.as_str()))
            .with_task(task)
    }

    pub fn with_task(mut self, task: TaskKind) -> Self {
        self.task = Some(task);
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == CoreErrorKind::Cancelled
    }

    /// True when the failure happened after an irreversible step and could not be rolled back.
    pub fn is_after_commit(&self) -> bool {
        self.kind == CoreErrorKind::ExternalResourceAfterCommit
    }
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)?;
        if let Some(resource) = &self.resource {
            write!(f, " ({resource})")?;
        }
        Ok(())
    }
}

impl Error for CoreError {}
