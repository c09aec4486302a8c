use std::time::Duration;

use thiserror::Error;

use crate::{InstanceStatus, OperationKind};

/// Failure reported by the remote control plane, keyed by the error
/// codes the remote API distinguishes. The engine's classifier maps
/// these into retry dispositions; nothing else should branch on them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Internal-server-style failure; expected to resolve on its own.
    #[error("remote internal error: {0}")]
    Internal(String),

    /// The instance is in a status incompatible with the request.
    #[error("invalid instance status: {0}")]
    InvalidInstanceStatus(String),

    /// The remote side rejected the operation while another one is in
    /// progress against the same instance.
    #[error("operation exception: {0}")]
    OperationException(String),

    #[error("instance not found: {0}")]
    NotFound(String),

    /// Release of a deleting instance failed remotely; only seen on
    /// the delete path and retried there.
    #[error("release instance failed: {0}")]
    ReleaseFailed(String),

    /// Any other remote error code.
    #[error("remote api error ({code}): {message}")]
    Api { code: String, message: String },

    /// The request never completed (connect/read failure).
    #[error("transport error: {0}")]
    Transport(String),
}

/// Terminal errors surfaced to the caller of the engine.
///
/// Transient remote failures are never surfaced on their own; they are
/// retried inside the invoker until the budget runs out, at which
/// point Timeout is returned instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Caller-input problem detected before any remote call.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The instance is in a state that makes the operation illegal and
    /// retrying will not help.
    #[error("{op} on {instance_id}: conflicting remote state: {source}")]
    Conflict {
        op: OperationKind,
        instance_id: String,
        source: ProviderError,
    },

    /// A mutating call targeted an instance the remote side no longer
    /// knows about.
    #[error("{op} on {instance_id}: remote instance not found")]
    NotFound {
        op: OperationKind,
        instance_id: String,
    },

    /// Polling observed a status from the operation's bad set.
    #[error("{op} on {instance_id}: unexpected status {status}")]
    UnexpectedState {
        op: OperationKind,
        instance_id: String,
        status: InstanceStatus,
    },

    /// The wall-clock budget ran out. The remote operation may still
    /// complete out-of-band; the caller should re-read state rather
    /// than assume failure.
    #[error("{op} on {instance_id}: timed out after {elapsed:?}")]
    Timeout {
        op: OperationKind,
        instance_id: String,
        elapsed: Duration,
    },

    /// Any other non-retryable remote failure.
    #[error("{op} on {instance_id}: {source}")]
    Provider {
        op: OperationKind,
        instance_id: String,
        source: ProviderError,
    },
}

impl EngineError {
    pub fn operation(&self) -> Option<OperationKind> {
        match self {
            EngineError::Validation(_) => None,
            EngineError::Conflict { op, .. }
            | EngineError::NotFound { op, .. }
            | EngineError::UnexpectedState { op, .. }
            | EngineError::Timeout { op, .. }
            | EngineError::Provider { op, .. } => Some(*op),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_error_names_operation_and_instance() {
        let err = EngineError::UnexpectedState {
            op: OperationKind::Create,
            instance_id: "scs-1".into(),
            status: InstanceStatus::Failed,
        };
        let msg = err.to_string();
        assert!(msg.contains("create"));
        assert!(msg.contains("scs-1"));
        assert!(msg.contains("Failed"));
        assert_eq!(err.operation(), Some(OperationKind::Create));
    }

    #[test]
    fn validation_has_no_operation() {
        assert_eq!(
            EngineError::Validation("bad".into()).operation(),
            None
        );
    }
}
