use cachekeeper_common::{OperationKind, ProviderError};

/// Retry disposition for one remote failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Expected to resolve on its own; retry within the budget.
    Transient,
    /// The instance is in a status incompatible with the request.
    /// Success-equivalent on the delete path, fatal everywhere else.
    ConflictState,
    /// The instance does not exist remotely. Success-equivalent for
    /// delete, fatal for any other mutation.
    NotFound,
    Fatal,
}

/// Map a remote failure into a retry disposition for `op`.
///
/// Internal-server-style errors (including transport failures that
/// never produced a response) are always Transient. A failed release
/// of a deleting instance is only retried on the delete path; seen
/// anywhere else it means the remote side is in a state we cannot
/// recover by retrying.
pub fn classify(err: &ProviderError, op: OperationKind) -> Disposition {
    match err {
        ProviderError::Internal(_) | ProviderError::Transport(_) => Disposition::Transient,
        ProviderError::ReleaseFailed(_) if op == OperationKind::Delete => Disposition::Transient,
        ProviderError::InvalidInstanceStatus(_) | ProviderError::OperationException(_) => {
            Disposition::ConflictState
        }
        ProviderError::NotFound(_) => Disposition::NotFound,
        ProviderError::ReleaseFailed(_) | ProviderError::Api { .. } => Disposition::Fatal,
    }
}
