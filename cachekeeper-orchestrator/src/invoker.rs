use std::future::Future;

use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use cachekeeper_common::{EngineError, OperationKind, ProviderError, RetryPolicy};

use crate::classify::{classify, Disposition};

/// How an invocation ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeOutcome<T> {
    Completed(T),
    /// Delete-only: the instance was already gone or already being
    /// deleted, which the engine treats as success.
    AlreadyGone,
}

/// Outcome of a single attempt, kept explicit so the loop's
/// termination condition is auditable separately from control flow.
enum Attempt<T> {
    Success(T),
    Retryable(ProviderError),
    Gone,
    Fatal(EngineError),
}

fn assess<T>(op: OperationKind, instance_id: &str, result: Result<T, ProviderError>) -> Attempt<T> {
    let err = match result {
        Ok(value) => return Attempt::Success(value),
        Err(err) => err,
    };
    match classify(&err, op) {
        Disposition::Transient => Attempt::Retryable(err),
        Disposition::ConflictState if op == OperationKind::Delete => Attempt::Gone,
        Disposition::ConflictState => Attempt::Fatal(EngineError::Conflict {
            op,
            instance_id: instance_id.to_string(),
            source: err,
        }),
        Disposition::NotFound if op == OperationKind::Delete => Attempt::Gone,
        Disposition::NotFound => Attempt::Fatal(EngineError::NotFound {
            op,
            instance_id: instance_id.to_string(),
        }),
        Disposition::Fatal => Attempt::Fatal(EngineError::Provider {
            op,
            instance_id: instance_id.to_string(),
            source: err,
        }),
    }
}

/// Execute one mutating remote call under a bounded retry loop.
///
/// The call is repeated only while the classifier reports Transient
/// and the elapsed wall clock is under `policy.timeout`, with a
/// cooperative sleep of `policy.poll_interval` between attempts. Any
/// non-transient outcome returns immediately. The caller must bake a
/// single idempotency token into `call` so every retry carries the
/// same token and the remote side can deduplicate.
pub async fn invoke<T, F, Fut>(
    op: OperationKind,
    instance_id: &str,
    policy: &RetryPolicy,
    mut call: F,
) -> Result<InvokeOutcome<T>, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let started = Instant::now();
    loop {
        match assess(op, instance_id, call().await) {
            Attempt::Success(value) => return Ok(InvokeOutcome::Completed(value)),
            Attempt::Gone => {
                info!(%op, instance_id, "instance already gone, treating as success");
                return Ok(InvokeOutcome::AlreadyGone);
            }
            Attempt::Fatal(err) => return Err(err),
            Attempt::Retryable(err) => {
                let elapsed = started.elapsed();
                if elapsed >= policy.timeout {
                    return Err(EngineError::Timeout {
                        op,
                        instance_id: instance_id.to_string(),
                        elapsed,
                    });
                }
                debug!(%op, instance_id, error = %err, "transient remote failure, retrying");
                sleep(policy.poll_interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn policy(timeout_secs: u64, interval_secs: u64) -> RetryPolicy {
        RetryPolicy::new(Duration::from_secs(timeout_secs))
            .with_poll_interval(Duration::from_secs(interval_secs))
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let outcome = invoke(OperationKind::Create, "redis-a", &policy(60, 5), || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ProviderError::Internal("retry me".into()))
                } else {
                    Ok("scs-1".to_string())
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(outcome, InvokeOutcome::Completed("scs-1".to_string()));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_count_is_bounded_by_budget() {
        let attempts = AtomicU32::new(0);
        let err = invoke(OperationKind::Rename, "scs-1", &policy(20, 5), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(ProviderError::Internal("busy".into())) }
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Timeout {
                op: OperationKind::Rename,
                ..
            }
        ));
        // timeout / interval attempts, plus the attempt that observes
        // the exhausted budget.
        assert_eq!(attempts.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_errors_return_without_retry() {
        let attempts = AtomicU32::new(0);
        let err = invoke(OperationKind::Rename, "scs-1", &policy(60, 5), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async {
                Err::<(), _>(ProviderError::InvalidInstanceStatus("modifying".into()))
            }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::Conflict { .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_conflict_and_not_found_are_success() {
        for err in [
            ProviderError::InvalidInstanceStatus("already deleting".into()),
            ProviderError::NotFound("scs-1".into()),
        ] {
            let outcome = invoke(OperationKind::Delete, "scs-1", &policy(60, 5), || {
                let err = err.clone();
                async move { Err::<(), _>(err) }
            })
            .await
            .unwrap();
            assert_eq!(outcome, InvokeOutcome::AlreadyGone);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_is_fatal_outside_delete() {
        let err = invoke(OperationKind::ResizeShardNum, "scs-1", &policy(60, 5), || async {
            Err::<(), _>(ProviderError::NotFound("scs-1".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }
}
