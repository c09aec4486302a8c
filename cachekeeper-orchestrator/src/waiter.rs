use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use cachekeeper_common::{EngineError, InstanceStatus, OperationKind, RetryPolicy};
use cachekeeper_providers::ControlPlane;

use crate::classify::{classify, Disposition};

/// Poll the instance's status on a fixed interval until it reaches a
/// target status, reaches a bad status, or the budget runs out.
///
/// The first poll happens immediately. A target status returns
/// success at once; a bad status fails at once with the observed
/// status; neither ever waits out the remaining budget. Transient read
/// failures are retried within the same budget.
///
/// When the target set contains a "gone" status (Paused, Deleted,
/// Isolated) a NotFound read counts as success: the instance vanished
/// between the mutation and this poll. Outside that case a NotFound
/// read is fatal.
pub async fn wait_for(
    control: &dyn ControlPlane,
    op: OperationKind,
    instance_id: &str,
    bad_statuses: &[InstanceStatus],
    target_statuses: &[InstanceStatus],
    policy: &RetryPolicy,
) -> Result<InstanceStatus, EngineError> {
    let tolerate_missing = target_statuses.iter().any(InstanceStatus::is_gone);
    let started = Instant::now();
    loop {
        match control.get_instance_detail(instance_id).await {
            Ok(observed) => {
                if target_statuses.contains(&observed.status) {
                    info!(%op, instance_id, status = %observed.status, "reached target status");
                    return Ok(observed.status);
                }
                if bad_statuses.contains(&observed.status) {
                    warn!(%op, instance_id, status = %observed.status, "observed failure status");
                    return Err(EngineError::UnexpectedState {
                        op,
                        instance_id: instance_id.to_string(),
                        status: observed.status,
                    });
                }
                debug!(%op, instance_id, status = %observed.status, "still waiting");
            }
            Err(err) => match classify(&err, OperationKind::Read) {
                Disposition::NotFound if tolerate_missing => {
                    info!(%op, instance_id, "instance gone while polling, treating as terminal");
                    return Ok(InstanceStatus::Deleted);
                }
                Disposition::NotFound => {
                    return Err(EngineError::NotFound {
                        op,
                        instance_id: instance_id.to_string(),
                    })
                }
                Disposition::Transient => {
                    debug!(%op, instance_id, error = %err, "transient read failure while polling");
                }
                Disposition::ConflictState | Disposition::Fatal => {
                    return Err(EngineError::Provider {
                        op,
                        instance_id: instance_id.to_string(),
                        source: err,
                    })
                }
            },
        }
        let elapsed = started.elapsed();
        if elapsed >= policy.timeout {
            return Err(EngineError::Timeout {
                op,
                instance_id: instance_id.to_string(),
                elapsed,
            });
        }
        sleep(policy.poll_interval).await;
    }
}
