use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use cachekeeper_common::{
    client_token, validate::validate_spec, DesiredSpec, EngineError, InstanceStatus,
    ObservedInstance, OperationKind, RetryPolicy, Topology,
};
use cachekeeper_providers::{ControlPlane, CreateInstanceArgs, ResizeArgs};

use crate::invoker::{invoke, InvokeOutcome};
use crate::waiter::wait_for;

/// Statuses that abort a create instead of converging to Running.
pub const CREATE_BAD_STATUSES: [InstanceStatus; 8] = [
    InstanceStatus::Pausing,
    InstanceStatus::Paused,
    InstanceStatus::Deleted,
    InstanceStatus::Deleting,
    InstanceStatus::Failed,
    InstanceStatus::Modifying,
    InstanceStatus::ModifyFailed,
    InstanceStatus::Expired,
];

/// Statuses that abort an update step while waiting for Running.
pub const UPDATE_BAD_STATUSES: [InstanceStatus; 2] =
    [InstanceStatus::ModifyFailed, InstanceStatus::Failed];

/// Terminal statuses accepted as a successful delete. The remote side
/// reports any of the three depending on billing mode and timing, and
/// they are deliberately treated as one "gone" outcome even though a
/// Paused prepaid instance may still incur charges.
pub const DELETE_TARGET_STATUSES: [InstanceStatus; 3] = [
    InstanceStatus::Paused,
    InstanceStatus::Deleted,
    InstanceStatus::Isolated,
];

/// One mutation derived from the desired-vs-observed diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlannedStep {
    Rename { instance_name: String },
    ResizeNodeType { node_type: String },
    ResizeShardNum { shard_num: u32 },
}

impl PlannedStep {
    pub fn kind(&self) -> OperationKind {
        match self {
            PlannedStep::Rename { .. } => OperationKind::Rename,
            PlannedStep::ResizeNodeType { .. } => OperationKind::ResizeNodeType,
            PlannedStep::ResizeShardNum { .. } => OperationKind::ResizeShardNum,
        }
    }
}

/// Derive the ordered mutation list that takes `observed` to
/// `desired`: rename first, then the resize matching the instance's
/// fixed topology. Pure over its two snapshots; nothing remote is
/// touched here.
///
/// A node-type difference only yields a step on master_slave
/// instances and a shard-count difference only on cluster instances;
/// the topology tag itself can never change, so a variant mismatch is
/// a caller error.
pub fn plan(
    observed: &ObservedInstance,
    desired: &DesiredSpec,
) -> Result<Vec<PlannedStep>, EngineError> {
    if !observed.topology.same_variant(&desired.topology) {
        return Err(EngineError::Validation(format!(
            "topology is fixed at creation: instance {} is {}, desired spec is {}",
            observed.id,
            observed.topology.cluster_type(),
            desired.topology.cluster_type()
        )));
    }

    let mut steps = Vec::new();
    if observed.name != desired.instance_name {
        steps.push(PlannedStep::Rename {
            instance_name: desired.instance_name.clone(),
        });
    }
    match (&observed.topology, &desired.topology) {
        (
            Topology::MasterSlave { node_type: current },
            Topology::MasterSlave { node_type: wanted },
        ) if current != wanted => {
            steps.push(PlannedStep::ResizeNodeType {
                node_type: wanted.clone(),
            });
        }
        (
            Topology::Cluster { shard_num: current },
            Topology::Cluster { shard_num: wanted },
        ) if current != wanted => {
            steps.push(PlannedStep::ResizeShardNum { shard_num: *wanted });
        }
        _ => {}
    }
    Ok(steps)
}

fn completed<T>(
    outcome: InvokeOutcome<T>,
    op: OperationKind,
    instance_id: &str,
) -> Result<T, EngineError> {
    match outcome {
        InvokeOutcome::Completed(value) => Ok(value),
        // Only the delete path maps conflicts to success; any other
        // operation landing here lost its instance.
        InvokeOutcome::AlreadyGone => Err(EngineError::NotFound {
            op,
            instance_id: instance_id.to_string(),
        }),
    }
}

/// Re-read the instance, retrying transient read failures.
async fn read_detail(
    control: &dyn ControlPlane,
    instance_id: &str,
    policy: &RetryPolicy,
) -> Result<ObservedInstance, EngineError> {
    let outcome = invoke(OperationKind::Read, instance_id, policy, || {
        control.get_instance_detail(instance_id)
    })
    .await?;
    completed(outcome, OperationKind::Read, instance_id)
}

/// Create a new instance and wait until it is Running.
///
/// The id assigned by the remote side is the handle for every later
/// operation and never changes.
pub async fn create_instance(
    control: &dyn ControlPlane,
    spec: &DesiredSpec,
    policy: &RetryPolicy,
) -> Result<ObservedInstance, EngineError> {
    validate_spec(spec)?;
    let args = CreateInstanceArgs::from_spec(spec);
    let token = client_token();
    info!(instance_name = %spec.instance_name, "creating instance");
    let outcome = invoke(OperationKind::Create, &spec.instance_name, policy, || {
        control.create_instance(&args, &token)
    })
    .await?;
    let instance_id = completed(outcome, OperationKind::Create, &spec.instance_name)?;
    wait_for(
        control,
        OperationKind::Create,
        &instance_id,
        &CREATE_BAD_STATUSES,
        &[InstanceStatus::Running],
        policy,
    )
    .await?;
    read_detail(control, &instance_id, policy).await
}

/// Drive `observed` to `desired`, one step at a time.
///
/// Steps run strictly sequentially, each pairing one mutation with one
/// status wait under its own copy of `policy`'s budget. The first
/// fatal error stops the run and is surfaced naming the failing step;
/// steps already applied stay applied, there is no rollback.
pub async fn reconcile(
    control: &dyn ControlPlane,
    observed: &ObservedInstance,
    desired: &DesiredSpec,
    policy: &RetryPolicy,
) -> Result<ObservedInstance, EngineError> {
    validate_spec(desired)?;
    let steps = plan(observed, desired)?;
    if steps.is_empty() {
        debug!(instance_id = %observed.id, "nothing to reconcile");
        return Ok(observed.clone());
    }

    let instance_id = observed.id.as_str();
    for step in &steps {
        let op = step.kind();
        info!(instance_id, step = %op, "applying reconciliation step");
        let outcome = match step {
            PlannedStep::Rename { instance_name } => {
                let token = client_token();
                invoke(op, instance_id, policy, || {
                    control.rename_instance(instance_id, instance_name, &token)
                })
                .await?
            }
            PlannedStep::ResizeNodeType { node_type } => {
                let args = ResizeArgs::NodeType(node_type.clone());
                invoke(op, instance_id, policy, || {
                    control.resize_instance(instance_id, &args)
                })
                .await?
            }
            PlannedStep::ResizeShardNum { shard_num } => {
                let args = ResizeArgs::ShardNum(*shard_num);
                invoke(op, instance_id, policy, || {
                    control.resize_instance(instance_id, &args)
                })
                .await?
            }
        };
        completed(outcome, op, instance_id)?;
        wait_for(
            control,
            op,
            instance_id,
            &UPDATE_BAD_STATUSES,
            &[InstanceStatus::Running],
            policy,
        )
        .await?;
    }

    read_detail(control, instance_id, policy).await
}

/// Delete the instance and wait until it is gone.
///
/// Deleting is idempotent: a conflict from an already-running delete,
/// or NotFound for an already-deleted instance, is success. Once the
/// delete is accepted, any of the accepted terminal statuses (or the
/// instance vanishing outright) completes the wait.
pub async fn delete_instance(
    control: &dyn ControlPlane,
    instance_id: &str,
    policy: &RetryPolicy,
) -> Result<(), EngineError> {
    let token = client_token();
    info!(instance_id, "deleting instance");
    let outcome = invoke(OperationKind::Delete, instance_id, policy, || {
        control.delete_instance(instance_id, &token)
    })
    .await?;
    if outcome == InvokeOutcome::AlreadyGone {
        return Ok(());
    }
    wait_for(
        control,
        OperationKind::Delete,
        instance_id,
        &[],
        &DELETE_TARGET_STATUSES,
        policy,
    )
    .await?;
    Ok(())
}

/// Adopt an existing instance given only its id.
///
/// Import reconstructs observed state with a single read and never
/// mutates; there is no prior desired spec to diff against.
pub async fn import_instance(
    control: &dyn ControlPlane,
    instance_id: &str,
) -> Result<ObservedInstance, EngineError> {
    control
        .get_instance_detail(instance_id)
        .await
        .map_err(|err| match crate::classify(&err, OperationKind::Read) {
            crate::Disposition::NotFound => EngineError::NotFound {
                op: OperationKind::Read,
                instance_id: instance_id.to_string(),
            },
            _ => EngineError::Provider {
                op: OperationKind::Read,
                instance_id: instance_id.to_string(),
                source: err,
            },
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observed_master_slave(node_type: &str) -> ObservedInstance {
        ObservedInstance::new(
            "scs-1",
            "redis-a",
            InstanceStatus::Running,
            Topology::MasterSlave {
                node_type: node_type.into(),
            },
        )
    }

    fn desired_master_slave(name: &str, node_type: &str) -> DesiredSpec {
        DesiredSpec::new(
            name,
            Topology::MasterSlave {
                node_type: node_type.into(),
            },
        )
    }

    #[test]
    fn plan_orders_rename_before_resize() {
        let observed = observed_master_slave("cache.n1.micro");
        let desired = desired_master_slave("redis-b", "cache.n1.small");
        let steps = plan(&observed, &desired).unwrap();
        assert_eq!(
            steps,
            vec![
                PlannedStep::Rename {
                    instance_name: "redis-b".into()
                },
                PlannedStep::ResizeNodeType {
                    node_type: "cache.n1.small".into()
                },
            ]
        );
    }

    #[test]
    fn plan_is_empty_when_converged() {
        let observed = observed_master_slave("cache.n1.micro");
        let desired = desired_master_slave("redis-a", "cache.n1.micro");
        assert!(plan(&observed, &desired).unwrap().is_empty());
    }

    #[test]
    fn plan_resizes_shards_only_on_cluster() {
        let observed = ObservedInstance::new(
            "scs-2",
            "redis-c",
            InstanceStatus::Running,
            Topology::Cluster { shard_num: 4 },
        );
        let desired = DesiredSpec::new("redis-c", Topology::Cluster { shard_num: 8 });
        let steps = plan(&observed, &desired).unwrap();
        assert_eq!(steps, vec![PlannedStep::ResizeShardNum { shard_num: 8 }]);
    }

    #[test]
    fn plan_rejects_topology_variant_change() {
        let observed = observed_master_slave("cache.n1.micro");
        let desired = DesiredSpec::new("redis-a", Topology::Cluster { shard_num: 4 });
        let err = plan(&observed, &desired).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn delete_terminal_set_matches_accepted_statuses() {
        for status in DELETE_TARGET_STATUSES {
            assert!(status.is_gone(), "{status}");
        }
    }
}
