use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use cachekeeper_common::{InstanceStatus, ObservedInstance, OperationKind, ProviderError, Topology};

use crate::{ControlPlane, CreateInstanceArgs, ResizeArgs};

/// One recorded control-plane call, for assertions.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub kind: OperationKind,
    pub instance_id: String,
    pub client_token: Option<String>,
    pub payload: Option<serde_json::Value>,
}

#[derive(Default)]
struct MockState {
    instances: HashMap<String, ObservedInstance>,
    /// Scripted outcome per `get_instance_detail`, consumed front to
    /// back; once empty, polls report the instance's current status.
    status_scripts: HashMap<String, VecDeque<Result<InstanceStatus, ProviderError>>>,
    /// Errors injected ahead of the next call(s) of an operation kind.
    op_errors: HashMap<OperationKind, VecDeque<ProviderError>>,
    calls: Vec<RecordedCall>,
    next_id: u32,
}

/// In-memory control plane for tests: scripted poll sequences,
/// injected per-operation failures, and a full call log.
#[derive(Default)]
pub struct MockControlPlane {
    state: Mutex<MockState>,
}

impl MockControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state lock")
    }

    /// Register an existing instance.
    pub fn seed(&self, observed: ObservedInstance) {
        self.state().instances.insert(observed.id.clone(), observed);
    }

    /// Queue statuses to report on successive polls of `id`.
    pub fn push_statuses(&self, id: &str, statuses: &[InstanceStatus]) {
        let mut state = self.state();
        let script = state.status_scripts.entry(id.to_string()).or_default();
        script.extend(statuses.iter().copied().map(Ok));
    }

    /// Queue a NotFound response for the next poll of `id`.
    pub fn push_gone(&self, id: &str) {
        self.state()
            .status_scripts
            .entry(id.to_string())
            .or_default()
            .push_back(Err(ProviderError::NotFound(id.to_string())));
    }

    /// Inject `err` ahead of the next `n` calls of `kind`.
    pub fn fail_times(&self, kind: OperationKind, err: ProviderError, n: usize) {
        let mut state = self.state();
        let queue = state.op_errors.entry(kind).or_default();
        for _ in 0..n {
            queue.push_back(err.clone());
        }
    }

    pub fn fail_next(&self, kind: OperationKind, err: ProviderError) {
        self.fail_times(kind, err, 1);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    pub fn calls_of(&self, kind: OperationKind) -> Vec<RecordedCall> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.kind == kind)
            .cloned()
            .collect()
    }

    pub fn instance(&self, id: &str) -> Option<ObservedInstance> {
        self.state().instances.get(id).cloned()
    }

    fn record(
        state: &mut MockState,
        kind: OperationKind,
        instance_id: &str,
        client_token: Option<&str>,
        payload: Option<serde_json::Value>,
    ) {
        state.calls.push(RecordedCall {
            kind,
            instance_id: instance_id.to_string(),
            client_token: client_token.map(str::to_string),
            payload,
        });
    }

    fn take_injected(state: &mut MockState, kind: OperationKind) -> Option<ProviderError> {
        state.op_errors.get_mut(&kind).and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn create_instance(
        &self,
        args: &CreateInstanceArgs,
        client_token: &str,
    ) -> Result<String, ProviderError> {
        let mut state = self.state();
        Self::record(
            &mut state,
            OperationKind::Create,
            "",
            Some(client_token),
            serde_json::to_value(args).ok(),
        );
        if let Some(err) = Self::take_injected(&mut state, OperationKind::Create) {
            return Err(err);
        }
        state.next_id += 1;
        let id = format!("scs-mock-{}", state.next_id);
        let topology = match &args.node_type {
            Some(node_type) if args.cluster_type == "master_slave" => Topology::MasterSlave {
                node_type: node_type.clone(),
            },
            _ => Topology::Cluster {
                shard_num: args.shard_num,
            },
        };
        let mut observed = ObservedInstance::new(
            id.clone(),
            args.instance_name.clone(),
            InstanceStatus::Creating,
            topology,
        );
        observed.engine_version = Some(args.engine_version.clone());
        observed.port = Some(args.port);
        state.instances.insert(id.clone(), observed);
        Ok(id)
    }

    async fn get_instance_detail(
        &self,
        instance_id: &str,
    ) -> Result<ObservedInstance, ProviderError> {
        let mut state = self.state();
        Self::record(&mut state, OperationKind::Read, instance_id, None, None);
        if let Some(err) = Self::take_injected(&mut state, OperationKind::Read) {
            return Err(err);
        }
        let scripted = state
            .status_scripts
            .get_mut(instance_id)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(Ok(status)) => {
                let observed = state
                    .instances
                    .get_mut(instance_id)
                    .ok_or_else(|| ProviderError::NotFound(instance_id.to_string()))?;
                observed.status = status;
                Ok(observed.clone())
            }
            Some(Err(err)) => {
                state.instances.remove(instance_id);
                Err(err)
            }
            None => state
                .instances
                .get(instance_id)
                .cloned()
                .ok_or_else(|| ProviderError::NotFound(instance_id.to_string())),
        }
    }

    async fn rename_instance(
        &self,
        instance_id: &str,
        instance_name: &str,
        client_token: &str,
    ) -> Result<(), ProviderError> {
        let mut state = self.state();
        Self::record(
            &mut state,
            OperationKind::Rename,
            instance_id,
            Some(client_token),
            Some(serde_json::json!({ "instance_name": instance_name })),
        );
        if let Some(err) = Self::take_injected(&mut state, OperationKind::Rename) {
            return Err(err);
        }
        let observed = state
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| ProviderError::NotFound(instance_id.to_string()))?;
        observed.name = instance_name.to_string();
        Ok(())
    }

    async fn resize_instance(
        &self,
        instance_id: &str,
        args: &ResizeArgs,
    ) -> Result<(), ProviderError> {
        let kind = match args {
            ResizeArgs::NodeType(_) => OperationKind::ResizeNodeType,
            ResizeArgs::ShardNum(_) => OperationKind::ResizeShardNum,
        };
        let mut state = self.state();
        Self::record(
            &mut state,
            kind,
            instance_id,
            None,
            serde_json::to_value(args).ok(),
        );
        if let Some(err) = Self::take_injected(&mut state, kind) {
            return Err(err);
        }
        let observed = state
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| ProviderError::NotFound(instance_id.to_string()))?;
        match (args, &mut observed.topology) {
            (ResizeArgs::NodeType(node_type), Topology::MasterSlave { node_type: current }) => {
                *current = node_type.clone();
            }
            (ResizeArgs::ShardNum(shard_num), Topology::Cluster { shard_num: current }) => {
                *current = *shard_num;
            }
            _ => {
                return Err(ProviderError::OperationException(format!(
                    "resize does not match topology of {instance_id}"
                )))
            }
        }
        observed.status = InstanceStatus::Modifying;
        Ok(())
    }

    async fn delete_instance(
        &self,
        instance_id: &str,
        client_token: &str,
    ) -> Result<(), ProviderError> {
        let mut state = self.state();
        Self::record(
            &mut state,
            OperationKind::Delete,
            instance_id,
            Some(client_token),
            None,
        );
        if let Some(err) = Self::take_injected(&mut state, OperationKind::Delete) {
            return Err(err);
        }
        let observed = state
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| ProviderError::NotFound(instance_id.to_string()))?;
        observed.status = InstanceStatus::Deleting;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachekeeper_common::DesiredSpec;

    #[tokio::test]
    async fn scripted_statuses_drain_in_order() {
        let mock = MockControlPlane::new();
        mock.seed(ObservedInstance::new(
            "scs-1",
            "redis-a",
            InstanceStatus::Creating,
            Topology::Cluster { shard_num: 2 },
        ));
        mock.push_statuses("scs-1", &[InstanceStatus::Creating, InstanceStatus::Running]);

        assert_eq!(
            mock.get_instance_detail("scs-1").await.unwrap().status,
            InstanceStatus::Creating
        );
        assert_eq!(
            mock.get_instance_detail("scs-1").await.unwrap().status,
            InstanceStatus::Running
        );
        // Script drained: current status sticks.
        assert_eq!(
            mock.get_instance_detail("scs-1").await.unwrap().status,
            InstanceStatus::Running
        );
    }

    #[tokio::test]
    async fn injected_errors_fire_before_effects() {
        let mock = MockControlPlane::new();
        let spec = DesiredSpec::new("redis-a", Topology::Cluster { shard_num: 2 });
        let args = CreateInstanceArgs::from_spec(&spec);
        mock.fail_next(
            OperationKind::Create,
            ProviderError::Internal("boom".into()),
        );

        assert!(mock.create_instance(&args, "tok-1").await.is_err());
        let id = mock.create_instance(&args, "tok-1").await.unwrap();
        assert!(mock.instance(&id).is_some());
        assert_eq!(mock.calls_of(OperationKind::Create).len(), 2);
    }

    #[tokio::test]
    async fn gone_script_removes_instance() {
        let mock = MockControlPlane::new();
        mock.seed(ObservedInstance::new(
            "scs-1",
            "redis-a",
            InstanceStatus::Deleting,
            Topology::Cluster { shard_num: 2 },
        ));
        mock.push_gone("scs-1");

        let err = mock.get_instance_detail("scs-1").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
        assert!(mock.instance("scs-1").is_none());
    }
}
