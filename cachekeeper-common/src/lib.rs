use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod error;
pub mod validate;

pub use error::{EngineError, ProviderError};

// --- Enums ---

/// Instance status as reported by the remote control plane.
///
/// Exactly one value holds for an instance at any instant. The remote
/// side never reports a status for a deleted instance; reads against a
/// deleted id surface NotFound instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceStatus {
    Creating,
    Running,
    Modifying,
    #[serde(rename = "Modifyfailed")]
    ModifyFailed,
    Pausing,
    Paused,
    Deleting,
    Deleted,
    Isolated,
    Failed,
    #[serde(rename = "Expire")]
    Expired,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Creating => "Creating",
            InstanceStatus::Running => "Running",
            InstanceStatus::Modifying => "Modifying",
            InstanceStatus::ModifyFailed => "Modifyfailed",
            InstanceStatus::Pausing => "Pausing",
            InstanceStatus::Paused => "Paused",
            InstanceStatus::Deleting => "Deleting",
            InstanceStatus::Deleted => "Deleted",
            InstanceStatus::Isolated => "Isolated",
            InstanceStatus::Failed => "Failed",
            InstanceStatus::Expired => "Expire",
        }
    }

    /// Statuses in which the instance no longer serves traffic and the
    /// remote side may stop reporting it entirely.
    pub fn is_gone(&self) -> bool {
        matches!(
            self,
            InstanceStatus::Paused | InstanceStatus::Deleted | InstanceStatus::Isolated
        )
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The operation classes the engine issues against the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Create,
    Rename,
    ResizeNodeType,
    ResizeShardNum,
    Delete,
    Read,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Rename => "rename",
            OperationKind::ResizeNodeType => "resize_node_type",
            OperationKind::ResizeShardNum => "resize_shard_num",
            OperationKind::Delete => "delete",
            OperationKind::Read => "read",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural mode of the instance, fixed at creation.
///
/// The variant decides which resize path is legal: shard-count resize
/// only applies to Cluster, node-type resize only to MasterSlave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cluster_type", rename_all = "snake_case")]
pub enum Topology {
    Cluster { shard_num: u32 },
    MasterSlave { node_type: String },
}

impl Topology {
    pub fn cluster_type(&self) -> &'static str {
        match self {
            Topology::Cluster { .. } => "cluster",
            Topology::MasterSlave { .. } => "master_slave",
        }
    }

    /// True when both values are the same variant, regardless of the
    /// variant's payload.
    pub fn same_variant(&self, other: &Topology) -> bool {
        self.cluster_type() == other.cluster_type()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineVersion {
    #[serde(rename = "3.2")]
    V3_2,
    #[serde(rename = "4.0")]
    V4_0,
}

impl EngineVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineVersion::V3_2 => "3.2",
            EngineVersion::V4_0 => "4.0",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentTiming {
    Prepaid,
    Postpaid,
}

// --- Billing ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub reservation_length: u32,
    /// Only "Month" is accepted by the remote side today.
    pub reservation_time_unit: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoRenew {
    /// "month" or "year".
    pub time_unit: String,
    pub time_length: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Billing {
    pub payment_timing: PaymentTiming,
    /// Reservation terms; only meaningful for Prepaid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation: Option<Reservation>,
    /// Automatic renewal terms; only valid for Prepaid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_renew: Option<AutoRenew>,
}

impl Billing {
    pub fn postpaid() -> Self {
        Billing {
            payment_timing: PaymentTiming::Postpaid,
            reservation: None,
            auto_renew: None,
        }
    }
}

// --- Specs ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub subnet_id: String,
    pub zone_name: String,
}

/// Immutable snapshot of the caller's target configuration.
///
/// The engine never mutates a DesiredSpec. Fields outside the
/// reconcilable set (port, replication_num, proxy_num, vpc_id,
/// subnets, purchase_count, engine_version, billing) only apply at
/// creation; the diff ignores them afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredSpec {
    pub instance_name: String,
    pub topology: Topology,
    pub engine_version: EngineVersion,
    pub billing: Billing,
    pub port: u16,
    pub replication_num: u32,
    pub proxy_num: u32,
    pub purchase_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subnets: Vec<Subnet>,
}

impl DesiredSpec {
    /// A spec with the remote side's defaults for everything the
    /// caller did not decide.
    pub fn new(instance_name: impl Into<String>, topology: Topology) -> Self {
        DesiredSpec {
            instance_name: instance_name.into(),
            topology,
            engine_version: EngineVersion::V3_2,
            billing: Billing::postpaid(),
            port: 6379,
            replication_num: 2,
            proxy_num: 0,
            purchase_count: 1,
            vpc_id: None,
            subnets: Vec::new(),
        }
    }
}

/// The configuration currently reported by the remote control plane
/// for one instance, keyed by its immutable id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedInstance {
    pub id: String,
    pub name: String,
    pub status: InstanceStatus,
    pub topology: Topology,
    pub engine: Option<String>,
    pub engine_version: Option<String>,
    pub domain: Option<String>,
    pub v_net_ip: Option<String>,
    pub port: Option<u16>,
    /// Memory capacity in GB.
    pub capacity: Option<u64>,
    pub used_capacity: Option<u64>,
    pub payment_timing: Option<PaymentTiming>,
    pub zone_names: Vec<String>,
    pub vpc_id: Option<String>,
    pub subnets: Vec<Subnet>,
    pub create_time: Option<DateTime<Utc>>,
    pub expire_time: Option<DateTime<Utc>>,
    pub auto_renew: Option<bool>,
    #[serde(default)]
    pub tags: std::collections::BTreeMap<String, String>,
}

impl ObservedInstance {
    /// Minimal observation; the optional attribute fields start empty.
    pub fn new(id: impl Into<String>, name: impl Into<String>, status: InstanceStatus, topology: Topology) -> Self {
        ObservedInstance {
            id: id.into(),
            name: name.into(),
            status,
            topology,
            engine: None,
            engine_version: None,
            domain: None,
            v_net_ip: None,
            port: None,
            capacity: None,
            used_capacity: None,
            payment_timing: None,
            zone_names: Vec::new(),
            vpc_id: None,
            subnets: Vec::new(),
            create_time: None,
            expire_time: None,
            auto_renew: None,
            tags: Default::default(),
        }
    }
}

// --- Retry policy ---

/// Wall-clock bound plus polling interval for one engine operation.
///
/// The timeout is the whole budget for the operation (retrying the
/// mutation and waiting out the status change both draw from it once
/// per step); the interval is the cooperative sleep between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

impl RetryPolicy {
    pub fn new(timeout: Duration) -> Self {
        RetryPolicy {
            timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Default budget for instance creation.
    pub fn for_create() -> Self {
        RetryPolicy::new(Duration::from_secs(20 * 60))
    }

    /// Default budget for one update step.
    pub fn for_update() -> Self {
        RetryPolicy::new(Duration::from_secs(30 * 60))
    }

    /// Default budget for deletion.
    pub fn for_delete() -> Self {
        RetryPolicy::new(Duration::from_secs(20 * 60))
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Fresh idempotency token for one mutating request. Retries of the
/// same logical mutation must reuse the token so the remote side can
/// deduplicate.
pub fn client_token() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serde_matches_remote_strings() {
        for (status, wire) in [
            (InstanceStatus::Creating, "\"Creating\""),
            (InstanceStatus::ModifyFailed, "\"Modifyfailed\""),
            (InstanceStatus::Expired, "\"Expire\""),
            (InstanceStatus::Isolated, "\"Isolated\""),
        ] {
            assert_eq!(serde_json::to_string(&status).unwrap(), wire);
            let parsed: InstanceStatus = serde_json::from_str(wire).unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn gone_statuses() {
        assert!(InstanceStatus::Paused.is_gone());
        assert!(InstanceStatus::Deleted.is_gone());
        assert!(InstanceStatus::Isolated.is_gone());
        assert!(!InstanceStatus::Running.is_gone());
        assert!(!InstanceStatus::Deleting.is_gone());
    }

    #[test]
    fn topology_variant_comparison() {
        let cluster = Topology::Cluster { shard_num: 4 };
        let bigger = Topology::Cluster { shard_num: 8 };
        let ms = Topology::MasterSlave {
            node_type: "cache.n1.micro".into(),
        };
        assert!(cluster.same_variant(&bigger));
        assert!(!cluster.same_variant(&ms));
        assert_eq!(ms.cluster_type(), "master_slave");
    }

    #[test]
    fn client_tokens_are_unique() {
        assert_ne!(client_token(), client_token());
    }
}
