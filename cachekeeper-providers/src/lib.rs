use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use cachekeeper_common::{Billing, DesiredSpec, ObservedInstance, ProviderError, Subnet, Topology};

/// The remote control-plane boundary for one managed cache service.
///
/// Mutating calls accept a caller-supplied `client_token` so the
/// remote side can deduplicate retried requests; resize carries no
/// token because the remote API does not take one there.
///
/// `get_instance_detail` must surface `ProviderError::NotFound` once
/// an instance is deleted; it never reports a status for a deleted id.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn create_instance(
        &self,
        args: &CreateInstanceArgs,
        client_token: &str,
    ) -> Result<String, ProviderError>;

    async fn get_instance_detail(
        &self,
        instance_id: &str,
    ) -> Result<ObservedInstance, ProviderError>;

    async fn rename_instance(
        &self,
        instance_id: &str,
        instance_name: &str,
        client_token: &str,
    ) -> Result<(), ProviderError>;

    async fn resize_instance(
        &self,
        instance_id: &str,
        args: &ResizeArgs,
    ) -> Result<(), ProviderError>;

    async fn delete_instance(
        &self,
        instance_id: &str,
        client_token: &str,
    ) -> Result<(), ProviderError>;
}

/// Creation request body. Everything here is fixed at creation; only
/// the name and the topology-matched size remain reconcilable later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateInstanceArgs {
    pub instance_name: String,
    pub cluster_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    pub shard_num: u32,
    pub replication_num: u32,
    pub proxy_num: u32,
    pub port: u16,
    pub engine_version: String,
    pub purchase_count: u32,
    pub billing: Billing,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subnets: Vec<Subnet>,
}

impl CreateInstanceArgs {
    pub fn from_spec(spec: &DesiredSpec) -> Self {
        let (node_type, shard_num) = match &spec.topology {
            Topology::Cluster { shard_num } => (None, *shard_num),
            // Master/slave instances always hold a single shard.
            Topology::MasterSlave { node_type } => (Some(node_type.clone()), 1),
        };
        CreateInstanceArgs {
            instance_name: spec.instance_name.clone(),
            cluster_type: spec.topology.cluster_type().to_string(),
            node_type,
            shard_num,
            replication_num: spec.replication_num,
            proxy_num: spec.proxy_num,
            port: spec.port,
            engine_version: spec.engine_version.as_str().to_string(),
            purchase_count: spec.purchase_count,
            billing: spec.billing.clone(),
            vpc_id: spec.vpc_id.clone(),
            subnets: spec.subnets.clone(),
        }
    }
}

/// Resize request body; which field applies depends on the instance
/// topology and the remote side rejects the mismatched one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeArgs {
    NodeType(String),
    ShardNum(u32),
}

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "http")]
pub mod http;

#[cfg(test)]
mod tests {
    use super::*;
    use cachekeeper_common::EngineVersion;

    #[test]
    fn create_args_from_master_slave_spec() {
        let spec = DesiredSpec::new(
            "redis-a",
            Topology::MasterSlave {
                node_type: "cache.n1.micro".into(),
            },
        );
        let args = CreateInstanceArgs::from_spec(&spec);
        assert_eq!(args.cluster_type, "master_slave");
        assert_eq!(args.node_type.as_deref(), Some("cache.n1.micro"));
        assert_eq!(args.shard_num, 1);
        assert_eq!(args.port, 6379);
        assert_eq!(args.engine_version, "3.2");
    }

    #[test]
    fn create_args_from_cluster_spec() {
        let mut spec = DesiredSpec::new("redis-b", Topology::Cluster { shard_num: 8 });
        spec.engine_version = EngineVersion::V4_0;
        let args = CreateInstanceArgs::from_spec(&spec);
        assert_eq!(args.cluster_type, "cluster");
        assert_eq!(args.node_type, None);
        assert_eq!(args.shard_num, 8);
        assert_eq!(args.engine_version, "4.0");
    }
}
