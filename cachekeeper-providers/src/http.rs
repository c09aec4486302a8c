use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use cachekeeper_common::{
    InstanceStatus, ObservedInstance, PaymentTiming, ProviderError, Subnet, Topology,
};

use crate::{ControlPlane, CreateInstanceArgs, ResizeArgs};
use async_trait::async_trait;

/// Connection settings for the remote control plane, read from the
/// environment.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub endpoint: String,
    pub access_key: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl ProviderConfig {
    /// Load from env (CACHEKEEPER_API_ENDPOINT, CACHEKEEPER_ACCESS_KEY,
    /// optional CACHEKEEPER_CONNECT_TIMEOUT_SECS / CACHEKEEPER_REQUEST_TIMEOUT_SECS).
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();
        let endpoint = std::env::var("CACHEKEEPER_API_ENDPOINT")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow::anyhow!("CACHEKEEPER_API_ENDPOINT is not set"))?;
        let access_key = std::env::var("CACHEKEEPER_ACCESS_KEY")
            .map(|s| s.trim().to_string())
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow::anyhow!("CACHEKEEPER_ACCESS_KEY is not set"))?;
        let connect_timeout = env_secs("CACHEKEEPER_CONNECT_TIMEOUT_SECS", 5);
        let request_timeout = env_secs("CACHEKEEPER_REQUEST_TIMEOUT_SECS", 20);
        Ok(ProviderConfig {
            endpoint,
            access_key,
            connect_timeout,
            request_timeout,
        })
    }
}

fn env_secs(key: &str, default: u64) -> Duration {
    let secs = std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default);
    Duration::from_secs(secs)
}

/// reqwest-backed control plane.
pub struct HttpControlPlane {
    client: Client,
    endpoint: String,
    access_key: String,
}

impl HttpControlPlane {
    pub fn new(config: ProviderConfig) -> anyhow::Result<Self> {
        // Without an overall timeout a stalled remote call can hang a
        // reconciliation past its own budget.
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;
        Ok(HttpControlPlane {
            client,
            endpoint: config.endpoint,
            access_key: config.access_key,
        })
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Self::new(ProviderConfig::from_env()?)
    }

    fn headers(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Ok(value) = reqwest::header::HeaderValue::from_str(&self.access_key) {
            headers.insert("X-Auth-Token", value);
        }
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        headers
    }

    /// Map a non-success response into the provider error taxonomy by
    /// remote error code, falling back on the HTTP status class.
    async fn map_error(resp: reqwest::Response) -> ProviderError {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        let body: Option<ApiErrorBody> = serde_json::from_str(&text).ok();
        let (code, message) = match body {
            Some(b) => (b.code, b.message),
            None => (String::new(), text.clone()),
        };
        warn!(status = status.as_u16(), code = %code, "control plane request failed");
        match code.as_str() {
            "InternalError" | "InternalServerError" => ProviderError::Internal(message),
            "InvalidInstanceStatus" => ProviderError::InvalidInstanceStatus(message),
            "OperationException" => ProviderError::OperationException(message),
            "InstanceNotExist" | "NoSuchObject" => ProviderError::NotFound(message),
            "ReleaseInstanceFailed" => ProviderError::ReleaseFailed(message),
            "" if status == reqwest::StatusCode::NOT_FOUND => ProviderError::NotFound(message),
            "" if status.is_server_error() => ProviderError::Internal(message),
            _ => ProviderError::Api { code, message },
        }
    }
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct CreateInstanceResponse {
    #[serde(rename = "instanceIds")]
    instance_ids: Vec<String>,
}

/// Detail payload as the remote API reports it.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstanceDetailResponse {
    instance_id: String,
    instance_name: String,
    instance_status: InstanceStatus,
    cluster_type: String,
    #[serde(default)]
    node_type: Option<String>,
    #[serde(default)]
    shard_num: Option<u32>,
    #[serde(default)]
    engine: Option<String>,
    #[serde(default)]
    engine_version: Option<String>,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default, rename = "vnetIP")]
    vnet_ip: Option<String>,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    capacity: Option<u64>,
    #[serde(default)]
    used_capacity: Option<u64>,
    #[serde(default)]
    payment_timing: Option<PaymentTiming>,
    #[serde(default)]
    zone_names: Vec<String>,
    #[serde(default)]
    vpc_id: Option<String>,
    #[serde(default)]
    subnets: Vec<SubnetResponse>,
    #[serde(default)]
    instance_create_time: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    instance_expire_time: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    auto_renew: Option<bool>,
    #[serde(default)]
    tags: std::collections::BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubnetResponse {
    #[serde(rename = "subnetID")]
    subnet_id: String,
    zone_name: String,
}

impl InstanceDetailResponse {
    fn into_observed(self) -> Result<ObservedInstance, ProviderError> {
        let topology = match self.cluster_type.as_str() {
            "cluster" => Topology::Cluster {
                shard_num: self.shard_num.ok_or_else(|| malformed("shardNum missing"))?,
            },
            "master_slave" => Topology::MasterSlave {
                node_type: self.node_type.ok_or_else(|| malformed("nodeType missing"))?,
            },
            other => return Err(malformed(format!("unknown clusterType {other:?}"))),
        };
        let mut observed =
            ObservedInstance::new(self.instance_id, self.instance_name, self.instance_status, topology);
        observed.engine = self.engine;
        observed.engine_version = self.engine_version;
        observed.domain = self.domain;
        observed.v_net_ip = self.vnet_ip;
        observed.port = self.port;
        observed.capacity = self.capacity;
        observed.used_capacity = self.used_capacity;
        observed.payment_timing = self.payment_timing;
        observed.zone_names = self.zone_names;
        observed.vpc_id = self.vpc_id;
        observed.subnets = self
            .subnets
            .into_iter()
            .map(|s| Subnet {
                subnet_id: s.subnet_id,
                zone_name: s.zone_name,
            })
            .collect();
        observed.create_time = self.instance_create_time;
        observed.expire_time = self.instance_expire_time;
        observed.auto_renew = self.auto_renew;
        observed.tags = self.tags;
        Ok(observed)
    }
}

fn malformed(detail: impl std::fmt::Display) -> ProviderError {
    ProviderError::Api {
        code: "MalformedResponse".into(),
        message: detail.to_string(),
    }
}

fn transport(e: reqwest::Error) -> ProviderError {
    ProviderError::Transport(e.to_string())
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn create_instance(
        &self,
        args: &CreateInstanceArgs,
        client_token: &str,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/v1/instance", self.endpoint);
        debug!(%url, instance_name = %args.instance_name, "POST create instance");
        let resp = self
            .client
            .post(&url)
            .headers(self.headers())
            .query(&[("clientToken", client_token)])
            .json(args)
            .send()
            .await
            .map_err(transport)?;
        if !resp.status().is_success() {
            return Err(Self::map_error(resp).await);
        }
        let body: CreateInstanceResponse = resp.json().await.map_err(transport)?;
        body.instance_ids
            .into_iter()
            .next()
            .ok_or_else(|| malformed("no instance id in create response"))
    }

    async fn get_instance_detail(
        &self,
        instance_id: &str,
    ) -> Result<ObservedInstance, ProviderError> {
        let url = format!("{}/v1/instance/{}", self.endpoint, instance_id);
        let resp = self
            .client
            .get(&url)
            .headers(self.headers())
            .send()
            .await
            .map_err(transport)?;
        if !resp.status().is_success() {
            return Err(Self::map_error(resp).await);
        }
        let body: InstanceDetailResponse = resp.json().await.map_err(transport)?;
        body.into_observed()
    }

    async fn rename_instance(
        &self,
        instance_id: &str,
        instance_name: &str,
        client_token: &str,
    ) -> Result<(), ProviderError> {
        let url = format!("{}/v1/instance/{}/rename", self.endpoint, instance_id);
        debug!(%url, %instance_name, "PUT rename instance");
        let resp = self
            .client
            .put(&url)
            .headers(self.headers())
            .query(&[("clientToken", client_token)])
            .json(&serde_json::json!({ "instanceName": instance_name }))
            .send()
            .await
            .map_err(transport)?;
        if !resp.status().is_success() {
            return Err(Self::map_error(resp).await);
        }
        Ok(())
    }

    async fn resize_instance(
        &self,
        instance_id: &str,
        args: &ResizeArgs,
    ) -> Result<(), ProviderError> {
        let url = format!("{}/v1/instance/{}/resize", self.endpoint, instance_id);
        let body = match args {
            ResizeArgs::NodeType(node_type) => serde_json::json!({ "nodeType": node_type }),
            ResizeArgs::ShardNum(shard_num) => serde_json::json!({ "shardNum": shard_num }),
        };
        debug!(%url, "PUT resize instance");
        let resp = self
            .client
            .put(&url)
            .headers(self.headers())
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        if !resp.status().is_success() {
            return Err(Self::map_error(resp).await);
        }
        Ok(())
    }

    async fn delete_instance(
        &self,
        instance_id: &str,
        client_token: &str,
    ) -> Result<(), ProviderError> {
        let url = format!("{}/v1/instance/{}", self.endpoint, instance_id);
        debug!(%url, "DELETE instance");
        let resp = self
            .client
            .delete(&url)
            .headers(self.headers())
            .query(&[("clientToken", client_token)])
            .send()
            .await
            .map_err(transport)?;
        if !resp.status().is_success() {
            return Err(Self::map_error(resp).await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_response_maps_cluster_topology() {
        let raw = serde_json::json!({
            "instanceId": "scs-bj-abc123",
            "instanceName": "terraform-redis",
            "instanceStatus": "Running",
            "clusterType": "cluster",
            "shardNum": 4,
            "engine": "redis",
            "engineVersion": "3.2",
            "vnetIP": "10.0.0.8",
            "port": 6379,
            "capacity": 2,
            "zoneNames": ["cn-bj-a"]
        });
        let detail: InstanceDetailResponse = serde_json::from_value(raw).unwrap();
        let observed = detail.into_observed().unwrap();
        assert_eq!(observed.id, "scs-bj-abc123");
        assert_eq!(observed.status, InstanceStatus::Running);
        assert_eq!(observed.topology, Topology::Cluster { shard_num: 4 });
        assert_eq!(observed.v_net_ip.as_deref(), Some("10.0.0.8"));
    }

    #[test]
    fn detail_response_rejects_missing_node_type() {
        let raw = serde_json::json!({
            "instanceId": "scs-bj-abc123",
            "instanceName": "terraform-redis",
            "instanceStatus": "Running",
            "clusterType": "master_slave"
        });
        let detail: InstanceDetailResponse = serde_json::from_value(raw).unwrap();
        assert!(detail.into_observed().is_err());
    }
}
