//! Canonical observed state of a materialized endpoint.
//!
//! Produced by the observer from live cluster objects; the field set mirrors
//! what `BuildEndpointRequest` asked for so that a clean round trip through
//! materialize-then-observe is directly comparable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::endpoint::{GpuType, ModelEndpointConfig};

/// Replica bounds and live counters for one endpoint's workload.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ModelEndpointDeploymentState {
    pub min_workers: u32,
    pub max_workers: u32,
    pub per_worker: u32,
    pub available_workers: u32,
    pub unavailable_workers: u32,
}

/// Per-worker resource requests as read back from the workload.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ModelEndpointResourceState {
    pub cpus: String,
    pub gpus: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_type: Option<GpuType>,
    pub memory: String,
    /// Absent on legacy workloads that never requested ephemeral storage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
    pub optimize_costs: bool,
}

/// Decoded user configuration artifacts.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct ModelEndpointUserConfigState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_config: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_config: Option<ModelEndpointConfig>,
}

/// Everything the observer can derive about one endpoint from the cluster.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ModelEndpointInfraState {
    /// The resource name the state was read under (canonical or legacy).
    pub deployment_name: String,
    pub aws_role: String,
    pub results_s3_bucket: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Tri-state: legacy workloads predate the PREWARM env var.
    pub prewarm: Option<bool>,
    pub high_priority: bool,
    pub deployment_state: ModelEndpointDeploymentState,
    pub resource_state: ModelEndpointResourceState,
    pub user_config_state: ModelEndpointUserConfigState,
    pub image: String,
}
