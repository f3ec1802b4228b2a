//! Reconciler settings.
//!
//! Everything the reconciler needs beyond the endpoint record itself:
//! where materialized objects live, fallback values the observer uses for
//! legacy workloads, where templates come from, and the CI escape hatch
//! for the cluster-version probe.

use std::{fs, path::PathBuf};

use llm_engine_core::ClusterVersion;
use serde::Deserialize;

use crate::error::ConfigurationError;

/// Settings for the endpoint resource delegate, usually loaded from the
/// service config file.
#[derive(Deserialize, Clone, Debug)]
pub struct ReconcilerConfig {
    /// Namespace all endpoint objects are materialized into.
    pub endpoint_namespace: String,
    /// IAM role assumed by workloads that predate the `AWS_PROFILE` env var.
    pub default_aws_role: String,
    /// Results bucket for workloads that predate `RESULTS_S3_BUCKET`.
    pub default_results_s3_bucket: String,
    /// Folder with one file per template key. Takes precedence over the
    /// packed manifest when set.
    #[serde(default)]
    pub service_template_folder: Option<PathBuf>,
    /// Packed template manifest (a ConfigMap dump with a `data` mapping).
    #[serde(default)]
    pub service_template_manifest: Option<PathBuf>,
    /// Domain suffix for the routing policy host of sync endpoints.
    pub dns_host_domain: String,
    /// Deploy environment name, stamped into observability labels.
    pub environment: String,
    /// Release identifier, stamped into observability labels.
    pub release_tag: String,
    /// Whether workloads emit traces; off in CI.
    #[serde(default = "default_trace_enabled")]
    pub trace_enabled: bool,
    /// Skip the apiserver version probe and assume this version. Used in
    /// CI and tests where no real control plane is reachable.
    #[serde(default)]
    pub fixed_cluster_version: Option<ClusterVersion>,
}

fn default_trace_enabled() -> bool {
    true
}

impl ReconcilerConfig {
    /// Load settings from a YAML config file.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigurationError> {
        let path = path.into();
        let raw = fs::read_to_string(&path).map_err(|source| ConfigurationError::ReadFile {
            path: path.clone(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigurationError::ParseFile { path, source })
    }
}
