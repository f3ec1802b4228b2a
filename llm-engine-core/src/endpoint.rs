//! Logical endpoint records and bundle flavors.
//!
//! These are the inputs to the reconciler: a persisted endpoint record plus
//! the per-build scaling and resource requests. The flavor enum drives
//! template selection, so its discriminants mirror the template naming
//! scheme rather than any storage format.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Execution mode of an endpoint.
///
/// The serialized literal doubles as the `mode` segment of deployment
/// template keys (e.g. `deployment-runnable-image-sync-gpu`).
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModelEndpointType {
    /// Queue-driven; work arrives through the task queue named at reconcile time.
    Async,
    /// Request/response over the traffic service.
    Sync,
    /// Like sync, but the workload exposes a streaming route.
    Streaming,
}

impl ModelEndpointType {
    /// Whether this mode gets a horizontal autoscaler plus the traffic
    /// service and routing/destination policies. Async endpoints scale via
    /// workload annotations instead and expose no traffic objects.
    pub fn uses_traffic_objects(&self) -> bool {
        matches!(self, ModelEndpointType::Sync | ModelEndpointType::Streaming)
    }
}

impl fmt::Display for ModelEndpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelEndpointType::Async => "async",
            ModelEndpointType::Sync => "sync",
            ModelEndpointType::Streaming => "streaming",
        })
    }
}

/// GPU accelerator classes, by their node-selector label value.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum GpuType {
    #[serde(rename = "nvidia-tesla-t4")]
    TeslaT4,
    #[serde(rename = "nvidia-ampere-a10")]
    AmpereA10,
    #[serde(rename = "nvidia-ampere-a100")]
    AmpereA100,
}

impl GpuType {
    /// The `k8s.amazonaws.com/accelerator` label value.
    pub fn as_str(&self) -> &'static str {
        match self {
            GpuType::TeslaT4 => "nvidia-tesla-t4",
            GpuType::AmpereA10 => "nvidia-ampere-a10",
            GpuType::AmpereA100 => "nvidia-ampere-a100",
        }
    }
}

impl fmt::Display for GpuType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GpuType {
    type Err = UnknownGpuType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nvidia-tesla-t4" => Ok(GpuType::TeslaT4),
            "nvidia-ampere-a10" => Ok(GpuType::AmpereA10),
            "nvidia-ampere-a100" => Ok(GpuType::AmpereA100),
            other => Err(UnknownGpuType(other.to_string())),
        }
    }
}

/// An accelerator label value we do not recognize.
#[derive(thiserror::Error, Debug)]
#[error("unknown gpu type: {0}")]
pub struct UnknownGpuType(pub String);

/// Frameworks an artifact bundle can target.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "framework_type", rename_all = "snake_case")]
pub enum ModelBundleFramework {
    Pytorch {
        pytorch_image_tag: String,
    },
    Tensorflow {
        tensorflow_version: String,
    },
    #[serde(rename = "custom_base_image")]
    Custom {
        image_repository: String,
        image_tag: String,
    },
}

/// Bundle contents for artifact-based endpoints: code plus a serialized
/// model fetched from `location` at pod start.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ArtifactBundle {
    pub location: String,
    pub framework: ModelBundleFramework,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_config: Option<serde_json::Value>,
}

/// Bundle contents for runnable-image endpoints: the image runs as-is.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct RunnableImage {
    pub repository: String,
    pub tag: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default = "default_predict_route")]
    pub predict_route: String,
    #[serde(default = "default_healthcheck_route")]
    pub healthcheck_route: String,
    #[serde(default = "default_readiness_initial_delay")]
    pub readiness_initial_delay_seconds: u32,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

impl RunnableImage {
    /// The full image reference this bundle runs.
    pub fn image(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

fn default_predict_route() -> String {
    "/predict".to_string()
}

fn default_healthcheck_route() -> String {
    "/readyz".to_string()
}

fn default_readiness_initial_delay() -> u32 {
    120
}

fn default_triton_readiness_initial_delay() -> u32 {
    300
}

fn default_protocol() -> String {
    "http".to_string()
}

fn default_streaming_predict_route() -> String {
    "/stream".to_string()
}

/// Extra fields for streaming-enhanced runnable images.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct StreamingEnhancedRunnableImage {
    #[serde(flatten)]
    pub image: RunnableImage,
    pub streaming_command: Vec<String>,
    #[serde(default = "default_streaming_predict_route")]
    pub streaming_predict_route: String,
}

/// Extra fields for deployments that run tritonserver in a sidecar.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct TritonEnhancedRunnableImage {
    #[serde(flatten)]
    pub image: RunnableImage,
    pub triton_model_repository: String,
    pub triton_num_cpu: f64,
    pub triton_commit_tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triton_storage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triton_memory: Option<String>,
    #[serde(default = "default_triton_readiness_initial_delay")]
    pub triton_readiness_initial_delay_seconds: u32,
}

/// How an endpoint's runtime is packaged.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "flavor", rename_all = "snake_case")]
pub enum ModelBundleFlavor {
    Artifact(ArtifactBundle),
    RunnableImage(RunnableImage),
    StreamingEnhancedRunnableImage(StreamingEnhancedRunnableImage),
    TritonEnhancedRunnableImage(TritonEnhancedRunnableImage),
}

impl ModelBundleFlavor {
    /// The template family this flavor selects.
    pub fn flavor_class(&self) -> FlavorClass {
        match self {
            ModelBundleFlavor::Artifact(_) => FlavorClass::Artifact,
            ModelBundleFlavor::RunnableImage(_)
            | ModelBundleFlavor::StreamingEnhancedRunnableImage(_) => FlavorClass::RunnableImage,
            ModelBundleFlavor::TritonEnhancedRunnableImage(_) => {
                FlavorClass::TritonEnhancedRunnableImage
            }
        }
    }

    /// True for every flavor backed by a user-supplied runnable image.
    pub fn is_runnable_image_like(&self) -> bool {
        !matches!(self, ModelBundleFlavor::Artifact(_))
    }

    /// The runnable-image payload shared by all runnable-like flavors.
    pub fn runnable_image(&self) -> Option<&RunnableImage> {
        match self {
            ModelBundleFlavor::Artifact(_) => None,
            ModelBundleFlavor::RunnableImage(image) => Some(image),
            ModelBundleFlavor::StreamingEnhancedRunnableImage(streaming) => Some(&streaming.image),
            ModelBundleFlavor::TritonEnhancedRunnableImage(triton) => Some(&triton.image),
        }
    }
}

/// Template family selected by a bundle flavor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlavorClass {
    Artifact,
    RunnableImage,
    TritonEnhancedRunnableImage,
}

impl FlavorClass {
    /// The literal used in deployment template keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            FlavorClass::Artifact => "artifact",
            FlavorClass::RunnableImage => "runnable-image",
            FlavorClass::TritonEnhancedRunnableImage => "triton-enhanced-runnable-image",
        }
    }
}

impl fmt::Display for FlavorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored model bundle: the code and model an endpoint serves.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ModelBundle {
    pub id: String,
    pub name: String,
    pub flavor: ModelBundleFlavor,
}

/// The persisted endpoint record, as yielded by the endpoint repository.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ModelEndpointRecord {
    pub id: String,
    /// Display name; doubles as the legacy resource name for endpoints that
    /// predate the canonical naming scheme.
    pub name: String,
    pub created_by: String,
    pub owner: String,
    pub endpoint_type: ModelEndpointType,
    pub current_model_bundle: ModelBundle,
}

/// Payload of the `-endpoint-config` configuration artifact. Workload pods
/// read this back; treat the field set as an external contract.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ModelEndpointConfig {
    pub endpoint_name: String,
    pub bundle_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_inference_hooks: Option<Vec<String>>,
}

/// Scaling and resource requests for one build of an endpoint.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct BuildEndpointRequest {
    pub model_endpoint_record: ModelEndpointRecord,
    pub min_workers: u32,
    pub max_workers: u32,
    pub per_worker: u32,
    /// Quantity strings are passed through opaquely ("3", "500m", "12Gi").
    pub cpus: String,
    pub gpus: u32,
    pub memory: String,
    pub storage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_type: Option<GpuType>,
    pub optimize_costs: bool,
    pub prewarm: bool,
    pub high_priority: bool,
    pub aws_role: String,
    pub results_s3_bucket: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_config: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_config: Option<ModelEndpointConfig>,
}

/// Full input to one reconcile: the build request plus the image the
/// endpoint builder resolved for it.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct CreateOrUpdateResourcesRequest {
    pub build_endpoint_request: BuildEndpointRequest,
    pub image: String,
}
