//! Core domain types for the llm-engine endpoint reconciler.
//!
//! This crate is deliberately free of any Kubernetes client machinery: it
//! holds the logical model of an endpoint (records, bundle flavors, scaling
//! and resource requests), the canonical observed state the reconciler's
//! observer produces, and the pure helpers both sides share (naming rules,
//! config payload framing, deep merge, scaling transforms, cluster version
//! ordering).
//!
//! The companion crate `llm-engine-k8s` materializes these types into
//! cluster objects and reads them back.

pub mod endpoint;
pub mod merge;
pub mod naming;
pub mod scaling;
pub mod serialization;
pub mod state;
pub mod version;

pub use endpoint::{
    ArtifactBundle, BuildEndpointRequest, CreateOrUpdateResourcesRequest, FlavorClass, GpuType,
    ModelBundle, ModelBundleFlavor, ModelBundleFramework, ModelEndpointConfig, ModelEndpointRecord,
    ModelEndpointType, RunnableImage, StreamingEnhancedRunnableImage, TritonEnhancedRunnableImage,
};
pub use merge::deep_merge;
pub use state::{
    ModelEndpointDeploymentState, ModelEndpointInfraState, ModelEndpointResourceState,
    ModelEndpointUserConfigState,
};
pub use version::ClusterVersion;
