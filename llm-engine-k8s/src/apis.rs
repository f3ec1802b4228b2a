//! Typed handles over the cluster APIs the reconciler touches.
//!
//! One `kube::Client` is shared across all kinds. Deployment, ConfigMap and
//! Service use the typed k8s-openapi models; the custom-resource kinds
//! (vertical autoscaler, routing and destination policies) go through
//! [`DynamicObject`] since their schemas are not compiled in. Horizontal
//! autoscalers are split by cluster version: `autoscaling/v2` is typed,
//! while pre-1.26 clusters get the dynamic `v2beta2` surface because
//! k8s-openapi no longer ships the beta model.

use k8s_openapi::api::{
    apps::v1::Deployment,
    autoscaling::v2::HorizontalPodAutoscaler,
    core::v1::{ConfigMap, Service},
};
use kube::{
    api::{Api, ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams},
    core::GroupVersionKind,
    Client,
};
use llm_engine_core::ClusterVersion;
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::{
    config::ReconcilerConfig,
    error::{Error, Result},
};

/// First cluster version where `autoscaling/v2` replaces `v2beta2`.
const AUTOSCALING_V2_MIN_VERSION: ClusterVersion = ClusterVersion::new(1, 26);

const AUTOSCALING_V2: &str = "autoscaling/v2";
const AUTOSCALING_V2BETA2: &str = "autoscaling/v2beta2";

/// Autoscaler API version literal for a cluster version. The single place
/// the 1.26 cutover is encoded; everything autoscaler-shaped derives from
/// this.
pub fn autoscaling_api_version(version: ClusterVersion) -> &'static str {
    if version >= AUTOSCALING_V2_MIN_VERSION {
        AUTOSCALING_V2
    } else {
        AUTOSCALING_V2BETA2
    }
}

/// The per-kind API handles for one namespace, with a set-once cluster
/// version cache.
pub struct ApiSet {
    client: Client,
    namespace: String,
    fixed_cluster_version: Option<ClusterVersion>,
    cluster_version: OnceCell<ClusterVersion>,
}

impl ApiSet {
    /// Wrap a client for the configured endpoint namespace. The version
    /// probe stays lazy; see [`ApiSet::cluster_version`].
    pub fn new(client: Client, config: &ReconcilerConfig) -> Self {
        ApiSet {
            client,
            namespace: config.endpoint_namespace.clone(),
            fixed_cluster_version: config.fixed_cluster_version,
            cluster_version: OnceCell::new(),
        }
    }

    /// Namespace all handles operate in.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The cluster version, probed once and cached. A configured fixed
    /// version short-circuits the probe entirely (CI mode).
    pub async fn cluster_version(&self) -> Result<ClusterVersion> {
        if let Some(fixed) = self.fixed_cluster_version {
            return Ok(fixed);
        }
        self.cluster_version
            .get_or_try_init(|| async {
                let info = self
                    .client
                    .apiserver_version()
                    .await
                    .map_err(Error::Infra)?;
                ClusterVersion::from_version_info(&info.major, &info.minor)
                    .map_err(|err| Error::Validation(err.to_string()))
            })
            .await
            .copied()
    }

    pub fn deployments(&self) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    pub fn config_maps(&self) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    pub fn services(&self) -> Api<Service> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    /// The horizontal autoscaler surface matching the cluster version.
    pub async fn horizontal_autoscalers(&self) -> Result<AutoscalerApi> {
        let version = self.cluster_version().await?;
        if autoscaling_api_version(version) == AUTOSCALING_V2 {
            Ok(AutoscalerApi::V2(Api::namespaced(
                self.client.clone(),
                &self.namespace,
            )))
        } else {
            let gvk = GroupVersionKind::gvk("autoscaling", "v2beta2", "HorizontalPodAutoscaler");
            let resource = ApiResource::from_gvk_with_plural(&gvk, "horizontalpodautoscalers");
            Ok(AutoscalerApi::V2beta2(Api::namespaced_with(
                self.client.clone(),
                &self.namespace,
                &resource,
            )))
        }
    }

    pub fn vertical_autoscalers(&self) -> Api<DynamicObject> {
        let gvk = GroupVersionKind::gvk("autoscaling.k8s.io", "v1", "VerticalPodAutoscaler");
        let resource = ApiResource::from_gvk_with_plural(&gvk, "verticalpodautoscalers");
        Api::namespaced_with(self.client.clone(), &self.namespace, &resource)
    }

    pub fn virtual_services(&self) -> Api<DynamicObject> {
        let gvk = GroupVersionKind::gvk("networking.istio.io", "v1alpha3", "VirtualService");
        let resource = ApiResource::from_gvk_with_plural(&gvk, "virtualservices");
        Api::namespaced_with(self.client.clone(), &self.namespace, &resource)
    }

    pub fn destination_rules(&self) -> Api<DynamicObject> {
        let gvk = GroupVersionKind::gvk("networking.istio.io", "v1beta1", "DestinationRule");
        let resource = ApiResource::from_gvk_with_plural(&gvk, "destinationrules");
        Api::namespaced_with(self.client.clone(), &self.namespace, &resource)
    }
}

/// Version-dependent horizontal autoscaler surface.
///
/// Bodies cross this boundary as JSON graphs: they come straight out of
/// templates, and normalizing reads to JSON keeps the observer independent
/// of which API version served them (the paths it cares about are identical
/// in `v2` and `v2beta2`).
pub enum AutoscalerApi {
    V2(Api<HorizontalPodAutoscaler>),
    V2beta2(Api<DynamicObject>),
}

impl AutoscalerApi {
    /// The `apiVersion` literal autoscaler templates should be rendered with.
    pub fn api_version(&self) -> &'static str {
        match self {
            AutoscalerApi::V2(_) => AUTOSCALING_V2,
            AutoscalerApi::V2beta2(_) => AUTOSCALING_V2BETA2,
        }
    }

    pub async fn create(&self, body: &Value) -> Result<(), kube::Error> {
        let pp = PostParams::default();
        match self {
            AutoscalerApi::V2(api) => {
                api.create(&pp, &typed_body(body)?).await?;
            }
            AutoscalerApi::V2beta2(api) => {
                api.create(&pp, &dynamic_body(body)?).await?;
            }
        }
        Ok(())
    }

    pub async fn patch(&self, name: &str, body: &Value) -> Result<(), kube::Error> {
        let pp = PatchParams::default();
        match self {
            AutoscalerApi::V2(api) => {
                api.patch(name, &pp, &Patch::Merge(body)).await?;
            }
            AutoscalerApi::V2beta2(api) => {
                api.patch(name, &pp, &Patch::Merge(body)).await?;
            }
        }
        Ok(())
    }

    pub async fn replace(&self, name: &str, body: &Value) -> Result<(), kube::Error> {
        let pp = PostParams::default();
        match self {
            AutoscalerApi::V2(api) => {
                api.replace(name, &pp, &typed_body(body)?).await?;
            }
            AutoscalerApi::V2beta2(api) => {
                api.replace(name, &pp, &dynamic_body(body)?).await?;
            }
        }
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Result<Value, kube::Error> {
        match self {
            AutoscalerApi::V2(api) => to_graph(&api.get(name).await?),
            AutoscalerApi::V2beta2(api) => to_graph(&api.get(name).await?),
        }
    }

    pub async fn get_opt(&self, name: &str) -> Result<Option<Value>, kube::Error> {
        match self {
            AutoscalerApi::V2(api) => api.get_opt(name).await?.map(|hpa| to_graph(&hpa)).transpose(),
            AutoscalerApi::V2beta2(api) => {
                api.get_opt(name).await?.map(|hpa| to_graph(&hpa)).transpose()
            }
        }
    }

    pub async fn list(&self) -> Result<Vec<Value>, kube::Error> {
        let lp = ListParams::default();
        match self {
            AutoscalerApi::V2(api) => api.list(&lp).await?.items.iter().map(to_graph).collect(),
            AutoscalerApi::V2beta2(api) => {
                api.list(&lp).await?.items.iter().map(to_graph).collect()
            }
        }
    }

    pub async fn delete(&self, name: &str) -> Result<(), kube::Error> {
        let dp = DeleteParams::default();
        match self {
            AutoscalerApi::V2(api) => {
                api.delete(name, &dp).await?;
            }
            AutoscalerApi::V2beta2(api) => {
                api.delete(name, &dp).await?;
            }
        }
        Ok(())
    }
}

fn typed_body(body: &Value) -> Result<HorizontalPodAutoscaler, kube::Error> {
    serde_json::from_value(body.clone()).map_err(kube::Error::SerdeError)
}

fn dynamic_body(body: &Value) -> Result<DynamicObject, kube::Error> {
    serde_json::from_value(body.clone()).map_err(kube::Error::SerdeError)
}

fn to_graph<T: serde::Serialize>(object: &T) -> Result<Value, kube::Error> {
    serde_json::to_value(object).map_err(kube::Error::SerdeError)
}
