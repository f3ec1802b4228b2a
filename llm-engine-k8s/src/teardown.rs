//! The delete ladder and per-mode delete compositions.
//!
//! Deletes try the canonical resource group name, fall back to the legacy
//! deployment name on not-found, and treat a second not-found as already
//! deleted. Each kind reports a success bit instead of an error so one
//! stubborn object cannot stop the rest of the teardown; the caller
//! aggregates the bits that matter.

use std::fmt::Debug;

use k8s_openapi::api::{apps::v1::Deployment, core::v1::{ConfigMap, Service}};
use kube::api::{Api, DeleteParams, DynamicObject};
use kube::ResourceExt;
use serde::de::DeserializeOwned;
use tracing::{error, warn};

use crate::{
    apis::AutoscalerApi,
    delegate::EndpointResourceDelegate,
    error::{is_not_found, Result},
    observe::config_maps_for,
};
use llm_engine_core::naming;

/// Delete one named object, retrying under the legacy name on not-found.
async fn delete_with_legacy_fallback<K>(
    api: &Api<K>,
    kind: &str,
    canonical: &str,
    legacy: &str,
) -> bool
where
    K: Clone + DeserializeOwned + Debug,
{
    let dp = DeleteParams::default();
    match api.delete(canonical, &dp).await {
        Ok(_) => true,
        Err(err) if is_not_found(&err) => {
            warn!(%kind, %canonical, %legacy, "not found, falling back to legacy name");
            match api.delete(legacy, &dp).await {
                Ok(_) => true,
                Err(err) if is_not_found(&err) => {
                    warn!(%kind, name = %legacy, "deleting nonexistent object");
                    true
                }
                Err(err) => {
                    error!(%kind, name = %legacy, %err, "deletion failed");
                    false
                }
            }
        }
        Err(err) => {
            error!(%kind, name = %canonical, %err, "deletion failed");
            false
        }
    }
}

/// Delete an autoscaler with the same ladder; the dynamic surface is not an
/// `Api<K>` so the fallback is spelled out again.
async fn delete_autoscaler(api: &AutoscalerApi, canonical: &str, legacy: &str) -> bool {
    match api.delete(canonical).await {
        Ok(()) => true,
        Err(err) if is_not_found(&err) => {
            warn!(%canonical, %legacy, "autoscaler not found, falling back to legacy name");
            match api.delete(legacy).await {
                Ok(()) => true,
                Err(err) if is_not_found(&err) => {
                    warn!(name = %legacy, "deleting nonexistent autoscaler");
                    true
                }
                Err(err) => {
                    error!(name = %legacy, %err, "autoscaler deletion failed");
                    false
                }
            }
        }
        Err(err) => {
            error!(name = %canonical, %err, "autoscaler deletion failed");
            false
        }
    }
}

/// Delete a custom object under its canonical name only; these kinds never
/// existed under legacy names.
async fn delete_custom_object(api: &Api<DynamicObject>, kind: &str, name: &str) -> bool {
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => true,
        Err(err) if is_not_found(&err) => {
            warn!(%kind, %name, "deleting nonexistent object");
            true
        }
        Err(err) => {
            error!(%kind, %name, %err, "deletion failed");
            false
        }
    }
}

/// Delete every configuration artifact matched by the endpoint's label
/// selectors.
async fn delete_config_maps(api: &Api<ConfigMap>, endpoint_id: &str, deployment_name: &str) -> bool {
    let config_maps = match config_maps_for(api, endpoint_id, deployment_name).await {
        Ok(config_maps) => config_maps,
        Err(err) => {
            error!(%endpoint_id, %err, "unable to list config maps for deletion");
            return false;
        }
    };
    let mut succeeded = true;
    for config_map in config_maps {
        let name = config_map.name_any();
        match api.delete(&name, &DeleteParams::default()).await {
            Ok(_) => {}
            Err(err) if is_not_found(&err) => {
                warn!(%name, "deleting nonexistent config map");
            }
            Err(err) => {
                error!(%name, %err, "config map deletion failed");
                succeeded = false;
            }
        }
    }
    succeeded
}

impl EndpointResourceDelegate {
    pub(crate) async fn delete_resources_async_inner(
        &self,
        endpoint_id: &str,
        deployment_name: &str,
    ) -> Result<bool> {
        let canonical = naming::resource_group_name(endpoint_id);
        let deployment_deleted = delete_with_legacy_fallback::<Deployment>(
            &self.apis.deployments(),
            "Deployment",
            &canonical,
            deployment_name,
        )
        .await;
        let config_maps_deleted =
            delete_config_maps(&self.apis.config_maps(), endpoint_id, deployment_name).await;
        // best-effort: endpoints without cost optimization have no VPA
        delete_custom_object(
            &self.apis.vertical_autoscalers(),
            "VerticalPodAutoscaler",
            &canonical,
        )
        .await;
        Ok(deployment_deleted && config_maps_deleted)
    }

    pub(crate) async fn delete_resources_sync_inner(
        &self,
        endpoint_id: &str,
        deployment_name: &str,
    ) -> Result<bool> {
        let canonical = naming::resource_group_name(endpoint_id);
        let deployment_deleted = delete_with_legacy_fallback::<Deployment>(
            &self.apis.deployments(),
            "Deployment",
            &canonical,
            deployment_name,
        )
        .await;
        let config_maps_deleted =
            delete_config_maps(&self.apis.config_maps(), endpoint_id, deployment_name).await;
        let service_deleted = delete_with_legacy_fallback::<Service>(
            &self.apis.services(),
            "Service",
            &canonical,
            deployment_name,
        )
        .await;
        let autoscalers = self.apis.horizontal_autoscalers().await?;
        let autoscaler_deleted = delete_autoscaler(&autoscalers, &canonical, deployment_name).await;
        delete_custom_object(
            &self.apis.vertical_autoscalers(),
            "VerticalPodAutoscaler",
            &canonical,
        )
        .await;
        let destination_rule_deleted = delete_custom_object(
            &self.apis.destination_rules(),
            "DestinationRule",
            &canonical,
        )
        .await;
        let virtual_service_deleted =
            delete_custom_object(&self.apis.virtual_services(), "VirtualService", &canonical).await;
        Ok(deployment_deleted
            && config_maps_deleted
            && service_deleted
            && autoscaler_deleted
            && destination_rule_deleted
            && virtual_service_deleted)
    }
}
