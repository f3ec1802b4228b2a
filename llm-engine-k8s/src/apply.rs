//! The create-or-update ladder for every object kind.
//!
//! Every apply starts with a bare `create`. A conflict means the object is
//! already there, so the operator falls back to a merge patch, and a patch
//! rejection (conflict or unprocessable) falls back to a full replace under
//! the live object's resourceVersion. Anything else bubbles up for the
//! delegate to wrap as an infra error. Conflicts and patch rejections are
//! expected traffic here, never surfaced.

use std::fmt::Debug;

use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{ConfigMap, Service},
};
use kube::{
    api::{Api, DynamicObject, Patch, PatchParams, PostParams},
    Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    apis::AutoscalerApi,
    error::{is_conflict, is_not_found, is_unprocessable},
};
use llm_engine_core::deep_merge;

/// Apply a workload deployment.
///
/// On the patch fallback the `replicas` field is stripped first: the
/// autoscaler owns the replica count once the workload exists, so only the
/// very first create writes it.
pub(crate) async fn apply_deployment(
    api: &Api<Deployment>,
    name: &str,
    deployment: Deployment,
) -> Result<(), kube::Error> {
    match api.create(&PostParams::default(), &deployment).await {
        Ok(_) => Ok(()),
        Err(err) if is_conflict(&err) => {
            info!(%name, "deployment already exists, patching");
            let mut update = deployment;
            if let Some(spec) = update.spec.as_mut() {
                spec.replicas = None;
            }
            patch_then_replace(api, name, &update).await
        }
        Err(err) => Err(err),
    }
}

/// Apply a configuration artifact.
///
/// Config artifacts are replaced wholesale rather than patched so that keys
/// removed from the payload disappear from the live object too.
pub(crate) async fn apply_config_map(
    api: &Api<ConfigMap>,
    name: &str,
    config_map: ConfigMap,
) -> Result<(), kube::Error> {
    match api.create(&PostParams::default(), &config_map).await {
        Ok(_) => Ok(()),
        Err(err) if is_conflict(&err) => {
            info!(%name, "config map already exists, replacing");
            replace_with_live_version(api, name, config_map).await
        }
        Err(err) => Err(err),
    }
}

/// Apply a traffic service with the full ladder.
pub(crate) async fn apply_service(
    api: &Api<Service>,
    name: &str,
    service: Service,
) -> Result<(), kube::Error> {
    match api.create(&PostParams::default(), &service).await {
        Ok(_) => Ok(()),
        Err(err) if is_conflict(&err) || is_unprocessable(&err) => {
            info!(%name, "service already exists, patching");
            patch_then_replace(api, name, &service).await
        }
        Err(err) => Err(err),
    }
}

/// Apply a horizontal autoscaler.
///
/// The apiserver occasionally hands back an autoscaler whose `conditions`
/// do not deserialize even though the write itself went through. The write
/// is retried once, and a second bad response is treated as applied.
pub(crate) async fn apply_autoscaler(
    api: &AutoscalerApi,
    name: &str,
    body: &Value,
) -> Result<(), kube::Error> {
    match api.create(body).await {
        Ok(()) => Ok(()),
        Err(err) if is_spurious_conditions_failure(&err) => {
            info!(%name, "ignoring undecodable conditions in autoscaler create response");
            Ok(())
        }
        Err(err) if is_conflict(&err) => {
            info!(%name, "autoscaler already exists, patching");
            patch_autoscaler(api, name, body).await
        }
        Err(err) => Err(err),
    }
}

async fn patch_autoscaler(api: &AutoscalerApi, name: &str, body: &Value) -> Result<(), kube::Error> {
    match api.patch(name, body).await {
        Ok(()) => Ok(()),
        Err(err) if is_spurious_conditions_failure(&err) => {
            debug!(%name, "autoscaler patch response undecodable, retrying once");
            match api.patch(name, body).await {
                Ok(()) => Ok(()),
                Err(retry_err) if is_spurious_conditions_failure(&retry_err) => {
                    warn!(%name, "skipping undecodable conditions in autoscaler patch response");
                    Ok(())
                }
                Err(retry_err) => Err(retry_err),
            }
        }
        Err(err) if is_conflict(&err) || is_unprocessable(&err) => {
            info!(%name, "autoscaler patch rejected, replacing");
            let existing = api.get(name).await?;
            let mut replacement = body.clone();
            if let Some(metadata) = replacement
                .get_mut("metadata")
                .and_then(Value::as_object_mut)
            {
                if let Some(version) = existing.pointer("/metadata/resourceVersion") {
                    metadata.insert("resourceVersion".to_string(), version.clone());
                }
            }
            api.replace(name, &replacement).await
        }
        Err(err) => Err(err),
    }
}

/// Apply a custom-resource object (vertical autoscaler, routing or
/// destination policy).
///
/// Server-side patch is unreliable for these kinds, so the existing object
/// is read, the new body deep-merged over it (maps by key, arrays replaced)
/// and the result written back as a replace.
pub(crate) async fn apply_custom_object(
    api: &Api<DynamicObject>,
    name: &str,
    body: Value,
) -> Result<(), kube::Error> {
    let object: DynamicObject =
        serde_json::from_value(body.clone()).map_err(kube::Error::SerdeError)?;
    match api.create(&PostParams::default(), &object).await {
        Ok(_) => Ok(()),
        Err(err) if is_conflict(&err) => {
            info!(%name, "custom object already exists, merging and replacing");
            let existing = api.get(name).await?;
            let existing_graph =
                serde_json::to_value(&existing).map_err(kube::Error::SerdeError)?;
            let merged: DynamicObject = serde_json::from_value(deep_merge(existing_graph, body))
                .map_err(kube::Error::SerdeError)?;
            api.replace(name, &PostParams::default(), &merged).await?;
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// Merge-patch `body`; on rejection, adopt the live resourceVersion and
/// replace outright.
async fn patch_then_replace<K>(api: &Api<K>, name: &str, body: &K) -> Result<(), kube::Error>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    match api.patch(name, &PatchParams::default(), &Patch::Merge(body)).await {
        Ok(_) => Ok(()),
        Err(err) if is_conflict(&err) || is_unprocessable(&err) => {
            info!(%name, "patch rejected, replacing");
            replace_with_live_version(api, name, body.clone()).await
        }
        Err(err) => Err(err),
    }
}

async fn replace_with_live_version<K>(
    api: &Api<K>,
    name: &str,
    mut body: K,
) -> Result<(), kube::Error>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    let existing = api.get(name).await?;
    body.meta_mut().resource_version = existing.resource_version();
    api.replace(name, &PostParams::default(), &body).await?;
    Ok(())
}

/// Whether an error is the undecodable-`conditions` response the autoscaler
/// API is known to produce on writes that actually applied.
fn is_spurious_conditions_failure(err: &kube::Error) -> bool {
    matches!(err, kube::Error::SerdeError(_))
}

/// Surfaced for the observer: not-found on a read is part of the legacy
/// fallback ladder, not an error.
pub(crate) fn not_found_is_none<T>(result: Result<T, kube::Error>) -> Result<Option<T>, kube::Error> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if is_not_found(&err) => Ok(None),
        Err(err) => Err(err),
    }
}
