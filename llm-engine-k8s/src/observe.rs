//! Reading live cluster objects back into canonical endpoint state.
//!
//! The inverse of the reconcile flow. The observer never writes; it
//! tolerates legacy naming, absent optional objects and partially
//! materialized endpoints, and reports exactly what it could derive.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{ConfigMap, Container, PodSpec},
};
use kube::{
    api::{Api, ListParams},
    ResourceExt,
};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use llm_engine_core::{
    naming,
    scaling::per_worker_from_concurrency_target,
    serialization::{decode_raw_data, parse_tristate_bool},
    GpuType, ModelEndpointConfig, ModelEndpointDeploymentState, ModelEndpointInfraState,
    ModelEndpointResourceState, ModelEndpointType, ModelEndpointUserConfigState,
};

use crate::{
    apply::not_found_is_none,
    arguments::{DEPLOYMENT_NAME_LABEL, ENDPOINT_ID_LABEL, LLM_ENGINE_HIGH_PRIORITY_CLASS},
    delegate::EndpointResourceDelegate,
    error::{is_not_found, Error, Result},
};

/// Annotations carrying the scaling bounds of queue-driven endpoints.
pub(crate) const MIN_WORKERS_ANNOTATION: &str = "celery.scaleml.autoscaler/minWorkers";
pub(crate) const MAX_WORKERS_ANNOTATION: &str = "celery.scaleml.autoscaler/maxWorkers";
pub(crate) const PER_WORKER_ANNOTATION: &str = "celery.scaleml.autoscaler/perWorker";

/// Node selector key naming the accelerator class.
pub(crate) const ACCELERATOR_NODE_SELECTOR: &str = "k8s.amazonaws.com/accelerator";

const BUNDLE_URL_ENV: &str = "BUNDLE_URL";
const AWS_PROFILE_ENV: &str = "AWS_PROFILE";
const RESULTS_S3_BUCKET_ENV: &str = "RESULTS_S3_BUCKET";
const PREWARM_ENV: &str = "PREWARM";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct HorizontalAutoscalingParams {
    pub min_workers: u32,
    pub max_workers: u32,
    pub per_worker: u32,
}

/// Container policy of a vertical autoscaler; presence alone drives the
/// `optimize_costs` read-back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct VerticalAutoscalingParams {
    pub min_cpu: String,
    pub max_cpu: String,
    pub min_memory: String,
    pub max_memory: String,
}

struct CommonEndpointParams {
    cpus: String,
    memory: String,
    storage: Option<String>,
    gpus: u32,
    gpu_type: Option<GpuType>,
    bundle_url: String,
    aws_role: String,
    results_s3_bucket: String,
    image: String,
    labels: BTreeMap<String, String>,
}

fn pod_spec(deployment: &Deployment) -> Result<&PodSpec> {
    deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .ok_or_else(|| Error::Validation("workload has no pod template".to_string()))
}

fn container<'a>(spec: &'a PodSpec, name: &str) -> Option<&'a Container> {
    spec.containers.iter().find(|c| c.name == name)
}

fn main_container(deployment: &Deployment) -> Result<&Container> {
    container(pod_spec(deployment)?, "main")
        .ok_or_else(|| Error::Validation("no main container detected".to_string()))
}

/// The container running llm-engine plumbing: a queue forwarder when one
/// exists, the http forwarder otherwise, the main container as a last
/// resort (artifact endpoints run the engine in-process).
fn engine_container(deployment: &Deployment) -> Result<&Container> {
    let spec = pod_spec(deployment)?;
    container(spec, "celery-forwarder")
        .or_else(|| container(spec, "http-forwarder"))
        .or_else(|| container(spec, "main"))
        .ok_or_else(|| Error::Validation("no main container detected".to_string()))
}

fn env_value<'a>(container: &'a Container, name: &str) -> Option<&'a str> {
    container
        .env
        .as_ref()?
        .iter()
        .find(|var| var.name == name)
        .and_then(|var| var.value.as_deref())
}

fn quantity_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Scaling bounds from workload annotations; `None` when the workload does
/// not carry them (it is then not a queue-driven endpoint we own).
fn annotation_autoscaling_params(deployment: &Deployment) -> Option<HorizontalAutoscalingParams> {
    let annotations = deployment.metadata.annotations.as_ref()?;
    let read = |key: &str| -> Option<u32> {
        let parsed = annotations.get(key)?.parse().ok();
        if parsed.is_none() {
            warn!(%key, "unparseable autoscaling annotation");
        }
        parsed
    };
    Some(HorizontalAutoscalingParams {
        min_workers: read(MIN_WORKERS_ANNOTATION)?,
        max_workers: read(MAX_WORKERS_ANNOTATION)?,
        per_worker: read(PER_WORKER_ANNOTATION)?,
    })
}

/// Scaling bounds from an autoscaler graph, inverting the concurrency
/// transform applied when the autoscaler was built.
fn sync_autoscaling_params(autoscaler: &Value) -> Result<HorizontalAutoscalingParams> {
    let max_workers = autoscaler
        .pointer("/spec/maxReplicas")
        .and_then(Value::as_u64)
        .ok_or_else(|| Error::Validation("autoscaler has no maxReplicas".to_string()))?;
    let min_workers = autoscaler
        .pointer("/spec/minReplicas")
        .and_then(Value::as_u64)
        .unwrap_or(1);
    let target = autoscaler
        .pointer("/spec/metrics/0/pods/target/averageValue")
        .and_then(quantity_string)
        .ok_or_else(|| {
            Error::Validation("autoscaler has no average-concurrency target".to_string())
        })?;
    let per_worker = per_worker_from_concurrency_target(&target)
        .map_err(|err| Error::Validation(err.to_string()))?;
    Ok(HorizontalAutoscalingParams {
        min_workers: min_workers as u32,
        max_workers: max_workers as u32,
        per_worker,
    })
}

/// Container policy for `main` out of a vertical autoscaler graph; `None`
/// unless exactly one policy matches.
fn vertical_autoscaling_params(autoscaler: &Value) -> Option<VerticalAutoscalingParams> {
    let policies = autoscaler
        .pointer("/spec/resourcePolicy/containerPolicies")?
        .as_array()?;
    let matching: Vec<&Value> = policies
        .iter()
        .filter(|policy| policy["containerName"] == "main")
        .collect();
    let [policy] = matching.as_slice() else {
        return None;
    };
    Some(VerticalAutoscalingParams {
        min_cpu: quantity_string(policy.pointer("/minAllowed/cpu")?)?,
        max_cpu: quantity_string(policy.pointer("/maxAllowed/cpu")?)?,
        min_memory: quantity_string(policy.pointer("/minAllowed/memory")?)?,
        max_memory: quantity_string(policy.pointer("/maxAllowed/memory")?)?,
    })
}

/// Configuration artifacts for an endpoint, by the primary label selector
/// with the legacy fallback.
pub(crate) async fn config_maps_for(
    api: &Api<ConfigMap>,
    endpoint_id: &str,
    deployment_name: &str,
) -> std::result::Result<Vec<ConfigMap>, kube::Error> {
    let primary = ListParams::default().labels(&format!("{ENDPOINT_ID_LABEL}={endpoint_id}"));
    let found = api.list(&primary).await?.items;
    if !found.is_empty() {
        return Ok(found);
    }
    warn!(
        %endpoint_id,
        "no config maps under the endpoint_id selector, falling back to deployment_name"
    );
    let fallback =
        ListParams::default().labels(&format!("{DEPLOYMENT_NAME_LABEL}={deployment_name}"));
    Ok(api.list(&fallback).await?.items)
}

fn decoded_raw_data<T: serde::de::DeserializeOwned>(config_map: &ConfigMap) -> Option<T> {
    let name = config_map.name_any();
    let raw = config_map.data.as_ref()?.get("raw_data")?;
    match decode_raw_data(raw) {
        Ok(payload) => Some(payload),
        Err(err) => {
            warn!(%name, %err, "undecodable config artifact payload");
            None
        }
    }
}

fn user_config_state(
    deployment_name: &str,
    config_maps: &[ConfigMap],
) -> ModelEndpointUserConfigState {
    let find = |name: &str| config_maps.iter().find(|cm| cm.name_any() == name);
    let app_config = find(deployment_name)
        .and_then(decoded_raw_data::<Value>)
        .filter(|value| !value.is_null());
    let endpoint_config = find(&naming::endpoint_config_name(deployment_name))
        .and_then(decoded_raw_data::<ModelEndpointConfig>);
    ModelEndpointUserConfigState {
        app_config,
        endpoint_config,
    }
}

impl EndpointResourceDelegate {
    fn common_endpoint_params(&self, deployment: &Deployment) -> Result<CommonEndpointParams> {
        let main = main_container(deployment)?;
        let engine = engine_container(deployment)?;
        let requests = main
            .resources
            .as_ref()
            .and_then(|resources| resources.requests.as_ref())
            .ok_or_else(|| {
                Error::Validation("main container has no resource requests".to_string())
            })?;
        let cpus = requests
            .get("cpu")
            .map(|quantity| quantity.0.clone())
            .ok_or_else(|| Error::Validation("main container has no cpu request".to_string()))?;
        let memory = requests
            .get("memory")
            .map(|quantity| quantity.0.clone())
            .ok_or_else(|| Error::Validation("main container has no memory request".to_string()))?;
        let storage = requests
            .get("ephemeral-storage")
            .map(|quantity| quantity.0.clone());
        let gpus = match main
            .resources
            .as_ref()
            .and_then(|resources| resources.limits.as_ref())
            .and_then(|limits| limits.get("nvidia.com/gpu"))
        {
            Some(quantity) => quantity.0.parse().map_err(|_| {
                Error::Validation(format!("gpu limit {:?} is not an integer", quantity.0))
            })?,
            None => 0,
        };
        let image = main
            .image
            .clone()
            .ok_or_else(|| Error::Validation("main container has no image".to_string()))?;

        // Runnable images have no real bundle location; the image stands in.
        let bundle_url = env_value(engine, BUNDLE_URL_ENV)
            .map(str::to_string)
            .unwrap_or_else(|| image.clone());
        // Workloads that predate these env vars fall back to the configured
        // defaults.
        let aws_role = env_value(engine, AWS_PROFILE_ENV)
            .map(str::to_string)
            .unwrap_or_else(|| self.config.default_aws_role.clone());
        let results_s3_bucket = env_value(engine, RESULTS_S3_BUCKET_ENV)
            .map(str::to_string)
            .unwrap_or_else(|| self.config.default_results_s3_bucket.clone());

        let gpu_type = pod_spec(deployment)?
            .node_selector
            .as_ref()
            .and_then(|selector| selector.get(ACCELERATOR_NODE_SELECTOR))
            .and_then(|value| match value.parse::<GpuType>() {
                Ok(gpu_type) => Some(gpu_type),
                Err(err) => {
                    warn!(%err, "unrecognized accelerator selector");
                    None
                }
            });
        let labels = deployment.metadata.labels.clone().unwrap_or_default();

        Ok(CommonEndpointParams {
            cpus,
            memory,
            storage,
            gpus,
            gpu_type,
            bundle_url,
            aws_role,
            results_s3_bucket,
            image,
            labels,
        })
    }

    fn infra_state_from_parts(
        &self,
        name_used: &str,
        deployment: &Deployment,
        horizontal: HorizontalAutoscalingParams,
        vertical: Option<VerticalAutoscalingParams>,
        config_maps: &[ConfigMap],
    ) -> Result<ModelEndpointInfraState> {
        let common = self.common_endpoint_params(deployment)?;
        debug!(name = %name_used, bundle_url = %common.bundle_url, "derived common endpoint parameters");
        if let Some(vertical) = &vertical {
            debug!(
                min_cpu = %vertical.min_cpu,
                max_cpu = %vertical.max_cpu,
                min_memory = %vertical.min_memory,
                max_memory = %vertical.max_memory,
                "vertical autoscaling policy in effect"
            );
        }
        let engine = engine_container(deployment)?;
        let prewarm = parse_tristate_bool(env_value(engine, PREWARM_ENV));
        let high_priority = pod_spec(deployment)?
            .priority_class_name
            .as_deref()
            .map(|class| class == LLM_ENGINE_HIGH_PRIORITY_CLASS)
            .unwrap_or(false);
        let status = deployment.status.as_ref();
        let available = status
            .and_then(|status| status.available_replicas)
            .unwrap_or(0)
            .max(0) as u32;
        let unavailable = status
            .and_then(|status| status.unavailable_replicas)
            .unwrap_or(0)
            .max(0) as u32;

        Ok(ModelEndpointInfraState {
            deployment_name: name_used.to_string(),
            aws_role: common.aws_role,
            results_s3_bucket: common.results_s3_bucket,
            labels: common.labels,
            prewarm,
            high_priority,
            deployment_state: ModelEndpointDeploymentState {
                min_workers: horizontal.min_workers,
                max_workers: horizontal.max_workers,
                per_worker: horizontal.per_worker,
                available_workers: available,
                unavailable_workers: unavailable,
            },
            resource_state: ModelEndpointResourceState {
                cpus: common.cpus,
                gpus: common.gpus,
                gpu_type: common.gpu_type,
                memory: common.memory,
                storage: common.storage,
                optimize_costs: vertical.is_some(),
            },
            user_config_state: user_config_state(name_used, config_maps),
            image: common.image,
        })
    }

    pub(crate) async fn get_resources_inner(
        &self,
        endpoint_id: &str,
        deployment_name: &str,
        endpoint_type: ModelEndpointType,
    ) -> Result<ModelEndpointInfraState> {
        let canonical = naming::resource_group_name(endpoint_id);
        let deployments = self.apis.deployments();
        let (name_used, deployment) =
            match not_found_is_none(deployments.get(&canonical).await).map_err(Error::Infra)? {
                Some(deployment) => (canonical, deployment),
                None => {
                    warn!(
                        %canonical,
                        legacy = %deployment_name,
                        "workload not found, falling back to legacy deployment name"
                    );
                    match not_found_is_none(deployments.get(deployment_name).await)
                        .map_err(Error::Infra)?
                    {
                        Some(deployment) => (deployment_name.to_string(), deployment),
                        None => return Err(Error::NotFound { name: canonical }),
                    }
                }
            };

        let horizontal = match endpoint_type {
            ModelEndpointType::Async => {
                annotation_autoscaling_params(&deployment).ok_or_else(|| {
                    Error::Validation(format!(
                        "workload {name_used} carries no autoscaling annotations"
                    ))
                })?
            }
            ModelEndpointType::Sync | ModelEndpointType::Streaming => {
                let autoscalers = self.apis.horizontal_autoscalers().await?;
                match autoscalers.get_opt(&name_used).await.map_err(Error::Infra)? {
                    Some(autoscaler) => sync_autoscaling_params(&autoscaler)?,
                    None => {
                        // Workload and autoscaler converge eventually; report
                        // what exists rather than failing the read.
                        warn!(%name_used, "autoscaler not found, reporting best-effort scaling state");
                        annotation_autoscaling_params(&deployment).unwrap_or(
                            HorizontalAutoscalingParams {
                                min_workers: 0,
                                max_workers: 0,
                                per_worker: 0,
                            },
                        )
                    }
                }
            }
        };

        let vertical = self
            .apis
            .vertical_autoscalers()
            .get_opt(&name_used)
            .await
            .map_err(Error::Infra)?
            .map(|vpa| serde_json::to_value(&vpa))
            .transpose()
            .map_err(|err| Error::Validation(err.to_string()))?
            .as_ref()
            .and_then(vertical_autoscaling_params);

        let config_maps = config_maps_for(&self.apis.config_maps(), endpoint_id, &name_used)
            .await
            .map_err(Error::Infra)?;

        self.infra_state_from_parts(&name_used, &deployment, horizontal, vertical, &config_maps)
    }

    pub(crate) async fn get_all_resources_inner(
        &self,
    ) -> Result<BTreeMap<String, (bool, ModelEndpointInfraState)>> {
        let lp = ListParams::default();
        let deployments = self
            .apis
            .deployments()
            .list(&lp)
            .await
            .map_err(Error::Infra)?
            .items;
        let autoscalers = self.apis.horizontal_autoscalers().await?;
        let horizontal_by_name: BTreeMap<String, Value> = autoscalers
            .list()
            .await
            .map_err(Error::Infra)?
            .into_iter()
            .filter_map(|hpa| {
                hpa.pointer("/metadata/name")
                    .and_then(Value::as_str)
                    .map(|name| (name.to_string(), hpa.clone()))
            })
            .collect();
        let vertical_by_name: BTreeMap<String, Value> =
            match self.apis.vertical_autoscalers().list(&lp).await {
                Ok(list) => list
                    .items
                    .iter()
                    .filter_map(|vpa| {
                        let graph = serde_json::to_value(vpa).ok()?;
                        Some((vpa.name_any(), graph))
                    })
                    .collect(),
                Err(err) if is_not_found(&err) => BTreeMap::new(),
                Err(err) => return Err(Error::Infra(err)),
            };
        let config_maps = self
            .apis
            .config_maps()
            .list(&lp)
            .await
            .map_err(Error::Infra)?
            .items;

        let deployment_names: BTreeSet<String> =
            deployments.iter().map(ResourceExt::name_any).collect();
        let orphaned_autoscalers: Vec<&String> = horizontal_by_name
            .keys()
            .filter(|name| !deployment_names.contains(*name))
            .collect();
        if !orphaned_autoscalers.is_empty() {
            info!(?orphaned_autoscalers, "autoscalers without a workload");
        }

        let mut states = BTreeMap::new();
        for deployment in &deployments {
            let name = deployment.name_any();
            let horizontal = match horizontal_by_name.get(&name) {
                // An autoscaler means a request/response endpoint; queue
                // endpoints carry their bounds on the workload itself.
                Some(autoscaler) => sync_autoscaling_params(autoscaler),
                None => annotation_autoscaling_params(deployment).ok_or_else(|| {
                    Error::Validation(format!("workload {name} carries no autoscaling state"))
                }),
            };
            let vertical = vertical_by_name
                .get(&name)
                .and_then(vertical_autoscaling_params);
            let state = horizontal.and_then(|horizontal| {
                self.infra_state_from_parts(&name, deployment, horizontal, vertical, &config_maps)
            });
            match state {
                Ok(state) => {
                    let (key, is_endpoint_id) =
                        match naming::endpoint_id_from_resource_group_name(&name) {
                            Some(endpoint_id) => (endpoint_id, true),
                            None => (name.clone(), false),
                        };
                    states.insert(key, (is_endpoint_id, state));
                }
                Err(err) => {
                    error!(%name, %err, "error deriving endpoint state");
                }
            }
        }
        Ok(states)
    }
}
