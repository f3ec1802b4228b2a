//! Translation of endpoint requests into template substitution bags.
//!
//! Every template key has a fixed parameter set, so each gets its own
//! argument struct and the set of substitutions is enumerated in one place
//! per template rather than spread over an open-ended map. Values that are
//! structured (labels, commands) are rendered as JSON, which YAML accepts
//! as flow syntax, keeping substitution purely textual.

use std::collections::BTreeMap;

use llm_engine_core::{
    endpoint::{FlavorClass, GpuType, ModelBundleFlavor, ModelEndpointType},
    naming,
    scaling::concurrency_target_from_per_worker,
    serialization::encode_raw_data,
    CreateOrUpdateResourcesRequest, ModelEndpointConfig,
};

use crate::{config::ReconcilerConfig, error::Error};

/// Priority class assigned to high-priority endpoints.
pub const LLM_ENGINE_HIGH_PRIORITY_CLASS: &str = "llm-engine-high-priority";

/// Priority class assigned to everything else.
pub const LLM_ENGINE_DEFAULT_PRIORITY_CLASS: &str = "llm-engine-default-priority";

/// Where user code lands inside endpoint images.
pub const BASE_PATH_IN_ENDPOINT: &str = "/app";

/// Port endpoint containers listen on.
pub const ENDPOINT_HTTP_PORT: u16 = 5000;

/// Label carrying the endpoint id; the observer's primary selector.
pub const ENDPOINT_ID_LABEL: &str = "endpoint_id";

/// Label carrying the resource name; the observer's fallback selector.
pub const DEPLOYMENT_NAME_LABEL: &str = "deployment_name";

pub(crate) const DD_ENV_LABEL: &str = "tags.datadoghq.com/env";
pub(crate) const DD_SERVICE_LABEL: &str = "tags.datadoghq.com/service";
pub(crate) const DD_VERSION_LABEL: &str = "tags.datadoghq.com/version";

/// Accelerator class of a deployment template.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Gpu,
}

impl Device {
    /// The literal used in deployment template keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Gpu => "gpu",
        }
    }

    /// Device class implied by a gpu request.
    pub fn for_gpus(gpus: u32) -> Device {
        if gpus > 0 {
            Device::Gpu
        } else {
            Device::Cpu
        }
    }
}

/// Template key for a deployment shape.
pub fn deployment_template_key(
    flavor_class: FlavorClass,
    mode: ModelEndpointType,
    device: Device,
) -> String {
    format!("deployment-{flavor_class}-{mode}-{}.yaml", device.as_str())
}

type Substitutions = BTreeMap<&'static str, String>;

fn json_string_map(map: &BTreeMap<String, String>) -> String {
    let object: serde_json::Map<String, serde_json::Value> = map
        .iter()
        .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
        .collect();
    serde_json::Value::Object(object).to_string()
}

fn json_string_list(list: &[String]) -> String {
    let array: Vec<serde_json::Value> = list
        .iter()
        .map(|item| serde_json::Value::String(item.clone()))
        .collect();
    serde_json::Value::Array(array).to_string()
}

/// Substitutions for one deployment template.
#[derive(Clone, Debug)]
pub struct DeploymentArguments {
    pub resource_group_name: String,
    pub namespace: String,
    pub endpoint_id: String,
    pub endpoint_name: String,
    pub labels: BTreeMap<String, String>,
    pub priority_class: &'static str,
    pub image: String,
    pub cpus: String,
    pub memory: String,
    pub storage: String,
    pub gpus: u32,
    pub gpu_type: Option<GpuType>,
    pub min_workers: u32,
    pub max_workers: u32,
    pub per_worker: u32,
    pub aws_role: String,
    pub results_s3_bucket: String,
    pub queue_name: String,
    pub queue_url: String,
    pub prewarm: bool,
    pub flavor: DeploymentFlavorArguments,
}

/// Per-flavor-class extras of a deployment template.
#[derive(Clone, Debug)]
pub enum DeploymentFlavorArguments {
    Artifact {
        bundle_url: String,
    },
    RunnableImage(RunnableImageArguments),
    TritonEnhancedRunnableImage {
        runnable: RunnableImageArguments,
        triton: TritonArguments,
    },
}

/// Keys shared by every runnable-image deployment template.
#[derive(Clone, Debug)]
pub struct RunnableImageArguments {
    pub command: Vec<String>,
    pub predict_route: String,
    pub healthcheck_route: String,
    pub readiness_initial_delay_seconds: u32,
    pub streaming: Option<StreamingArguments>,
}

/// Extra keys of streaming-mode deployment templates.
#[derive(Clone, Debug)]
pub struct StreamingArguments {
    pub streaming_command: Vec<String>,
    pub streaming_predict_route: String,
}

/// Extra keys of triton-enhanced deployment templates.
#[derive(Clone, Debug)]
pub struct TritonArguments {
    pub model_repository: String,
    pub cpus: String,
    pub memory: String,
    pub storage: String,
    pub commit_tag: String,
    pub readiness_initial_delay_seconds: u32,
}

impl DeploymentArguments {
    /// The enumerated substitution set for this deployment.
    pub fn substitutions(&self) -> Substitutions {
        let mut subs = Substitutions::new();
        subs.insert("RESOURCE_NAME", self.resource_group_name.clone());
        subs.insert("NAMESPACE", self.namespace.clone());
        subs.insert("ENDPOINT_ID", self.endpoint_id.clone());
        subs.insert("ENDPOINT_NAME", self.endpoint_name.clone());
        subs.insert("LABELS", json_string_map(&self.labels));
        subs.insert("PRIORITY", self.priority_class.to_string());
        subs.insert("IMAGE", self.image.clone());
        subs.insert("CPUS", self.cpus.clone());
        subs.insert("MEMORY", self.memory.clone());
        subs.insert("STORAGE", self.storage.clone());
        subs.insert("GPUS", self.gpus.to_string());
        subs.insert("MIN_WORKERS", self.min_workers.to_string());
        subs.insert("MAX_WORKERS", self.max_workers.to_string());
        subs.insert("PER_WORKER", self.per_worker.to_string());
        subs.insert("AWS_ROLE", self.aws_role.clone());
        subs.insert("RESULTS_S3_BUCKET", self.results_s3_bucket.clone());
        subs.insert("SQS_QUEUE_NAME", self.queue_name.clone());
        subs.insert("SQS_QUEUE_URL", self.queue_url.clone());
        subs.insert("PREWARM", self.prewarm.to_string());
        subs.insert("BASE_PATH", BASE_PATH_IN_ENDPOINT.to_string());
        subs.insert("HTTP_PORT", ENDPOINT_HTTP_PORT.to_string());
        if let Some(gpu_type) = self.gpu_type {
            subs.insert("GPU_TYPE", gpu_type.as_str().to_string());
        }
        match &self.flavor {
            DeploymentFlavorArguments::Artifact { bundle_url } => {
                subs.insert("BUNDLE_URL", bundle_url.clone());
            }
            DeploymentFlavorArguments::RunnableImage(runnable) => {
                runnable.extend(&mut subs);
            }
            DeploymentFlavorArguments::TritonEnhancedRunnableImage { runnable, triton } => {
                runnable.extend(&mut subs);
                triton.extend(&mut subs);
            }
        }
        subs
    }
}

impl RunnableImageArguments {
    fn extend(&self, subs: &mut Substitutions) {
        subs.insert("COMMAND", json_string_list(&self.command));
        subs.insert("PREDICT_ROUTE", self.predict_route.clone());
        subs.insert("HEALTHCHECK_ROUTE", self.healthcheck_route.clone());
        subs.insert(
            "READINESS_INITIAL_DELAY",
            self.readiness_initial_delay_seconds.to_string(),
        );
        if let Some(streaming) = &self.streaming {
            subs.insert(
                "STREAMING_COMMAND",
                json_string_list(&streaming.streaming_command),
            );
            subs.insert(
                "STREAMING_PREDICT_ROUTE",
                streaming.streaming_predict_route.clone(),
            );
        }
    }
}

impl TritonArguments {
    fn extend(&self, subs: &mut Substitutions) {
        subs.insert("TRITON_MODEL_REPOSITORY", self.model_repository.clone());
        subs.insert("TRITON_CPUS", self.cpus.clone());
        subs.insert("TRITON_MEMORY", self.memory.clone());
        subs.insert("TRITON_STORAGE", self.storage.clone());
        subs.insert("TRITON_COMMIT_TAG", self.commit_tag.clone());
        subs.insert(
            "TRITON_READINESS_INITIAL_DELAY",
            self.readiness_initial_delay_seconds.to_string(),
        );
    }
}

/// Substitutions for the user-config and endpoint-config artifacts.
#[derive(Clone, Debug)]
pub struct ConfigMapArguments {
    pub resource_group_name: String,
    pub namespace: String,
    pub endpoint_id: String,
    pub endpoint_name: String,
    pub labels: BTreeMap<String, String>,
    pub raw_data: String,
    key: &'static str,
}

impl ConfigMapArguments {
    /// Which raw-data placeholder this artifact's template uses.
    pub fn substitutions(&self) -> Substitutions {
        let mut subs = Substitutions::new();
        subs.insert("RESOURCE_NAME", self.resource_group_name.clone());
        subs.insert("NAMESPACE", self.namespace.clone());
        subs.insert("ENDPOINT_ID", self.endpoint_id.clone());
        subs.insert("ENDPOINT_NAME", self.endpoint_name.clone());
        subs.insert("LABELS", json_string_map(&self.labels));
        subs.insert(self.key, self.raw_data.clone());
        subs
    }
}

/// Substitutions for the horizontal autoscaler template.
#[derive(Clone, Debug)]
pub struct HorizontalAutoscalerArguments {
    pub resource_group_name: String,
    pub namespace: String,
    pub endpoint_id: String,
    pub endpoint_name: String,
    pub labels: BTreeMap<String, String>,
    pub api_version: String,
    pub min_workers: u32,
    pub max_workers: u32,
    pub concurrency: String,
}

impl HorizontalAutoscalerArguments {
    pub fn substitutions(&self) -> Substitutions {
        let mut subs = Substitutions::new();
        subs.insert("RESOURCE_NAME", self.resource_group_name.clone());
        subs.insert("NAMESPACE", self.namespace.clone());
        subs.insert("ENDPOINT_ID", self.endpoint_id.clone());
        subs.insert("ENDPOINT_NAME", self.endpoint_name.clone());
        subs.insert("LABELS", json_string_map(&self.labels));
        subs.insert("API_VERSION", self.api_version.clone());
        subs.insert("MIN_WORKERS", self.min_workers.to_string());
        subs.insert("MAX_WORKERS", self.max_workers.to_string());
        subs.insert("CONCURRENCY", self.concurrency.clone());
        subs
    }
}

/// Substitutions for the vertical autoscaler template.
#[derive(Clone, Debug)]
pub struct VerticalAutoscalerArguments {
    pub resource_group_name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub cpus: String,
    pub memory: String,
}

impl VerticalAutoscalerArguments {
    pub fn substitutions(&self) -> Substitutions {
        let mut subs = Substitutions::new();
        subs.insert("RESOURCE_NAME", self.resource_group_name.clone());
        subs.insert("NAMESPACE", self.namespace.clone());
        subs.insert("LABELS", json_string_map(&self.labels));
        subs.insert("CPUS", self.cpus.clone());
        subs.insert("MEMORY", self.memory.clone());
        subs
    }
}

/// Substitutions for the traffic service template.
#[derive(Clone, Debug)]
pub struct ServiceArguments {
    pub resource_group_name: String,
    pub namespace: String,
    pub endpoint_id: String,
    pub labels: BTreeMap<String, String>,
    pub service_type: String,
}

impl ServiceArguments {
    pub fn substitutions(&self) -> Substitutions {
        let mut subs = Substitutions::new();
        subs.insert("RESOURCE_NAME", self.resource_group_name.clone());
        subs.insert("NAMESPACE", self.namespace.clone());
        subs.insert("ENDPOINT_ID", self.endpoint_id.clone());
        subs.insert("LABELS", json_string_map(&self.labels));
        subs.insert("SERVICE_TYPE", self.service_type.clone());
        subs.insert("HTTP_PORT", ENDPOINT_HTTP_PORT.to_string());
        subs
    }
}

/// Substitutions for the routing policy template.
#[derive(Clone, Debug)]
pub struct VirtualServiceArguments {
    pub resource_group_name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub dns_host_domain: String,
}

impl VirtualServiceArguments {
    pub fn substitutions(&self) -> Substitutions {
        let mut subs = Substitutions::new();
        subs.insert("RESOURCE_NAME", self.resource_group_name.clone());
        subs.insert("NAMESPACE", self.namespace.clone());
        subs.insert("LABELS", json_string_map(&self.labels));
        subs.insert("DNS_HOST_DOMAIN", self.dns_host_domain.clone());
        subs
    }
}

/// Substitutions for the destination policy template.
#[derive(Clone, Debug)]
pub struct DestinationRuleArguments {
    pub resource_group_name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
}

impl DestinationRuleArguments {
    pub fn substitutions(&self) -> Substitutions {
        let mut subs = Substitutions::new();
        subs.insert("RESOURCE_NAME", self.resource_group_name.clone());
        subs.insert("NAMESPACE", self.namespace.clone());
        subs.insert("LABELS", json_string_map(&self.labels));
        subs
    }
}

/// Derives per-template argument structs from one reconcile request.
pub struct ArgumentSource<'a> {
    request: &'a CreateOrUpdateResourcesRequest,
    config: &'a ReconcilerConfig,
    resource_group_name: &'a str,
    queue_name: &'a str,
    queue_url: &'a str,
}

impl<'a> ArgumentSource<'a> {
    pub fn new(
        request: &'a CreateOrUpdateResourcesRequest,
        config: &'a ReconcilerConfig,
        resource_group_name: &'a str,
        queue_name: &'a str,
        queue_url: &'a str,
    ) -> Self {
        ArgumentSource {
            request,
            config,
            resource_group_name,
            queue_name,
            queue_url,
        }
    }

    /// Labels stamped onto every object of the endpoint: the user's own
    /// labels, the selector labels the observer relies on, and the
    /// observability tags the env injection reads back.
    pub fn object_labels(&self) -> BTreeMap<String, String> {
        let build = &self.request.build_endpoint_request;
        let record = &build.model_endpoint_record;
        let mut labels = build.labels.clone();
        labels.insert("app".to_string(), self.resource_group_name.to_string());
        labels.insert(ENDPOINT_ID_LABEL.to_string(), record.id.clone());
        labels.insert("endpoint_name".to_string(), record.name.clone());
        labels.insert(
            DEPLOYMENT_NAME_LABEL.to_string(),
            self.resource_group_name.to_string(),
        );
        labels.insert("created_by".to_string(), record.created_by.clone());
        labels.insert("owner".to_string(), record.owner.clone());
        labels.insert(DD_ENV_LABEL.to_string(), self.config.environment.clone());
        labels.insert(DD_SERVICE_LABEL.to_string(), record.name.clone());
        labels.insert(DD_VERSION_LABEL.to_string(), self.config.release_tag.clone());
        labels
    }

    /// The deployment template this request selects.
    pub fn deployment_template_key(&self) -> String {
        let build = &self.request.build_endpoint_request;
        let record = &build.model_endpoint_record;
        deployment_template_key(
            record.current_model_bundle.flavor.flavor_class(),
            record.endpoint_type,
            Device::for_gpus(build.gpus),
        )
    }

    pub fn deployment(&self) -> Result<DeploymentArguments, Error> {
        let build = &self.request.build_endpoint_request;
        let record = &build.model_endpoint_record;
        let flavor = &record.current_model_bundle.flavor;

        let gpu_type = match (build.gpus, build.gpu_type) {
            (0, _) => None,
            (_, Some(gpu_type)) => Some(gpu_type),
            (_, None) => {
                return Err(Error::Validation(format!(
                    "endpoint {} requests {} gpus but no gpu type",
                    record.id, build.gpus
                )))
            }
        };

        let streaming = |flavor: &ModelBundleFlavor| -> Result<Option<StreamingArguments>, Error> {
            if record.endpoint_type != ModelEndpointType::Streaming {
                return Ok(None);
            }
            match flavor {
                ModelBundleFlavor::StreamingEnhancedRunnableImage(enhanced) => {
                    Ok(Some(StreamingArguments {
                        streaming_command: enhanced.streaming_command.clone(),
                        streaming_predict_route: enhanced.streaming_predict_route.clone(),
                    }))
                }
                _ => Err(Error::Validation(format!(
                    "endpoint {} is a streaming endpoint but its bundle has no streaming command",
                    record.id
                ))),
            }
        };

        let flavor_arguments = match flavor {
            ModelBundleFlavor::Artifact(artifact) => DeploymentFlavorArguments::Artifact {
                bundle_url: artifact.location.clone(),
            },
            ModelBundleFlavor::RunnableImage(image) => {
                DeploymentFlavorArguments::RunnableImage(RunnableImageArguments {
                    command: image.command.clone(),
                    predict_route: image.predict_route.clone(),
                    healthcheck_route: image.healthcheck_route.clone(),
                    readiness_initial_delay_seconds: image.readiness_initial_delay_seconds,
                    streaming: streaming(flavor)?,
                })
            }
            ModelBundleFlavor::StreamingEnhancedRunnableImage(enhanced) => {
                DeploymentFlavorArguments::RunnableImage(RunnableImageArguments {
                    command: enhanced.image.command.clone(),
                    predict_route: enhanced.image.predict_route.clone(),
                    healthcheck_route: enhanced.image.healthcheck_route.clone(),
                    readiness_initial_delay_seconds: enhanced.image.readiness_initial_delay_seconds,
                    streaming: streaming(flavor)?,
                })
            }
            ModelBundleFlavor::TritonEnhancedRunnableImage(triton) => {
                DeploymentFlavorArguments::TritonEnhancedRunnableImage {
                    runnable: RunnableImageArguments {
                        command: triton.image.command.clone(),
                        predict_route: triton.image.predict_route.clone(),
                        healthcheck_route: triton.image.healthcheck_route.clone(),
                        readiness_initial_delay_seconds: triton
                            .image
                            .readiness_initial_delay_seconds,
                        streaming: streaming(flavor)?,
                    },
                    triton: TritonArguments {
                        model_repository: triton.triton_model_repository.clone(),
                        cpus: triton.triton_num_cpu.to_string(),
                        memory: triton.triton_memory.clone().unwrap_or_else(|| "4Gi".into()),
                        storage: triton.triton_storage.clone().unwrap_or_else(|| "1Gi".into()),
                        commit_tag: triton.triton_commit_tag.clone(),
                        readiness_initial_delay_seconds: triton
                            .triton_readiness_initial_delay_seconds,
                    },
                }
            }
        };

        Ok(DeploymentArguments {
            resource_group_name: self.resource_group_name.to_string(),
            namespace: self.config.endpoint_namespace.clone(),
            endpoint_id: record.id.clone(),
            endpoint_name: record.name.clone(),
            labels: self.object_labels(),
            priority_class: if build.high_priority {
                LLM_ENGINE_HIGH_PRIORITY_CLASS
            } else {
                LLM_ENGINE_DEFAULT_PRIORITY_CLASS
            },
            image: self.request.image.clone(),
            cpus: build.cpus.clone(),
            memory: build.memory.clone(),
            storage: build.storage.clone(),
            gpus: build.gpus,
            gpu_type,
            min_workers: build.min_workers,
            max_workers: build.max_workers,
            per_worker: build.per_worker,
            aws_role: build.aws_role.clone(),
            results_s3_bucket: build.results_s3_bucket.clone(),
            queue_name: self.queue_name.to_string(),
            queue_url: self.queue_url.to_string(),
            prewarm: build.prewarm,
            flavor: flavor_arguments,
        })
    }

    pub fn user_config(&self) -> Result<ConfigMapArguments, Error> {
        let build = &self.request.build_endpoint_request;
        let payload = build
            .app_config
            .clone()
            .or_else(|| match &build.model_endpoint_record.current_model_bundle.flavor {
                ModelBundleFlavor::Artifact(artifact) => artifact.app_config.clone(),
                _ => None,
            })
            .unwrap_or(serde_json::Value::Null);
        self.config_map_arguments("CONFIG_DATA_SERIALIZED", &payload)
    }

    pub fn endpoint_config(&self) -> Result<ConfigMapArguments, Error> {
        let build = &self.request.build_endpoint_request;
        let record = &build.model_endpoint_record;
        let payload = build.endpoint_config.clone().unwrap_or(ModelEndpointConfig {
            endpoint_name: record.name.clone(),
            bundle_name: record.current_model_bundle.name.clone(),
            post_inference_hooks: None,
        });
        self.config_map_arguments("ENDPOINT_CONFIG_SERIALIZED", &payload)
    }

    fn config_map_arguments<T: serde::Serialize>(
        &self,
        key: &'static str,
        payload: &T,
    ) -> Result<ConfigMapArguments, Error> {
        let record = &self.request.build_endpoint_request.model_endpoint_record;
        let raw_data = encode_raw_data(payload)
            .map_err(|err| Error::Validation(format!("config payload not serializable: {err}")))?;
        Ok(ConfigMapArguments {
            resource_group_name: self.resource_group_name.to_string(),
            namespace: self.config.endpoint_namespace.clone(),
            endpoint_id: record.id.clone(),
            endpoint_name: record.name.clone(),
            labels: self.object_labels(),
            raw_data,
            key,
        })
    }

    pub fn horizontal_autoscaler(&self, api_version: &str) -> HorizontalAutoscalerArguments {
        let build = &self.request.build_endpoint_request;
        let record = &build.model_endpoint_record;
        HorizontalAutoscalerArguments {
            resource_group_name: self.resource_group_name.to_string(),
            namespace: self.config.endpoint_namespace.clone(),
            endpoint_id: record.id.clone(),
            endpoint_name: record.name.clone(),
            labels: self.object_labels(),
            api_version: api_version.to_string(),
            min_workers: build.min_workers,
            max_workers: build.max_workers,
            concurrency: concurrency_target_from_per_worker(build.per_worker),
        }
    }

    pub fn vertical_autoscaler(&self) -> VerticalAutoscalerArguments {
        let build = &self.request.build_endpoint_request;
        VerticalAutoscalerArguments {
            resource_group_name: self.resource_group_name.to_string(),
            namespace: self.config.endpoint_namespace.clone(),
            labels: self.object_labels(),
            cpus: build.cpus.clone(),
            memory: build.memory.clone(),
        }
    }

    pub fn service(&self) -> ServiceArguments {
        let record = &self.request.build_endpoint_request.model_endpoint_record;
        ServiceArguments {
            resource_group_name: self.resource_group_name.to_string(),
            namespace: self.config.endpoint_namespace.clone(),
            endpoint_id: record.id.clone(),
            labels: self.object_labels(),
            service_type: "ClusterIP".to_string(),
        }
    }

    pub fn virtual_service(&self) -> VirtualServiceArguments {
        VirtualServiceArguments {
            resource_group_name: self.resource_group_name.to_string(),
            namespace: self.config.endpoint_namespace.clone(),
            labels: self.object_labels(),
            dns_host_domain: self.config.dns_host_domain.clone(),
        }
    }

    pub fn destination_rule(&self) -> DestinationRuleArguments {
        DestinationRuleArguments {
            resource_group_name: self.resource_group_name.to_string(),
            namespace: self.config.endpoint_namespace.clone(),
            labels: self.object_labels(),
        }
    }
}
