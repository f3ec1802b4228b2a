//! In-memory apiserver for tests.
//!
//! Wraps a `tower_test` mock service in just enough apiserver behavior to
//! drive the reconciler end to end: an object store keyed by plural and
//! name, conflict on duplicate create, merge patch, replace, delete,
//! label-selector list filtering and the `/version` probe. Failure
//! injection covers the paths the operators have to survive: patch
//! rejections and undecodable autoscaler patch responses.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex},
};

use http::{Method, Request, Response};
use http_body_util::BodyExt;
use kube::{client::Body, Client};
use serde_json::{json, Value};

use llm_engine_core::deep_merge;

/// Namespace every test object lives in.
pub const NAMESPACE: &str = "llm-engine-test";

#[derive(Default)]
struct ClusterState {
    objects: BTreeMap<String, BTreeMap<String, Value>>,
    calls: Vec<(String, String)>,
    minor_version: String,
    reject_patch: BTreeMap<String, u16>,
    corrupt_autoscaler_patch: bool,
    missing_lists: BTreeSet<String>,
    resource_version: u64,
}

/// Handle over one fake cluster; clones of the client share its store.
#[derive(Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        let cluster = FakeCluster::default();
        cluster.state.lock().unwrap().minor_version = "26".to_string();
        cluster
    }

    /// A client whose requests are served from this cluster's store. The
    /// serving task ends when the client is dropped.
    pub fn client(&self) -> Client {
        let (mock_service, mut handle) =
            tower_test::mock::pair::<Request<Body>, Response<Body>>();
        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some((request, send)) = handle.next_request().await {
                let response = respond(&state, request).await;
                send.send_response(response);
            }
        });
        Client::new(mock_service, NAMESPACE)
    }

    pub fn seed(&self, plural: &str, name: &str, mut body: Value) {
        let mut state = self.state.lock().unwrap();
        state.resource_version += 1;
        let version = state.resource_version.to_string();
        if let Some(metadata) = body.get_mut("metadata").and_then(Value::as_object_mut) {
            metadata
                .entry("resourceVersion")
                .or_insert_with(|| Value::String(version));
        }
        state
            .objects
            .entry(plural.to_string())
            .or_default()
            .insert(name.to_string(), body);
    }

    pub fn object(&self, plural: &str, name: &str) -> Option<Value> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(plural)
            .and_then(|objects| objects.get(name))
            .cloned()
    }

    /// Mutate one stored object in place, as an external controller would.
    pub fn update(&self, plural: &str, name: &str, mutate: impl FnOnce(&mut Value)) {
        let mut state = self.state.lock().unwrap();
        if let Some(object) = state
            .objects
            .get_mut(plural)
            .and_then(|objects| objects.get_mut(name))
        {
            mutate(object);
        }
    }

    pub fn count(&self, plural: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(plural)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_matching(&self, method: &str, path_fragment: &str) -> usize {
        self.calls()
            .iter()
            .filter(|(m, path)| m == method && path.contains(path_fragment))
            .count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn set_minor_version(&self, minor: &str) {
        self.state.lock().unwrap().minor_version = minor.to_string();
    }

    /// Make every patch against `plural` fail with `code`.
    pub fn reject_patch(&self, plural: &str, code: u16) {
        self.state
            .lock()
            .unwrap()
            .reject_patch
            .insert(plural.to_string(), code);
    }

    /// Apply autoscaler patches but answer them with bodies that fail
    /// client-side decoding, like the real apiserver's bogus `conditions`.
    pub fn corrupt_autoscaler_patch_responses(&self) {
        self.state.lock().unwrap().corrupt_autoscaler_patch = true;
    }

    /// Answer list calls for `plural` with 404, as for an uninstalled CRD.
    pub fn remove_list_api(&self, plural: &str) {
        self.state
            .lock()
            .unwrap()
            .missing_lists
            .insert(plural.to_string());
    }
}

async fn respond(state: &Arc<Mutex<ClusterState>>, request: Request<Body>) -> Response<Body> {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or_default().to_string();
    let bytes = match request.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => return status_failure(400, "BadRequest", "unreadable body"),
    };
    let body: Option<Value> = serde_json::from_slice(&bytes).ok();

    let mut state = state.lock().unwrap();
    state.calls.push((method.to_string(), path.clone()));
    route(&mut state, &method, &path, &query, body)
}

fn route(
    state: &mut ClusterState,
    method: &Method,
    path: &str,
    query: &str,
    body: Option<Value>,
) -> Response<Body> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments == ["version"] {
        return json_response(
            200,
            &json!({
                "major": "1",
                "minor": state.minor_version.clone(),
                "gitVersion": format!("v1.{}.0", state.minor_version),
                "gitCommit": "0000000000000000000000000000000000000000",
                "gitTreeState": "clean",
                "buildDate": "2024-01-01T00:00:00Z",
                "goVersion": "go1.21.0",
                "compiler": "gc",
                "platform": "linux/amd64",
            }),
        );
    }

    let (plural, name) = match segments.as_slice() {
        ["api", "v1", "namespaces", _, plural, rest @ ..]
        | ["apis", _, _, "namespaces", _, plural, rest @ ..] => (*plural, rest.first().copied()),
        _ => return status_failure(404, "NotFound", "unhandled path"),
    };

    match (method, name) {
        (&Method::GET, Some(name)) => match state.objects.get(plural).and_then(|o| o.get(name)) {
            Some(object) => json_response(200, object),
            None => not_found(plural, name),
        },
        (&Method::GET, None) => {
            if state.missing_lists.contains(plural) {
                return status_failure(404, "NotFound", "the server could not find the requested resource");
            }
            let selector = label_selector(query);
            let items: Vec<Value> = state
                .objects
                .get(plural)
                .map(|objects| {
                    objects
                        .values()
                        .filter(|object| matches_selector(object, selector.as_deref()))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            json_response(
                200,
                &json!({"apiVersion": "v1", "kind": "List", "metadata": {"resourceVersion": "1"}, "items": items}),
            )
        }
        (&Method::POST, None) => {
            let Some(mut object) = body else {
                return status_failure(400, "BadRequest", "missing body");
            };
            let Some(name) = object
                .pointer("/metadata/name")
                .and_then(Value::as_str)
                .map(str::to_string)
            else {
                return status_failure(422, "Invalid", "metadata.name is required");
            };
            if state
                .objects
                .get(plural)
                .map(|objects| objects.contains_key(&name))
                .unwrap_or(false)
            {
                return status_failure(409, "AlreadyExists", "object already exists");
            }
            state.resource_version += 1;
            let version = state.resource_version.to_string();
            if let Some(metadata) = object.get_mut("metadata").and_then(Value::as_object_mut) {
                metadata.insert("resourceVersion".to_string(), Value::String(version));
            }
            state
                .objects
                .entry(plural.to_string())
                .or_default()
                .insert(name, object.clone());
            json_response(201, &object)
        }
        (&Method::PATCH, Some(name)) => {
            if let Some(code) = state.reject_patch.get(plural) {
                let reason = if *code == 409 { "Conflict" } else { "Invalid" };
                return status_failure(*code, reason, "patch rejected");
            }
            let Some(patch) = body else {
                return status_failure(400, "BadRequest", "missing body");
            };
            let Some(existing) = state.objects.get(plural).and_then(|o| o.get(name)).cloned()
            else {
                return not_found(plural, name);
            };
            let merged = deep_merge(existing, patch);
            state
                .objects
                .entry(plural.to_string())
                .or_default()
                .insert(name.to_string(), merged.clone());
            if plural == "horizontalpodautoscalers" && state.corrupt_autoscaler_patch {
                // applied, but the response does not decode
                return json_response(
                    200,
                    &json!({"status": {"conditions": [{"type": 42, "status": true}]}}),
                );
            }
            json_response(200, &merged)
        }
        (&Method::PUT, Some(name)) => {
            let Some(mut object) = body else {
                return status_failure(400, "BadRequest", "missing body");
            };
            if !state
                .objects
                .get(plural)
                .map(|o| o.contains_key(name))
                .unwrap_or(false)
            {
                return not_found(plural, name);
            }
            state.resource_version += 1;
            if let Some(metadata) = object.get_mut("metadata").and_then(Value::as_object_mut) {
                metadata.insert(
                    "resourceVersion".to_string(),
                    Value::String(state.resource_version.to_string()),
                );
            }
            state
                .objects
                .entry(plural.to_string())
                .or_default()
                .insert(name.to_string(), object.clone());
            json_response(200, &object)
        }
        (&Method::DELETE, Some(name)) => {
            let removed = state
                .objects
                .get_mut(plural)
                .and_then(|objects| objects.remove(name));
            match removed {
                Some(_) => json_response(
                    200,
                    &json!({"apiVersion": "v1", "kind": "Status", "status": "Success", "code": 200}),
                ),
                None => not_found(plural, name),
            }
        }
        _ => status_failure(405, "MethodNotAllowed", "unhandled method"),
    }
}

fn label_selector(query: &str) -> Option<String> {
    query
        .split('&')
        .find_map(|param| param.strip_prefix("labelSelector="))
        .map(|raw| raw.replace("%3D", "="))
}

fn matches_selector(object: &Value, selector: Option<&str>) -> bool {
    let Some(selector) = selector else {
        return true;
    };
    let Some((key, value)) = selector.split_once('=') else {
        return true;
    };
    object
        .pointer(&format!("/metadata/labels/{}", key.replace('/', "~1")))
        .and_then(Value::as_str)
        .map(|found| found == value)
        .unwrap_or(false)
}

fn json_response(code: u16, body: &Value) -> Response<Body> {
    let bytes = body.to_string().into_bytes();
    Response::builder()
        .status(code)
        .body(Body::from(bytes))
        .expect("static response parts")
}

fn not_found(plural: &str, name: &str) -> Response<Body> {
    status_failure(404, "NotFound", &format!("{plural} {name:?} not found"))
}

fn status_failure(code: u16, reason: &str, message: &str) -> Response<Body> {
    json_response(
        code,
        &json!({
            "apiVersion": "v1",
            "kind": "Status",
            "status": "Failure",
            "message": message,
            "reason": reason,
            "code": code,
        }),
    )
}

/// Shared request, config and template fixtures.
pub mod fixtures {
    use std::collections::BTreeMap;
    use std::path::{Path, PathBuf};

    use llm_engine_core::{
        ArtifactBundle, BuildEndpointRequest, ClusterVersion, CreateOrUpdateResourcesRequest,
        GpuType, ModelBundle, ModelBundleFlavor, ModelBundleFramework, ModelEndpointRecord,
        ModelEndpointType, RunnableImage, StreamingEnhancedRunnableImage,
    };
    use serde_json::json;

    use crate::config::ReconcilerConfig;

    pub fn config(template_folder: Option<PathBuf>) -> ReconcilerConfig {
        ReconcilerConfig {
            endpoint_namespace: super::NAMESPACE.to_string(),
            default_aws_role: "default-ml-role".to_string(),
            default_results_s3_bucket: "default-results-bucket".to_string(),
            service_template_folder: template_folder,
            service_template_manifest: None,
            dns_host_domain: "ml.internal.example.com".to_string(),
            environment: "test".to_string(),
            release_tag: "test-release".to_string(),
            trace_enabled: true,
            fixed_cluster_version: Some(ClusterVersion::new(1, 26)),
        }
    }

    fn runnable_image() -> RunnableImage {
        RunnableImage {
            repository: "ghcr.io/acme/answerer".to_string(),
            tag: "abc123".to_string(),
            command: vec!["python".to_string(), "serve.py".to_string()],
            env: BTreeMap::new(),
            predict_route: "/predict".to_string(),
            healthcheck_route: "/readyz".to_string(),
            readiness_initial_delay_seconds: 120,
            protocol: "http".to_string(),
        }
    }

    fn record(
        endpoint_id: &str,
        endpoint_type: ModelEndpointType,
        flavor: ModelBundleFlavor,
    ) -> ModelEndpointRecord {
        ModelEndpointRecord {
            id: endpoint_id.to_string(),
            name: format!("{endpoint_id}-name"),
            created_by: "user-1".to_string(),
            owner: "team-infra".to_string(),
            endpoint_type,
            current_model_bundle: ModelBundle {
                id: format!("bundle-{endpoint_id}"),
                name: "answerer-bundle".to_string(),
                flavor,
            },
        }
    }

    pub fn sync_gpu_request(endpoint_id: &str) -> CreateOrUpdateResourcesRequest {
        CreateOrUpdateResourcesRequest {
            build_endpoint_request: BuildEndpointRequest {
                model_endpoint_record: record(
                    endpoint_id,
                    ModelEndpointType::Sync,
                    ModelBundleFlavor::RunnableImage(runnable_image()),
                ),
                min_workers: 1,
                max_workers: 3,
                per_worker: 4,
                cpus: "2".to_string(),
                gpus: 1,
                memory: "8Gi".to_string(),
                storage: "16Gi".to_string(),
                gpu_type: Some(GpuType::TeslaT4),
                optimize_costs: false,
                prewarm: true,
                high_priority: true,
                aws_role: "ml-worker-role".to_string(),
                results_s3_bucket: "inference-results".to_string(),
                labels: BTreeMap::from([("team".to_string(), "infra".to_string())]),
                app_config: Some(json!({"temperature": 0.2})),
                endpoint_config: None,
            },
            image: "ghcr.io/acme/answerer:abc123".to_string(),
        }
    }

    pub fn streaming_gpu_request(endpoint_id: &str) -> CreateOrUpdateResourcesRequest {
        let mut request = sync_gpu_request(endpoint_id);
        request
            .build_endpoint_request
            .model_endpoint_record
            .endpoint_type = ModelEndpointType::Streaming;
        request
            .build_endpoint_request
            .model_endpoint_record
            .current_model_bundle
            .flavor = ModelBundleFlavor::StreamingEnhancedRunnableImage(
            StreamingEnhancedRunnableImage {
                image: runnable_image(),
                streaming_command: vec![
                    "python".to_string(),
                    "serve.py".to_string(),
                    "--stream".to_string(),
                ],
                streaming_predict_route: "/stream".to_string(),
            },
        );
        request
    }

    pub fn async_cpu_request(endpoint_id: &str) -> CreateOrUpdateResourcesRequest {
        CreateOrUpdateResourcesRequest {
            build_endpoint_request: BuildEndpointRequest {
                model_endpoint_record: record(
                    endpoint_id,
                    ModelEndpointType::Async,
                    ModelBundleFlavor::Artifact(ArtifactBundle {
                        location: format!("s3://bundles/{endpoint_id}"),
                        framework: ModelBundleFramework::Pytorch {
                            pytorch_image_tag: "1.13-cuda".to_string(),
                        },
                        requirements: vec!["numpy".to_string()],
                        app_config: None,
                    }),
                ),
                min_workers: 0,
                max_workers: 1,
                per_worker: 2,
                cpus: "1".to_string(),
                gpus: 0,
                memory: "4Gi".to_string(),
                storage: "1Gi".to_string(),
                gpu_type: None,
                optimize_costs: false,
                prewarm: false,
                high_priority: false,
                aws_role: "ml-worker-role".to_string(),
                results_s3_bucket: "inference-results".to_string(),
                labels: BTreeMap::from([("team".to_string(), "infra".to_string())]),
                app_config: Some(json!({"batch_size": 8})),
                endpoint_config: None,
            },
            image: "registry.example.com/llm-engine/artifact-runner:stable".to_string(),
        }
    }

    const DEPLOYMENT_RUNNABLE_SYNC_GPU: &str = r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: ${RESOURCE_NAME}
  namespace: ${NAMESPACE}
  labels: ${LABELS}
spec:
  replicas: ${MIN_WORKERS}
  selector:
    matchLabels:
      app: ${RESOURCE_NAME}
  template:
    metadata:
      labels: ${LABELS}
    spec:
      priorityClassName: ${PRIORITY}
      nodeSelector:
        k8s.amazonaws.com/accelerator: ${GPU_TYPE}
      containers:
        - name: http-forwarder
          image: registry.example.com/llm-engine/http-forwarder:stable
          command: ["http-forwarder", "--route", "${PREDICT_ROUTE}", "--port", "${HTTP_PORT}"]
          env:
            - name: AWS_PROFILE
              value: ${AWS_ROLE}
            - name: RESULTS_S3_BUCKET
              value: ${RESULTS_S3_BUCKET}
            - name: PREWARM
              value: "${PREWARM}"
          resources:
            requests:
              cpu: 100m
              memory: 128Mi
        - name: main
          image: ${IMAGE}
          command: ${COMMAND}
          env:
            - name: BASE_PATH
              value: ${BASE_PATH}
            - name: PORT
              value: "${HTTP_PORT}"
          ports:
            - containerPort: ${HTTP_PORT}
          readinessProbe:
            httpGet:
              path: ${HEALTHCHECK_ROUTE}
              port: ${HTTP_PORT}
            initialDelaySeconds: ${READINESS_INITIAL_DELAY}
          resources:
            requests:
              cpu: "${CPUS}"
              memory: ${MEMORY}
              ephemeral-storage: ${STORAGE}
            limits:
              nvidia.com/gpu: "${GPUS}"
"#;

    const DEPLOYMENT_RUNNABLE_STREAMING_GPU: &str = r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: ${RESOURCE_NAME}
  namespace: ${NAMESPACE}
  labels: ${LABELS}
spec:
  replicas: ${MIN_WORKERS}
  selector:
    matchLabels:
      app: ${RESOURCE_NAME}
  template:
    metadata:
      labels: ${LABELS}
    spec:
      priorityClassName: ${PRIORITY}
      nodeSelector:
        k8s.amazonaws.com/accelerator: ${GPU_TYPE}
      containers:
        - name: http-forwarder
          image: registry.example.com/llm-engine/http-forwarder:stable
          command: ["http-forwarder", "--route", "${STREAMING_PREDICT_ROUTE}", "--port", "${HTTP_PORT}"]
          env:
            - name: AWS_PROFILE
              value: ${AWS_ROLE}
            - name: RESULTS_S3_BUCKET
              value: ${RESULTS_S3_BUCKET}
            - name: PREWARM
              value: "${PREWARM}"
          resources:
            requests:
              cpu: 100m
              memory: 128Mi
        - name: main
          image: ${IMAGE}
          command: ${STREAMING_COMMAND}
          ports:
            - containerPort: ${HTTP_PORT}
          readinessProbe:
            httpGet:
              path: ${HEALTHCHECK_ROUTE}
              port: ${HTTP_PORT}
            initialDelaySeconds: ${READINESS_INITIAL_DELAY}
          resources:
            requests:
              cpu: "${CPUS}"
              memory: ${MEMORY}
              ephemeral-storage: ${STORAGE}
            limits:
              nvidia.com/gpu: "${GPUS}"
"#;

    const DEPLOYMENT_ARTIFACT_ASYNC_CPU: &str = r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: ${RESOURCE_NAME}
  namespace: ${NAMESPACE}
  labels: ${LABELS}
  annotations:
    celery.scaleml.autoscaler/minWorkers: "${MIN_WORKERS}"
    celery.scaleml.autoscaler/maxWorkers: "${MAX_WORKERS}"
    celery.scaleml.autoscaler/perWorker: "${PER_WORKER}"
spec:
  replicas: ${MIN_WORKERS}
  selector:
    matchLabels:
      app: ${RESOURCE_NAME}
  template:
    metadata:
      labels: ${LABELS}
    spec:
      priorityClassName: ${PRIORITY}
      containers:
        - name: main
          image: ${IMAGE}
          command: ["python", "-m", "llm_engine.inference.worker"]
          env:
            - name: BUNDLE_URL
              value: ${BUNDLE_URL}
            - name: BASE_PATH
              value: ${BASE_PATH}
            - name: AWS_PROFILE
              value: ${AWS_ROLE}
            - name: RESULTS_S3_BUCKET
              value: ${RESULTS_S3_BUCKET}
            - name: PREWARM
              value: "${PREWARM}"
            - name: SQS_QUEUE_NAME
              value: ${SQS_QUEUE_NAME}
            - name: SQS_QUEUE_URL
              value: ${SQS_QUEUE_URL}
          resources:
            requests:
              cpu: "${CPUS}"
              memory: ${MEMORY}
              ephemeral-storage: ${STORAGE}
"#;

    const DEPLOYMENT_RUNNABLE_ASYNC_CPU: &str = r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: ${RESOURCE_NAME}
  namespace: ${NAMESPACE}
  labels: ${LABELS}
  annotations:
    celery.scaleml.autoscaler/minWorkers: "${MIN_WORKERS}"
    celery.scaleml.autoscaler/maxWorkers: "${MAX_WORKERS}"
    celery.scaleml.autoscaler/perWorker: "${PER_WORKER}"
spec:
  replicas: ${MIN_WORKERS}
  selector:
    matchLabels:
      app: ${RESOURCE_NAME}
  template:
    metadata:
      labels: ${LABELS}
    spec:
      priorityClassName: ${PRIORITY}
      containers:
        - name: celery-forwarder
          image: registry.example.com/llm-engine/celery-forwarder:stable
          command: ["celery-forwarder", "--queue", "${SQS_QUEUE_NAME}"]
          env:
            - name: AWS_PROFILE
              value: ${AWS_ROLE}
            - name: RESULTS_S3_BUCKET
              value: ${RESULTS_S3_BUCKET}
            - name: PREWARM
              value: "${PREWARM}"
            - name: SQS_QUEUE_URL
              value: ${SQS_QUEUE_URL}
          resources:
            requests:
              cpu: 100m
              memory: 128Mi
        - name: main
          image: ${IMAGE}
          command: ${COMMAND}
          resources:
            requests:
              cpu: "${CPUS}"
              memory: ${MEMORY}
              ephemeral-storage: ${STORAGE}
"#;

    const HORIZONTAL_POD_AUTOSCALER: &str = r#"apiVersion: ${API_VERSION}
kind: HorizontalPodAutoscaler
metadata:
  name: ${RESOURCE_NAME}
  namespace: ${NAMESPACE}
  labels: ${LABELS}
spec:
  scaleTargetRef:
    apiVersion: apps/v1
    kind: Deployment
    name: ${RESOURCE_NAME}
  minReplicas: ${MIN_WORKERS}
  maxReplicas: ${MAX_WORKERS}
  metrics:
    - type: Pods
      pods:
        metric:
          name: request-concurrency-average
        target:
          type: AverageValue
          averageValue: "${CONCURRENCY}"
"#;

    const USER_CONFIG: &str = r#"apiVersion: v1
kind: ConfigMap
metadata:
  name: ${RESOURCE_NAME}
  namespace: ${NAMESPACE}
  labels: ${LABELS}
data:
  raw_data: "${CONFIG_DATA_SERIALIZED}"
"#;

    const ENDPOINT_CONFIG: &str = r#"apiVersion: v1
kind: ConfigMap
metadata:
  name: ${RESOURCE_NAME}-endpoint-config
  namespace: ${NAMESPACE}
  labels: ${LABELS}
data:
  raw_data: "${ENDPOINT_CONFIG_SERIALIZED}"
"#;

    const SERVICE: &str = r#"apiVersion: v1
kind: Service
metadata:
  name: ${RESOURCE_NAME}
  namespace: ${NAMESPACE}
  labels: ${LABELS}
spec:
  type: ${SERVICE_TYPE}
  selector:
    app: ${RESOURCE_NAME}
  ports:
    - port: ${HTTP_PORT}
      targetPort: ${HTTP_PORT}
      protocol: TCP
"#;

    const VERTICAL_POD_AUTOSCALER: &str = r#"apiVersion: autoscaling.k8s.io/v1
kind: VerticalPodAutoscaler
metadata:
  name: ${RESOURCE_NAME}
  namespace: ${NAMESPACE}
  labels: ${LABELS}
spec:
  targetRef:
    apiVersion: apps/v1
    kind: Deployment
    name: ${RESOURCE_NAME}
  updatePolicy:
    updateMode: Auto
  resourcePolicy:
    containerPolicies:
      - containerName: main
        minAllowed:
          cpu: 100m
          memory: 128Mi
        maxAllowed:
          cpu: "${CPUS}"
          memory: ${MEMORY}
        controlledResources: ["cpu", "memory"]
"#;

    const VIRTUAL_SERVICE: &str = r#"apiVersion: networking.istio.io/v1alpha3
kind: VirtualService
metadata:
  name: ${RESOURCE_NAME}
  namespace: ${NAMESPACE}
  labels: ${LABELS}
spec:
  hosts:
    - ${RESOURCE_NAME}.${DNS_HOST_DOMAIN}
  gateways:
    - default/internal-gateway
  http:
    - route:
        - destination:
            host: ${RESOURCE_NAME}.${NAMESPACE}.svc.cluster.local
            port:
              number: 80
"#;

    const DESTINATION_RULE: &str = r#"apiVersion: networking.istio.io/v1beta1
kind: DestinationRule
metadata:
  name: ${RESOURCE_NAME}
  namespace: ${NAMESPACE}
  labels: ${LABELS}
spec:
  host: ${RESOURCE_NAME}.${NAMESPACE}.svc.cluster.local
  trafficPolicy:
    loadBalancer:
      simple: LEAST_REQUEST
"#;

    /// Every template the reconciler can select, keyed the way the loader
    /// resolves them.
    pub fn templates() -> Vec<(&'static str, &'static str)> {
        vec![
            (
                "deployment-runnable-image-sync-gpu.yaml",
                DEPLOYMENT_RUNNABLE_SYNC_GPU,
            ),
            (
                "deployment-runnable-image-streaming-gpu.yaml",
                DEPLOYMENT_RUNNABLE_STREAMING_GPU,
            ),
            (
                "deployment-artifact-async-cpu.yaml",
                DEPLOYMENT_ARTIFACT_ASYNC_CPU,
            ),
            (
                "deployment-runnable-image-async-cpu.yaml",
                DEPLOYMENT_RUNNABLE_ASYNC_CPU,
            ),
            ("horizontal-pod-autoscaler.yaml", HORIZONTAL_POD_AUTOSCALER),
            ("user-config.yaml", USER_CONFIG),
            ("endpoint-config.yaml", ENDPOINT_CONFIG),
            ("service.yaml", SERVICE),
            ("vertical-pod-autoscaler.yaml", VERTICAL_POD_AUTOSCALER),
            ("virtual-service.yaml", VIRTUAL_SERVICE),
            ("destination-rule.yaml", DESTINATION_RULE),
        ]
    }

    pub fn write_templates(folder: &Path) {
        for (key, text) in templates() {
            std::fs::write(folder.join(key), text).expect("writable template fixture folder");
        }
    }
}
