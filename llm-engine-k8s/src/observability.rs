//! Observability env injection for runnable-image workloads.
//!
//! Runnable images are user-supplied, so the tracer wiring cannot be baked
//! into the template the way it is for artifact images. Instead the loaded
//! deployment graph is rewritten before the apply: any previously injected
//! variables are dropped from the `main` container and the current set is
//! appended, which keeps repeated reconciles idempotent.

use serde_json::{json, Value};

use crate::arguments::{DD_ENV_LABEL, DD_SERVICE_LABEL, DD_VERSION_LABEL};
use crate::error::Error;

/// Env vars owned by the injection; replaced wholesale on every reconcile.
pub(crate) const OBSERVABILITY_ENV_VARS: [&str; 5] = [
    "DATADOG_TRACE_ENABLED",
    "DD_SERVICE",
    "DD_ENV",
    "DD_VERSION",
    "DD_AGENT_HOST",
];

/// Rewrite a deployment graph with the observability env on its `main`
/// container. Pure: the input graph is consumed and the updated graph
/// returned for the caller to apply.
pub(crate) fn with_observability_env(
    mut deployment: Value,
    trace_enabled: bool,
) -> Result<Value, Error> {
    let labels = deployment
        .pointer("/metadata/labels")
        .cloned()
        .unwrap_or(Value::Null);
    let label = |key: &str| -> Result<Value, Error> {
        labels.get(key).cloned().ok_or_else(|| {
            Error::Validation(format!("deployment template is missing the {key} label"))
        })
    };
    let service = label(DD_SERVICE_LABEL)?;
    let env_name = label(DD_ENV_LABEL)?;
    let version = label(DD_VERSION_LABEL)?;

    let containers = deployment
        .pointer_mut("/spec/template/spec/containers")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| {
            Error::Validation("deployment template has no containers list".to_string())
        })?;
    let main = containers
        .iter_mut()
        .find(|container| container["name"] == "main")
        .ok_or_else(|| {
            Error::Validation(
                "main container not found in deployment template when adding observability env"
                    .to_string(),
            )
        })?;

    let mut env: Vec<Value> = main
        .get("env")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .filter(|var| {
            var.get("name")
                .and_then(Value::as_str)
                .map(|name| !OBSERVABILITY_ENV_VARS.contains(&name))
                .unwrap_or(true)
        })
        .collect();
    env.extend([
        json!({"name": "DATADOG_TRACE_ENABLED", "value": trace_enabled.to_string()}),
        json!({"name": "DD_SERVICE", "value": service}),
        json!({"name": "DD_ENV", "value": env_name}),
        json!({"name": "DD_VERSION", "value": version}),
        json!({"name": "DD_AGENT_HOST", "valueFrom": {"fieldRef": {"fieldPath": "status.hostIP"}}}),
    ]);
    main["env"] = Value::Array(env);

    Ok(deployment)
}
