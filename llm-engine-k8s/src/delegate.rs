//! The narrow facade over endpoint resource management.
//!
//! Four operations: materialize (`create_or_update_resources`), observe one
//! (`get_resources`), observe everything (`get_all_resources`) and tear
//! down (`delete_resources`). The reconcile and observe internals live in
//! the sibling modules and hang off this struct, kube-style.

use std::collections::BTreeMap;

use kube::Client;
use llm_engine_core::{CreateOrUpdateResourcesRequest, ModelEndpointInfraState, ModelEndpointType};
use tracing::error;

use crate::{
    apis::ApiSet,
    config::ReconcilerConfig,
    error::Result,
    template::TemplateLoader,
};

/// Materializes logical endpoints into cluster objects and back.
///
/// The delegate is cheap to construct and holds only handles: one client,
/// the template loader and the settings. Cluster state is never cached
/// beyond the set-once version probe, so a single delegate can serve many
/// concurrent endpoint operations.
pub struct EndpointResourceDelegate {
    pub(crate) apis: ApiSet,
    pub(crate) templates: TemplateLoader,
    pub(crate) config: ReconcilerConfig,
}

impl EndpointResourceDelegate {
    /// Build a delegate over `client`. The cluster-version probe is
    /// deferred to the first operation that needs it.
    pub fn new(client: Client, config: ReconcilerConfig) -> Result<Self> {
        let templates = TemplateLoader::from_config(&config)?;
        Ok(EndpointResourceDelegate {
            apis: ApiSet::new(client, &config),
            templates,
            config,
        })
    }

    /// Build a delegate and probe the cluster version up front.
    ///
    /// Use this from callers that bridge the delegate into synchronous
    /// code: the probe then happens on a known-good runtime instead of
    /// whichever context first touches the autoscaler surface.
    pub async fn connect(client: Client, config: ReconcilerConfig) -> Result<Self> {
        let delegate = Self::new(client, config)?;
        delegate.apis.cluster_version().await?;
        Ok(delegate)
    }

    /// Materialize or converge every object the endpoint's mode and flavor
    /// call for. Idempotent: partial prior materializations converge.
    pub async fn create_or_update_resources(
        &self,
        request: &CreateOrUpdateResourcesRequest,
        queue_name: Option<&str>,
        queue_url: Option<&str>,
    ) -> Result<()> {
        self.create_or_update_inner(
            request,
            queue_name.unwrap_or_default(),
            queue_url.unwrap_or_default(),
        )
        .await
        .inspect_err(|err| {
            error!(
                endpoint_id = %request.build_endpoint_request.model_endpoint_record.id,
                %err,
                "create_or_update_resources failed"
            );
        })
    }

    /// Read one endpoint's live objects back into canonical state, falling
    /// back to the legacy deployment name where needed.
    pub async fn get_resources(
        &self,
        endpoint_id: &str,
        deployment_name: &str,
        endpoint_type: ModelEndpointType,
    ) -> Result<ModelEndpointInfraState> {
        self.get_resources_inner(endpoint_id, deployment_name, endpoint_type)
            .await
            .inspect_err(|err| error!(%endpoint_id, %err, "get_resources failed"))
    }

    /// Read every endpoint in the namespace. Keys are endpoint ids where
    /// the workload carries a canonical name (flag `true`), otherwise the
    /// legacy name itself (flag `false`). Per-endpoint derivation errors
    /// are logged and skipped, never failing the batch.
    pub async fn get_all_resources(
        &self,
    ) -> Result<BTreeMap<String, (bool, ModelEndpointInfraState)>> {
        self.get_all_resources_inner()
            .await
            .inspect_err(|err| error!(%err, "get_all_resources failed"))
    }

    /// Tear down an endpoint's objects. Succeeds iff every mandatory
    /// sub-delete succeeded; the vertical autoscaler is best-effort.
    pub async fn delete_resources(
        &self,
        endpoint_id: &str,
        deployment_name: &str,
        endpoint_type: ModelEndpointType,
    ) -> Result<bool> {
        match endpoint_type {
            ModelEndpointType::Async => {
                self.delete_resources_async_inner(endpoint_id, deployment_name)
                    .await
            }
            ModelEndpointType::Sync | ModelEndpointType::Streaming => {
                self.delete_resources_sync_inner(endpoint_id, deployment_name)
                    .await
            }
        }
    }
}
