//! The create-or-update flow for one endpoint.
//!
//! The workload goes first since everything else points at it; after that
//! each object kind is independent. The sequence is deliberately
//! sequential: every apply is idempotent, so a failure mid-way leaves a
//! partial endpoint the next reconcile converges.

use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{ConfigMap, Service},
};
use tracing::debug;

use llm_engine_core::{naming, CreateOrUpdateResourcesRequest};

use crate::{
    apply,
    arguments::ArgumentSource,
    delegate::EndpointResourceDelegate,
    error::{Error, Result, TemplateError},
    observability::with_observability_env,
    template,
};

impl EndpointResourceDelegate {
    pub(crate) async fn create_or_update_inner(
        &self,
        request: &CreateOrUpdateResourcesRequest,
        queue_name: &str,
        queue_url: &str,
    ) -> Result<()> {
        let build = &request.build_endpoint_request;
        let record = &build.model_endpoint_record;
        let resource_group_name = naming::resource_group_name(&record.id);
        let source = ArgumentSource::new(
            request,
            &self.config,
            &resource_group_name,
            queue_name,
            queue_url,
        );

        // Workload first: the autoscaler and traffic objects reference it.
        let deployment_key = source.deployment_template_key();
        let deployment_arguments = source.deployment()?;
        let mut graph = self
            .templates
            .load(&deployment_key, &deployment_arguments.substitutions())?;
        if record.current_model_bundle.flavor.is_runnable_image_like() {
            graph = with_observability_env(graph, self.config.trace_enabled)?;
        }
        let deployment: Deployment = template::typed(&deployment_key, graph)?;
        apply::apply_deployment(&self.apis.deployments(), &resource_group_name, deployment)
            .await
            .map_err(Error::Infra)?;

        let user_config_arguments = source.user_config()?;
        let user_config: ConfigMap = self
            .templates
            .load_as("user-config.yaml", &user_config_arguments.substitutions())?;
        apply::apply_config_map(&self.apis.config_maps(), &resource_group_name, user_config)
            .await
            .map_err(Error::Infra)?;

        let endpoint_config_arguments = source.endpoint_config()?;
        let endpoint_config: ConfigMap = self.templates.load_as(
            "endpoint-config.yaml",
            &endpoint_config_arguments.substitutions(),
        )?;
        apply::apply_config_map(
            &self.apis.config_maps(),
            &naming::endpoint_config_name(&resource_group_name),
            endpoint_config,
        )
        .await
        .map_err(Error::Infra)?;

        if build.optimize_costs {
            let vpa_graph = self.templates.load(
                "vertical-pod-autoscaler.yaml",
                &source.vertical_autoscaler().substitutions(),
            )?;
            apply::apply_custom_object(
                &self.apis.vertical_autoscalers(),
                &resource_group_name,
                vpa_graph,
            )
            .await
            .map_err(Error::Infra)?;
        }

        if record.endpoint_type.uses_traffic_objects() {
            let autoscalers = self.apis.horizontal_autoscalers().await?;
            let autoscaler_arguments = source.horizontal_autoscaler(autoscalers.api_version());
            let autoscaler_graph = self.templates.load(
                "horizontal-pod-autoscaler.yaml",
                &autoscaler_arguments.substitutions(),
            )?;
            apply::apply_autoscaler(&autoscalers, &resource_group_name, &autoscaler_graph)
                .await
                .map_err(Error::Infra)?;

            let service: Service = self
                .templates
                .load_as("service.yaml", &source.service().substitutions())?;
            apply::apply_service(&self.apis.services(), &resource_group_name, service)
                .await
                .map_err(Error::Infra)?;

            // The routing templates are deployment-provided; clusters
            // without a mesh simply do not ship them.
            match self.templates.load(
                "virtual-service.yaml",
                &source.virtual_service().substitutions(),
            ) {
                Ok(graph) => {
                    apply::apply_custom_object(
                        &self.apis.virtual_services(),
                        &resource_group_name,
                        graph,
                    )
                    .await
                    .map_err(Error::Infra)?;
                }
                Err(TemplateError::MissingTemplate { key }) => {
                    debug!(%key, "routing template not configured, skipping");
                }
                Err(err) => return Err(err.into()),
            }
            match self.templates.load(
                "destination-rule.yaml",
                &source.destination_rule().substitutions(),
            ) {
                Ok(graph) => {
                    apply::apply_custom_object(
                        &self.apis.destination_rules(),
                        &resource_group_name,
                        graph,
                    )
                    .await
                    .map_err(Error::Infra)?;
                }
                Err(TemplateError::MissingTemplate { key }) => {
                    debug!(%key, "destination template not configured, skipping");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(())
    }
}
