//! Naming rules for materialized endpoint objects.
//!
//! Every object of an endpoint shares one deterministic resource group name
//! derived from the endpoint id. Endpoint ids may contain underscores but
//! Kubernetes names may not, so the mapping swaps `_` for `-`; ids never
//! contain hyphens, which keeps the mapping invertible.

/// Prefix of every canonical resource group name.
pub const RESOURCE_GROUP_PREFIX: &str = "llm-engine-endpoint-id-";

/// Name suffix of the internal endpoint-config artifact.
pub const ENDPOINT_CONFIG_SUFFIX: &str = "-endpoint-config";

/// Canonical resource group name for an endpoint id.
pub fn resource_group_name(endpoint_id: &str) -> String {
    format!("{RESOURCE_GROUP_PREFIX}{endpoint_id}").replace('_', "-")
}

/// Inverse of [`resource_group_name`]; `None` if the name is not canonical.
pub fn endpoint_id_from_resource_group_name(name: &str) -> Option<String> {
    name.strip_prefix(RESOURCE_GROUP_PREFIX)
        .map(|id| id.replace('-', "_"))
}

/// Name of the endpoint-config artifact for a resource group.
pub fn endpoint_config_name(resource_group_name: &str) -> String {
    format!("{resource_group_name}{ENDPOINT_CONFIG_SUFFIX}")
}
