//! Kubernetes materialization of llm-engine model endpoints.
//!
//! A logical endpoint maps to a handful of cluster objects: a workload
//! deployment, two configuration artifacts, an autoscaler or scaling
//! annotations depending on mode, and for request/response endpoints a
//! traffic service plus routing policies. This crate owns that mapping in
//! both directions:
//!
//! - [`EndpointResourceDelegate::create_or_update_resources`] renders the
//!   endpoint's templates and converges every object through an idempotent
//!   create/patch/replace ladder,
//! - [`EndpointResourceDelegate::get_resources`] and
//!   [`EndpointResourceDelegate::get_all_resources`] read the live graph
//!   back into [`ModelEndpointInfraState`](llm_engine_core::ModelEndpointInfraState),
//! - [`EndpointResourceDelegate::delete_resources`] tears the graph down,
//!   tolerating legacy names and already-absent objects.
//!
//! Domain types live in [`llm_engine_core`]; this crate adds the cluster
//! facing half on top of [`kube`].

pub mod apis;
pub mod arguments;
pub mod config;
pub mod delegate;
pub mod error;
pub mod template;

mod apply;
mod observability;
mod observe;
mod reconcile;
mod teardown;

pub use config::ReconcilerConfig;
pub use delegate::EndpointResourceDelegate;
pub use error::{Error, Result};

#[cfg(test)]
pub(crate) mod mock;
