//! Error handling for the endpoint reconciler.
//!
//! Callers see exactly four kinds: configuration problems detected before
//! any cluster write, infra failures once the operator ladders are out of
//! options, not-found after both naming schemes missed, and validation of
//! records or live objects. Everything recoverable (conflicts, patch
//! rejections, not-found on delete) is absorbed inside the operators and
//! never reaches this enum.

use std::path::PathBuf;

use thiserror::Error;

/// Possible errors from the endpoint resource delegate.
#[derive(Error, Debug)]
pub enum Error {
    /// A template or settings problem; nothing was written to the cluster
    /// for the failing object.
    #[error("configuration error: {0}")]
    Configuration(#[source] ConfigurationError),

    /// A cluster call failed in a way the operator ladders cannot recover.
    #[error("kubernetes interaction failed: {0}")]
    Infra(#[source] kube::Error),

    /// Canonical and legacy lookups both missed.
    #[error("no resources found for endpoint: {name}")]
    NotFound {
        /// The canonical resource group name that was probed first.
        name: String,
    },

    /// An endpoint record or a live object violates a derivable invariant.
    #[error("validation failed: {0}")]
    Validation(String),
}

/// Convenience alias over [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Configuration failures, template handling included.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("neither a template folder nor a template manifest is configured")]
    NoTemplateSource,
    #[error("unable to read config file {path:?}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to parse config file {path:?}: {source}")]
    ParseFile {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Failures resolving, substituting or parsing a template.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("no template found for key {key:?}")]
    MissingTemplate { key: String },
    #[error("unable to read template {key:?} from {path:?}: {source}")]
    ReadTemplate {
        key: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to parse template manifest {path:?}: {source}")]
    ParseManifest {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("template {key:?} references ${{{name}}} which has no substitution")]
    MissingSubstitution { key: String, name: String },
    /// The rendered text is kept so a bad substitution can be diagnosed
    /// from the error alone.
    #[error("template {key:?} did not parse after substitution: {source}\n{rendered}")]
    Parse {
        key: String,
        rendered: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("template {key:?} does not describe the expected object kind: {source}")]
    UnexpectedShape {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<TemplateError> for Error {
    fn from(err: TemplateError) -> Self {
        Error::Configuration(ConfigurationError::Template(err))
    }
}

impl From<ConfigurationError> for Error {
    fn from(err: ConfigurationError) -> Self {
        Error::Configuration(err)
    }
}

/// The HTTP status carried by an apiserver error response, if that is what
/// this error is.
pub(crate) fn api_status(err: &kube::Error) -> Option<u16> {
    match err {
        kube::Error::Api(response) => Some(response.code),
        _ => None,
    }
}

pub(crate) fn is_conflict(err: &kube::Error) -> bool {
    api_status(err) == Some(409)
}

pub(crate) fn is_unprocessable(err: &kube::Error) -> bool {
    api_status(err) == Some(422)
}

pub(crate) fn is_not_found(err: &kube::Error) -> bool {
    api_status(err) == Some(404)
}
