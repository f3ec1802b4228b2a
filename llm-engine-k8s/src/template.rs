//! Template resolution and substitution.
//!
//! Templates are plain YAML with `${NAME}` placeholders; substitution is
//! string-for-string with no conditionals or iteration, so whatever logic a
//! template needs is decided by which template gets selected. Two sources
//! exist: a folder with one file per key (local development, packaged
//! installs) and a packed manifest dump where `data` maps keys to template
//! text (the in-cluster shape).

use std::{collections::BTreeMap, fs, path::PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::{config::ReconcilerConfig, error::ConfigurationError, error::TemplateError};

/// Where templates are read from.
#[derive(Clone, Debug)]
pub enum TemplateSource {
    /// One file per template key inside this folder.
    Folder(PathBuf),
    /// A packed manifest with a `data` mapping from key to template text.
    Manifest(PathBuf),
}

/// Resolves template keys to substituted, parsed object graphs.
#[derive(Clone, Debug)]
pub struct TemplateLoader {
    source: TemplateSource,
}

#[derive(Deserialize)]
struct PackedManifest {
    data: BTreeMap<String, String>,
}

impl TemplateLoader {
    /// Loader over an explicit source.
    pub fn new(source: TemplateSource) -> Self {
        TemplateLoader { source }
    }

    /// Pick the source out of the reconciler config: the folder when
    /// configured, the packed manifest otherwise.
    pub fn from_config(config: &ReconcilerConfig) -> Result<Self, ConfigurationError> {
        if let Some(folder) = &config.service_template_folder {
            Ok(TemplateLoader::new(TemplateSource::Folder(folder.clone())))
        } else if let Some(manifest) = &config.service_template_manifest {
            Ok(TemplateLoader::new(TemplateSource::Manifest(
                manifest.clone(),
            )))
        } else {
            Err(ConfigurationError::NoTemplateSource)
        }
    }

    /// Resolve `key`, substitute `params`, and parse the result into a JSON
    /// object graph.
    pub fn load(
        &self,
        key: &str,
        params: &BTreeMap<&'static str, String>,
    ) -> Result<serde_json::Value, TemplateError> {
        let text = self.fetch(key)?;
        let rendered = substitute(key, &text, params)?;
        serde_yaml::from_str(&rendered).map_err(|source| TemplateError::Parse {
            key: key.to_string(),
            rendered,
            source,
        })
    }

    /// [`load`](Self::load), then convert into a typed object.
    pub fn load_as<K: DeserializeOwned>(
        &self,
        key: &str,
        params: &BTreeMap<&'static str, String>,
    ) -> Result<K, TemplateError> {
        let graph = self.load(key, params)?;
        typed(key, graph)
    }

    fn fetch(&self, key: &str) -> Result<String, TemplateError> {
        match &self.source {
            TemplateSource::Folder(folder) => {
                let path = folder.join(key);
                fs::read_to_string(&path).map_err(|source| {
                    if source.kind() == std::io::ErrorKind::NotFound {
                        TemplateError::MissingTemplate {
                            key: key.to_string(),
                        }
                    } else {
                        TemplateError::ReadTemplate {
                            key: key.to_string(),
                            path,
                            source,
                        }
                    }
                })
            }
            TemplateSource::Manifest(path) => {
                let raw =
                    fs::read_to_string(path).map_err(|source| TemplateError::ReadTemplate {
                        key: key.to_string(),
                        path: path.clone(),
                        source,
                    })?;
                let manifest: PackedManifest = serde_yaml::from_str(&raw).map_err(|source| {
                    TemplateError::ParseManifest {
                        path: path.clone(),
                        source,
                    }
                })?;
                manifest
                    .data
                    .get(key)
                    .cloned()
                    .ok_or_else(|| TemplateError::MissingTemplate {
                        key: key.to_string(),
                    })
            }
        }
    }
}

/// Finish a loaded graph as a typed object.
pub(crate) fn typed<K: DeserializeOwned>(
    key: &str,
    graph: serde_json::Value,
) -> Result<K, TemplateError> {
    serde_json::from_value(graph).map_err(|source| TemplateError::UnexpectedShape {
        key: key.to_string(),
        source,
    })
}

/// Substitute `${NAME}` placeholders. `$$` escapes a literal dollar; any
/// other use of `$` is copied through untouched.
fn substitute(
    key: &str,
    template: &str,
    params: &BTreeMap<&'static str, String>,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(dollar) = rest.find('$') {
        out.push_str(&rest[..dollar]);
        let after = &rest[dollar + 1..];
        if let Some(tail) = after.strip_prefix('$') {
            out.push('$');
            rest = tail;
        } else if let Some(tail) = after.strip_prefix('{') {
            let end = tail
                .find('}')
                .ok_or_else(|| TemplateError::MissingSubstitution {
                    key: key.to_string(),
                    name: tail.chars().take(32).collect(),
                })?;
            let name = &tail[..end];
            let value =
                params
                    .get(name)
                    .ok_or_else(|| TemplateError::MissingSubstitution {
                        key: key.to_string(),
                        name: name.to_string(),
                    })?;
            out.push_str(value);
            rest = &tail[end + 1..];
        } else {
            out.push('$');
            rest = after;
        }
    }
    out.push_str(rest);
    Ok(out)
}
