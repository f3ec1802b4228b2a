//! Cluster version parsing and ordering.

use std::{fmt, str::FromStr};

use thiserror::Error;

/// A major.minor cluster version as reported by the version probe.
///
/// Managed providers report the minor with a `+` suffix instead of a patch
/// level (`"26+"`); the suffix is stripped before parsing so comparisons
/// behave. Ordering is derived, so version gates read directly:
///
/// ```
/// use llm_engine_core::ClusterVersion;
/// assert!("1.26".parse::<ClusterVersion>().unwrap() >= ClusterVersion::new(1, 26));
/// assert!("1.25".parse::<ClusterVersion>().unwrap() < ClusterVersion::new(1, 26));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClusterVersion {
    pub major: u32,
    pub minor: u32,
}

impl ClusterVersion {
    /// Construct a version directly.
    pub const fn new(major: u32, minor: u32) -> Self {
        ClusterVersion { major, minor }
    }

    /// Parse the separate major/minor fields of a version-probe response.
    pub fn from_version_info(major: &str, minor: &str) -> Result<Self, InvalidClusterVersion> {
        let parse = |part: &str| {
            part.trim_end_matches('+')
                .parse()
                .map_err(|_| InvalidClusterVersion(format!("{major}.{minor}")))
        };
        Ok(ClusterVersion {
            major: parse(major)?,
            minor: parse(minor)?,
        })
    }
}

impl FromStr for ClusterVersion {
    type Err = InvalidClusterVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s
            .split_once('.')
            .ok_or_else(|| InvalidClusterVersion(s.to_string()))?;
        ClusterVersion::from_version_info(major, minor)
    }
}

impl fmt::Display for ClusterVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl serde::Serialize for ClusterVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for ClusterVersion {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A version string the probe returned that we cannot compare against.
#[derive(Error, Debug)]
#[error("invalid cluster version: {0:?}")]
pub struct InvalidClusterVersion(pub String);
