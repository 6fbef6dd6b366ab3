//! The package abstraction shared by the resolver and the installer: a
//! distribution is either a pre-built wheel or a source distribution that is
//! converted to a wheel on demand. Both expose the same capability set:
//! name, version, dependencies under an environment, and installation into a
//! per-package directory.

use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use rope_cache::Cache;
use rope_client::RopeClient;
use rope_normalize::PackageName;
use rope_pep440::Version;
use rope_platform_tags::Environment;

pub use error::DistError;
pub use sdist::Sdist;
pub use wheel::Wheel;

mod error;
mod sdist;
mod wheel;

/// Everything a distribution needs to fetch, build and install itself.
/// Constructed once by the command front end and passed by reference.
#[derive(Debug)]
pub struct DistContext<'a> {
    pub client: &'a RopeClient,
    pub cache: &'a Cache,
    pub env: &'a Environment,
    /// The directory wheels are unpacked into, e.g. `./ropedir`.
    pub install_root: &'a Path,
}

/// A distribution artifact resolved from an index or the cache.
#[derive(Debug, Clone)]
pub enum Dist {
    Wheel(Wheel),
    Sdist(Sdist),
}

impl Dist {
    /// The normalized package name.
    pub fn name(&self) -> &PackageName {
        match self {
            Self::Wheel(wheel) => &wheel.filename.name,
            Self::Sdist(sdist) => &sdist.filename.name,
        }
    }

    /// The package version.
    pub fn version(&self) -> &Version {
        match self {
            Self::Wheel(wheel) => &wheel.filename.version,
            Self::Sdist(sdist) => &sdist.filename.version,
        }
    }

    /// The transitive dependencies under `env`, each collapsed to its
    /// minimal acceptable version.
    ///
    /// For a source distribution that has not been built yet this is empty;
    /// dependency discovery happens after conversion, and the resolver
    /// tolerates the first pass returning nothing.
    pub fn dependencies(&self, env: &Environment) -> Vec<PackageRequest> {
        match self {
            Self::Wheel(wheel) => wheel.dependencies(env),
            Self::Sdist(sdist) => sdist.dependencies(env),
        }
    }

    /// Install the distribution, returning the directory it was unpacked
    /// into. Wheels are fetched (or taken from the cache) and unzipped;
    /// source distributions are converted to a wheel first.
    pub async fn install(&mut self, ctx: &DistContext<'_>) -> Result<PathBuf, DistError> {
        match self {
            Self::Wheel(wheel) => wheel.install(ctx).await,
            Self::Sdist(sdist) => sdist.install(ctx).await,
        }
    }
}

impl Display for Dist {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.name(), self.version())
    }
}

/// A package pinned to a minimal version, or unpinned when no lower bound is
/// known ("latest acceptable"). This is the unit the resolver traverses and
/// the manifest records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRequest {
    pub name: PackageName,
    pub version: Option<Version>,
}

impl PackageRequest {
    pub fn new(name: PackageName, version: Option<Version>) -> Self {
        Self { name, version }
    }

    /// A request for a concrete version.
    pub fn pinned(name: PackageName, version: Version) -> Self {
        Self {
            name,
            version: Some(version),
        }
    }

    /// A request for the latest acceptable version.
    pub fn latest(name: PackageName) -> Self {
        Self {
            name,
            version: None,
        }
    }
}

impl Display for PackageRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}-{}", self.name, version),
            None => write!(f, "{}-<latest>", self.name),
        }
    }
}

/// Serialized as `<name>-<canonical-version>`; serialization fails for an
/// unpinned request so that a manifest can never drift to "latest".
impl Serialize for PackageRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.version {
            Some(version) => serializer.collect_str(&format_args!("{}-{}", self.name, version)),
            None => Err(serde::ser::Error::custom(format!(
                "dependency '{}' has no version pinned",
                self.name
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for PackageRequest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        // Names may contain `-`; the version follows the rightmost one.
        let (name, version) = s.rsplit_once('-').ok_or_else(|| {
            de::Error::custom(format!(
                "expected a dependency of the form <name>-<version>, got '{s}'"
            ))
        })?;
        let version = version.parse::<Version>().map_err(de::Error::custom)?;
        Ok(Self {
            name: PackageName::normalize(name),
            version: Some(version),
        })
    }
}
