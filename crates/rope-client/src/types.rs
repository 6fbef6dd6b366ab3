use std::collections::BTreeMap;

use serde::Deserialize;
use url::Url;

/// An artifact link extracted from a simple-index page.
#[derive(Debug, Clone)]
pub struct Link {
    /// The absolute download URL, fragment included.
    pub url: Url,
    /// The artifact filename, taken from the last path segment.
    pub filename: String,
}

/// The response of the PyPI JSON API for a `(name, version)` query.
///
/// <https://warehouse.pypa.io/api-reference/json.html>
#[derive(Debug, Clone, Deserialize)]
pub struct PypiResponse {
    pub info: PypiInfo,
    #[serde(default)]
    pub urls: Vec<PypiFile>,
    /// Only consulted when the exact version query fails and the search has
    /// to be relaxed to a neighboring release.
    #[serde(default)]
    pub releases: BTreeMap<String, Vec<PypiFile>>,
}

/// The subset of the `info` block rope consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct PypiInfo {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub requires_dist: Option<Vec<String>>,
    #[serde(default)]
    pub requires_python: Option<String>,
}

/// One released artifact in a PyPI JSON response.
#[derive(Debug, Clone, Deserialize)]
pub struct PypiFile {
    pub filename: String,
    pub url: String,
    /// `bdist_wheel`, `sdist`, or a legacy type such as `bdist_egg`.
    pub packagetype: String,
    #[serde(default)]
    pub requires_python: Option<String>,
    #[serde(default)]
    pub digests: PypiDigests,
    #[serde(default)]
    pub yanked: bool,
}

/// Content digests attached to a released artifact.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PypiDigests {
    #[serde(default)]
    pub sha256: Option<String>,
}
