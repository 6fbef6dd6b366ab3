use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use rope_cache::Cache;
use rope_client::{PypiFile, PypiResponse, RopeClient, PYTHON_PACKAGE_INDEX};
use rope_distribution::{Dist, Sdist, Wheel};
use rope_distribution_filename::{SdistFilename, WheelFilename};
use rope_normalize::PackageName;
use rope_pep440::Version;
use rope_platform_tags::Environment;

use crate::error::ResolveError;
use crate::index::{check_cache, select_preferred, Index};

/// The PyPI JSON metadata API:
/// `GET <root>/pypi/<name>/<version>/json`.
///
/// Unlike the simple index, the JSON response carries `requires_dist`
/// directly, so resolving through this index needs no wheel downloads.
///
/// <https://warehouse.pypa.io/api-reference/json.html>
#[derive(Debug)]
pub struct PyPiIndex<'a> {
    client: &'a RopeClient,
    cache: &'a Cache,
    env: &'a Environment,
    url: String,
}

/// The outcome of one query attempt: either a package, or a relaxed version
/// to retry with.
enum Attempt {
    Found(Dist),
    Retry(Version),
}

impl<'a> PyPiIndex<'a> {
    pub fn new(client: &'a RopeClient, cache: &'a Cache, env: &'a Environment) -> Self {
        Self {
            client,
            cache,
            env,
            url: PYTHON_PACKAGE_INDEX.to_string(),
        }
    }

    /// Use a different API root.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    async fn attempt(
        &self,
        name: &PackageName,
        version: Option<&Version>,
    ) -> Result<Attempt, ResolveError> {
        let response = match self.client.pypi_metadata(&self.url, name, version).await {
            Ok(response) => response,
            Err(err) if err.is_not_found() => {
                let Some(version) = version else {
                    return Err(ResolveError::PackageNotFound(name.to_string()));
                };
                // The exact version is unknown to the index; relax to the
                // lowest acceptable neighboring release.
                let response = self.client.pypi_metadata(&self.url, name, None).await?;
                let next = self.find_min(name, &response.releases, version)?;
                debug!("relaxing {name}-{version} to {name}-{next}");
                return Ok(Attempt::Retry(next));
            }
            Err(err) => return Err(ResolveError::Client(err)),
        };

        // Some versions publish an empty artifact list; relax the same way
        // as for an unknown version.
        if response.urls.is_empty() {
            if let Some(version) = version {
                let next = self.find_min(name, &response.releases, version)?;
                return Ok(Attempt::Retry(next));
            }
            return Err(ResolveError::NoCompatibleArtifact(name.to_string()));
        }

        let candidates = self.decode_files(name, &response);
        if candidates.is_empty() {
            if version.is_none() {
                // Likely an interpreter too old for the newest release; fall
                // back to the greatest final release that supports it.
                let next = self.find_max(name, &response.releases)?;
                debug!("no compatible artifact in the latest {name}; trying {name}-{next}");
                return Ok(Attempt::Retry(next));
            }
            return Err(ResolveError::NoCompatibleArtifact(name.to_string()));
        }

        Ok(Attempt::Found(select_preferred(candidates, self.env)))
    }

    /// Decode the artifact list of a response, dropping artifacts whose
    /// `requires_python` or tags rule out this environment. `bdist_egg` is
    /// silently ignored; other unknown package types are logged.
    fn decode_files(&self, name: &PackageName, response: &PypiResponse) -> Vec<Dist> {
        let mut candidates = Vec::new();
        for file in &response.urls {
            if !self.python_compatible(file) {
                continue;
            }

            match file.packagetype.as_str() {
                "bdist_wheel" => {
                    let filename = match WheelFilename::from_str(&file.filename) {
                        Ok(filename) => filename,
                        Err(err) => {
                            warn!("{name}: skipping undecodable wheel '{}': {err}", file.filename);
                            continue;
                        }
                    };
                    if !filename.is_compatible(self.env) {
                        continue;
                    }
                    let Some(url) = self.file_url(file) else {
                        continue;
                    };
                    let mut wheel = Wheel::remote(filename, url);
                    wheel.requires_dist =
                        response.info.requires_dist.clone().unwrap_or_default();
                    wheel.requires_python = file.requires_python.clone();
                    candidates.push(Dist::Wheel(wheel));
                }
                "sdist" => {
                    let filename = match SdistFilename::parse(&file.filename) {
                        Ok(filename) => filename,
                        Err(err) => {
                            warn!("{name}: skipping undecodable sdist '{}': {err}", file.filename);
                            continue;
                        }
                    };
                    let Some(url) = self.file_url(file) else {
                        continue;
                    };
                    candidates.push(Dist::Sdist(Sdist::remote(filename, url)));
                }
                "bdist_egg" => {}
                other => {
                    warn!("{name}: unknown package type '{other}' for '{}'", file.filename);
                }
            }
        }
        candidates
    }

    /// Attach the `#sha256=` fragment from the digests so the download is
    /// verified.
    fn file_url(&self, file: &PypiFile) -> Option<Url> {
        let mut url = match Url::parse(&file.url) {
            Ok(url) => url,
            Err(err) => {
                warn!("skipping artifact with unparseable URL '{}': {err}", file.url);
                return None;
            }
        };
        if url.fragment().is_none() {
            if let Some(sha256) = &file.digests.sha256 {
                url.set_fragment(Some(&format!("sha256={sha256}")));
            }
        }
        Some(url)
    }

    fn python_compatible(&self, file: &PypiFile) -> bool {
        let Some(requires_python) = &file.requires_python else {
            return true;
        };
        match self.env.satisfies_python_version(requires_python) {
            Ok(ok) => ok,
            Err(err) => {
                warn!(
                    "treating unparseable requires_python '{requires_python}' as incompatible: {err}"
                );
                false
            }
        }
    }

    /// The lowest release that is at least `min` and supports this
    /// interpreter.
    fn find_min(
        &self,
        name: &PackageName,
        releases: &BTreeMap<String, Vec<PypiFile>>,
        min: &Version,
    ) -> Result<Version, ResolveError> {
        self.acceptable_releases(releases)
            .filter(|version| version >= min)
            .min()
            .ok_or_else(|| ResolveError::PackageNotFound(name.to_string()))
    }

    /// The greatest final (non-pre-release) release that supports this
    /// interpreter.
    fn find_max(
        &self,
        name: &PackageName,
        releases: &BTreeMap<String, Vec<PypiFile>>,
    ) -> Result<Version, ResolveError> {
        self.acceptable_releases(releases)
            .filter(|version| version.pre().is_none())
            .max()
            .ok_or_else(|| ResolveError::PackageNotFound(name.to_string()))
    }

    fn acceptable_releases<'r>(
        &'r self,
        releases: &'r BTreeMap<String, Vec<PypiFile>>,
    ) -> impl Iterator<Item = Version> + 'r {
        releases.iter().filter_map(|(key, files)| {
            let version = Version::from_str(key).ok()?;
            let first = files.first()?;
            if !self.python_compatible(first) {
                return None;
            }
            Some(version)
        })
    }
}


#[async_trait]
impl Index for PyPiIndex<'_> {
    async fn find_package(
        &self,
        name: &PackageName,
        version: Option<&Version>,
    ) -> Result<Dist, ResolveError> {
        if let Some(version) = version {
            if let Some(wheel) = check_cache(self.client, self.cache, self.env, name, version)? {
                return Ok(Dist::Wheel(wheel));
            }
        }

        // Relaxation could revisit a version whose artifact list is empty;
        // treat a repeat as not found rather than looping.
        let mut attempted: HashSet<Version> = version.iter().map(|v| (*v).clone()).collect();
        let mut requested = version.cloned();
        loop {
            match self.attempt(name, requested.as_ref()).await? {
                Attempt::Found(dist) => {
                    if version.is_none() {
                        // A "latest" query resolved to a concrete version;
                        // it may be cached.
                        let resolved = dist.version().clone();
                        if let Some(wheel) =
                            check_cache(self.client, self.cache, self.env, name, &resolved)?
                        {
                            return Ok(Dist::Wheel(wheel));
                        }
                    }
                    return Ok(dist);
                }
                Attempt::Retry(next) => {
                    if !attempted.insert(next.clone()) {
                        return Err(ResolveError::PackageNotFound(name.to_string()));
                    }
                    requested = Some(next);
                }
            }
        }
    }
}
