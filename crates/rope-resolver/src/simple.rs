use async_trait::async_trait;
use tracing::debug;

use rope_cache::Cache;
use rope_client::{Link, RopeClient, DEFAULT_SIMPLE_INDEX};
use rope_distribution::{Dist, Sdist, Wheel};
use rope_distribution_filename::{SdistFilename, WheelFilename};
use rope_normalize::PackageName;
use rope_pep440::Version;
use rope_platform_tags::Environment;

use crate::error::ResolveError;
use crate::index::{check_cache, select_preferred, Index};

/// A PEP 503 simple HTML index, e.g. `https://pypi.org/simple`.
///
/// The per-package page lists one anchor per released artifact; the artifact
/// kind and version are decoded from the link filename.
#[derive(Debug)]
pub struct SimpleIndex<'a> {
    client: &'a RopeClient,
    cache: &'a Cache,
    env: &'a Environment,
    url: String,
}

impl<'a> SimpleIndex<'a> {
    pub fn new(client: &'a RopeClient, cache: &'a Cache, env: &'a Environment) -> Self {
        Self {
            client,
            cache,
            env,
            url: DEFAULT_SIMPLE_INDEX.to_string(),
        }
    }

    /// Use a different index root, e.g. a corporate mirror.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Decode an artifact link into a candidate distribution. Wheels that
    /// are incompatible with the environment are dropped here; unknown
    /// artifact types are logged and skipped.
    fn decode_link(&self, link: &Link) -> Option<Dist> {
        if link.filename.ends_with(".whl") {
            let filename = match link.filename.parse::<WheelFilename>() {
                Ok(filename) => filename,
                Err(err) => {
                    debug!("skipping undecodable wheel link '{}': {err}", link.filename);
                    return None;
                }
            };
            if !filename.is_compatible(self.env) {
                return None;
            }
            Some(Dist::Wheel(Wheel::remote(filename, link.url.clone())))
        } else {
            match SdistFilename::parse(&link.filename) {
                Ok(filename) => Some(Dist::Sdist(Sdist::remote(filename, link.url.clone()))),
                Err(err) => {
                    debug!("skipping unknown artifact '{}': {err}", link.filename);
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use url::Url;

    use rope_cache::Cache;
    use rope_pep508::MarkerEnvironment;
    use rope_platform_tags::{Arch, Os};

    use super::*;

    fn environment() -> Environment {
        let markers = MarkerEnvironment {
            implementation_name: "cpython".to_string(),
            python_full_version: "3.6.8".to_string(),
            python_version: "3.6".to_string(),
            ..MarkerEnvironment::default()
        };
        Environment::from_markers(markers, Os::Linux, Arch::X86_64).unwrap()
    }

    fn link(filename: &str) -> Link {
        Link {
            url: Url::parse(&format!("https://example.org/packages/{filename}")).unwrap(),
            filename: filename.to_string(),
        }
    }

    #[test]
    fn decodes_artifact_links() {
        let client = RopeClient::new().unwrap();
        let cache = Cache::temp().unwrap();
        let env = environment();
        let index = SimpleIndex::new(&client, &cache, &env);

        assert!(matches!(
            index.decode_link(&link("tqdm-4.48.2-py2.py3-none-any.whl")),
            Some(Dist::Wheel(_))
        ));
        assert!(matches!(
            index.decode_link(&link("tqdm-4.48.2.tar.gz")),
            Some(Dist::Sdist(_))
        ));
        // Incompatible with a cp36 Linux host.
        assert!(index
            .decode_link(&link("numpy-1.14.5-cp27-cp27m-manylinux1_x86_64.whl"))
            .is_none());
        assert!(index
            .decode_link(&link("numpy-1.14.5-cp36-cp36m-win_amd64.whl"))
            .is_none());
        // Not a known artifact type.
        assert!(index.decode_link(&link("tqdm-4.48.2.exe")).is_none());
    }
}

#[async_trait]
impl Index for SimpleIndex<'_> {
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

        let page = self
            .client
            .simple_page(&self.url, name)
            .await
            .map_err(|err| match err {
                rope_client::Error::PackageNotFound => {
                    ResolveError::PackageNotFound(name.to_string())
                }
                other => ResolveError::Client(other),
            })?;

        // With a pinned version, keep every candidate whose version matches.
        // Without one, keep the candidates of the greatest version seen.
        let mut candidates: Vec<Dist> = Vec::new();
        let mut greatest: Option<Version> = None;
        for link in &page.links {
            let Some(dist) = self.decode_link(link) else {
                continue;
            };
            match version {
                Some(version) => {
                    if dist.version().matches(version) {
                        candidates.push(dist);
                    }
                }
                None => match &greatest {
                    Some(current) if dist.version() < current => {}
                    Some(current) if dist.version() == current => candidates.push(dist),
                    _ => {
                        greatest = Some(dist.version().clone());
                        candidates = vec![dist];
                    }
                },
            }
        }

        if candidates.is_empty() {
            // An index page without any artifact links means the package is
            // unknown; links that merely failed the version or tag filters
            // mean no artifact fits this environment.
            return Err(if page.links.is_empty() {
                ResolveError::PackageNotFound(name.to_string())
            } else {
                ResolveError::NoCompatibleArtifact(name.to_string())
            });
        }
        let mut best = select_preferred(candidates, self.env);

        // A "latest" query resolved to a concrete version; it may be cached.
        if version.is_none() {
            let resolved = best.version().clone();
            if let Some(wheel) = check_cache(self.client, self.cache, self.env, name, &resolved)? {
                return Ok(Dist::Wheel(wheel));
            }
        }

        // The HTML index carries no dependency metadata, so wheels are
        // fetched eagerly to read it from the archive (publishing them to
        // the cache along the way). Source distributions defer discovery
        // until they are built.
        if let Dist::Wheel(wheel) = &mut best {
            wheel.fetch(self.client, self.cache).await?;
        }

        Ok(best)
    }
}
