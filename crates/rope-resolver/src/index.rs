use async_trait::async_trait;

use rope_cache::Cache;
use rope_client::RopeClient;
use rope_distribution::{Dist, Wheel};
use rope_normalize::PackageName;
use rope_pep440::Version;
use rope_platform_tags::Environment;

use crate::error::ResolveError;

/// A package index: maps a `(name, version)` query to the best-fitting
/// concrete artifact. `None` asks for the latest acceptable version.
#[async_trait]
pub trait Index: Sync {
    async fn find_package(
        &self,
        name: &PackageName,
        version: Option<&Version>,
    ) -> Result<Dist, ResolveError>;
}

/// Consult the wheel cache before touching the network. With
/// `ROPE_CACHE_ONLY` set, a miss is an error instead of a download.
pub(crate) fn check_cache(
    client: &RopeClient,
    cache: &Cache,
    env: &Environment,
    name: &PackageName,
    version: &Version,
) -> Result<Option<Wheel>, ResolveError> {
    if let Some(hit) = cache.get_wheel(name.as_ref(), version, env) {
        return Ok(Some(Wheel::from_cached(hit)));
    }
    if client.cache_only() {
        return Err(ResolveError::Client(rope_client::Error::CacheOnly(format!(
            "{name}-{version}"
        ))));
    }
    Ok(None)
}

/// Pick the preferred artifact among candidates at the same version: wheels
/// beat source distributions, and between wheels the more specific tag wins.
/// The last of equally preferred candidates is kept.
pub(crate) fn select_preferred(candidates: Vec<Dist>, env: &Environment) -> Dist {
    let mut candidates = candidates.into_iter();
    let mut best = candidates
        .next()
        .expect("select_preferred requires at least one candidate");
    for candidate in candidates {
        if preferred(&candidate, &best, env) {
            best = candidate;
        }
    }
    best
}

/// Whether `a` should be installed in preference to `b`.
fn preferred(a: &Dist, b: &Dist, env: &Environment) -> bool {
    match (a, b) {
        (Dist::Wheel(_), Dist::Sdist(_)) => true,
        (Dist::Sdist(_), Dist::Wheel(_)) => false,
        (Dist::Wheel(a), Dist::Wheel(b)) => {
            a.filename.preference(env) >= b.filename.preference(env)
        }
        // Both are source distributions; keep taking the newer sighting.
        (Dist::Sdist(_), Dist::Sdist(_)) => true,
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use url::Url;

    use rope_distribution::Sdist;
    use rope_distribution_filename::{SdistFilename, WheelFilename};
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

    fn wheel(filename: &str, url: &str) -> Dist {
        Dist::Wheel(Wheel::remote(
            WheelFilename::from_str(filename).unwrap(),
            Url::parse(url).unwrap(),
        ))
    }

    fn sdist(filename: &str) -> Dist {
        Dist::Sdist(Sdist::remote(
            SdistFilename::parse(filename).unwrap(),
            Url::parse("https://example.org/sdist").unwrap(),
        ))
    }

    #[test]
    fn wheels_beat_source_distributions() {
        let env = environment();
        for candidates in [
            vec![sdist("a-1.0.tar.gz"), wheel("a-1.0-py3-none-any.whl", "https://example.org/w")],
            vec![wheel("a-1.0-py3-none-any.whl", "https://example.org/w"), sdist("a-1.0.tar.gz")],
        ] {
            assert!(matches!(
                select_preferred(candidates, &env),
                Dist::Wheel(_)
            ));
        }
    }

    #[test]
    fn more_specific_tags_win() {
        let env = environment();
        let best = select_preferred(
            vec![
                wheel("a-1.0-py3-none-any.whl", "https://example.org/pure"),
                wheel(
                    "a-1.0-cp36-cp36m-manylinux1_x86_64.whl",
                    "https://example.org/binary",
                ),
                wheel("a-1.0-py2.py3-none-any.whl", "https://example.org/universal"),
            ],
            &env,
        );
        let Dist::Wheel(best) = best else {
            panic!("expected a wheel");
        };
        assert_eq!(best.url.unwrap().as_str(), "https://example.org/binary");
    }

    #[test]
    fn the_last_of_equal_candidates_wins() {
        let env = environment();
        let best = select_preferred(
            vec![
                wheel("a-1.0-py3-none-any.whl", "https://example.org/first"),
                wheel("a-1.0-py3-none-any.whl", "https://example.org/second"),
            ],
            &env,
        );
        let Dist::Wheel(best) = best else {
            panic!("expected a wheel");
        };
        assert_eq!(best.url.unwrap().as_str(), "https://example.org/second");
    }
}
