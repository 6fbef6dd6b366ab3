//! Minimal version selection.
//!
//! The resolver visits the dependency graph breadth-first, keeping for each
//! package the greatest lower bound any edge asked for. The runtime is
//! proportional to the size of the unreduced list plus the number of
//! dependency edges, at most quadratic in it.
//!
//! The algorithm and its analysis are from Russ Cox's
//! <https://research.swtch.com/vgo-mvs>.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use tracing::debug;

use rope_distribution::PackageRequest;
use rope_normalize::PackageName;
use rope_pep440::Version;
use rope_platform_tags::Environment;

use crate::error::ResolveError;
use crate::index::Index;

/// One entry of the build list: a package resolved to a concrete version,
/// with the flags that drive reproducibility pinning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub name: PackageName,
    pub version: Version,
    /// The winning edge requested "latest acceptable" rather than a
    /// concrete version.
    pub unspecified: bool,
    /// The index resolved the winning edge to a different version than
    /// requested (relaxed lookup or wildcard match).
    pub mismatch: bool,
}

/// The outcome of a resolution.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// The transitive closure of packages to install, sorted by name.
    pub build_list: Vec<ResolvedPackage>,
    /// The smallest top-level requirement list that reproduces
    /// `build_list`: the base packages plus a pin for every package that
    /// some edge left unbounded (or that resolved away from its request).
    /// Sorted by name; every entry carries a version.
    pub minimal: Vec<PackageRequest>,
}

/// Resolve `base` against `index`, producing the build list and the minimal
/// requirement list.
///
/// Breadth-first order matters: a specified lower bound from a direct
/// dependency must supersede a deeper unspecified edge before the latter
/// resolves to "latest". Cycles are broken by a `(name, version)` visited
/// set. Every lookup failure carries the `name-version` edge it occurred on.
pub async fn resolve<I: Index + ?Sized>(
    base: &[PackageRequest],
    index: &I,
    env: &Environment,
) -> Result<Resolution, ResolveError> {
    let mut build: BTreeMap<PackageName, ResolvedPackage> = BTreeMap::new();
    let mut visited: HashSet<(PackageName, Option<Version>)> = HashSet::new();
    // Names that must be pinned at the top level for reproducibility, even
    // when a later specified edge wins the version.
    let mut pinned: BTreeSet<PackageName> = BTreeSet::new();

    let mut work: VecDeque<PackageRequest> = VecDeque::new();
    for request in base {
        visited.insert((request.name.clone(), request.version.clone()));
        work.push_back(request.clone());
    }

    while let Some(request) = work.pop_front() {
        if request.version.is_none() {
            pinned.insert(request.name.clone());
        }

        let replace = match build.get(&request.name) {
            None => true,
            Some(current) => match &request.version {
                None => false,
                Some(version) => current.unspecified || *version > current.version,
            },
        };
        if !replace {
            continue;
        }

        let dist = index
            .find_package(&request.name, request.version.as_ref())
            .await
            .map_err(|err| err.with_context(request.to_string()))?;
        debug!("resolved {request} to {dist}");

        let value = ResolvedPackage {
            name: dist.name().clone(),
            version: dist.version().clone(),
            unspecified: request.version.is_none(),
            mismatch: request
                .version
                .as_ref()
                .is_some_and(|version| dist.version() != version),
        };
        if value.mismatch {
            pinned.insert(value.name.clone());
        }

        let dependencies = dist.dependencies(env);
        for dependency in &dependencies {
            if visited.insert((dependency.name.clone(), dependency.version.clone())) {
                work.push_back(dependency.clone());
            }
        }

        build.insert(request.name.clone(), value);
    }

    let build_list: Vec<ResolvedPackage> = build.values().cloned().collect();

    let mut minimal_names: BTreeSet<PackageName> =
        base.iter().map(|request| request.name.clone()).collect();
    minimal_names.extend(pinned);

    let minimal = minimal_names
        .iter()
        .filter_map(|name| build.get(name))
        .map(|entry| PackageRequest::pinned(entry.name.clone(), entry.version.clone()))
        .collect();

    Ok(Resolution {
        build_list,
        minimal,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::str::FromStr;

    use async_trait::async_trait;

    use rope_distribution::{Dist, Wheel};
    use rope_distribution_filename::WheelFilename;
    use rope_pep508::MarkerEnvironment;
    use rope_platform_tags::{Arch, Os};

    use super::*;

    fn environment() -> Environment {
        let markers = MarkerEnvironment {
            implementation_name: "cpython".to_string(),
            python_full_version: "3.6.8".to_string(),
            python_version: "3.6".to_string(),
            sys_platform: "linux".to_string(),
            ..MarkerEnvironment::default()
        };
        Environment::from_markers(markers, Os::Linux, Arch::X86_64).unwrap()
    }

    /// An in-memory index: for every package a list of releases, each with
    /// its raw `Requires-Dist` lines.
    #[derive(Default)]
    struct TestIndex {
        packages: HashMap<&'static str, Vec<(&'static str, Vec<&'static str>)>>,
    }

    impl TestIndex {
        fn package(mut self, name: &'static str, releases: Vec<(&'static str, Vec<&'static str>)>) -> Self {
            self.packages.insert(name, releases);
            self
        }

        fn wheel(name: &str, version: &str, requires_dist: &[&str]) -> Dist {
            let filename =
                WheelFilename::from_str(&format!("{name}-{version}-py3-none-any.whl")).unwrap();
            let mut wheel = Wheel::from_path(filename, std::path::PathBuf::from("/dev/null"));
            wheel.requires_dist = requires_dist.iter().map(ToString::to_string).collect();
            Dist::Wheel(wheel)
        }
    }

    #[async_trait]
    impl Index for TestIndex {
        async fn find_package(
            &self,
            name: &PackageName,
            version: Option<&Version>,
        ) -> Result<Dist, ResolveError> {
            let releases = self
                .packages
                .get(name.as_ref())
                .ok_or_else(|| ResolveError::PackageNotFound(name.to_string()))?;

            match version {
                Some(version) => releases
                    .iter()
                    .find(|(release, _)| {
                        Version::from_str(release).unwrap().matches(version)
                    })
                    .map(|(release, deps)| Self::wheel(name.as_ref(), release, deps))
                    .ok_or_else(|| ResolveError::PackageNotFound(name.to_string())),
                None => releases
                    .iter()
                    .max_by_key(|(release, _)| Version::from_str(release).unwrap())
                    .map(|(release, deps)| Self::wheel(name.as_ref(), release, deps))
                    .ok_or_else(|| ResolveError::PackageNotFound(name.to_string())),
            }
        }
    }

    /// The dependency graph from <https://research.swtch.com/vgo-mvs>, with
    /// the cyclic F/G extension.
    fn vgo_index() -> TestIndex {
        TestIndex::default()
            .package(
                "b",
                vec![
                    ("1.1.0", vec!["d (==1.1.0)"]),
                    ("1.2.0", vec!["d (==1.3.0)"]),
                ],
            )
            .package(
                "c",
                vec![
                    ("1.1.0", vec![]),
                    ("1.2.0", vec!["d (==1.4.0)"]),
                    ("1.3.0", vec!["f (==1.1.0)"]),
                ],
            )
            .package(
                "d",
                vec![
                    ("1.1.0", vec!["e (==1.1.0)"]),
                    ("1.2.0", vec!["e (==1.1.0)"]),
                    ("1.3.0", vec!["e (==1.2.0)"]),
                    ("1.4.0", vec!["e (==1.2.0)"]),
                ],
            )
            .package(
                "e",
                vec![("1.1.0", vec![]), ("1.2.0", vec![]), ("1.3.0", vec![])],
            )
            .package("f", vec![("1.1.0", vec!["g (==1.1.0)"])])
            .package("g", vec![("1.1.0", vec!["f (==1.1.0)"])])
    }

    fn request(name: &str, version: &str) -> PackageRequest {
        PackageRequest::pinned(
            PackageName::normalize(name),
            Version::from_str(version).unwrap(),
        )
    }

    fn latest(name: &str) -> PackageRequest {
        PackageRequest::latest(PackageName::normalize(name))
    }

    fn names_and_versions(list: &[ResolvedPackage]) -> Vec<(String, String)> {
        list.iter()
            .map(|entry| (entry.name.to_string(), entry.version.to_string()))
            .collect()
    }

    fn pins(list: &[PackageRequest]) -> Vec<(String, String)> {
        list.iter()
            .map(|request| {
                (
                    request.name.to_string(),
                    request.version.as_ref().unwrap().to_string(),
                )
            })
            .collect()
    }

    fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
        expected
            .iter()
            .map(|(name, version)| (name.to_string(), version.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn classic_mvs() {
        let index = vgo_index();
        let base = [request("b", "1.2.0"), request("c", "1.2.0")];

        let resolution = resolve(&base, &index, &environment()).await.unwrap();
        assert_eq!(
            names_and_versions(&resolution.build_list),
            pairs(&[
                ("b", "1.2.0"),
                ("c", "1.2.0"),
                ("d", "1.4.0"),
                ("e", "1.2.0"),
            ])
        );
        // No unbounded edges: the base list is already minimal.
        assert_eq!(
            pins(&resolution.minimal),
            pairs(&[("b", "1.2.0"), ("c", "1.2.0")])
        );
    }

    #[tokio::test]
    async fn cyclic_graph_terminates() {
        let index = vgo_index();
        let base = [request("b", "1.2.0"), request("c", "1.3.0")];

        let resolution = resolve(&base, &index, &environment()).await.unwrap();
        assert_eq!(
            names_and_versions(&resolution.build_list),
            pairs(&[
                ("b", "1.2.0"),
                ("c", "1.3.0"),
                ("d", "1.3.0"),
                ("e", "1.2.0"),
                ("f", "1.1.0"),
                ("g", "1.1.0"),
            ])
        );
        assert_eq!(
            pins(&resolution.minimal),
            pairs(&[("b", "1.2.0"), ("c", "1.3.0")])
        );
    }

    fn ml_index() -> TestIndex {
        TestIndex::default()
            .package("torch", vec![("1.6.0", vec!["numpy"])])
            .package("tensorflow", vec![("2.3.0", vec!["numpy (>=1.14.0)"])])
            .package(
                "numpy",
                vec![("1.13.0", vec![]), ("1.14.0", vec![]), ("1.15.0", vec![])],
            )
    }

    #[tokio::test]
    async fn unbounded_transitive_dependency() {
        let index = ml_index();
        let base = [latest("torch"), latest("tensorflow")];

        let resolution = resolve(&base, &index, &environment()).await.unwrap();
        // numpy lands on the highest specified lower bound, not the latest
        // release.
        assert_eq!(
            names_and_versions(&resolution.build_list),
            pairs(&[
                ("numpy", "1.14.0"),
                ("tensorflow", "2.3.0"),
                ("torch", "1.6.0"),
            ])
        );
        // The unbounded edge forces an explicit numpy pin.
        assert_eq!(
            pins(&resolution.minimal),
            pairs(&[
                ("numpy", "1.14.0"),
                ("tensorflow", "2.3.0"),
                ("torch", "1.6.0"),
            ])
        );
    }

    #[tokio::test]
    async fn reproducible_after_upstream_release() {
        let before = TestIndex::default()
            .package("torch", vec![("1.6.0", vec!["numpy"])])
            .package("numpy", vec![("1.19.0", vec![]), ("1.19.1", vec![])]);

        let resolution = resolve(&[latest("torch")], &before, &environment())
            .await
            .unwrap();
        assert_eq!(
            pins(&resolution.minimal),
            pairs(&[("numpy", "1.19.1"), ("torch", "1.6.0")])
        );

        // numpy 1.19.2 is published; re-running from the minimal list must
        // not pick it up.
        let after = TestIndex::default()
            .package("torch", vec![("1.6.0", vec!["numpy"])])
            .package(
                "numpy",
                vec![("1.19.0", vec![]), ("1.19.1", vec![]), ("1.19.2", vec![])],
            );

        let resolution = resolve(&resolution.minimal, &after, &environment())
            .await
            .unwrap();
        assert_eq!(
            names_and_versions(&resolution.build_list),
            pairs(&[("numpy", "1.19.1"), ("torch", "1.6.0")])
        );
    }

    #[tokio::test]
    async fn rerunning_with_the_minimal_list_reproduces_the_build_list() {
        let index = vgo_index();
        let base = [request("b", "1.2.0"), request("c", "1.2.0")];

        let first = resolve(&base, &index, &environment()).await.unwrap();
        let second = resolve(&first.minimal, &index, &environment())
            .await
            .unwrap();
        assert_eq!(
            names_and_versions(&first.build_list),
            names_and_versions(&second.build_list)
        );
    }

    #[tokio::test]
    async fn resolution_is_deterministic() {
        let index = vgo_index();
        let base = [request("b", "1.2.0"), request("c", "1.3.0")];

        let first = resolve(&base, &index, &environment()).await.unwrap();
        let second = resolve(&base, &index, &environment()).await.unwrap();
        assert_eq!(first.build_list, second.build_list);
        assert_eq!(first.minimal, second.minimal);
    }

    #[tokio::test]
    async fn missing_package_reports_the_failing_edge() {
        let index = TestIndex::default().package("a", vec![("1.0.0", vec!["ghost (==1.0.0)"])]);

        let err = resolve(&[request("a", "1.0.0")], &index, &environment())
            .await
            .unwrap_err();
        let message = format!("{err}");
        assert!(message.contains("ghost-1.0.0"), "{message}");
    }
}
