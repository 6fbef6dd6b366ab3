use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};

use rope_distribution::PackageRequest;
use rope_pep508::Dependency;
use rope_resolver::{resolve, Index, PyPiIndex};

use crate::commands::{ExitStatus, Session};
use crate::project::{self, ManifestNotFound, Project, MANIFEST_FILE};

/// Resolve and install the given dependency specifications, then persist
/// the minimal requirement list to the manifest. Creates the manifest when
/// run outside a project.
pub(crate) async fn add(timeout: Option<u64>, packages: &[String]) -> anyhow::Result<ExitStatus> {
    match timeout {
        Some(seconds) => {
            // Dropping the future on expiry aborts any in-flight download or
            // extraction.
            tokio::time::timeout(Duration::from_secs(seconds), add_packages(packages))
                .await
                .map_err(|_| anyhow!("command timed out after {seconds}s"))?
        }
        None => add_packages(packages).await,
    }
}

async fn add_packages(packages: &[String]) -> anyhow::Result<ExitStatus> {
    let (mut project, manifest_path) = match project::read_project() {
        Ok((project, path)) => (project, path),
        Err(err) if err.downcast_ref::<ManifestNotFound>().is_some() => (
            Project::default(),
            std::env::current_dir()?.join(MANIFEST_FILE),
        ),
        Err(err) => return Err(err),
    };

    let session = Session::new()?;
    let index = PyPiIndex::new(&session.client, &session.cache, &session.env);

    // Resolve every spec to a concrete package up front so the manifest
    // records canonical names and versions.
    for spec in packages {
        let dependency = Dependency::from_str(spec)?;
        if dependency.specifiers.len() > 1 {
            bail!(
                "expected at most a single version requirement, got {}: '{spec}'",
                dependency.specifiers.len()
            );
        }
        if !dependency.extras.is_empty() {
            bail!("extras are not supported for top-level dependencies: '{spec}'");
        }

        let version = dependency
            .specifiers
            .first()
            .map(|specifier| specifier.version().clone());
        let dist = index
            .find_package(&dependency.name, version.as_ref())
            .await
            .with_context(|| format!("finding '{}'", spec.trim()))?;

        project.dependencies.push(PackageRequest::pinned(
            dist.name().clone(),
            dist.version().clone(),
        ));
    }

    let resolution = resolve(&project.dependencies, &index, &session.env)
        .await
        .context("failed version selection")?;

    for entry in &resolution.build_list {
        let mut dist = index
            .find_package(&entry.name, Some(&entry.version))
            .await
            .context("failed to find package after version selection")?;
        dist.install(&session.dist_context())
            .await
            .with_context(|| format!("installing '{}-{}'", entry.name, entry.version))?;
    }

    project.dependencies = resolution.minimal;
    project::write_project(&mut project, &manifest_path)?;
    Ok(ExitStatus::Success)
}
