//! Reading and writing the `rope.json` project manifest.

use std::path::{Path, PathBuf};

use anyhow::Context;
use fs_err as fs;
use serde::{Deserialize, Serialize};

use rope_distribution::PackageRequest;

/// The project manifest filename.
pub(crate) const MANIFEST_FILE: &str = "rope.json";

/// The project manifest: an optional interpreter constraint and the
/// top-level dependency list.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct Project {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) python: Option<String>,
    pub(crate) dependencies: Vec<PackageRequest>,
}

/// `rope.json` was not found in the working directory or any parent.
#[derive(Debug)]
pub(crate) struct ManifestNotFound;

impl std::fmt::Display for ManifestNotFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("rope.json not found (or in any of the parent directories)")
    }
}

impl std::error::Error for ManifestNotFound {}

/// Locate the manifest by walking from the working directory up to the
/// filesystem root.
pub(crate) fn find_manifest() -> anyhow::Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    let mut dir: &Path = &cwd;
    loop {
        let candidate = dir.join(MANIFEST_FILE);
        if candidate.is_file() {
            return Ok(candidate);
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => return Err(ManifestNotFound.into()),
        }
    }
}

/// Read the manifest found by [`find_manifest`].
pub(crate) fn read_project() -> anyhow::Result<(Project, PathBuf)> {
    let path = find_manifest()?;
    let project = read_project_from(&path)?;
    Ok((project, path))
}

pub(crate) fn read_project_from(path: &Path) -> anyhow::Result<Project> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
}

/// Write the manifest: dependencies sorted by name, indented with one tab,
/// newline-terminated. Fails when any dependency has no pinned version.
pub(crate) fn write_project(project: &mut Project, path: &Path) -> anyhow::Result<()> {
    project
        .dependencies
        .sort_by(|a, b| a.name.cmp(&b.name));

    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    project
        .serialize(&mut serializer)
        .with_context(|| format!("serializing {}", path.display()))?;
    buffer.push(b'\n');

    fs::write(path, buffer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rope_normalize::PackageName;
    use rope_pep440::Version;

    use super::*;

    fn pinned(name: &str, version: &str) -> PackageRequest {
        PackageRequest::pinned(
            PackageName::normalize(name),
            Version::from_str(version).unwrap(),
        )
    }

    #[test]
    fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);

        let mut project = Project {
            python: None,
            dependencies: vec![pinned("tqdm", "4.48.2"), pinned("numpy", "1.19.1")],
        };
        write_project(&mut project, &path).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        // Tab-indented, newline-terminated, sorted by name.
        assert_eq!(
            written,
            "{\n\t\"dependencies\": [\n\t\t\"numpy-1.19.1\",\n\t\t\"tqdm-4.48.2\"\n\t]\n}\n"
        );

        let read_back = read_project_from(&path).unwrap();
        assert_eq!(read_back.dependencies.len(), 2);
        assert_eq!(read_back.dependencies[0].name.as_ref(), "numpy");
    }

    #[test]
    fn unpinned_dependencies_refuse_to_serialize() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);

        let mut project = Project {
            python: None,
            dependencies: vec![PackageRequest::latest(PackageName::normalize("numpy"))],
        };
        assert!(write_project(&mut project, &path).is_err());
    }
}
