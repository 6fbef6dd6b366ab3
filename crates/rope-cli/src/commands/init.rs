use std::path::Path;

use anyhow::bail;

use crate::commands::ExitStatus;
use crate::project::{self, ManifestNotFound, Project, MANIFEST_FILE};

/// Create an empty manifest in the current directory, unless the directory
/// already belongs to a project.
pub(crate) fn init() -> anyhow::Result<ExitStatus> {
    match project::find_manifest() {
        Ok(path) => bail!("rope.json already found at: {}", path.display()),
        Err(err) if err.downcast_ref::<ManifestNotFound>().is_some() => {}
        Err(err) => return Err(err),
    }

    project::write_project(&mut Project::default(), Path::new(MANIFEST_FILE))?;
    Ok(ExitStatus::Success)
}
