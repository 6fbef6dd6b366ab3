use std::io::Write;

use anyhow::Context;

use rope_resolver::{resolve, SimpleIndex};

use crate::commands::{ExitStatus, Session};
use crate::project;

/// Write the build list to stdout as `<name>==<version>` lines, a format
/// pip accepts as a requirements file.
pub(crate) async fn export() -> anyhow::Result<ExitStatus> {
    let (project, _) = project::read_project()?;

    let session = Session::new()?;
    let index = SimpleIndex::new(&session.client, &session.cache, &session.env);
    let resolution = resolve(&project.dependencies, &index, &session.env)
        .await
        .context("failed version selection")?;

    let mut stdout = std::io::stdout().lock();
    for entry in &resolution.build_list {
        writeln!(stdout, "{}=={}", entry.name, entry.version)?;
    }
    Ok(ExitStatus::Success)
}
