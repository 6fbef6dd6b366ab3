use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::Context;

use rope_resolver::{resolve, Index, SimpleIndex};

use crate::commands::{ExitStatus, Session};
use crate::project;

/// Resolve and install the project's dependencies, returning the install
/// directories in resolver order.
async fn install_all(session: &Session) -> anyhow::Result<Vec<PathBuf>> {
    let (project, _) = project::read_project()?;

    let index = SimpleIndex::new(&session.client, &session.cache, &session.env);
    let resolution = resolve(&project.dependencies, &index, &session.env)
        .await
        .context("failed version selection")?;

    let mut paths = Vec::with_capacity(resolution.build_list.len());
    for entry in &resolution.build_list {
        let mut dist = index
            .find_package(&entry.name, Some(&entry.version))
            .await
            .context("failed to find package after version selection")?;
        let path = dist
            .install(&session.dist_context())
            .await
            .with_context(|| format!("installing '{}-{}'", entry.name, entry.version))?;
        paths.push(path);
    }
    Ok(paths)
}

/// Print the `PYTHONPATH` that makes the resolved packages importable.
pub(crate) async fn pythonpath() -> anyhow::Result<ExitStatus> {
    let session = Session::new()?;
    let paths = install_all(&session).await?;
    let joined = std::env::join_paths(paths).context("joining install directories")?;
    print!("{}", joined.to_string_lossy());
    Ok(ExitStatus::Success)
}

/// Run a command with `PYTHONPATH` set up, prepending the resolved install
/// directories to any existing value.
pub(crate) async fn run(command: &[String]) -> anyhow::Result<ExitStatus> {
    let session = Session::new()?;
    let mut paths = install_all(&session).await?;
    if let Some(existing) = std::env::var_os("PYTHONPATH") {
        paths.extend(std::env::split_paths(&existing));
    }
    let value: OsString = std::env::join_paths(paths).context("joining install directories")?;

    let (program, args) = command
        .split_first()
        .expect("clap requires at least the command");
    let status = std::process::Command::new(program)
        .args(args)
        .env("PYTHONPATH", value)
        .status()
        .with_context(|| format!("running '{program}'"))?;

    match status.code() {
        Some(0) => Ok(ExitStatus::Success),
        Some(code) => Ok(ExitStatus::External(code.clamp(0, 255) as u8)),
        // Terminated by a signal.
        None => Ok(ExitStatus::Failure),
    }
}
