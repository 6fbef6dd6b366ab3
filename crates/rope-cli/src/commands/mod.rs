use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;

use rope_cache::Cache;
use rope_client::RopeClient;
use rope_distribution::DistContext;
use rope_platform_tags::Environment;

pub(crate) use add::add;
pub(crate) use export::export;
pub(crate) use init::init;
pub(crate) use pythonpath::{pythonpath, run};

mod add;
mod export;
mod init;
mod pythonpath;

/// The directory wheels are unpacked into, relative to the working
/// directory.
pub(crate) const INSTALL_ROOT: &str = "ropedir";

#[derive(Copy, Clone)]
pub(crate) enum ExitStatus {
    /// The command succeeded.
    Success,
    /// The command failed at runtime.
    Failure,
    /// The command was used incorrectly.
    Usage,
    /// A child process decided the exit code.
    External(u8),
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        match status {
            ExitStatus::Success => Self::SUCCESS,
            ExitStatus::Failure => Self::from(1),
            ExitStatus::Usage => Self::from(2),
            ExitStatus::External(code) => Self::from(code),
        }
    }
}

/// The shared per-command state: HTTP client, wheel cache, and the detected
/// host environment. Constructed once per command and torn down when the
/// command completes.
pub(crate) struct Session {
    pub(crate) client: RopeClient,
    pub(crate) cache: Cache,
    pub(crate) env: Environment,
}

impl Session {
    pub(crate) fn new() -> anyhow::Result<Self> {
        let client = RopeClient::new()?;
        let cache = Cache::from_user_cache_dir()?;
        let env = Environment::detect().context("detecting the Python environment")?;
        Ok(Self { client, cache, env })
    }

    pub(crate) fn dist_context(&self) -> DistContext<'_> {
        DistContext {
            client: &self.client,
            cache: &self.cache,
            env: &self.env,
            install_root: Path::new(INSTALL_ROOT),
        }
    }
}
