//! The wheel cache.
//!
//! Downloaded wheels, and wheels built from source distributions, are stored
//! per package under `<cache-root>/<CACHE_VERSION>/<normalized-name>/`.
//! Alongside the wheels, a newline-delimited JSON log `index.json` records
//! one `{file, requires_dist, requires_python}` entry per wheel so that
//! later runs can answer dependency queries without re-reading `METADATA`.
//!
//! The log is append-only and entries may repeat; the latest entry for a
//! filename wins. A wheel is moved into place (an atomic rename within the
//! cache filesystem) *before* its log entry is appended, so readers never
//! observe an entry whose file is missing.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use fs_err as fs;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, warn};

use rope_distribution_filename::WheelFilename;
use rope_pep440::Version;
use rope_platform_tags::Environment;

/// Bumped whenever the cache layout changes incompatibly.
pub const CACHE_VERSION: &str = "0";

const INDEX_FILE: &str = "index.json";

/// The per-package wheel store.
#[derive(Debug)]
pub struct Cache {
    root: PathBuf,
    /// Keeps a temporary cache alive for the duration of the command; the
    /// directory is removed when the cache is dropped.
    temp_dir: Option<TempDir>,
}

/// One line of a per-package `index.json` log.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    file: String,
    #[serde(default)]
    requires_dist: Vec<String>,
    #[serde(default)]
    requires_python: String,
}

/// A wheel found in the cache, with the metadata recorded in the log.
#[derive(Debug, Clone)]
pub struct CachedWheel {
    pub filename: WheelFilename,
    pub path: PathBuf,
    pub requires_dist: Vec<String>,
    pub requires_python: Option<String>,
}

/// Cache initialization and write errors. Read errors are not represented:
/// an unreadable log degrades to a cache miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("no user cache directory is available on this platform")]
    NoUserCacheDir,
    #[error("creating cache directory")]
    Create(#[source] std::io::Error),
    #[error("moving wheel into the cache")]
    Publish(#[source] std::io::Error),
    #[error("appending to the cache index")]
    Append(#[source] std::io::Error),
}

impl Cache {
    /// The durable per-user cache, e.g. `~/.cache/rope` on Linux.
    pub fn from_user_cache_dir() -> Result<Self, CacheError> {
        let dirs = directories::ProjectDirs::from("", "", "rope")
            .ok_or(CacheError::NoUserCacheDir)?;
        Self::from_path(dirs.cache_dir())
    }

    /// A cache rooted at a caller-chosen directory.
    pub fn from_path(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(CacheError::Create)?;
        Ok(Self {
            root,
            temp_dir: None,
        })
    }

    /// A scratch cache that is removed when dropped.
    pub fn temp() -> Result<Self, CacheError> {
        let temp_dir = tempfile::Builder::new()
            .prefix("rope-cache-")
            .tempdir()
            .map_err(CacheError::Create)?;
        Ok(Self {
            root: temp_dir.path().to_path_buf(),
            temp_dir: Some(temp_dir),
        })
    }

    /// The cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether this cache is a scratch cache.
    pub fn is_temporary(&self) -> bool {
        self.temp_dir.is_some()
    }

    /// The directory holding a package's wheels and log.
    pub fn package_dir(&self, name: &str) -> PathBuf {
        self.root.join(CACHE_VERSION).join(name)
    }

    /// Search the cache for a wheel of `name` at exactly `version` that is
    /// compatible with `env`. Metadata comes from the log, skipping a later
    /// `METADATA` re-read. A missing or unreadable log is a miss.
    pub fn get_wheel(&self, name: &str, version: &Version, env: &Environment) -> Option<CachedWheel> {
        let dir = self.package_dir(name);
        let log = match fs::read_to_string(dir.join(INDEX_FILE)) {
            Ok(log) => log,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!("unreadable cache index for {name}, treating as a miss: {err}");
                return None;
            }
        };

        // Later entries for the same filename supersede earlier ones.
        let mut entries: Vec<IndexEntry> = Vec::new();
        for line in log.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<IndexEntry>(line) {
                Ok(entry) => {
                    entries.retain(|existing| existing.file != entry.file);
                    entries.push(entry);
                }
                Err(err) => {
                    warn!("skipping malformed cache index line for {name}: {err}");
                }
            }
        }

        for entry in entries {
            let Ok(filename) = WheelFilename::from_str(&entry.file) else {
                warn!("skipping cache entry with unparseable filename: {}", entry.file);
                continue;
            };
            if &filename.version == version && filename.is_compatible(env) {
                debug!("cache hit for {name}-{version}: {}", entry.file);
                return Some(CachedWheel {
                    path: dir.join(&entry.file),
                    filename,
                    requires_dist: entry.requires_dist,
                    requires_python: (!entry.requires_python.is_empty())
                        .then_some(entry.requires_python),
                });
            }
        }

        None
    }

    /// Move the wheel at `source` into the cache and append its log entry,
    /// returning the new path. The move is published before the log entry so
    /// a reader never sees an entry without its file; `source` must live on
    /// the cache filesystem for the rename to be atomic.
    pub fn add_wheel(
        &self,
        filename: &WheelFilename,
        requires_dist: &[String],
        requires_python: Option<&str>,
        source: &Path,
    ) -> Result<PathBuf, CacheError> {
        let dir = self.package_dir(filename.name.as_ref());
        fs::create_dir_all(&dir).map_err(CacheError::Create)?;

        let file = filename.to_string();
        let target = dir.join(&file);
        fs::rename(source, &target).map_err(CacheError::Publish)?;

        let entry = IndexEntry {
            file,
            requires_dist: requires_dist.to_vec(),
            requires_python: requires_python.unwrap_or_default().to_string(),
        };
        let mut log = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(INDEX_FILE))
            .map_err(CacheError::Append)?;
        let mut line = serde_json::to_string(&entry).expect("cache entries always serialize");
        line.push('\n');
        log.write_all(line.as_bytes()).map_err(CacheError::Append)?;

        debug!("cached wheel {}", target.display());
        Ok(target)
    }
}
