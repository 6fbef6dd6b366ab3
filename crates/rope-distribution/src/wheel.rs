use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use fs_err as fs;
use tracing::{debug, info, warn};
use url::Url;
use zip::ZipArchive;

use rope_cache::{Cache, CachedWheel, CACHE_VERSION};
use rope_client::RopeClient;
use rope_distribution_filename::WheelFilename;
use rope_pep440::minimal_version;
use rope_pep508::Dependency;
use rope_platform_tags::Environment;

use crate::error::DistError;
use crate::{DistContext, PackageRequest};

/// A built distribution.
///
/// `url` is set when the wheel was found in a remote index; `path` is set
/// once the wheel exists on the local filesystem (ownership of the file sits
/// with the cache from that point on).
#[derive(Debug, Clone)]
pub struct Wheel {
    pub filename: WheelFilename,
    pub url: Option<Url>,
    pub path: Option<PathBuf>,
    /// Raw `Requires-Dist` lines, from the index metadata, the cache log, or
    /// the embedded `METADATA` file.
    pub requires_dist: Vec<String>,
    pub requires_python: Option<String>,
}

impl Wheel {
    /// A wheel advertised by a remote index.
    pub fn remote(filename: WheelFilename, url: Url) -> Self {
        Self {
            filename,
            url: Some(url),
            path: None,
            requires_dist: Vec::new(),
            requires_python: None,
        }
    }

    /// A wheel found in the cache, metadata included.
    pub fn from_cached(cached: CachedWheel) -> Self {
        Self {
            filename: cached.filename,
            url: None,
            path: Some(cached.path),
            requires_dist: cached.requires_dist,
            requires_python: cached.requires_python,
        }
    }

    /// A wheel that already exists on disk, e.g. freshly built from a source
    /// distribution.
    pub fn from_path(filename: WheelFilename, path: PathBuf) -> Self {
        Self {
            filename,
            url: None,
            path: Some(path),
            requires_dist: Vec::new(),
            requires_python: None,
        }
    }

    /// Make sure the wheel exists on the local filesystem: download it into
    /// the cache, reading dependency metadata from the archive unless the
    /// index already provided it. No-op when the wheel was already fetched.
    pub async fn fetch(&mut self, client: &RopeClient, cache: &Cache) -> Result<(), DistError> {
        if self.path.is_some() {
            return Ok(());
        }
        let url = self
            .url
            .clone()
            .ok_or_else(|| DistError::NoSource(self.filename.to_string()))?;

        info!("downloading {}", self.filename);
        // Stage the download inside the cache root so the publishing rename
        // stays on one filesystem.
        let staging = tempfile::Builder::new()
            .prefix(".downloading-")
            .tempfile_in(cache.root())?
            .into_temp_path();
        client.download_to(&url, &staging).await?;

        if self.requires_dist.is_empty() {
            let (requires_dist, requires_python) = read_metadata(&self.filename, &staging)?;
            self.requires_dist = requires_dist;
            if self.requires_python.is_none() {
                self.requires_python = requires_python;
            }
        }

        let cached = cache.add_wheel(
            &self.filename,
            &self.requires_dist,
            self.requires_python.as_deref(),
            &staging,
        )?;
        self.path = Some(cached);
        Ok(())
    }

    /// Read dependency metadata from the archive on disk, unless the index
    /// or cache already provided it.
    pub fn extract_metadata(&mut self) -> Result<(), DistError> {
        if !self.requires_dist.is_empty() {
            return Ok(());
        }
        let path = self
            .path
            .clone()
            .ok_or_else(|| DistError::NoSource(self.filename.to_string()))?;
        let (requires_dist, requires_python) = read_metadata(&self.filename, &path)?;
        self.requires_dist = requires_dist;
        if self.requires_python.is_none() {
            self.requires_python = requires_python;
        }
        Ok(())
    }

    /// The dependencies that apply under `env`: each `Requires-Dist` line is
    /// parsed, its markers evaluated, and its constraint list collapsed to
    /// the highest lower bound. Unparseable or unevaluable lines are logged
    /// and dropped rather than failing the resolution.
    pub fn dependencies(&self, env: &Environment) -> Vec<PackageRequest> {
        let mut requests = Vec::new();
        for line in &self.requires_dist {
            let dependency = match Dependency::from_str(line) {
                Ok(dependency) => dependency,
                Err(err) => {
                    warn!("{}: skipping requirement '{line}': {err}", self.filename.name);
                    continue;
                }
            };
            match dependency.evaluate(env.markers()) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(err) => {
                    warn!("{}: skipping requirement '{line}': {err}", self.filename.name);
                    continue;
                }
            }
            requests.push(PackageRequest::new(
                dependency.name,
                minimal_version(&dependency.specifiers),
            ));
        }
        requests
    }

    /// Unpack the wheel into
    /// `<install-root>/<CACHE_VERSION>/<wheel-stem>/`, fetching it first if
    /// necessary, and return that directory. An existing target directory is
    /// reused as-is.
    pub async fn install(&mut self, ctx: &DistContext<'_>) -> Result<PathBuf, DistError> {
        self.fetch(ctx.client, ctx.cache).await?;
        let archive = self
            .path
            .clone()
            .expect("fetch leaves the wheel on disk");

        let target = ctx
            .install_root
            .join(CACHE_VERSION)
            .join(self.filename.stem());
        if target.exists() {
            debug!("wheel already installed at {}", target.display());
            return Ok(target);
        }

        info!("installing wheel {}", self.filename);
        unzip_wheel(&archive, &target)?;
        Ok(target)
    }
}

/// Unpack every regular file of the archive under `target`. Files are
/// written with mode 0444 so users cannot silently mutate an installed
/// package out from under their other projects. Directory entries are
/// skipped; parent directories are created from the file paths (some
/// archives carry no directory entries at all).
fn unzip_wheel(archive_path: &Path, target: &Path) -> Result<(), DistError> {
    let mut archive = ZipArchive::new(fs::File::open(archive_path)?)?;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            warn!("skipping zip entry with an unsafe path: {}", entry.name());
            continue;
        };

        let dest = target.join(relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o444);
        }
        let mut dest_file = options.open(&dest)?;
        std::io::copy(&mut entry, &mut dest_file)?;
    }
    Ok(())
}

/// Pull `Requires-Dist` and `Requires-Python` out of the embedded
/// `*.dist-info/METADATA` file.
pub(crate) fn read_metadata(
    filename: &WheelFilename,
    path: &Path,
) -> Result<(Vec<String>, Option<String>), DistError> {
    let mut archive = ZipArchive::new(fs::File::open(path)?)?;

    let metadata_name = (0..archive.len())
        .filter_map(|index| {
            let entry = archive.by_index(index).ok()?;
            entry
                .name()
                .ends_with(".dist-info/METADATA")
                .then(|| entry.name().to_string())
        })
        .next()
        .ok_or_else(|| DistError::MissingMetadata(filename.to_string()))?;

    let mut contents = String::new();
    archive
        .by_name(&metadata_name)?
        .read_to_string(&mut contents)?;

    let mut requires_dist = Vec::new();
    let mut requires_python = None;
    for line in contents.lines() {
        if let Some(value) = line.strip_prefix("Requires-Dist:") {
            requires_dist.push(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("Requires-Python:") {
            requires_python = Some(value.trim().to_string());
        }
    }

    Ok((requires_dist, requires_python))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::FileOptions;
    use zip::ZipWriter;

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

    fn write_wheel(dir: &Path, filename: &str, metadata: &str) -> PathBuf {
        let path = dir.join(filename);
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = ZipWriter::new(file);
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        writer
            .start_file("tqdm/__init__.py", options)
            .unwrap();
        writer.write_all(b"__version__ = 'test'\n").unwrap();
        writer
            .start_file("tqdm-4.48.2.dist-info/METADATA", options)
            .unwrap();
        writer.write_all(metadata.as_bytes()).unwrap();
        writer.finish().unwrap();
        path
    }

    const METADATA: &str = "\
Metadata-Version: 2.1
Name: tqdm
Version: 4.48.2
Requires-Python: >=2.7, !=3.0.*
Requires-Dist: colorama ; sys_platform == \"win32\"
Requires-Dist: requests (>=2.8.1)
Requires-Dist: argparse ; python_version < \"3\"

A progress bar.
";

    #[test]
    fn metadata_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let filename = WheelFilename::from_str("tqdm-4.48.2-py2.py3-none-any.whl").unwrap();
        let path = write_wheel(dir.path(), "tqdm-4.48.2-py2.py3-none-any.whl", METADATA);

        let (requires_dist, requires_python) = read_metadata(&filename, &path).unwrap();
        assert_eq!(requires_dist.len(), 3);
        assert_eq!(requires_python.as_deref(), Some(">=2.7, !=3.0.*"));
    }

    #[test]
    fn dependencies_are_marker_filtered_and_collapsed() {
        let dir = tempfile::tempdir().unwrap();
        let filename = WheelFilename::from_str("tqdm-4.48.2-py2.py3-none-any.whl").unwrap();
        let path = write_wheel(dir.path(), "tqdm-4.48.2-py2.py3-none-any.whl", METADATA);

        let mut wheel = Wheel::from_path(filename, path);
        wheel.extract_metadata().unwrap();
        let dependencies = wheel.dependencies(&environment());

        // colorama (win32 only) and argparse (Python 2 only) drop out.
        assert_eq!(dependencies.len(), 1);
        assert_eq!(dependencies[0].name.as_ref(), "requests");
        assert_eq!(
            dependencies[0].version.as_ref().unwrap().to_string(),
            "2.8.1"
        );
    }

    #[test]
    fn unparseable_requirements_are_dropped() {
        let filename = WheelFilename::from_str("x-1.0-py3-none-any.whl").unwrap();
        let wheel = Wheel {
            filename,
            url: None,
            path: None,
            requires_dist: vec![
                "???".to_string(),
                "requests (>=2.8.1)".to_string(),
                "pip @ https://example.org/pip.zip".to_string(),
            ],
            requires_python: None,
        };
        let dependencies = wheel.dependencies(&environment());
        assert_eq!(dependencies.len(), 1);
        assert_eq!(dependencies[0].name.as_ref(), "requests");
    }

    #[test]
    fn install_unpacks_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wheel(dir.path(), "tqdm-4.48.2-py2.py3-none-any.whl", METADATA);

        let target = dir.path().join("install").join("tqdm-4.48.2-py2.py3-none-any");
        unzip_wheel(&path, &target).unwrap();
        assert!(target.join("tqdm/__init__.py").exists());
        assert!(target.join("tqdm-4.48.2.dist-info/METADATA").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(target.join("tqdm/__init__.py"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o444);
        }
    }
}
