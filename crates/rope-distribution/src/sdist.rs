use std::path::{Path, PathBuf};
use std::str::FromStr;

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use fs_err as fs;
use tar::Archive;
use tracing::info;
use url::Url;
use zip::ZipArchive;

use rope_distribution_filename::{SdistExtension, SdistFilename, WheelFilename};
use rope_platform_tags::{Environment, PYTHON};

use crate::error::DistError;
use crate::wheel::{read_metadata, Wheel};
use crate::{DistContext, PackageRequest};

/// Shim wrapping the `setup.py` invocation with setuptools, allowing legacy
/// packages without a `pyproject.toml` to be built. This is the same method
/// pip uses.
///
/// <https://github.com/pypa/pip/blob/9cbe8fbd/src/pip/_internal/utils/setuptools_build.py#L14-L20>
const SETUPTOOLS_SHIM: &str = concat!(
    "import sys, setuptools, tokenize; sys.argv[0] = 'setup.py'; ",
    "__file__='setup.py';",
    "f=getattr(tokenize, 'open', open)(__file__);",
    r"code=f.read().replace('\r\n', '\n');",
    "f.close();",
    "exec(compile(code, __file__, 'exec'))"
);

/// A source distribution.
///
/// Installing one requires converting it to a wheel first, which runs the
/// Python interpreter and may in turn execute arbitrary code from the
/// archive.
#[derive(Debug, Clone)]
pub struct Sdist {
    pub filename: SdistFilename,
    /// Set when the archive was found in a remote index.
    pub url: Option<Url>,
    /// The wheel built from this source distribution, once converted.
    built: Option<Wheel>,
}

impl Sdist {
    /// A source distribution advertised by a remote index.
    pub fn remote(filename: SdistFilename, url: Url) -> Self {
        Self {
            filename,
            url: Some(url),
            built: None,
        }
    }

    /// Dependencies are unknown until the archive has been built; the first
    /// resolution pass sees an empty list and the resolver tolerates that.
    pub fn dependencies(&self, env: &Environment) -> Vec<PackageRequest> {
        match &self.built {
            Some(wheel) => wheel.dependencies(env),
            None => Vec::new(),
        }
    }

    /// Convert to a wheel (if not done yet), then install the wheel.
    pub async fn install(&mut self, ctx: &DistContext<'_>) -> Result<PathBuf, DistError> {
        if self.built.is_none() {
            self.convert(ctx).await?;
        }
        self.built
            .as_mut()
            .expect("convert leaves a built wheel")
            .install(ctx)
            .await
    }

    /// Download, extract and build the source distribution, publishing the
    /// resulting wheel to the cache.
    ///
    /// The build runs `python -c <setuptools-shim> bdist_wheel -d <tmp>` in
    /// the extracted archive root with `PYTHONPATH` cleared, so a minimal
    /// version selected for this project cannot leak into the build. Exactly
    /// one `*.whl` is expected as output; it must be compatible with the
    /// current environment.
    pub async fn convert(&mut self, ctx: &DistContext<'_>) -> Result<(), DistError> {
        let url = self
            .url
            .clone()
            .ok_or_else(|| DistError::NoSource(self.filename.to_string()))?;

        info!("converting source distribution {}", self.filename);
        let scratch = tempfile::Builder::new()
            .prefix(&format!("rope-build-{}-", self.filename.name))
            .tempdir()?;

        let archive = scratch.path().join(self.filename.to_string());
        ctx.client.download_to(&url, &archive).await?;

        let extracted = scratch.path().join("extracted");
        extract_archive(&archive, self.filename.extension, &extracted)?;

        // Sdists contain a single `<name>-<version>` top-level directory.
        // The directory may use the unnormalized project name, so fall back
        // to a sole top-level directory when the expected one is missing.
        let mut root = extracted.join(stem(&self.filename));
        if !root.is_dir() {
            let top_level: Vec<PathBuf> = fs::read_dir(&extracted)?
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .filter(|path| path.is_dir())
                .collect();
            match top_level.as_slice() {
                [single] => root = single.clone(),
                _ => return Err(DistError::MissingExtractionRoot(root)),
            }
        }

        let wheel_dir = scratch.path().join("wheel");
        let output = tokio::process::Command::new(PYTHON)
            .arg("-c")
            .arg(SETUPTOOLS_SHIM)
            .arg("bdist_wheel")
            .arg("-d")
            .arg(&wheel_dir)
            .current_dir(&root)
            .env("PYTHONPATH", "")
            .output()
            .await?;
        if !output.status.success() {
            return Err(DistError::BuildFailed {
                filename: self.filename.to_string(),
                stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let mut wheels: Vec<PathBuf> = fs::read_dir(&wheel_dir)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "whl"))
            .collect();
        if wheels.len() != 1 {
            return Err(DistError::UnexpectedBuildOutput {
                filename: self.filename.to_string(),
                count: wheels.len(),
            });
        }
        let built_path = wheels.remove(0);
        let built_name = built_path
            .file_name()
            .expect("read_dir entries have file names")
            .to_string_lossy()
            .to_string();

        let wheel_filename = WheelFilename::from_str(&built_name)
            .map_err(|err| DistError::InvalidBuiltWheel(built_name.clone(), err))?;
        if !wheel_filename.is_compatible(ctx.env) {
            return Err(DistError::IncompatibleBuiltWheel(built_name));
        }

        let (requires_dist, requires_python) = read_metadata(&wheel_filename, &built_path)?;

        // Stage the wheel on the cache filesystem, then publish it.
        let staging = tempfile::Builder::new()
            .prefix(".building-")
            .tempfile_in(ctx.cache.root())?
            .into_temp_path();
        fs::copy(&built_path, &staging)?;
        let cached = ctx.cache.add_wheel(
            &wheel_filename,
            &requires_dist,
            requires_python.as_deref(),
            &staging,
        )?;

        let mut wheel = Wheel::from_path(wheel_filename, cached);
        wheel.requires_dist = requires_dist;
        wheel.requires_python = requires_python;
        self.built = Some(wheel);
        Ok(())
    }
}

/// The filename without its archive suffix, which is also the name of the
/// directory the archive extracts to.
fn stem(filename: &SdistFilename) -> String {
    format!("{}-{}", filename.name, filename.version)
}

/// Unpack a source archive into `dest`. Directory entries are not relied
/// upon; the tar unpacker creates parents from the file paths (some archives
/// omit directory entries entirely).
fn extract_archive(
    archive: &Path,
    extension: SdistExtension,
    dest: &Path,
) -> Result<(), DistError> {
    fs::create_dir_all(dest)?;
    match extension {
        SdistExtension::TarGz | SdistExtension::Tgz => {
            Archive::new(GzDecoder::new(fs::File::open(archive)?)).unpack(dest)?;
        }
        SdistExtension::TarBz2 => {
            Archive::new(BzDecoder::new(fs::File::open(archive)?)).unpack(dest)?;
        }
        SdistExtension::Zip => {
            ZipArchive::new(fs::File::open(archive)?)?.extract(dest)?;
        }
    }
    Ok(())
}
