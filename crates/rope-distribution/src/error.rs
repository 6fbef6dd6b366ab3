use std::path::PathBuf;

use thiserror::Error;

use rope_cache::CacheError;

/// Errors from fetching, building and installing distributions.
#[derive(Debug, Error)]
pub enum DistError {
    #[error(transparent)]
    Client(#[from] rope_client::Error),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("reading wheel archive")]
    Zip(#[from] zip::result::ZipError),

    #[error("no *.dist-info/METADATA found in '{0}'")]
    MissingMetadata(String),

    #[error("wheel '{0}' has no download URL and is not on disk")]
    NoSource(String),

    #[error("invalid source distribution: expected '{}' to exist after extraction", .0.display())]
    MissingExtractionRoot(PathBuf),

    #[error("building '{filename}' failed:\n--- stdout:\n{stdout}\n--- stderr:\n{stderr}\n---")]
    BuildFailed {
        filename: String,
        stdout: String,
        stderr: String,
    },

    #[error("expected the build of '{filename}' to produce exactly one wheel, found {count}")]
    UnexpectedBuildOutput { filename: String, count: usize },

    #[error("built wheel '{0}' is not parseable")]
    InvalidBuiltWheel(String, #[source] rope_distribution_filename::WheelFilenameError),

    #[error("built wheel '{0}' is incompatible with the current environment")]
    IncompatibleBuiltWheel(String),
}
