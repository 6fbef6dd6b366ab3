use thiserror::Error;

use rope_distribution::DistError;

/// Errors from index lookups and graph resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("package '{0}' not found in the index")]
    PackageNotFound(String),

    #[error("no artifact of '{0}' is compatible with the current environment")]
    NoCompatibleArtifact(String),

    #[error(transparent)]
    Client(#[from] rope_client::Error),

    #[error(transparent)]
    Dist(#[from] DistError),

    /// Wraps a failure with the `name-version` edge it occurred on, forming
    /// a requirement chain from a top-level dependency to the failing edge.
    #[error("finding package '{context}'")]
    Context {
        context: String,
        #[source]
        source: Box<ResolveError>,
    },
}

impl ResolveError {
    /// Attach the `name-version` edge a lookup failed on.
    pub(crate) fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}
