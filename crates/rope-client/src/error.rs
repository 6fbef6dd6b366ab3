use thiserror::Error;
use url::Url;

/// Transport and payload errors from the index client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("package not found in the index")]
    PackageNotFound,

    #[error("package not found in cache (ROPE_CACHE_ONLY is set): {0}")]
    CacheOnly(String),

    #[error("failed HTTP request: {status} for {url}")]
    Status { url: Url, status: reqwest::StatusCode },

    #[error(transparent)]
    Request(#[from] reqwest::Error),

    #[error("invalid URL '{input}'")]
    InvalidUrl {
        input: String,
        #[source]
        source: url::ParseError,
    },

    #[error("decoding JSON response from {url}")]
    Json {
        url: Url,
        #[source]
        source: serde_json::Error,
    },

    #[error("parsing the index page from {url}")]
    BadHtml { url: Url },

    #[error("sha256 checksum is not valid hex: '{0}'")]
    ChecksumInvalidHex(String),

    #[error("checksum mismatch for {url}: got {got}, expected {expected}")]
    ChecksumMismatch {
        url: Url,
        got: String,
        expected: String,
    },

    #[error("writing download to disk")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error is the index reporting an unknown package or
    /// version, which some lookups recover from by relaxing the query.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::PackageNotFound)
    }
}
