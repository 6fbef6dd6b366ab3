use std::path::Path;

use futures::StreamExt;
use reqwest::{Client, ClientBuilder, Response, StatusCode};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use url::Url;

use rope_normalize::PackageName;
use rope_pep440::Version;

use crate::error::Error;
use crate::html::SimplePage;
use crate::types::PypiResponse;

/// The default Python package index.
pub const PYTHON_PACKAGE_INDEX: &str = "https://pypi.org";

/// The default PEP 503 simple index root.
pub const DEFAULT_SIMPLE_INDEX: &str = "https://pypi.org/simple";

/// When set, every network access fails and missing cache entries become
/// errors.
const CACHE_ONLY_VAR: &str = "ROPE_CACHE_ONLY";

/// A client for PEP 503 simple indexes, the PyPI JSON API, and artifact
/// downloads.
#[derive(Debug, Clone)]
pub struct RopeClient {
    client: Client,
    cache_only: bool,
}

impl RopeClient {
    /// Build a client. Redirects are followed; `ROPE_CACHE_ONLY=1` turns
    /// every request into an error.
    pub fn new() -> Result<Self, Error> {
        let client = ClientBuilder::new()
            .user_agent(concat!("rope/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let cache_only = std::env::var(CACHE_ONLY_VAR)
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Ok(Self { client, cache_only })
    }

    /// Whether `ROPE_CACHE_ONLY` forbids network fetches.
    pub fn cache_only(&self) -> bool {
        self.cache_only
    }

    fn guard_network(&self, what: &str) -> Result<(), Error> {
        if self.cache_only {
            Err(Error::CacheOnly(what.to_string()))
        } else {
            Ok(())
        }
    }

    async fn get(&self, url: Url) -> Result<Response, Error> {
        self.guard_network(url.as_str())?;
        let response = self.client.get(url.clone()).send().await?;
        match response.status() {
            StatusCode::OK => Ok(response),
            StatusCode::NOT_FOUND => Err(Error::PackageNotFound),
            status => Err(Error::Status { url, status }),
        }
    }

    /// Fetch and parse the simple-index page for a package:
    /// `GET <root>/<normalized-name>/`.
    pub async fn simple_page(
        &self,
        root: &str,
        name: &PackageName,
    ) -> Result<SimplePage, Error> {
        let url = parse_url(&format!("{}/{}/", root.trim_end_matches('/'), name))?;
        debug!("fetching simple index page {url}");
        let response = self.get(url).await?;
        // Redirects may have moved the page; resolve links against the final
        // URL.
        let base = response.url().clone();
        let text = response.text().await?;
        SimplePage::parse(&text, &base)
    }

    /// Fetch the JSON metadata for a package:
    /// `GET <root>/pypi/<name>/<version>/json`, or without the version for a
    /// "latest acceptable" query.
    pub async fn pypi_metadata(
        &self,
        root: &str,
        name: &PackageName,
        version: Option<&Version>,
    ) -> Result<PypiResponse, Error> {
        let root = root.trim_end_matches('/');
        let url = match version {
            Some(version) => parse_url(&format!("{root}/pypi/{name}/{version}/json"))?,
            None => parse_url(&format!("{root}/pypi/{name}/json"))?,
        };
        debug!("fetching package metadata {url}");
        let response = self.get(url.clone()).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|err| Error::Json { url, source: err })
    }

    /// Download `url` to `dest`, verifying a `#sha256=<hex>` URL fragment
    /// when present by teeing the stream through a digest.
    pub async fn download_to(&self, url: &Url, dest: &Path) -> Result<(), Error> {
        self.guard_network(url.as_str())?;

        let expected = expected_sha256(url)?;
        let response = self.client.get(url.clone()).send().await?;
        if response.status() != StatusCode::OK {
            return Err(Error::Status {
                url: url.clone(),
                status: response.status(),
            });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut hasher = expected.as_ref().map(|_| Sha256::new());
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if let Some(hasher) = hasher.as_mut() {
                hasher.update(&chunk);
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        if let (Some(expected), Some(hasher)) = (expected, hasher) {
            let got = hex_encode(hasher.finalize().as_slice());
            if got != expected {
                return Err(Error::ChecksumMismatch {
                    url: url.clone(),
                    got,
                    expected,
                });
            }
        }

        Ok(())
    }
}

fn parse_url(input: &str) -> Result<Url, Error> {
    Url::parse(input).map_err(|err| Error::InvalidUrl {
        input: input.to_string(),
        source: err,
    })
}

/// Extract the lowercase hex digest from a `#sha256=<hex>` URL fragment.
fn expected_sha256(url: &Url) -> Result<Option<String>, Error> {
    let Some(fragment) = url.fragment() else {
        return Ok(None);
    };
    for pair in fragment.split('&') {
        if let Some(hex) = pair.strip_prefix("sha256=") {
            if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(Error::ChecksumInvalidHex(hex.to_string()));
            }
            return Ok(Some(hex.to_ascii_lowercase()));
        }
    }
    Ok(None)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_fragment_extraction() {
        let url = Url::parse(&format!(
            "https://example.org/a-1.0.tar.gz#sha256={}",
            "ab".repeat(32)
        ))
        .unwrap();
        assert_eq!(expected_sha256(&url).unwrap(), Some("ab".repeat(32)));

        let url = Url::parse("https://example.org/a-1.0.tar.gz").unwrap();
        assert_eq!(expected_sha256(&url).unwrap(), None);

        let url = Url::parse("https://example.org/a-1.0.tar.gz#sha256=nothex").unwrap();
        assert!(expected_sha256(&url).is_err());
    }
}
