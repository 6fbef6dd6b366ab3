//! Normalized package and extra names.
//!
//! See:
//! - <https://peps.python.org/pep-0503/#normalized-names>
//! - <https://peps.python.org/pep-0508/#names>

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

static NAME_NORMALIZE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-_.]+").unwrap());
static NAME_VALIDATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^([A-Z0-9]|[A-Z0-9][A-Z0-9._-]*[A-Z0-9])$").unwrap());

/// The error when a string is not a valid package or extra name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error(
    "'{input}' is not a valid name (names must start and end with a letter or \
     digit and may only contain -, _, . and alphanumeric characters)"
)]
pub struct InvalidNameError {
    input: String,
}

/// A normalized package name: lowercase, with every run of `-`, `_` and `.`
/// collapsed to a single `-`, so `Friendly._.Bard` becomes `friendly-bard`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageName(String);

impl PackageName {
    /// Normalize a name without validating it first. Normalization is
    /// idempotent.
    pub fn normalize(name: impl AsRef<str>) -> Self {
        let mut normalized = NAME_NORMALIZE.replace_all(name.as_ref(), "-").to_string();
        normalized.make_ascii_lowercase();
        Self(normalized)
    }

    /// Validate, then normalize a name.
    pub fn validate(name: impl AsRef<str>) -> Result<Self, InvalidNameError> {
        if NAME_VALIDATE.is_match(name.as_ref()) {
            Ok(Self::normalize(name))
        } else {
            Err(InvalidNameError {
                input: name.as_ref().to_string(),
            })
        }
    }
}

impl FromStr for PackageName {
    type Err = InvalidNameError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::validate(name)
    }
}

impl Display for PackageName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

impl Serialize for PackageName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for PackageName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::validate(&s).map_err(de::Error::custom)
    }
}

/// A normalized extra name, e.g. `test` in `requests[test]`. Extras share
/// the package-name grammar and normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExtraName(String);

impl ExtraName {
    /// Normalize an extra name without validating it first.
    pub fn normalize(name: impl AsRef<str>) -> Self {
        let mut normalized = NAME_NORMALIZE.replace_all(name.as_ref(), "-").to_string();
        normalized.make_ascii_lowercase();
        Self(normalized)
    }

    /// Validate, then normalize an extra name.
    pub fn validate(name: impl AsRef<str>) -> Result<Self, InvalidNameError> {
        if NAME_VALIDATE.is_match(name.as_ref()) {
            Ok(Self::normalize(name))
        } else {
            Err(InvalidNameError {
                input: name.as_ref().to_string(),
            })
        }
    }
}

impl FromStr for ExtraName {
    type Err = InvalidNameError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::validate(name)
    }
}

impl Display for ExtraName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for ExtraName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}
