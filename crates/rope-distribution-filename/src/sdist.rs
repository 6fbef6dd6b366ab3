use std::fmt::{Display, Formatter};

use thiserror::Error;

use rope_normalize::PackageName;
use rope_pep440::{Version, VersionParseError};

/// The archive formats a source distribution may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdistExtension {
    TarGz,
    Zip,
    TarBz2,
    Tgz,
}

impl SdistExtension {
    /// Strip a known source distribution suffix from `filename`.
    pub fn split(filename: &str) -> Option<(&str, Self)> {
        if let Some(stem) = filename.strip_suffix(".tar.gz") {
            return Some((stem, Self::TarGz));
        }
        if let Some(stem) = filename.strip_suffix(".zip") {
            return Some((stem, Self::Zip));
        }
        if let Some(stem) = filename.strip_suffix(".tar.bz2") {
            return Some((stem, Self::TarBz2));
        }
        if let Some(stem) = filename.strip_suffix(".tgz") {
            return Some((stem, Self::Tgz));
        }
        None
    }
}

impl Display for SdistExtension {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TarGz => f.write_str("tar.gz"),
            Self::Zip => f.write_str("zip"),
            Self::TarBz2 => f.write_str("tar.bz2"),
            Self::Tgz => f.write_str("tgz"),
        }
    }
}

/// A parsed source distribution filename, `<name>-<version>.<extension>`.
///
/// Package names may themselves contain hyphens, so the name/version split
/// is on the rightmost `-` of the stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdistFilename {
    pub name: PackageName,
    pub version: Version,
    pub extension: SdistExtension,
}

impl SdistFilename {
    /// Parse a source distribution filename.
    pub fn parse(filename: &str) -> Result<Self, SdistFilenameError> {
        let Some((stem, extension)) = SdistExtension::split(filename) else {
            return Err(SdistFilenameError::UnknownExtension(filename.to_string()));
        };

        let Some((name, version)) = stem.rsplit_once('-') else {
            return Err(SdistFilenameError::MissingVersion(filename.to_string()));
        };

        let version =
            version
                .parse::<Version>()
                .map_err(|err| SdistFilenameError::InvalidVersion {
                    filename: filename.to_string(),
                    source: err,
                })?;

        Ok(Self {
            name: PackageName::normalize(name),
            version,
            extension,
        })
    }
}

impl Display for SdistFilename {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}.{}", self.name, self.version, self.extension)
    }
}

/// The error when a filename cannot be parsed as a source distribution.
#[derive(Debug, Clone, Error)]
pub enum SdistFilenameError {
    #[error("'{0}' does not end with a known source distribution suffix (.tar.gz, .zip, .tar.bz2, .tgz)")]
    UnknownExtension(String),
    #[error("expected '{0}' to be of the form <name>-<version><suffix>")]
    MissingVersion(String),
    #[error("source distribution filename '{filename}' has an invalid version field")]
    InvalidVersion {
        filename: String,
        #[source]
        source: VersionParseError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hyphenated_names_split_on_the_rightmost_hyphen() {
        let sdist = SdistFilename::parse("python-slugify-3.0.0.tar.gz").unwrap();
        assert_eq!(sdist.name.as_ref(), "python-slugify");
        assert_eq!(sdist.version.to_string(), "3.0.0");
        assert_eq!(sdist.extension, SdistExtension::TarGz);
    }

    #[test]
    fn all_known_extensions() {
        for (filename, extension) in [
            ("a-1.0.tar.gz", SdistExtension::TarGz),
            ("a-1.0.zip", SdistExtension::Zip),
            ("a-1.0.tar.bz2", SdistExtension::TarBz2),
            ("a-1.0.tgz", SdistExtension::Tgz),
        ] {
            assert_eq!(SdistFilename::parse(filename).unwrap().extension, extension);
        }
    }

    #[test]
    fn rejects_malformed_filenames() {
        assert!(SdistFilename::parse("a-1.0.tar.zstd").is_err());
        assert!(SdistFilename::parse("noversion.tar.gz").is_err());
        assert!(SdistFilename::parse("a-not;a;version.zip").is_err());
    }
}
