use std::fmt::{Display, Formatter};
use std::str::FromStr;

use thiserror::Error;

use rope_normalize::PackageName;
use rope_pep440::{Version, VersionParseError};
use rope_platform_tags::{Environment, Tag, TagPriority};

/// A parsed wheel filename.
///
/// The filename carries five or six hyphen-separated fields under the `.whl`
/// suffix: `name-version[-build]-python-abi-platform`. Each of the three tag
/// fields may hold several dot-separated alternatives; the effective tag set
/// is their cross-product.
///
/// <https://peps.python.org/pep-0427/#file-name-convention>
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WheelFilename {
    pub name: PackageName,
    pub version: Version,
    pub build: Option<String>,
    pub python_tags: Vec<String>,
    pub abi_tags: Vec<String>,
    pub platform_tags: Vec<String>,
}

impl FromStr for WheelFilename {
    type Err = WheelFilenameError;

    fn from_str(filename: &str) -> Result<Self, Self::Err> {
        let stem = filename
            .strip_suffix(".whl")
            .ok_or_else(|| WheelFilenameError::NotAWheel(filename.to_string()))?;

        let fields: Vec<&str> = stem.split('-').collect();
        let build = match fields.len() {
            5 => None,
            6 => Some(fields[2].to_string()),
            _ => {
                return Err(WheelFilenameError::WrongFieldCount {
                    filename: filename.to_string(),
                    fields: fields.len(),
                });
            }
        };

        let version = Version::from_str(fields[1]).map_err(|err| {
            WheelFilenameError::InvalidVersion {
                filename: filename.to_string(),
                source: err,
            }
        })?;

        Ok(Self {
            name: PackageName::normalize(fields[0]),
            version,
            build,
            python_tags: fields[fields.len() - 3]
                .split('.')
                .map(String::from)
                .collect(),
            abi_tags: fields[fields.len() - 2]
                .split('.')
                .map(String::from)
                .collect(),
            platform_tags: fields[fields.len() - 1]
                .split('.')
                .map(String::from)
                .collect(),
        })
    }
}

impl Display for WheelFilename {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.name, self.version)?;
        if let Some(build) = &self.build {
            write!(f, "-{build}")?;
        }
        write!(
            f,
            "-{}-{}-{}.whl",
            self.python_tags.join("."),
            self.abi_tags.join("."),
            self.platform_tags.join(".")
        )
    }
}

impl WheelFilename {
    /// The filename without the `.whl` suffix, used as the install directory
    /// name.
    pub fn stem(&self) -> String {
        let filename = self.to_string();
        filename
            .strip_suffix(".whl")
            .expect("the display form always ends in .whl")
            .to_string()
    }

    /// Every concrete tag the wheel declares: the cross-product of the
    /// dot-separated alternatives in the three tag fields.
    pub fn tags(&self) -> Vec<Tag> {
        let mut tags =
            Vec::with_capacity(self.python_tags.len() * self.abi_tags.len() * self.platform_tags.len());
        for python in &self.python_tags {
            for abi in &self.abi_tags {
                for platform in &self.platform_tags {
                    tags.push(Tag::new(python, abi, platform));
                }
            }
        }
        tags
    }

    /// The relative preference of this wheel for an environment: the best
    /// priority over all its tags, or `None` when no tag is compatible.
    pub fn preference(&self, env: &Environment) -> Option<TagPriority> {
        self.tags().iter().filter_map(|tag| env.priority(tag)).max()
    }

    /// Whether any of the wheel's tags is compatible with the environment.
    pub fn is_compatible(&self, env: &Environment) -> bool {
        self.preference(env).is_some()
    }
}

/// The error when a filename cannot be parsed as a wheel.
#[derive(Debug, Clone, Error)]
pub enum WheelFilenameError {
    #[error("'{0}' is not a wheel filename (missing the .whl suffix)")]
    NotAWheel(String),
    #[error("wheel filename '{filename}' must have 5 or 6 hyphen-separated fields, got {fields}")]
    WrongFieldCount { filename: String, fields: usize },
    #[error("wheel filename '{filename}' has an invalid version field")]
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
    fn five_field_wheel() {
        let wheel = WheelFilename::from_str("tqdm-4.48.2-py2.py3-none-any.whl").unwrap();
        assert_eq!(wheel.name.as_ref(), "tqdm");
        assert_eq!(wheel.version.to_string(), "4.48.2");
        assert_eq!(wheel.build, None);
        assert_eq!(wheel.python_tags, vec!["py2", "py3"]);
        assert_eq!(wheel.tags().len(), 2);
    }

    #[test]
    fn six_field_wheel_keeps_the_build_tag() {
        let wheel = WheelFilename::from_str("distribution-1.0-1-py27-none-any.whl").unwrap();
        assert_eq!(wheel.build.as_deref(), Some("1"));
        assert_eq!(wheel.python_tags, vec!["py27"]);
    }

    #[test]
    fn tag_cross_product() {
        let wheel = WheelFilename::from_str(
            "numpy-1.14.5-cp27-cp27m-macosx_10_6_intel.macosx_10_9_intel.macosx_10_9_x86_64.whl",
        )
        .unwrap();
        assert_eq!(wheel.name.as_ref(), "numpy");
        let tags = wheel.tags();
        assert_eq!(tags.len(), 3);
        assert_eq!(tags[0].to_string(), "cp27-cp27m-macosx_10_6_intel");
    }

    #[test]
    fn name_is_normalized() {
        let wheel = WheelFilename::from_str("Flask_SQLAlchemy-2.4.4-py2.py3-none-any.whl").unwrap();
        assert_eq!(wheel.name.as_ref(), "flask-sqlalchemy");
    }

    #[test]
    fn display_round_trip() {
        for filename in [
            "tqdm-4.48.2-py2.py3-none-any.whl",
            "distribution-1.0-1-py27-none-any.whl",
        ] {
            assert_eq!(
                WheelFilename::from_str(filename).unwrap().to_string(),
                filename
            );
        }
    }

    #[test]
    fn rejects_malformed_filenames() {
        assert!(WheelFilename::from_str("foo.tar.gz").is_err());
        assert!(WheelFilename::from_str("foo-1.0.whl").is_err());
        assert!(WheelFilename::from_str("a-1.0-x-y-z-w-v.whl").is_err());
        assert!(WheelFilename::from_str("foo-not.a.version-py3-none-any.whl").is_err());
    }
}
