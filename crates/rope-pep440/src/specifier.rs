use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use thiserror::Error;
use tracing::warn;

use crate::version::{Version, VersionParseError};

/// A version comparison operator: `<=`, `<`, `!=`, `==`, `>=`, `>`, `~=` or
/// `===`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `<=`
    LessEqual,
    /// `<`
    Less,
    /// `!=`
    NotEqual,
    /// `==`
    Equal,
    /// `>=`
    GreaterEqual,
    /// `>`
    Greater,
    /// `~=`; recognized but never evaluated.
    TildeEqual,
    /// `===`; exact equality.
    ExactEqual,
}

/// All operators, longest spelling first so that prefix scanning never
/// mistakes `===` for `==` or `<=` for `<`.
pub(crate) const OPERATORS: &[(&str, Operator)] = &[
    ("===", Operator::ExactEqual),
    ("==", Operator::Equal),
    ("<=", Operator::LessEqual),
    (">=", Operator::GreaterEqual),
    ("!=", Operator::NotEqual),
    ("~=", Operator::TildeEqual),
    ("<", Operator::Less),
    (">", Operator::Greater),
];

impl Operator {
    /// Match an operator at the start of `input`, returning it together with
    /// the remainder of the string.
    pub fn strip_prefix(input: &str) -> Option<(Self, &str)> {
        OPERATORS.iter().find_map(|(token, operator)| {
            input
                .strip_prefix(token)
                .map(|remainder| (*operator, remainder))
        })
    }
}

impl FromStr for Operator {
    type Err = OperatorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OPERATORS
            .iter()
            .find_map(|(token, operator)| (*token == s).then_some(*operator))
            .ok_or_else(|| OperatorParseError {
                got: s.to_string(),
            })
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let token = match self {
            Self::LessEqual => "<=",
            Self::Less => "<",
            Self::NotEqual => "!=",
            Self::Equal => "==",
            Self::GreaterEqual => ">=",
            Self::Greater => ">",
            Self::TildeEqual => "~=",
            Self::ExactEqual => "===",
        };
        f.write_str(token)
    }
}

/// An error for an unknown version comparison operator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("expected a version comparison operator (one of <= < != == >= > ~= ===), got '{got}'")]
pub struct OperatorParseError {
    pub(crate) got: String,
}

/// A single version constraint such as `>=1.16.0` or `==2.8.*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionSpecifier {
    operator: Operator,
    version: Version,
}

impl VersionSpecifier {
    /// Pair an operator with an already-parsed version.
    pub fn new(operator: Operator, version: Version) -> Self {
        Self { operator, version }
    }

    /// Pair an operator with a version literal.
    ///
    /// A trailing `*` is kept as a wildcard version under `==` and `!=`; for
    /// every other operator PEP 440 has no wildcard form, so the `*` is read
    /// as `0` (tolerating specs such as `>=1.8.*`).
    pub fn parse(operator: Operator, version: &str) -> Result<Self, VersionParseError> {
        let version = if version.contains('*')
            && !matches!(operator, Operator::Equal | Operator::NotEqual)
        {
            Version::from_str(&version.replace('*', "0"))?
        } else {
            Version::from_str(version)?
        };
        Ok(Self { operator, version })
    }

    /// The comparison operator.
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// The version literal.
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Whether `version` satisfies this constraint.
    ///
    /// `~=` is not evaluated; it logs a warning and matches nothing.
    pub fn contains(&self, version: &Version) -> bool {
        match self.operator {
            Operator::Equal | Operator::ExactEqual => {
                if self.version.is_wildcard() {
                    self.version.matches(version)
                } else {
                    version.cmp(&self.version) == Ordering::Equal
                }
            }
            Operator::NotEqual => {
                if self.version.is_wildcard() {
                    !self.version.matches(version)
                } else {
                    version.cmp(&self.version) != Ordering::Equal
                }
            }
            Operator::LessEqual => version.cmp(&self.version) != Ordering::Greater,
            Operator::Less => version.cmp(&self.version) == Ordering::Less,
            Operator::GreaterEqual => version.cmp(&self.version) != Ordering::Less,
            Operator::Greater => version.cmp(&self.version) == Ordering::Greater,
            Operator::TildeEqual => {
                warn!("'~=' is not supported, treating '{self}' as unsatisfiable");
                false
            }
        }
    }
}

impl FromStr for VersionSpecifier {
    type Err = VersionSpecifierParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let (operator, rest) =
            Operator::strip_prefix(trimmed).ok_or_else(|| VersionSpecifierParseError::Operator {
                input: trimmed.to_string(),
            })?;
        Ok(Self::parse(operator, rest.trim())?)
    }
}

impl Display for VersionSpecifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.operator, self.version)
    }
}

/// The error when a string cannot be parsed as a version specifier.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VersionSpecifierParseError {
    #[error("version specifier must start with a comparison operator: '{input}'")]
    Operator { input: String },
    #[error(transparent)]
    Version(#[from] VersionParseError),
}

/// A comma-separated list of version constraints such as
/// `>=1.16.0, <1.19.0`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionSpecifiers(Vec<VersionSpecifier>);

impl VersionSpecifiers {
    /// Whether `version` satisfies every constraint in the list. An empty
    /// list accepts every version.
    pub fn contains(&self, version: &Version) -> bool {
        self.0.iter().all(|specifier| specifier.contains(version))
    }

    pub fn iter(&self) -> impl Iterator<Item = &VersionSpecifier> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<VersionSpecifier>> for VersionSpecifiers {
    fn from(specifiers: Vec<VersionSpecifier>) -> Self {
        Self(specifiers)
    }
}

impl FromStr for VersionSpecifiers {
    type Err = VersionSpecifierParseError;

    /// Parse a comma-separated constraint list, e.g. a `Requires-Python`
    /// value such as `>=2.7, !=3.0.*, !=3.1.*`.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        trimmed
            .split(',')
            .map(VersionSpecifier::from_str)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl Display for VersionSpecifiers {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, specifier) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            Display::fmt(specifier, f)?;
        }
        Ok(())
    }
}

/// Collapse a constraint list into the version the package was verified to
/// work with: the greatest lower bound appearing under `>=`, `==`, `~=` or
/// `===`. Upper bounds are ignored; `None` means no lower bound exists and
/// the latest acceptable version should be used.
///
/// ```text
/// <1.19.0, >=1.16.0 -> 1.16.0
/// <1.3.4, >=1.3.6   -> 1.3.6
/// ```
pub fn minimal_version(specifiers: &[VersionSpecifier]) -> Option<Version> {
    let mut highest_lower_bound: Option<Version> = None;
    for specifier in specifiers {
        match specifier.operator() {
            Operator::GreaterEqual
            | Operator::Equal
            | Operator::TildeEqual
            | Operator::ExactEqual => {
                if highest_lower_bound
                    .as_ref()
                    .map_or(true, |current| specifier.version() > current)
                {
                    highest_lower_bound = Some(specifier.version().clone());
                }
            }
            _ => {}
        }
    }
    highest_lower_bound
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specifier(input: &str) -> VersionSpecifier {
        VersionSpecifier::from_str(input).unwrap()
    }

    fn version(input: &str) -> Version {
        Version::from_str(input).unwrap()
    }

    #[test]
    fn contains() {
        assert!(specifier(">=1.16.0").contains(&version("1.16")));
        assert!(specifier(">=1.16.0").contains(&version("1.19.1")));
        assert!(!specifier(">=1.16.0").contains(&version("1.15.4")));
        assert!(specifier("<2").contains(&version("1.9")));
        assert!(!specifier("<2").contains(&version("2.0")));
        assert!(specifier("!=1.5").contains(&version("1.5.1")));
        assert!(specifier("===2.8.1").contains(&version("2.8.1")));
    }

    #[test]
    fn wildcard_specifiers() {
        assert!(specifier("==2.8.*").contains(&version("2.8.1")));
        assert!(!specifier("==2.8.*").contains(&version("2.9.0")));
        assert!(!specifier("!=2.8.*").contains(&version("2.8.1")));
        assert!(specifier("!=2.8.*").contains(&version("2.9.0")));
        // No wildcard form exists for ordered operators; the `*` reads as 0.
        assert_eq!(specifier(">=1.8.*"), specifier(">=1.8.0"));
    }

    #[test]
    fn tilde_equal_matches_nothing() {
        assert!(!specifier("~=1.4.2").contains(&version("1.4.3")));
    }

    #[test]
    fn requires_python_style_lists() {
        let specifiers = VersionSpecifiers::from_str(">=2.7, !=3.0.*, !=3.1.*").unwrap();
        assert!(specifiers.contains(&version("2.7.10")));
        assert!(specifiers.contains(&version("3.6.2")));
        assert!(!specifiers.contains(&version("3.0.4")));
        assert!(!specifiers.contains(&version("2.6")));
    }

    #[test]
    fn minimal_version_prefers_highest_lower_bound() {
        let specifiers = [specifier(">=1.16.0"), specifier("<1.19.0")];
        assert_eq!(minimal_version(&specifiers), Some(version("1.16.0")));

        let contradictory = [specifier("<1.3.4"), specifier(">=1.3.6")];
        assert_eq!(minimal_version(&contradictory), Some(version("1.3.6")));

        assert_eq!(minimal_version(&[specifier("<2.0")]), None);
        assert_eq!(minimal_version(&[]), None);
    }

    #[test]
    fn display_round_trip() {
        for input in [">=1.16.0", "==2.8.*", "===2.8.1", "~=1.4"] {
            assert_eq!(specifier(input).to_string(), input);
        }
    }
}
