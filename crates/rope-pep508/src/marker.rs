//! Environment markers: the boolean expressions after `;` in a dependency
//! specification, e.g. `python_version < "3" and extra == 'test'`.
//!
//! <https://peps.python.org/pep-0508/#environment-markers>

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use rope_pep440::{Operator, Version};

/// The closed set of environment variables a marker may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerVariable {
    OsName,
    SysPlatform,
    PlatformMachine,
    PlatformPythonImplementation,
    PlatformRelease,
    PlatformSystem,
    PlatformVersion,
    PythonVersion,
    PythonFullVersion,
    ImplementationName,
    ImplementationVersion,
    /// Only defined when the surrounding layer selected an extra.
    Extra,
}

impl MarkerVariable {
    const ALL: &'static [(&'static str, MarkerVariable)] = &[
        ("os_name", Self::OsName),
        ("sys_platform", Self::SysPlatform),
        ("platform_machine", Self::PlatformMachine),
        (
            "platform_python_implementation",
            Self::PlatformPythonImplementation,
        ),
        ("platform_release", Self::PlatformRelease),
        ("platform_system", Self::PlatformSystem),
        ("platform_version", Self::PlatformVersion),
        ("python_version", Self::PythonVersion),
        ("python_full_version", Self::PythonFullVersion),
        ("implementation_name", Self::ImplementationName),
        ("implementation_version", Self::ImplementationVersion),
        ("extra", Self::Extra),
    ];
}

impl FromStr for MarkerVariable {
    type Err = UnknownMarkerVariable;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find_map(|(name, variable)| (*name == s).then_some(*variable))
            .ok_or_else(|| UnknownMarkerVariable {
                name: s.to_string(),
            })
    }
}

impl Display for MarkerVariable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = Self::ALL
            .iter()
            .find_map(|(name, variable)| (variable == self).then_some(*name))
            .expect("every variable has a name");
        f.write_str(name)
    }
}

/// A marker referenced a variable outside the closed set.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown environment marker variable '{name}'")]
pub struct UnknownMarkerVariable {
    pub(crate) name: String,
}

/// One operand of a marker comparison: an environment variable reference or
/// a quoted literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerValue {
    Variable(MarkerVariable),
    Literal(String),
}

impl MarkerValue {
    fn resolve<'a>(&'a self, env: &'a MarkerEnvironment) -> &'a str {
        match self {
            Self::Variable(variable) => env.get(*variable),
            Self::Literal(literal) => literal,
        }
    }
}

impl Display for MarkerValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Variable(variable) => Display::fmt(variable, f),
            Self::Literal(literal) => write!(f, "'{literal}'"),
        }
    }
}

/// A marker comparison operator: the version operators plus `in`/`not in`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerOperator {
    Comparison(Operator),
    In,
    NotIn,
}

impl Display for MarkerOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Comparison(operator) => Display::fmt(operator, f),
            Self::In => f.write_str("in"),
            Self::NotIn => f.write_str("not in"),
        }
    }
}

/// A single comparison, e.g. `python_version < "3"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerExpression {
    pub left: MarkerValue,
    pub operator: MarkerOperator,
    pub right: MarkerValue,
}

/// A marker expression tree. `or` binds loosest, then `and`, then
/// comparisons; parentheses group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerTree {
    Expression(MarkerExpression),
    And(Box<MarkerTree>, Box<MarkerTree>),
    Or(Box<MarkerTree>, Box<MarkerTree>),
}

/// Marker evaluation failed; the requirement carrying the marker should be
/// treated as unusable rather than installable or not.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MarkerEvalError {
    #[error("'~=' is only supported between valid versions, got '{left}' and '{right}'")]
    TildeEqualOnStrings { left: String, right: String },
}

impl MarkerExpression {
    /// Evaluate the comparison against an environment.
    ///
    /// `in`/`not in` are string containment and `===` is string equality.
    /// The remaining operators compare as PEP 440 versions when both sides
    /// parse as versions and fall back to lexicographic string comparison
    /// otherwise.
    pub fn evaluate(&self, env: &MarkerEnvironment) -> Result<bool, MarkerEvalError> {
        let left = self.left.resolve(env);
        let right = self.right.resolve(env);

        let operator = match self.operator {
            MarkerOperator::In => return Ok(left.contains(right)),
            MarkerOperator::NotIn => return Ok(!left.contains(right)),
            MarkerOperator::Comparison(Operator::ExactEqual) => return Ok(left == right),
            MarkerOperator::Comparison(operator) => operator,
        };

        if let (Ok(left_version), Ok(right_version)) =
            (Version::from_str(left), Version::from_str(right))
        {
            Ok(match operator {
                Operator::LessEqual => left_version <= right_version,
                Operator::Less => left_version < right_version,
                Operator::NotEqual => left_version != right_version,
                Operator::Equal => left_version == right_version,
                Operator::GreaterEqual => left_version >= right_version,
                Operator::Greater => left_version > right_version,
                // Recognized by the grammar but deliberately not evaluated.
                Operator::TildeEqual => false,
                Operator::ExactEqual => unreachable!("handled above"),
            })
        } else {
            match operator {
                Operator::LessEqual => Ok(left <= right),
                Operator::Less => Ok(left < right),
                Operator::NotEqual => Ok(left != right),
                Operator::Equal => Ok(left == right),
                Operator::GreaterEqual => Ok(left >= right),
                Operator::Greater => Ok(left > right),
                Operator::TildeEqual => Err(MarkerEvalError::TildeEqualOnStrings {
                    left: left.to_string(),
                    right: right.to_string(),
                }),
                Operator::ExactEqual => unreachable!("handled above"),
            }
        }
    }
}

impl Display for MarkerExpression {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.left, self.operator, self.right)
    }
}

impl MarkerTree {
    /// Evaluate the tree against an environment with a depth-first fold.
    /// `and` short-circuits; both branches of `or` are evaluated so that an
    /// evaluation error on the right side is never masked.
    pub fn evaluate(&self, env: &MarkerEnvironment) -> Result<bool, MarkerEvalError> {
        match self {
            Self::Expression(expression) => expression.evaluate(env),
            Self::And(left, right) => {
                if !left.evaluate(env)? {
                    return Ok(false);
                }
                right.evaluate(env)
            }
            Self::Or(left, right) => {
                let left = left.evaluate(env)?;
                let right = right.evaluate(env)?;
                Ok(left || right)
            }
        }
    }
}

impl Display for MarkerTree {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Expression(expression) => Display::fmt(expression, f),
            Self::And(left, right) => write!(f, "({left} and {right})"),
            Self::Or(left, right) => write!(f, "({left} or {right})"),
        }
    }
}

/// The values of the marker variables for a concrete interpreter on a
/// concrete host. Deserialized from the interpreter probe output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkerEnvironment {
    pub implementation_name: String,
    pub implementation_version: String,
    pub os_name: String,
    pub platform_machine: String,
    pub platform_python_implementation: String,
    pub platform_release: String,
    pub platform_system: String,
    pub platform_version: String,
    pub python_full_version: String,
    pub python_version: String,
    pub sys_platform: String,
    /// The selected extra, if the containing layer defined one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
}

impl MarkerEnvironment {
    /// Look up a marker variable. An unset `extra` reads as the empty
    /// string, which compares unequal to every extra name.
    pub fn get(&self, variable: MarkerVariable) -> &str {
        match variable {
            MarkerVariable::OsName => &self.os_name,
            MarkerVariable::SysPlatform => &self.sys_platform,
            MarkerVariable::PlatformMachine => &self.platform_machine,
            MarkerVariable::PlatformPythonImplementation => &self.platform_python_implementation,
            MarkerVariable::PlatformRelease => &self.platform_release,
            MarkerVariable::PlatformSystem => &self.platform_system,
            MarkerVariable::PlatformVersion => &self.platform_version,
            MarkerVariable::PythonVersion => &self.python_version,
            MarkerVariable::PythonFullVersion => &self.python_full_version,
            MarkerVariable::ImplementationName => &self.implementation_name,
            MarkerVariable::ImplementationVersion => &self.implementation_version,
            MarkerVariable::Extra => self.extra.as_deref().unwrap_or(""),
        }
    }

    /// A copy of this environment with the given extra selected.
    #[must_use]
    pub fn with_extra(&self, extra: impl Into<String>) -> Self {
        Self {
            extra: Some(extra.into()),
            ..self.clone()
        }
    }
}
