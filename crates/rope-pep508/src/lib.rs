//! Parsing and evaluation of Python dependency specifications such as
//! `numpy (>=1.16.0,<1.19.0) ; python_version == "3.6" and extra == 'test'`.
//!
//! The grammar is PEP 508 with two deliberate deviations: the comma between
//! version constraints may be omitted when the next constraint begins with a
//! comparison operator (tolerating specs like `>=0.3<=0.4` seen in the
//! wild), and URL specifications (`name @ url`) are rejected with a
//! dedicated error.
//!
//! <https://peps.python.org/pep-0508/>

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use unicode_width::UnicodeWidthChar;

pub use marker::{
    MarkerEnvironment, MarkerEvalError, MarkerExpression, MarkerOperator, MarkerTree, MarkerValue,
    MarkerVariable, UnknownMarkerVariable,
};
use rope_normalize::{ExtraName, PackageName};
use rope_pep440::{Operator, VersionSpecifier};

use crate::cursor::Cursor;

mod cursor;
mod marker;

/// A parse error with the offending span so it can be underlined.
#[derive(Debug, Clone)]
pub struct Pep508Error {
    /// What went wrong.
    pub kind: Pep508ErrorKind,
    /// Byte offset of the offending span.
    pub start: usize,
    /// Byte length of the offending span.
    pub len: usize,
    /// The full input, for context.
    pub input: String,
}

/// The kinds of dependency-specification parse failures.
#[derive(Debug, Clone)]
pub enum Pep508ErrorKind {
    /// A plain grammar error.
    Message(String),
    /// The dependency used the `name @ url` form, which rope does not
    /// support.
    UrlNotSupported,
    /// A marker referenced a variable outside the closed set.
    UnknownVariable(UnknownMarkerVariable),
}

impl Display for Pep508ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Message(message) => f.write_str(message),
            Self::UrlNotSupported => f.write_str("URL dependency specifications are not supported"),
            Self::UnknownVariable(err) => Display::fmt(err, f),
        }
    }
}

impl Display for Pep508Error {
    /// Pretty formatting with the offending span underlined.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let indent = self.input[..self.start]
            .chars()
            .filter_map(UnicodeWidthChar::width)
            .sum::<usize>();
        let underline = self.input[self.start..(self.start + self.len).min(self.input.len())]
            .chars()
            .filter_map(UnicodeWidthChar::width)
            .sum::<usize>()
            .max(1);
        write!(
            f,
            "{}\n{}\n{}{}",
            self.kind,
            self.input,
            " ".repeat(indent),
            "^".repeat(underline)
        )
    }
}

impl std::error::Error for Pep508Error {}

impl Pep508Error {
    fn new(kind: Pep508ErrorKind, start: usize, len: usize, cursor: &Cursor) -> Self {
        Self {
            kind,
            start,
            len,
            input: cursor.input().to_string(),
        }
    }

    fn message(message: impl Into<String>, start: usize, len: usize, cursor: &Cursor) -> Self {
        Self::new(Pep508ErrorKind::Message(message.into()), start, len, cursor)
    }

    /// Whether this error is the rejection of a `name @ url` spec.
    pub fn is_url_not_supported(&self) -> bool {
        matches!(self.kind, Pep508ErrorKind::UrlNotSupported)
    }
}

/// A parsed dependency specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// The normalized distribution name.
    pub name: PackageName,
    /// Requested extras, e.g. `security` in `requests[security]`.
    pub extras: Vec<ExtraName>,
    /// The version constraints, possibly empty.
    pub specifiers: Vec<VersionSpecifier>,
    /// The `;`-separated marker expressions; all of them must hold for the
    /// dependency to apply.
    pub markers: Vec<MarkerTree>,
}

impl Dependency {
    /// Whether this dependency should be installed in the given environment:
    /// the environment's `extra` must be one of the requested extras (when
    /// any are requested) and every marker expression must evaluate to true.
    pub fn evaluate(&self, env: &MarkerEnvironment) -> Result<bool, MarkerEvalError> {
        if !self.extras.is_empty() {
            let selected = ExtraName::normalize(env.get(MarkerVariable::Extra));
            if !self.extras.contains(&selected) {
                return Ok(false);
            }
        }

        for marker in &self.markers {
            if !marker.evaluate(env)? {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

impl FromStr for Dependency {
    type Err = Pep508Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        parse_dependency(&mut Cursor::new(input))
    }
}

impl Display for Dependency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            write!(
                f,
                "[{}]",
                self.extras
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(",")
            )?;
        }
        if !self.specifiers.is_empty() {
            write!(
                f,
                " {}",
                self.specifiers
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(",")
            )?;
        }
        for marker in &self.markers {
            write!(f, " ; {marker}")?;
        }
        Ok(())
    }
}

/// Parse a comma-separated list of version constraints outside a dependency
/// specification, e.g. from a command line argument.
pub fn parse_version_specifiers(input: &str) -> Result<Vec<VersionSpecifier>, Pep508Error> {
    let mut cursor = Cursor::new(input);
    let specifiers = parse_specifiers(&mut cursor)?;
    cursor.eat_whitespace();
    expect_end(&cursor)?;
    Ok(specifiers)
}

fn parse_dependency(cursor: &mut Cursor) -> Result<Dependency, Pep508Error> {
    cursor.eat_whitespace();
    let name = parse_name(cursor)?;

    cursor.eat_whitespace();
    let extras = if cursor.peek_char() == Some('[') {
        parse_extras(cursor)?
    } else {
        Vec::new()
    };

    cursor.eat_whitespace();
    let specifiers = match cursor.peek() {
        Some((start, '(')) => {
            cursor.next();
            let specifiers = parse_specifiers(cursor)?;
            cursor.eat_whitespace();
            if cursor.eat_char(')').is_none() {
                return Err(Pep508Error::message(
                    "missing closing parenthesis in version specification",
                    start,
                    1,
                    cursor,
                ));
            }
            specifiers
        }
        Some((_, char)) if is_operator_char(char) => parse_specifiers(cursor)?,
        Some((start, '@')) => {
            return Err(Pep508Error::new(
                Pep508ErrorKind::UrlNotSupported,
                start,
                cursor.input().len() - start,
                cursor,
            ));
        }
        _ => Vec::new(),
    };

    cursor.eat_whitespace();
    let markers = if cursor.peek_char() == Some(';') {
        parse_quoted_markers(cursor)?
    } else {
        Vec::new()
    };

    cursor.eat_whitespace();
    expect_end(cursor)?;

    Ok(Dependency {
        name,
        extras,
        specifiers,
        markers,
    })
}

fn expect_end(cursor: &Cursor) -> Result<(), Pep508Error> {
    if cursor.at_end() {
        Ok(())
    } else {
        Err(Pep508Error::message(
            format!("expected end of input, remaining: '{}'", cursor.remaining()),
            cursor.pos(),
            cursor.input().len() - cursor.pos(),
            cursor,
        ))
    }
}

fn is_identifier_char(char: char) -> bool {
    char.is_ascii_alphanumeric() || char == '-' || char == '_' || char == '.'
}

fn is_version_char(char: char) -> bool {
    char.is_ascii_alphanumeric()
        || matches!(char, '-' | '_' | '.' | '*' | '+' | '!')
}

fn is_operator_char(char: char) -> bool {
    matches!(char, '<' | '>' | '=' | '!' | '~')
}

/// The characters allowed inside a quoted marker literal, from the
/// `python_str_c` production.
fn is_python_str_char(char: char) -> bool {
    char.is_alphanumeric()
        || char.is_whitespace()
        || matches!(
            char,
            '(' | ')'
                | '.'
                | '{'
                | '}'
                | '-'
                | '_'
                | '*'
                | '#'
                | ':'
                | ';'
                | ','
                | '/'
                | '?'
                | '['
                | ']'
                | '!'
                | '~'
                | '`'
                | '@'
                | '$'
                | '%'
                | '^'
                | '&'
                | '='
                | '+'
                | '|'
                | '<'
                | '>'
        )
}

fn parse_name(cursor: &mut Cursor) -> Result<PackageName, Pep508Error> {
    match cursor.peek() {
        Some((_, char)) if char.is_ascii_alphanumeric() => {}
        Some((start, char)) => {
            return Err(Pep508Error::message(
                format!("expected a package name starting with a letter or digit, found '{char}'"),
                start,
                char.len_utf8(),
                cursor,
            ));
        }
        None => {
            return Err(Pep508Error::message(
                "expected a package name, found end of input",
                0,
                1,
                cursor,
            ));
        }
    }

    let (start, len) = cursor.take_while(is_identifier_char);
    Ok(PackageName::normalize(cursor.slice(start, len)))
}

fn parse_extras(cursor: &mut Cursor) -> Result<Vec<ExtraName>, Pep508Error> {
    let bracket = cursor
        .eat_char('[')
        .expect("caller checked for the opening bracket");

    let mut extras = Vec::new();
    loop {
        cursor.eat_whitespace();
        let (start, len) = cursor.take_while(is_identifier_char);
        if len == 0 {
            return Err(Pep508Error::message(
                "expected an extra name",
                cursor.pos(),
                1,
                cursor,
            ));
        }
        extras.push(ExtraName::normalize(cursor.slice(start, len)));

        cursor.eat_whitespace();
        match cursor.next() {
            Some((_, ']')) => return Ok(extras),
            Some((_, ',')) => {}
            Some((pos, other)) => {
                return Err(Pep508Error::message(
                    format!("expected ',' or ']' in the extras list, found '{other}'"),
                    pos,
                    other.len_utf8(),
                    cursor,
                ));
            }
            None => {
                return Err(Pep508Error::message(
                    "missing closing bracket for extras",
                    bracket,
                    1,
                    cursor,
                ));
            }
        }
    }
}

fn parse_specifiers(cursor: &mut Cursor) -> Result<Vec<VersionSpecifier>, Pep508Error> {
    let mut specifiers = Vec::new();
    loop {
        specifiers.push(parse_specifier(cursor)?);

        cursor.eat_whitespace();
        match cursor.peek_char() {
            Some(',') => {
                cursor.next();
            }
            // Tolerate a missing comma when a new comparison operator
            // begins right away, e.g. `>=0.3<=0.4`.
            Some(char) if is_operator_char(char) => {}
            _ => return Ok(specifiers),
        }
    }
}

fn parse_specifier(cursor: &mut Cursor) -> Result<VersionSpecifier, Pep508Error> {
    cursor.eat_whitespace();
    let (op_start, op_len) = cursor.take_while(is_operator_char);
    if op_len == 0 {
        return Err(Pep508Error::message(
            "expected a version comparison operator",
            op_start,
            1,
            cursor,
        ));
    }
    let operator = Operator::from_str(cursor.slice(op_start, op_len))
        .map_err(|err| Pep508Error::message(err.to_string(), op_start, op_len, cursor))?;

    cursor.eat_whitespace();
    let (version_start, version_len) = cursor.take_while(is_version_char);
    if version_len == 0 {
        return Err(Pep508Error::message(
            "expected a version after the comparison operator",
            version_start,
            1,
            cursor,
        ));
    }
    VersionSpecifier::parse(operator, cursor.slice(version_start, version_len))
        .map_err(|err| Pep508Error::message(err.to_string(), version_start, version_len, cursor))
}

fn parse_quoted_markers(cursor: &mut Cursor) -> Result<Vec<MarkerTree>, Pep508Error> {
    let mut markers = Vec::new();
    loop {
        cursor.eat_whitespace();
        if cursor.eat_char(';').is_none() {
            return Ok(markers);
        }
        markers.push(parse_marker_or(cursor)?);
    }
}

fn parse_marker_or(cursor: &mut Cursor) -> Result<MarkerTree, Pep508Error> {
    let mut tree = parse_marker_and(cursor)?;
    loop {
        cursor.eat_whitespace();
        if cursor.eat_keyword("or") {
            let right = parse_marker_and(cursor)?;
            tree = MarkerTree::Or(Box::new(tree), Box::new(right));
        } else {
            return Ok(tree);
        }
    }
}

fn parse_marker_and(cursor: &mut Cursor) -> Result<MarkerTree, Pep508Error> {
    let mut tree = parse_marker_expression(cursor)?;
    loop {
        cursor.eat_whitespace();
        if cursor.eat_keyword("and") {
            let right = parse_marker_expression(cursor)?;
            tree = MarkerTree::And(Box::new(tree), Box::new(right));
        } else {
            return Ok(tree);
        }
    }
}

fn parse_marker_expression(cursor: &mut Cursor) -> Result<MarkerTree, Pep508Error> {
    cursor.eat_whitespace();
    if let Some(open) = cursor.eat_char('(') {
        let tree = parse_marker_or(cursor)?;
        cursor.eat_whitespace();
        if cursor.eat_char(')').is_none() {
            return Err(Pep508Error::message(
                "missing closing parenthesis in marker expression",
                open,
                1,
                cursor,
            ));
        }
        return Ok(tree);
    }

    let left = parse_marker_value(cursor)?;
    let operator = parse_marker_operator(cursor)?;
    let right = parse_marker_value(cursor)?;
    Ok(MarkerTree::Expression(MarkerExpression {
        left,
        operator,
        right,
    }))
}

fn parse_marker_value(cursor: &mut Cursor) -> Result<MarkerValue, Pep508Error> {
    cursor.eat_whitespace();
    match cursor.peek() {
        Some((_, quote @ ('\'' | '"'))) => {
            let (open, _) = cursor.next().expect("the quote was just peeked");
            let other_quote = if quote == '\'' { '"' } else { '\'' };
            let (start, len) =
                cursor.take_while(|char| is_python_str_char(char) || char == other_quote);
            let literal = cursor.slice(start, len).to_string();
            if cursor.eat_char(quote).is_none() {
                return Err(Pep508Error::message(
                    format!("missing closing quote ({quote}) for marker literal"),
                    open,
                    1,
                    cursor,
                ));
            }
            Ok(MarkerValue::Literal(literal))
        }
        _ => {
            let (start, len) =
                cursor.take_while(|char| char.is_ascii_alphanumeric() || char == '_');
            if len == 0 {
                return Err(Pep508Error::message(
                    "expected a quoted string or an environment marker variable",
                    cursor.pos(),
                    1,
                    cursor,
                ));
            }
            let variable = MarkerVariable::from_str(cursor.slice(start, len))
                .map_err(|err| Pep508Error::new(
                    Pep508ErrorKind::UnknownVariable(err),
                    start,
                    len,
                    cursor,
                ))?;
            Ok(MarkerValue::Variable(variable))
        }
    }
}

fn parse_marker_operator(cursor: &mut Cursor) -> Result<MarkerOperator, Pep508Error> {
    cursor.eat_whitespace();
    let (start, len) = cursor.take_while(is_operator_char);
    if len > 0 {
        let operator = Operator::from_str(cursor.slice(start, len))
            .map_err(|err| Pep508Error::message(err.to_string(), start, len, cursor))?;
        return Ok(MarkerOperator::Comparison(operator));
    }

    if cursor.eat_keyword("in") {
        return Ok(MarkerOperator::In);
    }
    if cursor.eat_keyword("not") {
        cursor.eat_whitespace();
        if cursor.eat_keyword("in") {
            return Ok(MarkerOperator::NotIn);
        }
        return Err(Pep508Error::message(
            "expected 'in' after 'not' in marker expression",
            cursor.pos(),
            1,
            cursor,
        ));
    }

    Err(Pep508Error::message(
        "expected a marker operator",
        start,
        1,
        cursor,
    ))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn dependency(input: &str) -> Dependency {
        Dependency::from_str(input).unwrap()
    }

    fn python36() -> MarkerEnvironment {
        MarkerEnvironment {
            implementation_name: "cpython".to_string(),
            implementation_version: "3.6.8".to_string(),
            os_name: "posix".to_string(),
            platform_machine: "x86_64".to_string(),
            platform_python_implementation: "CPython".to_string(),
            platform_release: "5.4.0".to_string(),
            platform_system: "Linux".to_string(),
            platform_version: "#1 SMP".to_string(),
            python_full_version: "3.6.8".to_string(),
            python_version: "3.6".to_string(),
            sys_platform: "linux".to_string(),
            extra: None,
        }
    }

    #[test]
    fn parse_bare_name() {
        let d = dependency("requests");
        assert_eq!(d.name.as_ref(), "requests");
        assert!(d.extras.is_empty());
        assert!(d.specifiers.is_empty());
        assert!(d.markers.is_empty());
    }

    #[test]
    fn parse_full_specification() {
        let d = dependency(r#"requests [security,tests] >= 2.8.1, == 2.8.* ; python_version > "2.7""#);
        assert_eq!(d.name.as_ref(), "requests");
        assert_eq!(
            d.extras,
            vec![
                ExtraName::normalize("security"),
                ExtraName::normalize("tests")
            ]
        );
        assert_eq!(d.specifiers.len(), 2);
        assert_eq!(d.markers.len(), 1);
    }

    #[test]
    fn parse_parenthesized_specifiers() {
        let d = dependency("functools32 (>=3.2.3)");
        assert_eq!(d.name.as_ref(), "functools32");
        assert_eq!(d.specifiers.len(), 1);
    }

    #[test]
    fn parse_name_is_normalized() {
        assert_eq!(dependency("Flask_SQLAlchemy").name.as_ref(), "flask-sqlalchemy");
    }

    #[test]
    fn tolerates_missing_comma_between_specifiers() {
        let d = dependency("oslo.utils (>=0.3<=0.4)");
        assert_eq!(d.specifiers.len(), 2);
        assert_eq!(d.specifiers[0].to_string(), ">=0.3");
        assert_eq!(d.specifiers[1].to_string(), "<=0.4");
    }

    #[test]
    fn rejects_url_specifications() {
        let err = Dependency::from_str("pip @ https://github.com/pypa/pip/archive/1.3.1.zip")
            .unwrap_err();
        assert!(err.is_url_not_supported());
    }

    #[test]
    fn rejects_unknown_marker_variable() {
        let err = Dependency::from_str(r#"foo ; nonsense_var == "1""#).unwrap_err();
        assert!(matches!(err.kind, Pep508ErrorKind::UnknownVariable(_)));
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(Dependency::from_str("requests >=2.8.1 !").is_err());
    }

    #[test]
    fn marker_excludes_python_3() {
        // Not installable on Python 3.6.
        let d = dependency(r#"functools32 (>=3.2.3) ; python_version < "3""#);
        assert!(!d.evaluate(&python36()).unwrap());
    }

    #[test]
    fn marker_with_extra_gate() {
        let d = dependency(
            r#"numpy (>=1.16.0,<1.19.0) ; (python_version == "3.6") and extra == 'test'"#,
        );
        assert!(!d.evaluate(&python36()).unwrap());
        assert!(d.evaluate(&python36().with_extra("test")).unwrap());

        let with_other_python = MarkerEnvironment {
            python_version: "3.8".to_string(),
            ..python36().with_extra("test")
        };
        assert!(!d.evaluate(&with_other_python).unwrap());
    }

    #[test]
    fn extras_gate() {
        let d = dependency("pytest-cov ; extra == 'test'");
        assert!(!d.evaluate(&python36()).unwrap());
        assert!(d.evaluate(&python36().with_extra("test")).unwrap());

        // A dependency with its own extras applies only when one of them is
        // the selected extra.
        let d = dependency("simplejson[test]");
        assert!(!d.evaluate(&python36()).unwrap());
        assert!(!d.evaluate(&python36().with_extra("docs")).unwrap());
        assert!(d.evaluate(&python36().with_extra("test")).unwrap());
    }

    #[test]
    fn marker_in_operators() {
        let d = dependency(r#"foo ; 'linux-gnu' in sys_platform"#);
        assert!(d.evaluate(&python36()).unwrap());
        let d = dependency(r#"foo ; sys_platform not in 'lin'"#);
        assert!(!d.evaluate(&python36()).unwrap());
    }

    #[test]
    fn marker_or_precedence() {
        // `or` binds looser than `and`.
        let d = dependency(
            r#"foo ; python_version == "2.7" and sys_platform == 'win32' or python_version == "3.6""#,
        );
        assert!(d.evaluate(&python36()).unwrap());
    }

    #[test]
    fn marker_version_comparison_falls_back_to_strings() {
        let d = dependency(r#"foo ; platform_python_implementation == "CPython""#);
        assert!(d.evaluate(&python36()).unwrap());
    }

    #[test]
    fn multiple_quoted_markers_all_apply() {
        let d = dependency(r#"foo ; python_version >= "3" ; sys_platform == 'win32'"#);
        assert_eq!(d.markers.len(), 2);
        assert!(!d.evaluate(&python36()).unwrap());
    }

    #[test]
    fn display_round_trips_through_parser() {
        let d = dependency(r#"requests[security] >=2.8.1,==2.8.* ; python_version > "2.7""#);
        assert_eq!(Dependency::from_str(&d.to_string()).unwrap(), d);
    }
}
