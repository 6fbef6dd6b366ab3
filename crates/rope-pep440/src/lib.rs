//! PEP 440 version handling: parsing, canonical formatting, ordering and
//! wildcard matching, plus version specifiers (`>=1.2`, `==1.0.*`, ...).
//!
//! <https://peps.python.org/pep-0440/>

pub use specifier::{
    minimal_version, Operator, OperatorParseError, VersionSpecifier, VersionSpecifierParseError,
    VersionSpecifiers,
};
pub use version::{Prerelease, PrereleasePhase, Version, VersionParseError};

mod specifier;
mod version;
