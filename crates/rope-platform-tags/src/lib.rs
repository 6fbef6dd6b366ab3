//! Describes the host interpreter, ABI and platform, and ranks wheel
//! compatibility tags against it.
//!
//! <https://packaging.python.org/en/latest/specifications/platform-compatibility-tags/>

pub use environment::{Environment, EnvironmentError, PYTHON};
pub use tags::{Arch, Os, Tag, TagPriority, UnsupportedPlatform};

mod environment;
mod tags;
