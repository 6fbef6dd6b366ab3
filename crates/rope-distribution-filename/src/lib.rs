//! Parsing of distribution archive filenames: wheels
//! (`name-version[-build]-python-abi-platform.whl`) and source distributions
//! (`name-version.tar.gz` and friends).

use std::str::FromStr;

pub use sdist::{SdistExtension, SdistFilename, SdistFilenameError};
pub use wheel::{WheelFilename, WheelFilenameError};

mod sdist;
mod wheel;

/// Either kind of distribution filename.
#[derive(Debug, Clone)]
pub enum DistFilename {
    Wheel(WheelFilename),
    Sdist(SdistFilename),
}

impl DistFilename {
    /// Parse a filename as a wheel or a source distribution, returning
    /// `None` when it is neither.
    pub fn parse(filename: &str) -> Option<Self> {
        if filename.ends_with(".whl") {
            WheelFilename::from_str(filename).ok().map(Self::Wheel)
        } else {
            SdistFilename::parse(filename).ok().map(Self::Sdist)
        }
    }
}
