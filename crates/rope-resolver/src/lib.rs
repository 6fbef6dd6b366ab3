//! Finding packages in an index and resolving a dependency graph with
//! minimal version selection.

pub use error::ResolveError;
pub use index::Index;
pub use mvs::{resolve, ResolvedPackage, Resolution};
pub use pypi::PyPiIndex;
pub use simple::SimpleIndex;

mod error;
mod index;
mod mvs;
mod pypi;
mod simple;
