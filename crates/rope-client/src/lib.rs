//! HTTP access to Python package indexes: the PEP 503 simple HTML API, the
//! PyPI JSON API, and artifact downloads with `#sha256=` verification.

pub use client::{RopeClient, DEFAULT_SIMPLE_INDEX, PYTHON_PACKAGE_INDEX};
pub use error::Error;
pub use html::SimplePage;
pub use types::{Link, PypiDigests, PypiFile, PypiInfo, PypiResponse};

mod client;
mod error;
mod html;
mod types;
