use std::process::Command;
use std::str::FromStr;

use thiserror::Error;
use tracing::debug;

use rope_pep440::{Version, VersionParseError, VersionSpecifiers};
use rope_pep508::MarkerEnvironment;

use crate::tags::{
    platform_tag_specificity, python_tag_specificity, Arch, Os, Tag, TagPriority,
    UnsupportedPlatform,
};

/// The interpreter used to probe marker values and to build source
/// distributions.
pub const PYTHON: &str = "python";

/// The probe run inside the interpreter to collect the marker environment.
/// Mirrors the variable definitions from PEP 508.
const CAPTURE_MARKERS_SCRIPT: &str = "
import os
import sys
import platform
import json
bindings = {
    'implementation_name': getattr(sys, 'implementation', None) and sys.implementation.name or '',
    'implementation_version': '{0.major}.{0.minor}.{0.micro}'.format(sys.implementation.version) if hasattr(sys, 'implementation') else '0',
    'os_name': os.name,
    'platform_machine': platform.machine(),
    'platform_python_implementation': platform.python_implementation(),
    'platform_release': platform.release(),
    'platform_system': platform.system(),
    'platform_version': platform.version(),
    'python_full_version': platform.python_version(),
    'python_version': '.'.join(platform.python_version_tuple()[:2]),
    'sys_platform': sys.platform,
}
json.dump(bindings, sys.stdout)
sys.stdout.flush()
";

/// The host environment: interpreter tag, marker values, and platform.
/// Constructed once per command and read-only afterwards.
#[derive(Debug, Clone)]
pub struct Environment {
    python_tag: String,
    python_version: Version,
    markers: MarkerEnvironment,
    os: Os,
    arch: Arch,
}

/// The error when the host environment cannot be determined.
#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("failed to run '{PYTHON}' to probe the interpreter")]
    Probe(#[source] std::io::Error),
    #[error("the interpreter probe returned malformed output")]
    ProbeOutput(#[source] serde_json::Error),
    #[error("the interpreter reported an invalid version")]
    PythonVersion(#[from] VersionParseError),
    #[error(transparent)]
    Platform(#[from] UnsupportedPlatform),
}

impl Environment {
    /// Detect the host environment by probing the `python` interpreter on
    /// `PATH`.
    pub fn detect() -> Result<Self, EnvironmentError> {
        let output = Command::new(PYTHON)
            .args(["-c", CAPTURE_MARKERS_SCRIPT])
            .output()
            .map_err(EnvironmentError::Probe)?;
        let markers: MarkerEnvironment =
            serde_json::from_slice(&output.stdout).map_err(EnvironmentError::ProbeOutput)?;
        debug!(
            "detected interpreter: {} {}",
            markers.platform_python_implementation, markers.python_full_version
        );
        Self::from_markers(markers, Os::current()?, Arch::current()?)
    }

    /// Build an environment from known marker values and platform, e.g. for
    /// tests.
    pub fn from_markers(
        markers: MarkerEnvironment,
        os: Os,
        arch: Arch,
    ) -> Result<Self, EnvironmentError> {
        let python_version = Version::from_str(&markers.python_full_version)?;
        let release = python_version.release();
        let (major, minor) = (
            release.first().copied().unwrap_or(0),
            release.get(1).copied().unwrap_or(0),
        );
        let implementation = if markers.implementation_name.eq_ignore_ascii_case("cpython") {
            "cp"
        } else {
            "py"
        };
        Ok(Self {
            python_tag: format!("{implementation}{major}{minor}"),
            python_version,
            markers,
            os,
            arch,
        })
    }

    /// The host interpreter tag, e.g. `cp36`.
    pub fn python_tag(&self) -> &str {
        &self.python_tag
    }

    /// The full interpreter version.
    pub fn python_version(&self) -> &Version {
        &self.python_version
    }

    /// The marker values for this environment.
    pub fn markers(&self) -> &MarkerEnvironment {
        &self.markers
    }

    pub fn os(&self) -> Os {
        self.os
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    /// How well a single tag fits this environment: `None` when the tag is
    /// incompatible, otherwise a priority where higher is more specific.
    /// Interpreter specificity dominates platform specificity; the ABI tag
    /// is currently accepted wholesale.
    pub fn priority(&self, tag: &Tag) -> Option<TagPriority> {
        let python = python_tag_specificity(&tag.python, &self.python_tag)?;
        let platform = platform_tag_specificity(&tag.platform, self.os, self.arch)?;
        Some(TagPriority(python * 2 + platform))
    }

    /// Whether the interpreter satisfies a `Requires-Python` constraint
    /// list. An empty constraint accepts every interpreter.
    pub fn satisfies_python_version(
        &self,
        requires_python: &str,
    ) -> Result<bool, rope_pep440::VersionSpecifierParseError> {
        let specifiers = VersionSpecifiers::from_str(requires_python)?;
        Ok(specifiers.contains(&self.python_version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn environment() -> Environment {
        let markers = MarkerEnvironment {
            implementation_name: "cpython".to_string(),
            python_full_version: "3.6.8".to_string(),
            python_version: "3.6".to_string(),
            ..MarkerEnvironment::default()
        };
        Environment::from_markers(markers, Os::Linux, Arch::X86_64).unwrap()
    }

    fn tag(python: &str, abi: &str, platform: &str) -> Tag {
        Tag::new(python, abi, platform)
    }

    #[test]
    fn derives_the_interpreter_tag() {
        assert_eq!(environment().python_tag(), "cp36");
    }

    #[test]
    fn priorities_rank_specific_tags_higher() {
        let env = environment();
        let exact_binary = env
            .priority(&tag("cp36", "cp36m", "manylinux2014_x86_64"))
            .unwrap();
        let exact_pure = env.priority(&tag("cp36", "none", "any")).unwrap();
        let generic_binary = env
            .priority(&tag("py3", "none", "manylinux1_x86_64"))
            .unwrap();
        let generic_pure = env.priority(&tag("py3", "none", "any")).unwrap();

        assert!(exact_binary > exact_pure);
        assert!(exact_pure > generic_binary);
        assert!(generic_binary > generic_pure);
    }

    #[test]
    fn incompatible_tags_have_no_priority() {
        let env = environment();
        assert!(env.priority(&tag("cp27", "none", "any")).is_none());
        assert!(env
            .priority(&tag("cp36", "none", "macosx_10_9_x86_64"))
            .is_none());
        assert!(env
            .priority(&tag("cp36", "none", "manylinux2014_aarch64"))
            .is_none());
    }

    #[test]
    fn requires_python_checks() {
        let env = environment();
        assert!(env.satisfies_python_version("").unwrap());
        assert!(env.satisfies_python_version(">=3.5").unwrap());
        assert!(!env.satisfies_python_version(">=3.7").unwrap());
        assert!(env.satisfies_python_version(">=2.7, !=3.0.*").unwrap());
        assert!(env.satisfies_python_version("<4").unwrap());
    }
}
