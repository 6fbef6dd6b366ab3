use std::fmt::{Display, Formatter};

use thiserror::Error;

/// The operating systems rope can install wheels for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Linux,
    Macos,
    Windows,
}

/// The CPU architectures rope can install wheels for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86,
    X86_64,
    Aarch64,
}

/// The error when the host platform cannot be expressed as wheel tags.
#[derive(Debug, Clone, Error)]
#[error("unsupported host platform: {os} {arch}")]
pub struct UnsupportedPlatform {
    os: String,
    arch: String,
}

impl Os {
    /// Detect the host operating system.
    pub fn current() -> Result<Self, UnsupportedPlatform> {
        match std::env::consts::OS {
            "linux" => Ok(Self::Linux),
            "macos" => Ok(Self::Macos),
            "windows" => Ok(Self::Windows),
            other => Err(UnsupportedPlatform {
                os: other.to_string(),
                arch: std::env::consts::ARCH.to_string(),
            }),
        }
    }
}

impl Arch {
    /// Detect the host architecture.
    pub fn current() -> Result<Self, UnsupportedPlatform> {
        match std::env::consts::ARCH {
            "x86" => Ok(Self::X86),
            "x86_64" => Ok(Self::X86_64),
            "aarch64" => Ok(Self::Aarch64),
            other => Err(UnsupportedPlatform {
                os: std::env::consts::OS.to_string(),
                arch: other.to_string(),
            }),
        }
    }
}

impl Display for Os {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Linux => f.write_str("linux"),
            Self::Macos => f.write_str("macos"),
            Self::Windows => f.write_str("windows"),
        }
    }
}

impl Display for Arch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::X86 => f.write_str("x86"),
            Self::X86_64 => f.write_str("x86_64"),
            Self::Aarch64 => f.write_str("aarch64"),
        }
    }
}

/// A single compatibility tag triple in `(python, abi, platform)` format,
/// e.g. `cp36-cp36m-manylinux2014_x86_64` or `py3-none-any`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    pub python: String,
    pub abi: String,
    pub platform: String,
}

impl Tag {
    pub fn new(
        python: impl Into<String>,
        abi: impl Into<String>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            python: python.into(),
            abi: abi.into(),
            platform: platform.into(),
        }
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.python, self.abi, self.platform)
    }
}

/// The specificity of a compatible tag; a higher priority is a better fit
/// for the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TagPriority(pub(crate) u32);

/// Whether the interpreter tag of a wheel matches the host interpreter tag,
/// and how specifically: an exact match ranks above a prefix match (`cp3`
/// matching a `cp36` host) or the `py3`-style major-only token.
pub(crate) fn python_tag_specificity(wheel_tag: &str, host_tag: &str) -> Option<u32> {
    if wheel_tag == host_tag {
        return Some(2);
    }
    // `py3` matches any 3.x interpreter (and `py2` any 2.x).
    let major = host_tag.chars().nth(2);
    if let Some(major) = major {
        if wheel_tag == format!("py{major}") {
            return Some(1);
        }
    }
    if host_tag.starts_with(wheel_tag) {
        return Some(1);
    }
    None
}

/// Whether the platform tag of a wheel can run on the given host. `any`
/// always matches with specificity 0; a concrete platform match ranks 1.
pub(crate) fn platform_tag_specificity(wheel_tag: &str, os: Os, arch: Arch) -> Option<u32> {
    if wheel_tag == "any" {
        return Some(0);
    }

    match os {
        Os::Windows => {
            let matched = match arch {
                Arch::X86 => wheel_tag == "win32",
                Arch::X86_64 => wheel_tag == "win_amd64",
                Arch::Aarch64 => wheel_tag == "win_arm64",
            };
            return matched.then_some(1);
        }
        Os::Macos => {
            if !wheel_tag.starts_with("macosx") {
                return None;
            }
        }
        Os::Linux => {
            let known_prefix = wheel_tag.starts_with("linux")
                || wheel_tag.starts_with("manylinux1")
                || wheel_tag.starts_with("manylinux2010")
                || wheel_tag.starts_with("manylinux2014")
                || wheel_tag.starts_with("manylinux_");
            if !known_prefix {
                return None;
            }
        }
    }

    let suffix = wheel_tag.rsplit('_').next().unwrap_or(wheel_tag);
    let matched = match arch {
        Arch::X86_64 => {
            suffix == "x86_64"
                || suffix == "amd64"
                || (os == Os::Macos && matches!(suffix, "intel" | "universal2" | "universal"))
        }
        Arch::X86 => suffix == "i686" || suffix == "i386",
        Arch::Aarch64 => {
            suffix == "aarch64"
                || suffix == "arm64"
                || (os == Os::Macos && suffix == "universal2")
        }
    };
    matched.then_some(1)
}
