use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// The maximum number of release segments a version may carry.
///
/// PEP 440 allows the release vector to be of unbounded length. Capping it at
/// six keeps the value `Copy`-friendly and directly comparable while covering
/// effectively every package published on PyPI.
pub const MAX_RELEASE_SEGMENTS: usize = 6;

/// Modified from the regular expression in PEP 440 appendix B to allow a `*`
/// in the final release segment.
///
/// <https://peps.python.org/pep-0440/#appendix-b-parsing-version-strings-with-regular-expressions>
static VERSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        ^v?
        (?:(?P<epoch>[0-9]+)!)?
        (?P<release>[0-9]+(?:\.(?:[0-9]+|\*$))*)
        (?P<pre>[-_.]?(?P<pre_l>a|b|c|rc|alpha|beta|pre|preview)[-_.]?(?P<pre_n>[0-9]+)?)?
        (?P<post>(?:-(?P<post_n1>[0-9]+))|(?:[-_.]?(?:post|rev|r)[-_.]?(?P<post_n2>[0-9]+)?))?
        (?P<dev>[-_.]?dev[-_.]?(?P<dev_n>[0-9]+)?)?
        (?:\+(?P<local>[a-z0-9]+(?:[-_.][a-z0-9]+)*))?
        $",
    )
    .unwrap()
});

/// The phase of a pre-release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrereleasePhase {
    /// `a`/`alpha`
    Alpha,
    /// `b`/`beta`
    Beta,
    /// `rc`/`c`/`pre`/`preview`
    Rc,
}

impl Display for PrereleasePhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alpha => f.write_str("a"),
            Self::Beta => f.write_str("b"),
            Self::Rc => f.write_str("rc"),
        }
    }
}

/// A pre-release segment such as `a1`, `b0` or `rc3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Prerelease {
    /// Alpha, beta or release candidate.
    pub phase: PrereleasePhase,
    /// The number attached to the phase, defaulting to 0.
    pub number: u64,
}

/// A PEP 440 version such as `1.19`, `4!5.6.7a8.post9.dev0+ubuntu1`, or the
/// wildcard form `1.0.*` produced by `==`/`!=` specifiers.
///
/// Beware that [`Ord`] implements the PEP 440 comparison for concrete
/// versions: a wildcard version compares equal to anything sharing its
/// release prefix padding, so wildcards should only ever be ordered against
/// versions they were matched with. [`PartialEq`] is structural (minus the
/// local segment) and therefore distinguishes `1.0.*` from `1.0`.
#[derive(Debug, Clone)]
pub struct Version {
    epoch: u64,
    /// Zero-padded release vector. Positions past `release_len` are zero.
    release: [u64; MAX_RELEASE_SEGMENTS],
    /// Number of segments the version was written with.
    release_len: usize,
    /// Whether the terminal release segment was `*`.
    wildcard: bool,
    pre: Option<Prerelease>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Option<String>,
}

/// The error when a string cannot be parsed as a PEP 440 version.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("not a PEP 440 version: '{input}'")]
pub struct VersionParseError {
    pub(crate) input: String,
}

impl Version {
    /// Create a version from release segments only, e.g. `[1, 2, 3]` for
    /// `1.2.3`.
    ///
    /// # Panics
    ///
    /// When more than [`MAX_RELEASE_SEGMENTS`] segments are given.
    pub fn new(release_segments: impl IntoIterator<Item = u64>) -> Self {
        let mut release = [0u64; MAX_RELEASE_SEGMENTS];
        let mut release_len = 0;
        for (i, segment) in release_segments.into_iter().enumerate() {
            assert!(i < MAX_RELEASE_SEGMENTS, "too many release segments");
            release[i] = segment;
            release_len = i + 1;
        }
        Self {
            epoch: 0,
            release,
            release_len,
            wildcard: false,
            pre: None,
            post: None,
            dev: None,
            local: None,
        }
    }

    /// The version epoch, 0 unless written as `N!`.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The release segments as written (not zero-padded).
    pub fn release(&self) -> &[u64] {
        &self.release[..self.release_len]
    }

    /// The release vector zero-padded to [`MAX_RELEASE_SEGMENTS`] positions.
    pub fn padded_release(&self) -> &[u64; MAX_RELEASE_SEGMENTS] {
        &self.release
    }

    /// Whether the terminal release segment was `*`.
    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// The pre-release segment, if any.
    pub fn pre(&self) -> Option<Prerelease> {
        self.pre
    }

    /// The post-release number, if any (`.post` alone is number 0).
    pub fn post(&self) -> Option<u64> {
        self.post
    }

    /// The dev-release number, if any.
    pub fn dev(&self) -> Option<u64> {
        self.dev
    }

    /// The local version label after `+`, if any.
    pub fn local(&self) -> Option<&str> {
        self.local.as_deref()
    }

    /// Whether this is an alpha/beta/rc or dev version.
    pub fn any_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    /// Version matching per PEP 440, extended over wildcards on either side.
    ///
    /// Epochs must be equal. A wildcard side matches when its written release
    /// segments are a prefix of the other side's padded release. Two concrete
    /// versions must agree on the padded release, the pre-release and the
    /// dev-release; the post-release only participates when both sides carry
    /// one.
    ///
    /// <https://peps.python.org/pep-0440/#version-matching>
    pub fn matches(&self, other: &Version) -> bool {
        if self.epoch != other.epoch {
            return false;
        }

        if self.wildcard || other.wildcard {
            let len = match (self.wildcard, other.wildcard) {
                (true, true) => self.release_len.min(other.release_len),
                (true, false) => self.release_len,
                (false, _) => other.release_len,
            };
            return self.release[..len] == other.release[..len];
        }

        if self.release != other.release {
            return false;
        }
        if self.pre != other.pre {
            return false;
        }
        if self.dev != other.dev {
            return false;
        }
        if let (Some(a), Some(b)) = (self.post, other.post) {
            if a != b {
                return false;
            }
        }

        true
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let error = || VersionParseError {
            input: input.to_string(),
        };

        let lower = input.to_lowercase();
        let captures = VERSION_RE.captures(&lower).ok_or_else(error)?;

        let epoch = match captures.name("epoch") {
            Some(epoch) => epoch.as_str().parse::<u64>().map_err(|_| error())?,
            None => 0,
        };

        let mut release = [0u64; MAX_RELEASE_SEGMENTS];
        let mut release_len = 0;
        let mut wildcard = false;
        for (i, segment) in captures["release"].split('.').enumerate() {
            if i >= MAX_RELEASE_SEGMENTS {
                return Err(error());
            }
            if segment == "*" {
                // The regex only admits `*` as the final segment. A wildcard
                // truncates everything that follows.
                wildcard = true;
                break;
            }
            release[i] = segment.parse::<u64>().map_err(|_| error())?;
            release_len = i + 1;
        }

        if wildcard {
            return Ok(Self {
                epoch,
                release,
                release_len,
                wildcard,
                pre: None,
                post: None,
                dev: None,
                local: None,
            });
        }

        let pre = if captures.name("pre").is_some() {
            let phase = match &captures["pre_l"] {
                "a" | "alpha" => PrereleasePhase::Alpha,
                "b" | "beta" => PrereleasePhase::Beta,
                "rc" | "c" | "pre" | "preview" => PrereleasePhase::Rc,
                _ => unreachable!("the pre_l group admits no other spelling"),
            };
            let number = match captures.name("pre_n") {
                Some(n) => n.as_str().parse::<u64>().map_err(|_| error())?,
                None => 0,
            };
            Some(Prerelease { phase, number })
        } else {
            None
        };

        let post = if captures.name("post").is_some() {
            let number = match captures.name("post_n1").or_else(|| captures.name("post_n2")) {
                Some(n) => n.as_str().parse::<u64>().map_err(|_| error())?,
                None => 0,
            };
            Some(number)
        } else {
            None
        };

        let dev = if captures.name("dev").is_some() {
            let number = match captures.name("dev_n") {
                Some(n) => n.as_str().parse::<u64>().map_err(|_| error())?,
                None => 0,
            };
            Some(number)
        } else {
            None
        };

        let local = captures.name("local").map(|local| local.as_str().to_string());

        Ok(Self {
            epoch,
            release,
            release_len,
            wildcard,
            pre,
            post,
            dev,
            local,
        })
    }
}

impl Display for Version {
    /// The canonical form: `epoch!` only when non-zero, the release printed
    /// to its written length, pre-releases normalized to `a`/`b`/`rc`, then
    /// `.postN`, `.devN` and `+local`.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.epoch > 0 {
            write!(f, "{}!", self.epoch)?;
        }
        for (i, segment) in self.release().iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        if self.wildcard {
            return f.write_str(".*");
        }
        if let Some(pre) = self.pre {
            write!(f, "{}{}", pre.phase, pre.number)?;
        }
        if let Some(post) = self.post {
            write!(f, ".post{post}")?;
        }
        if let Some(dev) = self.dev {
            write!(f, ".dev{dev}")?;
        }
        if let Some(local) = &self.local {
            write!(f, "+{local}")?;
        }
        Ok(())
    }
}

impl PartialEq for Version {
    /// Structural equality over the zero-padded release, excluding the local
    /// segment and the written release length (`1.0` equals `1.0.0`).
    fn eq(&self, other: &Self) -> bool {
        self.epoch == other.epoch
            && self.release == other.release
            && self.wildcard == other.wildcard
            && self.pre == other.pre
            && self.post == other.post
            && self.dev == other.dev
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.epoch.hash(state);
        self.release.hash(state);
        self.wildcard.hash(state);
        self.pre.hash(state);
        self.post.hash(state);
        self.dev.hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    /// PEP 440 ordering: epoch, zero-padded release, pre-release (absence
    /// sorts above presence), post-release (presence sorts above absence),
    /// dev-release (absence sorts above presence). The local segment does not
    /// participate. Wildcard operands compare equal once epoch and release
    /// agree.
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| self.release.cmp(&other.release))
            .then_with(|| {
                if self.wildcard || other.wildcard {
                    return Ordering::Equal;
                }
                pre_key(self)
                    .cmp(&pre_key(other))
                    .then_with(|| post_key(self).cmp(&post_key(other)))
                    .then_with(|| dev_key(self).cmp(&dev_key(other)))
            })
    }
}

/// `(1, ..)` for no pre-release so that `1.0 > 1.0rc1`.
fn pre_key(v: &Version) -> (u8, Option<Prerelease>) {
    match v.pre {
        Some(pre) => (0, Some(pre)),
        None => (1, None),
    }
}

/// `(0, 0)` for no post-release so that `1.0.post0 > 1.0`.
fn post_key(v: &Version) -> (u8, u64) {
    match v.post {
        Some(post) => (1, post),
        None => (0, 0),
    }
}

/// `(1, ..)` for no dev-release so that `1.0 > 1.0.dev9`.
fn dev_key(v: &Version) -> (u8, u64) {
    match v.dev {
        Some(dev) => (0, dev),
        None => (1, 0),
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(input: &str) -> Version {
        Version::from_str(input).unwrap()
    }

    #[test]
    fn parse_and_canonicalize() {
        for (input, canonical) in [
            ("1.19", "1.19"),
            ("v1.0", "1.0"),
            ("1!1.16rc3.post5.dev2+xyz", "1!1.16rc3.post5.dev2+xyz"),
            ("1.2-alpha", "1.2a0"),
            ("1.0.0-Beta", "1.0.0b0"),
            ("1.0.0.preview7", "1.0.0rc7"),
            ("1.3.post", "1.3.post0"),
            ("1.3.rev2", "1.3.post2"),
            ("1.3-4", "1.3.post4"),
            ("2.0.dev", "2.0.dev0"),
            ("0.6.*", "0.6.*"),
            ("3.1.4+Ubuntu-1", "3.1.4+ubuntu-1"),
        ] {
            assert_eq!(version(input).to_string(), canonical, "{input}");
        }
    }

    #[test]
    fn canonical_is_idempotent() {
        for input in [
            "1.19.1",
            "1!2.0a1",
            "1.16rc3.post5.dev2+xyz",
            "0.6.*",
            "10.post3",
        ] {
            let parsed = version(input);
            assert_eq!(version(&parsed.to_string()), parsed, "{input}");
        }
    }

    #[test]
    fn parse_rejects_garbage() {
        for input in ["", "not-a-version", "1.2.3.4.5.6.7", "1.*.2", "1.0+é"] {
            assert!(Version::from_str(input).is_err(), "{input}");
        }
    }

    #[test]
    fn ordering() {
        let ordered = [
            "0.9",
            "1.0a1",
            "1.0a2.dev456",
            "1.0a2",
            "1.0b1",
            "1.0rc1",
            "1.0.dev1",
            "1.0",
            "1.0.post0",
            "1.0.post1",
            "1.1",
            "1!0.1",
        ];
        for pair in ordered.windows(2) {
            assert!(
                version(pair[0]) < version(pair[1]),
                "{} < {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn ordering_is_symmetric() {
        let corpus: Vec<Version> = [
            "1.0", "1.0.0", "1.0a1", "1.0b2", "1.0rc1", "1.0.post1", "1.0.dev3", "2!1.0",
            "1.0+local", "0.9.9",
        ]
        .iter()
        .map(|s| version(s))
        .collect();
        for a in &corpus {
            for b in &corpus {
                assert_eq!(a.cmp(b), b.cmp(a).reverse(), "{a} vs {b}");
            }
        }
    }

    #[test]
    fn local_segment_is_ignored_in_comparison() {
        assert_eq!(version("1.0+one"), version("1.0+two"));
        assert_eq!(version("1.0+one").cmp(&version("1.0")), Ordering::Equal);
    }

    #[test]
    fn zero_padding() {
        assert_eq!(version("1.0"), version("1.0.0"));
        assert!(version("1.0").matches(&version("1.0.0")));
    }

    #[test]
    fn wildcard_matching() {
        let wildcard = version("0.6.*");
        assert!(wildcard.matches(&version("0.6.1")));
        assert!(wildcard.matches(&version("0.6.99")));
        assert!(!wildcard.matches(&version("0.7.0")));
        // Symmetric over the wildcard side.
        assert!(version("0.6.1").matches(&wildcard));
    }

    #[test]
    fn matching_post_releases() {
        // The post-release participates only when both sides carry one.
        assert!(version("1.0").matches(&version("1.0.post2")));
        assert!(!version("1.0.post1").matches(&version("1.0.post2")));
        assert!(!version("1.0a1").matches(&version("1.0")));
    }
}
