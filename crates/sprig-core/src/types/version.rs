//! Package version and version requirement types.
//!
//! Versions are `major[.minor[.patch]][-prerelease][+build]`; omitted
//! components are zero. Requirements accept operator forms (`^1.2`, `~1.2.3`,
//! `>=1.0, <2.0`), interval notation (`[1.0,2.0)`, `(,3.0]`, `[1.5]`) and a
//! bare version, which is read as a minimum (`1.0` means `>= 1.0.0`).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Package version (major.minor.patch-prerelease+build)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
    pub build: Option<String>,
}

/// Version requirement (^1.0.0, [1.0,2.0), >=1.0.0, <2.0.0)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionReq {
    pub comparators: Vec<Comparator>,
}

/// Individual version comparator
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Comparator {
    pub op: Op,
    pub version: PartialVersion,
}

/// Comparison operator for version requirements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Exact,     // =1.0.0
    Greater,   // >1.0.0
    GreaterEq, // >=1.0.0
    Less,      // <1.0.0
    LessEq,    // <=1.0.0
    Tilde,     // ~1.0.0
    Caret,     // ^1.0.0
    Wildcard,  // *
}

/// Partial version for comparisons (may have missing components)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartialVersion {
    pub major: u64,
    pub minor: Option<u64>,
    pub patch: Option<u64>,
    pub prerelease: Option<String>,
}

/// Version parsing and validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid version format: {input}")]
    InvalidFormat { input: String },

    #[error("Invalid number in version: {component}")]
    InvalidNumber { component: String },

    #[error("Invalid version range: {input}")]
    InvalidRange { input: String },
}

impl Version {
    /// Create a new version
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: None,
            build: None,
        }
    }

    /// Parse a version string
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        Self::from_str(input)
    }

    /// Check if this version satisfies a version requirement
    pub fn satisfies(&self, req: &VersionReq) -> bool {
        req.matches(self)
    }

    /// Check if this is a prerelease version
    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }

    /// Get the precedence for comparison (ignores build metadata)
    fn precedence_cmp(&self, other: &Self) -> Ordering {
        match (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch)) {
            Ordering::Equal => match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(a), Some(b)) => a.cmp(b),
            },
            other => other,
        }
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let partial = PartialVersion::from_str(s)?;
        let input = s.trim();
        let build = input.split_once('+').map(|(_, b)| b.to_string());
        Ok(Version {
            major: partial.major,
            minor: partial.minor.unwrap_or(0),
            patch: partial.patch.unwrap_or(0),
            prerelease: partial.prerelease,
            build,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;

        if let Some(ref pre) = self.prerelease {
            write!(f, "-{}", pre)?;
        }

        if let Some(ref build) = self.build {
            write!(f, "+{}", build)?;
        }

        Ok(())
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.precedence_cmp(other)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl VersionReq {
    /// Requirement matched by every version
    pub fn any() -> Self {
        VersionReq {
            comparators: vec![Comparator {
                op: Op::Wildcard,
                version: PartialVersion::zero(),
            }],
        }
    }

    /// Requirement matched by exactly one version
    pub fn exact(version: &Version) -> Self {
        VersionReq {
            comparators: vec![Comparator::full(Op::Exact, version)],
        }
    }

    /// Requirement matched by the given version and everything above it
    pub fn at_least(version: &Version) -> Self {
        VersionReq {
            comparators: vec![Comparator::full(Op::GreaterEq, version)],
        }
    }

    /// Parse a version requirement string
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let input = input.trim();

        if input.is_empty() || input == "*" {
            return Ok(Self::any());
        }

        if input.starts_with('[') || input.starts_with('(') {
            return Self::parse_interval(input);
        }

        let comparators = input
            .split(',')
            .map(|part| Comparator::parse(part.trim()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(VersionReq { comparators })
    }

    /// Parse interval notation: `[1.0,2.0)`, `(,2.0]`, `[1.0,]`, `[1.0]`
    fn parse_interval(input: &str) -> Result<Self, VersionError> {
        let invalid = || VersionError::InvalidRange {
            input: input.to_string(),
        };

        let min_inclusive = input.starts_with('[');
        let max_inclusive = match input.chars().last() {
            Some(']') => true,
            Some(')') => false,
            _ => return Err(invalid()),
        };
        let inner = input[1..input.len() - 1].trim();

        let Some((min, max)) = inner.split_once(',') else {
            // A single version in brackets pins that version
            if !(min_inclusive && max_inclusive) || inner.is_empty() {
                return Err(invalid());
            }
            return Ok(Self::exact(&Version::from_str(inner)?));
        };

        let (min, max) = (min.trim(), max.trim());
        if min.is_empty() && max.is_empty() {
            return Err(invalid());
        }

        let mut comparators = Vec::with_capacity(2);
        if !min.is_empty() {
            let op = if min_inclusive { Op::GreaterEq } else { Op::Greater };
            comparators.push(Comparator::full(op, &Version::from_str(min)?));
        }
        if !max.is_empty() {
            let op = if max_inclusive { Op::LessEq } else { Op::Less };
            comparators.push(Comparator::full(op, &Version::from_str(max)?));
        }

        Ok(VersionReq { comparators })
    }

    /// Check if a version matches this requirement
    pub fn matches(&self, version: &Version) -> bool {
        self.comparators.iter().all(|comp| comp.matches(version))
    }

    /// Lowest version this requirement names, if it has a lower bound
    pub fn minimum(&self) -> Option<Version> {
        self.comparators
            .iter()
            .filter(|comp| !matches!(comp.op, Op::Less | Op::LessEq | Op::Wildcard))
            .map(|comp| comp.version.to_version())
            .min()
    }
}

impl FromStr for VersionReq {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionReq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, comparator) in self.comparators.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", comparator)?;
        }
        Ok(())
    }
}

impl Comparator {
    /// Comparator against a fully specified version
    fn full(op: Op, version: &Version) -> Self {
        Self {
            op,
            version: PartialVersion {
                major: version.major,
                minor: Some(version.minor),
                patch: Some(version.patch),
                prerelease: version.prerelease.clone(),
            },
        }
    }

    /// Parse a single operator-prefixed comparator
    fn parse(input: &str) -> Result<Self, VersionError> {
        if input == "*" {
            return Ok(Comparator {
                op: Op::Wildcard,
                version: PartialVersion::zero(),
            });
        }

        let (op, version_str) = if let Some(stripped) = input.strip_prefix('^') {
            (Op::Caret, stripped)
        } else if let Some(stripped) = input.strip_prefix('~') {
            (Op::Tilde, stripped)
        } else if let Some(stripped) = input.strip_prefix(">=") {
            (Op::GreaterEq, stripped)
        } else if let Some(stripped) = input.strip_prefix("<=") {
            (Op::LessEq, stripped)
        } else if let Some(stripped) = input.strip_prefix('>') {
            (Op::Greater, stripped)
        } else if let Some(stripped) = input.strip_prefix('<') {
            (Op::Less, stripped)
        } else if let Some(stripped) = input.strip_prefix('=') {
            (Op::Exact, stripped)
        } else {
            // Bare versions are minimums
            (Op::GreaterEq, input)
        };

        let version = PartialVersion::from_str(version_str.trim())?;
        match op {
            Op::Caret | Op::Tilde | Op::Exact => Ok(Comparator { op, version }),
            _ => Ok(Comparator::full(op, &version.to_version())),
        }
    }

    /// Check if a version matches this comparator
    pub fn matches(&self, version: &Version) -> bool {
        match self.op {
            Op::Exact => self.version.matches_exact(version),
            Op::Wildcard => true,
            Op::Greater => version > &self.version.to_version(),
            Op::GreaterEq => version >= &self.version.to_version(),
            Op::Less => version < &self.version.to_version(),
            Op::LessEq => version <= &self.version.to_version(),
            Op::Tilde => self.version.matches_tilde(version),
            Op::Caret => self.version.matches_caret(version),
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self.op {
            Op::Wildcard => return write!(f, "*"),
            Op::Exact => "=",
            Op::Greater => ">",
            Op::GreaterEq => ">=",
            Op::Less => "<",
            Op::LessEq => "<=",
            Op::Tilde => "~",
            Op::Caret => "^",
        };
        write!(f, "{} {}", symbol, self.version)
    }
}

impl PartialVersion {
    fn zero() -> Self {
        Self {
            major: 0,
            minor: None,
            patch: None,
            prerelease: None,
        }
    }

    /// Convert to a full version (filling missing parts with 0)
    pub fn to_version(&self) -> Version {
        Version {
            major: self.major,
            minor: self.minor.unwrap_or(0),
            patch: self.patch.unwrap_or(0),
            prerelease: self.prerelease.clone(),
            build: None,
        }
    }

    /// Check exact match
    fn matches_exact(&self, version: &Version) -> bool {
        version.major == self.major
            && self.minor.map_or(true, |m| version.minor == m)
            && self.patch.map_or(true, |p| version.patch == p)
            && version.prerelease == self.prerelease
    }

    /// Check tilde match (~1.2.3 allows >=1.2.3 <1.3.0)
    fn matches_tilde(&self, version: &Version) -> bool {
        if version.major != self.major {
            return false;
        }

        match self.minor {
            Some(minor) => version.minor == minor && version.patch >= self.patch.unwrap_or(0),
            None => true,
        }
    }

    /// Check caret match (^1.2.3 allows >=1.2.3 <2.0.0)
    fn matches_caret(&self, version: &Version) -> bool {
        if version.major != self.major {
            return false;
        }

        version >= &self.to_version()
    }
}

impl FromStr for PartialVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();

        // Build metadata never takes part in matching
        let version_part = input.split_once('+').map_or(input, |(v, _)| v);

        let (core_part, prerelease) = match version_part.split_once('-') {
            Some((c, p)) => (c, Some(p.to_string())),
            None => (version_part, None),
        };

        let parts: Vec<&str> = core_part.split('.').collect();
        if core_part.is_empty() || parts.len() > 3 {
            return Err(VersionError::InvalidFormat {
                input: input.to_string(),
            });
        }

        let number = |component: &str| {
            component
                .parse::<u64>()
                .map_err(|_| VersionError::InvalidNumber {
                    component: component.to_string(),
                })
        };

        Ok(PartialVersion {
            major: number(parts[0])?,
            minor: parts.get(1).map(|c| number(c)).transpose()?,
            patch: parts.get(2).map(|c| number(c)).transpose()?,
            prerelease,
        })
    }
}

impl fmt::Display for PartialVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.major)?;
        if let Some(minor) = self.minor {
            write!(f, ".{}", minor)?;
        }
        if let Some(patch) = self.patch {
            write!(f, ".{}", patch)?;
        }
        if let Some(ref pre) = self.prerelease {
            write!(f, "-{}", pre)?;
        }
        Ok(())
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn version_round_trip(
            major in 0u64..1000,
            minor in 0u64..1000,
            patch in 0u64..1000,
            prerelease in prop::option::of("[a-zA-Z0-9.]+"),
            build in prop::option::of("[a-zA-Z0-9.-]+")
        ) {
            let original = Version {
                major,
                minor,
                patch,
                prerelease: prerelease.clone(),
                build: build.clone(),
            };

            let parsed = Version::from_str(&original.to_string()).unwrap();
            prop_assert_eq!(parsed, original);
        }
    }

    proptest! {
        #[test]
        fn interval_matches_bounds(
            lo in 0u64..50,
            span in 1u64..50,
            probe in 0u64..120,
        ) {
            let hi = lo + span;
            let req = VersionReq::parse(&format!("[{}.0,{}.0)", lo, hi)).unwrap();
            let version = Version::new(probe, 0, 0);
            prop_assert_eq!(req.matches(&version), probe >= lo && probe < hi);
        }
    }
}
