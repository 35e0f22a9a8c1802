//! Version selection among the versions a source offers.

use std::collections::BTreeSet;

use super::version::{Version, VersionReq};

/// Version selector for finding best matching versions
#[derive(Debug, Clone, Default)]
pub struct VersionSelector {
    /// Available versions, ascending
    available_versions: BTreeSet<Version>,
}

impl VersionSelector {
    /// Create new version selector with available versions
    pub fn new(versions: impl IntoIterator<Item = Version>) -> Self {
        Self {
            available_versions: versions.into_iter().collect(),
        }
    }

    /// Select highest version matching the constraint
    pub fn select_best(&self, constraint: Option<&VersionReq>) -> Option<Version> {
        self.available_versions
            .iter()
            .rev()
            .find(|version| constraint.map_or(true, |req| req.matches(version)))
            .cloned()
    }

    /// Select highest stable version (no prerelease) matching the constraint
    pub fn select_best_stable(&self, constraint: Option<&VersionReq>) -> Option<Version> {
        self.available_versions
            .iter()
            .rev()
            .filter(|version| !version.is_prerelease())
            .find(|version| constraint.map_or(true, |req| req.matches(version)))
            .cloned()
    }

    /// Select version with preference for stability
    pub fn select_preferred(&self, constraint: Option<&VersionReq>) -> Option<Version> {
        self.select_best_stable(constraint)
            .or_else(|| self.select_best(constraint))
    }

    /// Get the highest available version
    pub fn highest_version(&self) -> Option<&Version> {
        self.available_versions.iter().next_back()
    }

    /// Number of known versions
    pub fn len(&self) -> usize {
        self.available_versions.len()
    }

    /// Whether no version is known
    pub fn is_empty(&self) -> bool {
        self.available_versions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn versions(list: &[&str]) -> VersionSelector {
        VersionSelector::new(list.iter().map(|v| Version::from_str(v).unwrap()))
    }

    #[test]
    fn test_select_best_in_range() {
        let selector = versions(&["1.0.0", "1.5.0", "2.0.0"]);
        let req = VersionReq::parse("[1.0,2.0)").unwrap();
        assert_eq!(selector.select_best(Some(&req)), Some(Version::new(1, 5, 0)));
        assert_eq!(selector.select_best(None), Some(Version::new(2, 0, 0)));
    }

    #[test]
    fn test_prefers_stable() {
        let selector = versions(&["1.0.0", "1.1.0-beta"]);
        assert_eq!(selector.select_preferred(None), Some(Version::new(1, 0, 0)));

        let only_pre = versions(&["1.1.0-beta"]);
        assert_eq!(
            only_pre.select_preferred(None),
            Some(Version::from_str("1.1.0-beta").unwrap())
        );
    }

    #[test]
    fn test_nothing_in_range() {
        let selector = versions(&["1.0.0", "1.5.0"]);
        let req = VersionReq::parse("[2.0,3.0)").unwrap();
        assert_eq!(selector.select_preferred(Some(&req)), None);
        assert_eq!(selector.highest_version(), Some(&Version::new(1, 5, 0)));
        assert_eq!(selector.len(), 2);
    }
}
