//! Installed-package snapshot and diff.

use std::collections::BTreeMap;

/// Mapping package name -> ordered sequence of installed versions
/// (multiple entries arise from multi-arch/duplicate packages).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageSet {
    packages: BTreeMap<String, Vec<String>>,
}

impl PackageSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, version: impl Into<String>) {
        self.packages.entry(name.into()).or_default().push(version.into());
    }

    pub fn versions(&self, name: &str) -> Option<&[String]> {
        self.packages.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Diff `self` (old) against `new`:
    /// - `installed` = packages in `new` absent from `old`
    /// - `updated`   = packages present in both with differing versions
    /// - `removed`   = packages in `old` absent from `new`
    pub fn diff(&self, new: &PackageSet) -> PackageDiff {
        let mut installed = Vec::new();
        let mut updated = Vec::new();
        let mut removed = Vec::new();

        for name in new.names() {
            if !self.contains(name) {
                installed.push(name.to_string());
            } else if self.versions(name) != new.versions(name) {
                updated.push(name.to_string());
            }
        }
        for name in self.names() {
            if !new.contains(name) {
                removed.push(name.to_string());
            }
        }

        installed.sort();
        updated.sort();
        removed.sort();
        PackageDiff {
            installed,
            updated,
            removed,
        }
    }
}

/// Result of [`PackageSet::diff`]: `installed`, `updated`, and `removed`
/// are pairwise disjoint (P5).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageDiff {
    pub installed: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
}

impl PackageDiff {
    pub fn is_empty(&self) -> bool {
        self.installed.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    /// True iff nothing was installed or updated (the `OK_NO_UPDATES`
    /// short-circuit condition ignores removals).
    pub fn has_no_new_content(&self) -> bool {
        self.installed.is_empty() && self.updated.is_empty()
    }

    /// Human-readable three-section summary printed on stdout
    /// (`"Installed/Updated/Removed packages:"`, `"None"` when empty).
    pub fn summary(&self) -> String {
        let section = |title: &str, items: &[String]| {
            let body = if items.is_empty() {
                "None".to_string()
            } else {
                items.join(", ")
            };
            format!("{title} packages:\n{body}\n")
        };
        let mut out = String::new();
        out.push_str(&section("Installed", &self.installed));
        out.push_str(&section("Updated", &self.updated));
        out.push_str(&section("Removed", &self.removed));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(entries: &[(&str, &str)]) -> PackageSet {
        let mut s = PackageSet::new();
        for (name, version) in entries {
            s.insert(*name, *version);
        }
        s
    }

    #[test]
    fn diff_classifies_installed_updated_removed() {
        let old = set(&[("a", "1.0"), ("b", "2.0"), ("c", "3.0")]);
        let new = set(&[("a", "1.0"), ("b", "2.1"), ("d", "1.0")]);
        let diff = old.diff(&new);
        assert_eq!(diff.installed, vec!["d".to_string()]);
        assert_eq!(diff.updated, vec!["b".to_string()]);
        assert_eq!(diff.removed, vec!["c".to_string()]);
    }

    #[test]
    fn diff_partition_is_disjoint_and_covers_union() {
        let old = set(&[("a", "1.0"), ("b", "2.0")]);
        let new = set(&[("a", "1.0"), ("b", "3.0"), ("c", "1.0")]);
        let diff = old.diff(&new);
        let mut all: Vec<&str> = diff
            .installed
            .iter()
            .chain(&diff.updated)
            .chain(&diff.removed)
            .map(String::as_str)
            .collect();
        all.sort();
        assert_eq!(all, vec!["b", "c"]);
    }

    #[test]
    fn no_new_content_ignores_removals() {
        let old = set(&[("a", "1.0"), ("b", "2.0")]);
        let new = set(&[("a", "1.0")]);
        let diff = old.diff(&new);
        assert!(diff.has_no_new_content());
        assert!(!diff.is_empty());
    }

    #[test]
    fn summary_reports_none_for_empty_sections() {
        let diff = PackageDiff::default();
        let s = diff.summary();
        assert!(s.contains("Installed packages:\nNone"));
        assert!(s.contains("Updated packages:\nNone"));
        assert!(s.contains("Removed packages:\nNone"));
    }
}
