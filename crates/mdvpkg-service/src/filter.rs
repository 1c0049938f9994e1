//! `filter(dimension, include, exclude)` (spec §4.4), modeled per the
//! §9 design note "dynamic filter dispatch... model as a map from
//! dimension tag to a match predicate closure; dimensions are a closed
//! enum" rather than the original's `getattr(self, 'filter_%s' % name)`
//! dispatch.

use regex::Regex;
use std::collections::HashMap;
use std::collections::HashSet;

/// The five filterable dimensions named in spec §4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterDimension {
    Name,
    Group,
    Status,
    Media,
    Action,
}

impl FilterDimension {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "name" => Some(Self::Name),
            "group" => Some(Self::Group),
            "status" => Some(Self::Status),
            "media" => Some(Self::Media),
            "action" => Some(Self::Action),
            _ => None,
        }
    }

    /// Per-dimension match rule: `name` is a regex match, `group` is a
    /// `/`-path-prefix match, the rest are exact string matches.
    fn matches_pattern(self, pattern: &str, value: &str) -> bool {
        match self {
            Self::Name => Regex::new(pattern).is_ok_and(|re| re.is_match(value)),
            Self::Group => value == pattern || value.starts_with(&format!("{pattern}/")),
            Self::Status | Self::Media | Self::Action => value == pattern,
        }
    }
}

/// The include/exclude pattern sets configured for one dimension.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    include: HashSet<String>,
    exclude: HashSet<String>,
}

impl FilterSet {
    #[must_use]
    pub fn new(include: HashSet<String>, exclude: HashSet<String>) -> Self {
        Self { include, exclude }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// A value survives iff it matches the include set when one is
    /// configured, and matches none of the exclude set.
    #[must_use]
    pub fn admits(&self, dimension: FilterDimension, value: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|p| dimension.matches_pattern(p, value));
        let excluded = self.exclude.iter().any(|p| dimension.matches_pattern(p, value));
        included && !excluded
    }
}

/// The full per-`PackageList` filter configuration: one `FilterSet` per
/// dimension, absent entries admitting everything.
#[derive(Debug, Clone, Default)]
pub struct FilterConfig(HashMap<FilterDimension, FilterSet>);

impl FilterConfig {
    /// `include = exclude = ∅` clears that dimension (spec §4.4).
    pub fn set(&mut self, dimension: FilterDimension, include: HashSet<String>, exclude: HashSet<String>) {
        let set = FilterSet::new(include, exclude);
        if set.is_empty() {
            self.0.remove(&dimension);
        } else {
            self.0.insert(dimension, set);
        }
    }

    /// A row survives iff every configured dimension admits the
    /// corresponding value.
    #[must_use]
    pub fn admits(&self, values: &RowValues<'_>) -> bool {
        self.0.iter().all(|(dimension, set)| set.admits(*dimension, values.get(*dimension)))
    }
}

/// The values one `PackageList` row exposes per dimension, gathered
/// once per `sort_and_filter` pass.
pub struct RowValues<'a> {
    pub name: &'a str,
    pub group: &'a str,
    pub status: &'a str,
    pub media: &'a str,
    pub action: &'a str,
}

impl RowValues<'_> {
    fn get(&self, dimension: FilterDimension) -> &str {
        match dimension {
            FilterDimension::Name => self.name,
            FilterDimension::Group => self.group,
            FilterDimension::Status => self.status,
            FilterDimension::Media => self.media,
            FilterDimension::Action => self.action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn empty_sets_admit_everything() {
        let mut config = FilterConfig::default();
        config.set(FilterDimension::Name, set(&[]), set(&[]));
        let row = RowValues { name: "libfoo", group: "System/Libraries", status: "new", media: "main", action: "" };
        assert!(config.admits(&row));
    }

    #[test]
    fn name_dimension_is_a_regex_match() {
        let mut config = FilterConfig::default();
        config.set(FilterDimension::Name, set(&["^lib"]), set(&[]));
        let matching = RowValues { name: "libfoo", group: "", status: "", media: "", action: "" };
        let not_matching = RowValues { name: "firefox", group: "", status: "", media: "", action: "" };
        assert!(config.admits(&matching));
        assert!(!config.admits(&not_matching));
    }

    #[test]
    fn group_dimension_is_a_path_prefix_match() {
        let mut config = FilterConfig::default();
        config.set(FilterDimension::Group, set(&["System"]), set(&[]));
        let child = RowValues { name: "", group: "System/Libraries", status: "", media: "", action: "" };
        let other = RowValues { name: "", group: "Networking/Other", status: "", media: "", action: "" };
        assert!(config.admits(&child));
        assert!(!config.admits(&other));
    }

    #[test]
    fn exclude_wins_even_if_include_also_matches() {
        let mut config = FilterConfig::default();
        config.set(FilterDimension::Status, set(&["new", "upgrade"]), set(&["new"]));
        let new_row = RowValues { name: "", group: "", status: "new", media: "", action: "" };
        let upgrade_row = RowValues { name: "", group: "", status: "upgrade", media: "", action: "" };
        assert!(!config.admits(&new_row));
        assert!(config.admits(&upgrade_row));
    }

    #[test]
    fn setting_empty_clears_a_previously_configured_dimension() {
        let mut config = FilterConfig::default();
        config.set(FilterDimension::Media, set(&["main"]), set(&[]));
        let other_media = RowValues { name: "", group: "", status: "", media: "extra", action: "" };
        assert!(!config.admits(&other_media));
        config.set(FilterDimension::Media, set(&[]), set(&[]));
        assert!(config.admits(&other_media));
    }
}
