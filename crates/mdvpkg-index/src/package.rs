//! `Package`: the per-(name,arch) version-classification state machine.
//!
//! Line-by-line ported from `original_source/mdvpkg/urpmi/packages.py`'s
//! `Package` class: the `_set_latest_installed`/`_set_type`/`on_*` hooks
//! become [`Package::add_version`] and the mutation hooks below, with
//! Python's `_types` dict-of-lists replaced by three `BTreeSet<RpmVersion>`
//! buckets (spec §3's "three auxiliary ordered sets grouping versions by
//! classification").

use mdvpkg_core::{Error, Result, RpmArtifact, RpmVersion};
use std::collections::{BTreeMap, BTreeSet};

/// Which bucket a version currently belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Currently installed (`installtime` was set on ingestion).
    Installed,
    /// Not installed, and newer than the greatest installed version.
    Upgrade,
    /// Not installed, and older than the greatest installed version.
    Downgrade,
}

/// A mid-transaction action on a Package's latest relevant version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InProgress {
    /// An upgrade version is being downloaded/installed.
    Installing,
    /// The installed version is being removed.
    Removing,
}

/// Status derived from `in_progress` and the classification buckets,
/// per spec §3 "Derived status".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// No version of this package has ever been observed installed.
    New,
    /// Installed, with at least one upgrade candidate available.
    Upgrade,
    /// Installed, with no upgrade candidate available.
    Installed,
    /// An install is in progress.
    Installing,
    /// A removal is in progress.
    Removing,
}

#[derive(Debug, Clone)]
struct VersionEntry {
    artifact: RpmArtifact,
    classification: Classification,
}

/// The index entry for a single (name, arch) key.
#[derive(Debug, Clone)]
pub struct Package {
    name: String,
    arch: String,
    versions: BTreeMap<RpmVersion, VersionEntry>,
    installed: BTreeSet<RpmVersion>,
    upgrades: BTreeSet<RpmVersion>,
    downgrades: BTreeSet<RpmVersion>,
    in_progress: Option<InProgress>,
    progress: Option<f64>,
}

impl Package {
    /// Create an empty Package for a (name, arch) key, as happens on
    /// first observation during index build.
    #[must_use]
    pub fn new(name: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arch: arch.into(),
            versions: BTreeMap::new(),
            installed: BTreeSet::new(),
            upgrades: BTreeSet::new(),
            downgrades: BTreeSet::new(),
            in_progress: None,
            progress: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn arch(&self) -> &str {
        &self.arch
    }

    #[must_use]
    pub fn in_progress(&self) -> Option<InProgress> {
        self.in_progress
    }

    #[must_use]
    pub fn progress(&self) -> Option<f64> {
        self.progress
    }

    #[must_use]
    pub fn has_installs(&self) -> bool {
        !self.installed.is_empty()
    }

    #[must_use]
    pub fn has_upgrades(&self) -> bool {
        !self.upgrades.is_empty()
    }

    #[must_use]
    pub fn has_downgrades(&self) -> bool {
        !self.downgrades.is_empty()
    }

    #[must_use]
    pub fn installs(&self) -> Vec<&RpmArtifact> {
        self.list_by(&self.installed)
    }

    #[must_use]
    pub fn upgrades(&self) -> Vec<&RpmArtifact> {
        self.list_by(&self.upgrades)
    }

    #[must_use]
    pub fn downgrades(&self) -> Vec<&RpmArtifact> {
        self.list_by(&self.downgrades)
    }

    fn list_by(&self, bucket: &BTreeSet<RpmVersion>) -> Vec<&RpmArtifact> {
        bucket.iter().filter_map(|v| self.versions.get(v)).map(|e| &e.artifact).collect()
    }

    #[must_use]
    pub fn latest_installed(&self) -> Option<&RpmArtifact> {
        self.latest_in(&self.installed)
    }

    #[must_use]
    pub fn latest_upgrade(&self) -> Option<&RpmArtifact> {
        self.latest_in(&self.upgrades)
    }

    fn latest_in(&self, bucket: &BTreeSet<RpmVersion>) -> Option<&RpmArtifact> {
        bucket.iter().next_back().and_then(|v| self.versions.get(v)).map(|e| &e.artifact)
    }

    /// Status prior to any pending action (spec §3 "current_status").
    #[must_use]
    pub fn current_status(&self) -> Status {
        if self.has_installs() {
            if self.has_upgrades() {
                Status::Upgrade
            } else {
                Status::Installed
            }
        } else {
            Status::New
        }
    }

    /// Observable status (spec §3 "Derived status").
    #[must_use]
    pub fn status(&self) -> Status {
        match self.in_progress {
            Some(InProgress::Installing) => Status::Installing,
            Some(InProgress::Removing) => Status::Removing,
            None => self.current_status(),
        }
    }

    /// The representative artifact for this package, per the selection
    /// rule in spec §4.4.
    ///
    /// Must not be called on a Package with every bucket empty (spec §9);
    /// returns `None` in that case rather than panicking, but callers
    /// should check `status()` first as the invariant intends.
    #[must_use]
    pub fn latest(&self) -> Option<&RpmArtifact> {
        match self.in_progress {
            Some(InProgress::Installing) => self.latest_upgrade(),
            Some(InProgress::Removing) => self.latest_installed(),
            None if matches!(self.current_status(), Status::New) => self.latest_upgrade(),
            None => self.latest_installed(),
        }
    }

    /// Ingest a newly observed artifact for this (name, arch) key,
    /// classifying it and shifting existing buckets as needed.
    ///
    /// Implements spec §4.1's ingestion rules: a duplicate installed
    /// record is logged and the first one kept; a duplicate media
    /// record for a non-installed version is logged and the first one
    /// kept; a version transitioning to installed reclassifies every
    /// other upgrade/downgrade bucket member relative to the new
    /// installed ceiling.
    pub fn add_version(&mut self, artifact: RpmArtifact) {
        let version = artifact.version.clone();
        let newly_installed = artifact.installtime.is_some();

        if let Some(existing) = self.versions.get(&version) {
            match existing.classification {
                Classification::Installed => {
                    if newly_installed {
                        tracing::error!(
                            name = %self.name, arch = %self.arch,
                            "two installed versions observed for the same evr; keeping the first"
                        );
                    }
                    // Media duplicate of an already-installed version: no-op.
                }
                Classification::Upgrade | Classification::Downgrade => {
                    if newly_installed {
                        self.promote_to_installed(version, artifact);
                    } else {
                        tracing::warn!(
                            name = %self.name, arch = %self.arch,
                            "duplicate media record for the same version; media attribution is ambiguous"
                        );
                    }
                }
            }
            return;
        }

        if newly_installed {
            self.insert(version.clone(), artifact, Classification::Installed);
            self.installed.insert(version.clone());
            self.reclassify_around_installed(&version);
        } else {
            let classification = if !self.has_installs() || version > *self.installed.iter().next_back().unwrap() {
                Classification::Upgrade
            } else {
                Classification::Downgrade
            };
            self.insert_classified(version, artifact, classification);
        }
    }

    fn promote_to_installed(&mut self, version: RpmVersion, artifact: RpmArtifact) {
        self.remove_from_bucket(&version);
        self.insert(version.clone(), artifact, Classification::Installed);
        self.installed.insert(version.clone());
        self.reclassify_around_installed(&version);
    }

    fn reclassify_around_installed(&mut self, newest: &RpmVersion) {
        let latest_installed = self.installed.iter().next_back().cloned().unwrap_or_else(|| newest.clone());
        let stale_upgrades: Vec<RpmVersion> =
            self.upgrades.iter().filter(|v| **v < latest_installed).cloned().collect();
        for v in stale_upgrades {
            self.move_bucket(&v, Classification::Downgrade);
        }
        let promotable_downgrades: Vec<RpmVersion> =
            self.downgrades.iter().filter(|v| **v > latest_installed).cloned().collect();
        for v in promotable_downgrades {
            self.move_bucket(&v, Classification::Upgrade);
        }
    }

    fn move_bucket(&mut self, version: &RpmVersion, to: Classification) {
        self.remove_from_bucket(version);
        match to {
            Classification::Installed => self.installed.insert(version.clone()),
            Classification::Upgrade => self.upgrades.insert(version.clone()),
            Classification::Downgrade => self.downgrades.insert(version.clone()),
        };
        if let Some(entry) = self.versions.get_mut(version) {
            entry.classification = to;
        }
    }

    fn remove_from_bucket(&mut self, version: &RpmVersion) {
        self.installed.remove(version);
        self.upgrades.remove(version);
        self.downgrades.remove(version);
    }

    fn insert(&mut self, version: RpmVersion, artifact: RpmArtifact, classification: Classification) {
        self.versions.insert(version, VersionEntry { artifact, classification });
    }

    fn insert_classified(&mut self, version: RpmVersion, artifact: RpmArtifact, classification: Classification) {
        match classification {
            Classification::Installed => {
                self.installed.insert(version.clone());
            }
            Classification::Upgrade => {
                self.upgrades.insert(version.clone());
            }
            Classification::Downgrade => {
                self.downgrades.insert(version.clone());
            }
        }
        self.insert(version, artifact, classification);
    }

    fn version_entry(&self, version: &RpmVersion) -> Result<&VersionEntry> {
        self.versions.get(version).ok_or_else(|| Error::TaskBadState {
            state: format!("{self:?}"),
            attempted: format!("operate on unknown version {version}"),
        })
    }

    fn require_in_progress(&self, expected: InProgress, attempted: &str) -> Result<()> {
        if self.in_progress == Some(expected) {
            Ok(())
        } else {
            Err(Error::TaskBadState {
                state: format!("{:?}", self.in_progress),
                attempted: attempted.to_string(),
            })
        }
    }

    /// Backend reports the start of downloading an upgrade version.
    pub fn on_download_start(&mut self, version: &RpmVersion) -> Result<()> {
        self.require_in_progress(InProgress::Installing, "download_start")?;
        self.version_entry(version)?;
        self.progress = Some(0.0);
        Ok(())
    }

    /// Backend reports download progress, `fraction` in `[0,1]`.
    pub fn on_download_progress(&mut self, version: &RpmVersion, fraction: f64) -> Result<()> {
        self.require_in_progress(InProgress::Installing, "download_progress")?;
        self.version_entry(version)?;
        self.progress = Some(fraction / 2.0);
        Ok(())
    }

    /// Backend reports a download finished.
    pub fn on_download_done(&mut self, version: &RpmVersion) -> Result<()> {
        self.require_in_progress(InProgress::Installing, "download_done")?;
        self.version_entry(version)?;
        self.progress = Some(0.5);
        Ok(())
    }

    /// Backend reports the start of an rpm transaction installing
    /// `version`.
    pub fn on_install_start(&mut self, version: &RpmVersion) -> Result<()> {
        self.require_in_progress(InProgress::Installing, "install_start")?;
        self.version_entry(version)?;
        self.progress = Some(0.5);
        Ok(())
    }

    /// Backend reports install progress, `fraction` in `[0,1]`.
    pub fn on_install_progress(&mut self, version: &RpmVersion, fraction: f64) -> Result<()> {
        self.require_in_progress(InProgress::Installing, "install_progress")?;
        self.version_entry(version)?;
        self.progress = Some(0.5 + fraction / 2.0);
        Ok(())
    }

    /// Backend reports an install transaction completed: the version
    /// becomes the new latest installed, clearing `in_progress`.
    pub fn on_install_done(&mut self, version: &RpmVersion) -> Result<()> {
        self.require_in_progress(InProgress::Installing, "install_done")?;
        let artifact = self.version_entry(version)?.artifact.clone();
        self.promote_to_installed(version.clone(), artifact);
        self.in_progress = None;
        self.progress = None;
        Ok(())
    }

    /// Backend reports the start of removing `version`.
    pub fn on_remove_start(&mut self, version: &RpmVersion) -> Result<()> {
        self.require_in_progress(InProgress::Removing, "remove_start")?;
        self.version_entry(version)?;
        self.progress = Some(0.0);
        Ok(())
    }

    /// Backend reports removal progress, `fraction` in `[0,1]`.
    pub fn on_remove_progress(&mut self, version: &RpmVersion, fraction: f64) -> Result<()> {
        self.require_in_progress(InProgress::Removing, "remove_progress")?;
        self.version_entry(version)?;
        self.progress = Some(fraction);
        Ok(())
    }

    /// Backend reports a removal transaction completed: the version is
    /// reclassified as upgrade or downgrade relative to whatever
    /// remains installed.
    ///
    /// Per the open question in spec §9, `in_progress` is preserved
    /// here intentionally matching the original's behavior — call sites
    /// clear it explicitly via [`Package::clear_in_progress`] once the
    /// backend's own confirmation arrives, not as a side effect of this
    /// hook, so a cancellation observed between this call and that
    /// confirmation does not silently clear a still-pending removal.
    pub fn on_remove_done(&mut self, version: &RpmVersion) -> Result<()> {
        self.require_in_progress(InProgress::Removing, "remove_done")?;
        let artifact = self.version_entry(version)?.artifact.clone();
        let classification = if self.has_installs() && *self.installed.iter().next_back().unwrap() > *version {
            Classification::Downgrade
        } else {
            Classification::Upgrade
        };
        self.remove_from_bucket(version);
        self.insert_classified(version.clone(), artifact, classification);
        self.progress = None;
        Ok(())
    }

    /// Begin an install/remove transaction, recording `in_progress`.
    pub fn begin(&mut self, kind: InProgress) {
        self.in_progress = Some(kind);
        self.progress = Some(0.0);
    }

    /// Clear `in_progress`/`progress`, used once a backend confirms a
    /// cancelled removal has actually stopped (spec §9 caveat).
    pub fn clear_in_progress(&mut self) {
        self.in_progress = None;
        self.progress = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn artifact(version: &str, release: &str, installtime: Option<i64>) -> RpmArtifact {
        RpmArtifact {
            name: "libfoo".to_string(),
            arch: "x86_64".to_string(),
            version: RpmVersion::new(0, version, release, None),
            group: "System/Libraries".to_string(),
            summary: String::new(),
            size: 0,
            media: Some("main".to_string()),
            disttag: None,
            installtime,
            requires: Vec::new(),
            provides: Vec::new(),
            conflicts: Vec::new(),
            obsoletes: Vec::new(),
        }
    }

    #[test]
    fn scenario_one_installed_upgrade_downgrade() {
        let mut pkg = Package::new("libfoo", "x86_64");
        pkg.add_version(artifact("1.0", "1", Some(100)));
        pkg.add_version(artifact("1.1", "1", None));
        pkg.add_version(artifact("0.9", "1", None));

        assert_eq!(pkg.status(), Status::Upgrade);
        assert_eq!(pkg.installs().len(), 1);
        assert_eq!(pkg.upgrades().len(), 1);
        assert_eq!(pkg.downgrades().len(), 1);
        assert_eq!(pkg.latest_installed().unwrap().version.version, "1.0");
        assert_eq!(pkg.upgrades()[0].version.version, "1.1");
        assert_eq!(pkg.downgrades()[0].version.version, "0.9");
    }

    #[test]
    fn new_package_has_new_status() {
        let mut pkg = Package::new("libfoo", "x86_64");
        pkg.add_version(artifact("1.1", "1", None));
        assert_eq!(pkg.status(), Status::New);
        assert_eq!(pkg.latest().unwrap().version.version, "1.1");
    }

    #[test]
    fn installing_an_upgrade_promotes_it_and_keeps_the_old_installed() {
        let mut pkg = Package::new("libfoo", "x86_64");
        pkg.add_version(artifact("1.0", "1", Some(100)));
        pkg.add_version(artifact("1.1", "1", None));

        pkg.begin(InProgress::Installing);
        let upgrade_version = RpmVersion::new(0, "1.1", "1", None);
        pkg.on_download_start(&upgrade_version).unwrap();
        pkg.on_download_done(&upgrade_version).unwrap();
        pkg.on_install_start(&upgrade_version).unwrap();
        pkg.on_install_done(&upgrade_version).unwrap();

        assert_eq!(pkg.in_progress(), None);
        assert_eq!(pkg.status(), Status::Installed);
        assert_eq!(pkg.latest_installed().unwrap().version.version, "1.1");
        // `reclassify_around_installed` only ever moves members of the
        // upgrade/downgrade buckets; the previously-installed 1.0 stays
        // in `installed` and is never demoted (matches `packages.py`'s
        // `_set_latest_installed`, which only touches `upgrade`/`downgrade`).
        assert!(pkg.downgrades().is_empty());
        assert!(pkg.installs().iter().any(|a| a.version.version == "1.0"));
    }

    #[test]
    fn hooks_reject_wrong_state() {
        let mut pkg = Package::new("libfoo", "x86_64");
        pkg.add_version(artifact("1.0", "1", Some(100)));
        let version = RpmVersion::new(0, "1.0", "1", None);
        let err = pkg.on_remove_start(&version).unwrap_err();
        assert!(matches!(err, Error::TaskBadState { .. }));
    }

    #[test]
    fn cancellation_leaves_in_progress_until_explicit_clear() {
        let mut pkg = Package::new("libfoo", "x86_64");
        pkg.add_version(artifact("1.0", "1", Some(100)));
        pkg.begin(InProgress::Removing);
        let version = RpmVersion::new(0, "1.0", "1", None);
        pkg.on_remove_start(&version).unwrap();
        // A cancel arrives here; in_progress is untouched by the library.
        assert_eq!(pkg.in_progress(), Some(InProgress::Removing));
        pkg.clear_in_progress();
        assert_eq!(pkg.in_progress(), None);
    }
}
