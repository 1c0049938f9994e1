//! `RpmArtifact`: the full package-version record carried by the index.
//!
//! Grounded on `original_source/mdvpkg/urpmi/packages.py`'s `RpmPackage`
//! class — the `denvra`/`na`/`nvra` properties there map onto the
//! equality key and `Display` impl here.

use crate::capability::Capability;
use crate::version::RpmVersion;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single RPM build, as carried by rpmdb or a media synthesis record.
///
/// Two artifacts are equal when their `(distepoch, disttag, epoch, name,
/// version, release, arch)` tuple matches — summary, size, and the
/// dependency lists are metadata, not identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpmArtifact {
    /// Package name, e.g. `kernel-desktop`.
    pub name: String,
    /// Architecture, e.g. `x86_64`, `noarch`.
    pub arch: String,
    /// Epoch/version/release/distepoch identity.
    pub version: RpmVersion,
    /// RPM group classification (`%group` tag), e.g. `System/Kernel and hardware`.
    pub group: String,
    /// One-line summary (`%summary` tag).
    pub summary: String,
    /// Installed or package size in bytes.
    pub size: u64,
    /// Name of the media this artifact was read from, absent for
    /// artifacts sourced from the local rpmdb.
    pub media: Option<String>,
    /// Distribution tag (`%disttag`), e.g. `mdv`.
    pub disttag: Option<String>,
    /// Installation timestamp, present only for artifacts read from
    /// rpmdb.
    pub installtime: Option<i64>,
    /// Capabilities this artifact requires.
    pub requires: Vec<Capability>,
    /// Capabilities this artifact provides, beyond its own `name = version`.
    pub provides: Vec<Capability>,
    /// Capabilities this artifact conflicts with.
    pub conflicts: Vec<Capability>,
    /// Capabilities this artifact obsoletes.
    pub obsoletes: Vec<Capability>,
}

impl RpmArtifact {
    /// `name.arch`, the key used by `PackageIndex`.
    #[must_use]
    pub fn na(&self) -> String {
        format!("{}.{}", self.name, self.arch)
    }

    /// `name-version-release.arch`, the conventional RPM display form.
    #[must_use]
    pub fn nvra(&self) -> String {
        format!(
            "{}-{}-{}.{}",
            self.name, self.version.version, self.version.release, self.arch
        )
    }
}

impl PartialEq for RpmArtifact {
    fn eq(&self, other: &Self) -> bool {
        self.version.distepoch == other.version.distepoch
            && self.disttag == other.disttag
            && self.version.epoch == other.version.epoch
            && self.name == other.name
            && self.version.version == other.version.version
            && self.version.release == other.version.release
            && self.arch == other.arch
    }
}

impl Eq for RpmArtifact {}

impl fmt::Display for RpmArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.nvra())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn artifact(name: &str, version: &str, release: &str) -> RpmArtifact {
        RpmArtifact {
            name: name.to_string(),
            arch: "x86_64".to_string(),
            version: RpmVersion::new(0, version, release, None),
            group: "System/Base".to_string(),
            summary: String::new(),
            size: 0,
            media: None,
            disttag: None,
            installtime: None,
            requires: Vec::new(),
            provides: Vec::new(),
            conflicts: Vec::new(),
            obsoletes: Vec::new(),
        }
    }

    #[test]
    fn equality_ignores_metadata() {
        let mut a = artifact("bash", "5.2", "1");
        let mut b = artifact("bash", "5.2", "1");
        a.summary = "the GNU shell".to_string();
        b.summary = "a different summary".to_string();
        a.size = 100;
        b.size = 200;
        assert_eq!(a, b);
    }

    #[test]
    fn equality_respects_disttag_and_distepoch() {
        let mut a = artifact("bash", "5.2", "1");
        let mut b = artifact("bash", "5.2", "1");
        a.disttag = Some("mdv".to_string());
        assert_ne!(a, b);
        b.disttag = Some("mdv".to_string());
        assert_eq!(a, b);
    }

    #[test]
    fn na_and_nvra_formatting() {
        let pkg = artifact("bash", "5.2", "1");
        assert_eq!(pkg.na(), "bash.x86_64");
        assert_eq!(pkg.nvra(), "bash-5.2-1.x86_64");
    }
}
