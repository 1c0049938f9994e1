//! Attribute resolution shared by `sort`, `filter`, and `get` (spec
//! §4.4): the `name/status/action` derived fields come from the
//! `PackageList` item itself, everything else is read off `latest()`'s
//! `RpmArtifact`.

use mdvpkg_core::RpmArtifact;

/// Resolve one named attribute against an artifact, per spec §4.4's
/// `get` contract: "empty strings substitute for absent attribute
/// values."
#[must_use]
pub fn artifact_attribute(artifact: &RpmArtifact, attr: &str) -> String {
    match attr {
        "name" => artifact.name.clone(),
        "arch" => artifact.arch.clone(),
        "version" => artifact.version.version.clone(),
        "release" => artifact.version.release.clone(),
        "epoch" => artifact.version.epoch.to_string(),
        "distepoch" => artifact.version.distepoch.clone().unwrap_or_default(),
        "group" => artifact.group.clone(),
        "summary" => artifact.summary.clone(),
        "size" => artifact.size.to_string(),
        "media" => artifact.media.clone().unwrap_or_default(),
        "disttag" => artifact.disttag.clone().unwrap_or_default(),
        "nvra" => artifact.nvra(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdvpkg_core::RpmVersion;
    use pretty_assertions::assert_eq;

    fn artifact() -> RpmArtifact {
        RpmArtifact {
            name: "libfoo".to_string(),
            arch: "x86_64".to_string(),
            version: RpmVersion::new(0, "1.1", "1", None),
            group: "System/Libraries".to_string(),
            summary: "a library".to_string(),
            size: 1024,
            media: Some("main".to_string()),
            disttag: None,
            installtime: None,
            requires: Vec::new(),
            provides: Vec::new(),
            conflicts: Vec::new(),
            obsoletes: Vec::new(),
        }
    }

    #[test]
    fn known_attributes_resolve() {
        let a = artifact();
        assert_eq!(artifact_attribute(&a, "name"), "libfoo");
        assert_eq!(artifact_attribute(&a, "version"), "1.1");
        assert_eq!(artifact_attribute(&a, "size"), "1024");
    }

    #[test]
    fn absent_values_are_empty_strings() {
        let a = artifact();
        assert_eq!(artifact_attribute(&a, "distepoch"), "");
        assert_eq!(artifact_attribute(&a, "disttag"), "");
    }

    #[test]
    fn unknown_attribute_is_an_empty_string() {
        let a = artifact();
        assert_eq!(artifact_attribute(&a, "does-not-exist"), "");
    }
}
