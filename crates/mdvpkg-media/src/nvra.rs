//! Decomposition of a synthesis record's compound package name into
//! `(name, version, release, arch)`.
//!
//! Ported from `original_source/mdvpkg/urpmi/media.py`'s `parse_rpm_name`,
//! which first strips an optional `-disttag[distepoch]` suffix (the
//! "starts-with 'm'" heuristic named in spec §9 is left unextended: the
//! disttag/distepoch are taken as explicit input from the `info` record's
//! own fields, never re-derived from the name), then matches the name
//! against `^(.+)-([^-]+)-([^-].*)\.(.+)$`. Because `name` is matched
//! greedy, the split always lands on the last two hyphens and the last
//! dot in the (possibly disttag-stripped) string — reproduced here
//! directly with `rfind` instead of a regex engine.

/// Split a compound synthesis name into its four RPM identity fields.
///
/// Returns `None` when the name does not decompose cleanly — the caller
/// should treat this as a skip-with-warning, not a fatal error (spec §8
/// boundary case).
#[must_use]
pub fn parse_rpm_name(compound: &str, disttag: Option<&str>, distepoch: Option<&str>) -> Option<(String, String, String, String)> {
    let mut working = compound.to_string();

    if let Some(disttag) = disttag {
        let mut dist = format!("-{disttag}");
        if let Some(distepoch) = distepoch {
            dist.push_str(distepoch);
        }
        let needle = format!("{dist}.");
        if let Some(idx) = working.rfind(&needle) {
            working.replace_range(idx..idx + dist.len(), "");
        }
    }

    let last_dot = working.rfind('.')?;
    let arch = &working[last_dot + 1..];
    if arch.is_empty() {
        return None;
    }

    let rest = &working[..last_dot];
    let last_dash = rest.rfind('-')?;
    let release = &rest[last_dash + 1..];
    if release.is_empty() || release.starts_with('-') {
        return None;
    }

    let head = &rest[..last_dash];
    let second_last_dash = head.rfind('-')?;
    let version = &head[second_last_dash + 1..];
    if version.is_empty() {
        return None;
    }

    let name = &head[..second_last_dash];
    if name.is_empty() {
        return None;
    }

    Some((
        name.to_string(),
        version.to_string(),
        release.to_string(),
        arch.to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn simple_nvra() {
        let parsed = parse_rpm_name("bash-5.2-1.x86_64", None, None).unwrap();
        assert_eq!(
            parsed,
            (
                "bash".to_string(),
                "5.2".to_string(),
                "1".to_string(),
                "x86_64".to_string()
            )
        );
    }

    #[test]
    fn release_with_dots() {
        let parsed = parse_rpm_name("bash-5.2-1.mga9.x86_64", None, None).unwrap();
        assert_eq!(parsed.2, "1.mga9");
        assert_eq!(parsed.3, "x86_64");
    }

    #[test]
    fn disttag_suffix_stripped_before_matching() {
        let parsed = parse_rpm_name("bash-5.2-1-mga9.x86_64", Some("mga9"), None).unwrap();
        assert_eq!(
            parsed,
            (
                "bash".to_string(),
                "5.2".to_string(),
                "1".to_string(),
                "x86_64".to_string()
            )
        );
    }

    #[test]
    fn disttag_and_distepoch_suffix_stripped() {
        let parsed = parse_rpm_name("bash-5.2-1-mga92.x86_64", Some("mga9"), Some("2")).unwrap();
        assert_eq!(parsed.2, "1");
    }

    #[test]
    fn malformed_name_returns_none() {
        assert_eq!(parse_rpm_name("nosensehere", None, None), None);
        assert_eq!(parse_rpm_name("name-version.arch", None, None), None);
    }
}
