//! `RpmVersion`: an epoch/version/release/distepoch tuple, totally
//! ordered by RPM's vercmp rules.
//!
//! The comparison algorithm below is the standard RPM version-comparison
//! algorithm (alternating numeric/alphabetic segment runs, with `~`
//! sorting before everything and `^` sorting after a missing segment) —
//! it is transcribed from `rpmvercmp`, not invented for this crate. See
//! `original_source/mdvpkg/urpmi/packages.py`'s `RpmEVRD.__cmp__`, which
//! delegates to the same algorithm via `rpm.evrCompare`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Epoch/version/release/distepoch identity of a package build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpmVersion {
    /// Numeric epoch, defaulting to 0 when absent from the source record.
    pub epoch: u32,
    /// Upstream version string.
    pub version: String,
    /// Packaging release string (may itself carry a `-disttag[distepoch]`
    /// suffix before decomposition by the media parser).
    pub release: String,
    /// Distribution epoch, if the media record carried one.
    pub distepoch: Option<String>,
}

impl RpmVersion {
    /// Build a version record.
    #[must_use]
    pub fn new(
        epoch: u32,
        version: impl Into<String>,
        release: impl Into<String>,
        distepoch: Option<String>,
    ) -> Self {
        Self {
            epoch,
            version: version.into(),
            release: release.into(),
            distepoch,
        }
    }
}

impl PartialEq for RpmVersion {
    fn eq(&self, other: &Self) -> bool {
        self.epoch == other.epoch
            && self.version == other.version
            && self.release == other.release
            && self.distepoch == other.distepoch
    }
}

impl Eq for RpmVersion {}

impl std::hash::Hash for RpmVersion {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.epoch.hash(state);
        self.version.hash(state);
        self.release.hash(state);
        self.distepoch.hash(state);
    }
}

impl PartialOrd for RpmVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RpmVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| rpmvercmp(&self.version, &other.version))
            .then_with(|| rpmvercmp(&self.release, &other.release))
            .then_with(|| self.distepoch.cmp(&other.distepoch))
    }
}

impl fmt::Display for RpmVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.epoch, self.version, self.release)?;
        if let Some(distepoch) = &self.distepoch {
            write!(f, ":{distepoch}")?;
        }
        Ok(())
    }
}

/// Compare two version/release strings using RPM's vercmp algorithm.
///
/// Strings are split into alternating maximal runs of ASCII digits and
/// ASCII letters, separated by runs of any other byte (which are
/// skipped, not compared). `~` sorts before everything, including the
/// empty string; `^` sorts after a missing segment but otherwise
/// compares as a separator like any other non-alphanumeric byte.
#[must_use]
pub fn rpmvercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let a = a.as_bytes();
    let b = b.as_bytes();
    let mut ai = 0usize;
    let mut bi = 0usize;

    loop {
        while ai < a.len() && !is_alnum(a[ai]) && a[ai] != b'~' && a[ai] != b'^' {
            ai += 1;
        }
        while bi < b.len() && !is_alnum(b[bi]) && b[bi] != b'~' && b[bi] != b'^' {
            bi += 1;
        }

        let a_tilde = ai < a.len() && a[ai] == b'~';
        let b_tilde = bi < b.len() && b[bi] == b'~';
        if a_tilde || b_tilde {
            if a_tilde && b_tilde {
                ai += 1;
                bi += 1;
                continue;
            }
            return if a_tilde {
                Ordering::Less
            } else {
                Ordering::Greater
            };
        }

        let a_caret = ai < a.len() && a[ai] == b'^';
        let b_caret = bi < b.len() && b[bi] == b'^';
        if a_caret || b_caret {
            if ai >= a.len() {
                return Ordering::Less;
            }
            if bi >= b.len() {
                return Ordering::Greater;
            }
            if a_caret && b_caret {
                ai += 1;
                bi += 1;
                continue;
            }
            return if a_caret {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        if ai >= a.len() || bi >= b.len() {
            break;
        }

        // Each side's run is typed by its own leading byte — `a` being
        // numeric does not force `b`'s run to be read as digits too. A
        // numeric run always outranks an alphabetic one, regardless of
        // which argument it belongs to.
        let a_start = ai;
        let a_numeric = a[ai].is_ascii_digit();
        if a_numeric {
            while ai < a.len() && a[ai].is_ascii_digit() {
                ai += 1;
            }
        } else {
            while ai < a.len() && a[ai].is_ascii_alphabetic() {
                ai += 1;
            }
        }

        let b_start = bi;
        let b_numeric = b[bi].is_ascii_digit();
        if b_numeric {
            while bi < b.len() && b[bi].is_ascii_digit() {
                bi += 1;
            }
        } else {
            while bi < b.len() && b[bi].is_ascii_alphabetic() {
                bi += 1;
            }
        }

        if a_numeric != b_numeric {
            return if a_numeric {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let mut a_seg = &a[a_start..ai];
        let mut b_seg = &b[b_start..bi];

        if a_numeric {
            a_seg = trim_leading_zeros(a_seg);
            b_seg = trim_leading_zeros(b_seg);
            match a_seg.len().cmp(&b_seg.len()) {
                Ordering::Equal => {}
                other => return other,
            }
        }

        match a_seg.cmp(b_seg) {
            Ordering::Equal => {}
            other => return other,
        }
    }

    match (ai >= a.len(), bi >= b.len()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => Ordering::Equal,
    }
}

fn is_alnum(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
}

fn trim_leading_zeros(segment: &[u8]) -> &[u8] {
    let mut start = 0;
    while start + 1 < segment.len() && segment[start] == b'0' {
        start += 1;
    }
    &segment[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn equal_strings() {
        assert_eq!(rpmvercmp("1.0", "1.0"), Ordering::Equal);
    }

    #[test]
    fn simple_numeric() {
        assert_eq!(rpmvercmp("1.0", "1.1"), Ordering::Less);
        assert_eq!(rpmvercmp("2.0", "1.9"), Ordering::Greater);
    }

    #[test]
    fn numeric_length_beats_lexical() {
        // "10" > "9" numerically, even though '1' < '9' lexically.
        assert_eq!(rpmvercmp("1.10", "1.9"), Ordering::Greater);
    }

    #[test]
    fn leading_zeros_ignored() {
        assert_eq!(rpmvercmp("1.010", "1.10"), Ordering::Equal);
    }

    #[test]
    fn tilde_sorts_before_everything() {
        assert_eq!(rpmvercmp("1.0~rc1", "1.0"), Ordering::Less);
        assert_eq!(rpmvercmp("1.0~rc1", "1.0~rc2"), Ordering::Less);
        assert_eq!(rpmvercmp("1.0~~", "1.0~"), Ordering::Less);
    }

    #[test]
    fn caret_sorts_after_missing_segment() {
        assert_eq!(rpmvercmp("1.0^git1", "1.0"), Ordering::Greater);
    }

    #[test]
    fn alpha_vs_numeric_segments() {
        // a numeric run always outranks an alphabetic one at the same
        // position, regardless of which string it belongs to.
        assert_eq!(rpmvercmp("10xyz", "10.1xyz"), Ordering::Less);
        assert_eq!(rpmvercmp("xyz.4", "8"), Ordering::Less);
    }

    #[test]
    fn trailing_segment_wins_regardless_of_type() {
        // once a common prefix is consumed, whichever side still has
        // more to compare is greater, whether that tail is numeric or
        // alphabetic.
        assert_eq!(rpmvercmp("2.0", "2.0.1"), Ordering::Less);
        assert_eq!(rpmvercmp("2.0.1a", "2.0.1"), Ordering::Greater);
    }

    #[test]
    fn evr_full_ordering() {
        let older = RpmVersion::new(0, "1.0", "1", None);
        let newer = RpmVersion::new(0, "1.1", "1", None);
        assert!(older < newer);

        let higher_epoch = RpmVersion::new(1, "0.1", "1", None);
        assert!(higher_epoch > newer);
    }

    #[test]
    fn distepoch_breaks_ties() {
        let a = RpmVersion::new(0, "1.0", "1", Some("1".to_string()));
        let b = RpmVersion::new(0, "1.0", "1", Some("2".to_string()));
        assert!(a < b);
        let no_distepoch = RpmVersion::new(0, "1.0", "1", None);
        assert!(no_distepoch < a);
    }

    proptest! {
        #[test]
        fn vercmp_is_antisymmetric(a in "[a-zA-Z0-9.~^_+-]{0,12}", b in "[a-zA-Z0-9.~^_+-]{0,12}") {
            let forward = rpmvercmp(&a, &b);
            let backward = rpmvercmp(&b, &a);
            prop_assert_eq!(forward, backward.reverse());
        }

        #[test]
        fn vercmp_is_reflexive(a in "[a-zA-Z0-9.~^_+-]{0,12}") {
            prop_assert_eq!(rpmvercmp(&a, &a), Ordering::Equal);
        }
    }
}
