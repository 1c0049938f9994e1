//! Line-oriented synthesis hdlist parsing.
//!
//! Grounded on `original_source/mdvpkg/urpmi/media.py`'s `list()`
//! generator, with one deliberate correction (SPEC_FULL.md §5.2): the
//! Python original yields a package dict the instant it sees the next
//! `info` line, before the `summary`/`requires`/`provides`/`conflict`/
//! `obsoletes` lines that describe *that same package* have been read,
//! so every yielded record is missing the fields that trail its `info`
//! line in the file. This parser instead accumulates fields into a
//! record-in-progress and only emits a record once it is complete: on
//! the next `info` line, or at end of stream.

use crate::nvra::parse_rpm_name;
use mdvpkg_core::{Capability, Error, Result, RpmArtifact, RpmVersion};
use std::str::FromStr;

#[derive(Default)]
struct RecordBuilder {
    compound_name: String,
    epoch: u32,
    size: u64,
    group: String,
    disttag: Option<String>,
    distepoch: Option<String>,
    summary: String,
    requires: Vec<Capability>,
    provides: Vec<Capability>,
    conflicts: Vec<Capability>,
    obsoletes: Vec<Capability>,
}

impl RecordBuilder {
    fn from_info_fields(fields: &[&str]) -> Self {
        let disttag = fields.get(4).map(|s| (*s).to_string());
        let distepoch = fields.get(5).map(|s| (*s).to_string());
        Self {
            compound_name: fields.first().copied().unwrap_or_default().to_string(),
            epoch: fields.get(1).and_then(|s| s.parse().ok()).unwrap_or(0),
            size: fields.get(2).and_then(|s| s.parse().ok()).unwrap_or(0),
            group: fields.get(3).copied().unwrap_or_default().to_string(),
            disttag,
            distepoch,
            ..Self::default()
        }
    }

    /// Finish this record into an [`RpmArtifact`], or `None` if the
    /// compound name fails to decompose (spec §8 boundary case: skip,
    /// don't fail the whole media read).
    fn finish(self, media_name: &str) -> Option<RpmArtifact> {
        let (name, version, release, arch) =
            parse_rpm_name(&self.compound_name, self.disttag.as_deref(), self.distepoch.as_deref())?;
        Some(RpmArtifact {
            name,
            arch,
            version: RpmVersion::new(self.epoch, version, release, self.distepoch.clone()),
            group: self.group,
            summary: self.summary,
            size: self.size,
            media: Some(media_name.to_string()),
            disttag: self.disttag,
            installtime: None,
            requires: self.requires,
            provides: self.provides,
            conflicts: self.conflicts,
            obsoletes: self.obsoletes,
        })
    }
}

fn parse_capability_list(fields: &[&str]) -> Vec<Capability> {
    fields
        .iter()
        .filter_map(|field| Capability::from_str(field).ok())
        .collect()
}

/// Parse an already-decompressed synthesis hdlist, line by line.
///
/// `media_name` tags every yielded artifact's `media` field and is used
/// only in `tracing::warn!` diagnostics for skipped records.
pub fn parse_lines<I, S, E>(lines: I, media_name: &str) -> Result<Vec<RpmArtifact>>
where
    I: IntoIterator<Item = std::result::Result<S, E>>,
    S: AsRef<str>,
    E: std::fmt::Display,
{
    let mut artifacts = Vec::new();
    let mut current: Option<RecordBuilder> = None;

    for line in lines {
        let line = line.map_err(|err| Error::BackendError {
            message: format!("reading synthesis data for {media_name}: {err}"),
        })?;
        let line = line.as_ref();
        let mut fields = line.split('@');
        // The line starts with '@', so the first split segment is empty.
        fields.next();
        let fields: Vec<&str> = fields.collect();
        let Some(&tag) = fields.first() else {
            continue;
        };
        let rest = &fields[1..];

        match tag {
            "info" => {
                if let Some(builder) = current.take() {
                    match builder.finish(media_name) {
                        Some(artifact) => artifacts.push(artifact),
                        None => tracing::warn!(media = media_name, "skipping record with unparseable name"),
                    }
                }
                current = Some(RecordBuilder::from_info_fields(rest));
            }
            "summary" => {
                if let Some(builder) = current.as_mut() {
                    builder.summary = rest.first().copied().unwrap_or_default().to_string();
                }
            }
            "requires" => {
                if let Some(builder) = current.as_mut() {
                    builder.requires = parse_capability_list(rest);
                }
            }
            "provides" => {
                if let Some(builder) = current.as_mut() {
                    builder.provides = parse_capability_list(rest);
                }
            }
            "conflict" | "conflicts" => {
                if let Some(builder) = current.as_mut() {
                    builder.conflicts = parse_capability_list(rest);
                }
            }
            "obsoletes" => {
                if let Some(builder) = current.as_mut() {
                    builder.obsoletes = parse_capability_list(rest);
                }
            }
            _ => {}
        }
    }

    if let Some(builder) = current {
        match builder.finish(media_name) {
            Some(artifact) => artifacts.push(artifact),
            None => tracing::warn!(media = media_name, "skipping record with unparseable name"),
        }
    }

    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lines(text: &str) -> Vec<std::result::Result<String, std::io::Error>> {
        text.lines().map(|line| Ok(line.to_string())).collect()
    }

    #[test]
    fn single_record_all_fields_attached() {
        let text = "\
@info@bash-5.2-1.x86_64@0@4210000@System/Shells
@summary@The GNU shell
@requires@glibc[>= 2.34]
@provides@bash
@obsoletes@
";
        let artifacts = parse_lines(lines(text), "core").unwrap();
        assert_eq!(artifacts.len(), 1);
        let bash = &artifacts[0];
        assert_eq!(bash.name, "bash");
        assert_eq!(bash.version.version, "5.2");
        assert_eq!(bash.version.release, "1");
        assert_eq!(bash.arch, "x86_64");
        assert_eq!(bash.summary, "The GNU shell");
        assert_eq!(bash.requires, vec![Capability::from_str("glibc[>= 2.34]").unwrap()]);
        assert_eq!(bash.provides, vec![Capability::unversioned("bash")]);
        assert_eq!(bash.media.as_deref(), Some("core"));
    }

    #[test]
    fn multi_record_boundary_does_not_leak_fields() {
        let text = "\
@info@bash-5.2-1.x86_64@0@4210000@System/Shells
@summary@The GNU shell
@requires@glibc
@info@zsh-5.9-2.x86_64@0@6300000@System/Shells
@summary@A shell with lots of features
@requires@glibc ncurses
";
        let artifacts = parse_lines(lines(text), "core").unwrap();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].name, "bash");
        assert_eq!(artifacts[0].summary, "The GNU shell");
        assert_eq!(artifacts[0].requires, vec![Capability::unversioned("glibc")]);
        assert_eq!(artifacts[1].name, "zsh");
        assert_eq!(artifacts[1].summary, "A shell with lots of features");
        assert_eq!(
            artifacts[1].requires,
            vec![Capability::unversioned("glibc"), Capability::unversioned("ncurses")]
        );
    }

    #[test]
    fn final_record_is_flushed_at_eof() {
        let text = "\
@info@bash-5.2-1.x86_64@0@4210000@System/Shells
@info@zsh-5.9-2.x86_64@0@6300000@System/Shells
@summary@A shell with lots of features
";
        let artifacts = parse_lines(lines(text), "core").unwrap();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[1].summary, "A shell with lots of features");
    }

    #[test]
    fn disttag_and_distepoch_fields_decompose_the_name() {
        let text = "@info@bash-5.2-1-mga92.x86_64@0@4210000@System/Shells@mga9@2\n";
        let artifacts = parse_lines(lines(text), "core").unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].version.release, "1");
        assert_eq!(artifacts[0].disttag.as_deref(), Some("mga9"));
        assert_eq!(artifacts[0].version.distepoch.as_deref(), Some("2"));
    }

    #[test]
    fn malformed_name_is_skipped_not_fatal() {
        let text = "\
@info@nosensehere@0@100@System/Base
@info@bash-5.2-1.x86_64@0@4210000@System/Shells
";
        let artifacts = parse_lines(lines(text), "core").unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].name, "bash");
    }
}
