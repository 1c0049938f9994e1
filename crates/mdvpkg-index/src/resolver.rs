//! Client for the external resolver protocol (spec §4.3).
//!
//! Spawned per `resolve()` call, short-lived, grounded on
//! `original_source/mdvpkg/worker.py`'s `Backend` class shape (spawn,
//! write a line, read lines until EOF) even though that class drives the
//! long-lived install backend, not the resolver — the stdio framing
//! idiom is the same.

use mdvpkg_core::{Error, Result, RpmVersion};
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

/// One of the resolver's action tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionTag {
    Install,
    AutoInstall,
    Remove,
    AutoRemove,
}

impl ActionTag {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "action-install" => Some(Self::Install),
            "action-auto-install" => Some(Self::AutoInstall),
            "action-remove" => Some(Self::Remove),
            "action-auto-remove" => Some(Self::AutoRemove),
            _ => None,
        }
    }
}

/// One of the rejection reasons a resolver can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Unsatisfied,
    Conflicts,
    RejectedDependency,
    RemoveDepends,
}

impl RejectReason {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "reject-install-unsatisfied" => Some(Self::Unsatisfied),
            "reject-install-conflicts" => Some(Self::Conflicts),
            "reject-install-rejected-dependency" => Some(Self::RejectedDependency),
            "reject-remove-depends" => Some(Self::RemoveDepends),
            _ => None,
        }
    }
}

/// A `(name, arch), version` target as reported by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub arch: String,
    pub version: RpmVersion,
}

/// One entry of the resolver's `SELECTED` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selected {
    pub action: ActionTag,
    pub target: Target,
}

/// One entry of the resolver's `REJECTED` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected {
    pub reason: RejectReason,
    pub target: Target,
    /// Capability strings (for `Unsatisfied`) or raw `(name,arch),version`
    /// tuples (for the other three reasons) — left uninterpreted here;
    /// the session/service layer knows which shape to expect per reason.
    pub subjects: Vec<String>,
}

/// The outcome of a single `resolve()` call: selections confirmed and
/// rejections reported, in the order the resolver emitted them.
#[derive(Debug, Clone, Default)]
pub struct ResolveOutcome {
    pub selected: Vec<Selected>,
    pub rejected: Vec<Rejected>,
}

impl ResolveOutcome {
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Input item for a `resolve()` call: a (name, arch, version) to
/// install or remove.
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub name: String,
    pub arch: String,
    pub version: RpmVersion,
}

/// Invoke the external resolver once, as specified in spec §4.3.
///
/// # Errors
/// [`Error::ResolverError`] if the process cannot be spawned, exits with
/// a non-zero status, emits an `ERROR` line, or emits output this parser
/// cannot make sense of.
pub async fn resolve(resolver_path: &Path, installs: &[ResolveRequest], removes: &[ResolveRequest]) -> Result<ResolveOutcome> {
    let mut tokens: Vec<String> = Vec::with_capacity(installs.len() + removes.len());
    for req in installs {
        tokens.push(nvra_token(req));
    }
    for req in removes {
        tokens.push(format!("r:{}", nvra_token(req)));
    }
    let line = tokens.join("\t");

    let mut child = Command::new(resolver_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|err| Error::ResolverError {
            message: format!("failed to spawn {}: {err}", resolver_path.display()),
        })?;

    {
        let mut stdin = child.stdin.take().ok_or_else(|| Error::ResolverError {
            message: "resolver process has no stdin".to_string(),
        })?;
        stdin.write_all(line.as_bytes()).await.map_err(|err| Error::ResolverError {
            message: format!("writing resolver input: {err}"),
        })?;
        stdin.write_all(b"\n").await.map_err(|err| Error::ResolverError {
            message: format!("writing resolver input: {err}"),
        })?;
    } // stdin dropped here, sending EOF to the child.

    let stdout = child.stdout.take().ok_or_else(|| Error::ResolverError {
        message: "resolver process has no stdout".to_string(),
    })?;
    let mut lines = BufReader::new(stdout).lines();
    let mut outcome = ResolveOutcome::default();

    while let Some(raw) = lines.next_line().await.map_err(|err| Error::ResolverError {
        message: format!("reading resolver output: {err}"),
    })? {
        let fields: Vec<&str> = raw.split('\t').collect();
        if fields.first() != Some(&"%MDVPKG") {
            continue;
        }
        match fields.get(1).copied() {
            Some("SELECTED") => outcome.selected.push(parse_selected(&fields)?),
            Some("REJECTED") => outcome.rejected.push(parse_rejected(&fields)?),
            Some("ERROR") => {
                return Err(Error::ResolverError {
                    message: fields.get(2).copied().unwrap_or("unspecified resolver error").to_string(),
                });
            }
            _ => tracing::warn!(line = %raw, "unrecognized resolver output line"),
        }
    }

    let status = child.wait().await.map_err(|err| Error::ResolverError {
        message: format!("waiting for resolver process: {err}"),
    })?;
    if !status.success() {
        return Err(Error::ResolverError {
            message: format!("resolver exited with {status}"),
        });
    }

    Ok(outcome)
}

fn nvra_token(req: &ResolveRequest) -> String {
    format!("{}-{}-{}.{}", req.name, req.version.version, req.version.release, req.arch)
}

fn parse_selected(fields: &[&str]) -> Result<Selected> {
    let action = fields
        .get(2)
        .and_then(|tag| ActionTag::parse(tag))
        .ok_or_else(|| malformed("SELECTED missing or unknown action tag"))?;
    let target = fields.get(3).ok_or_else(|| malformed("SELECTED missing target tuple")).and_then(|tuple| parse_target(tuple))?;
    Ok(Selected { action, target })
}

fn parse_rejected(fields: &[&str]) -> Result<Rejected> {
    let reason = fields
        .get(2)
        .and_then(|tag| RejectReason::parse(tag))
        .ok_or_else(|| malformed("REJECTED missing or unknown reason"))?;
    let target = fields.get(3).ok_or_else(|| malformed("REJECTED missing target tuple")).and_then(|tuple| parse_target(tuple))?;
    let subjects = fields[4.min(fields.len())..].iter().map(|s| (*s).to_string()).collect();
    Ok(Rejected { reason, target, subjects })
}

fn malformed(message: &str) -> Error {
    Error::ResolverError {
        message: message.to_string(),
    }
}

/// Parse a `((name,arch),(epoch,version,release,distepoch))` literal.
fn parse_target(tuple: &str) -> Result<Target> {
    let inner = tuple
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| malformed("target tuple missing outer parens"))?;
    let parts = split_top_level(inner);
    let [na, evrd] = parts.as_slice() else {
        return Err(malformed("target tuple does not have exactly two parts"));
    };

    let na_inner = na
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| malformed("(name,arch) tuple missing parens"))?;
    let na_parts = split_top_level(na_inner);
    let [name, arch] = na_parts.as_slice() else {
        return Err(malformed("(name,arch) tuple does not have exactly two parts"));
    };

    let evrd_inner = evrd
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| malformed("evrd tuple missing parens"))?;
    let evrd_parts = split_top_level(evrd_inner);
    let (Some(epoch), Some(version), Some(release)) = (evrd_parts.first(), evrd_parts.get(1), evrd_parts.get(2)) else {
        return Err(malformed("evrd tuple missing epoch/version/release"));
    };
    let distepoch = evrd_parts.get(3).map(|s| s.trim()).filter(|s| !s.is_empty()).map(str::to_string);
    let epoch: u32 = epoch.trim().parse().map_err(|_| malformed("evrd epoch is not numeric"))?;

    Ok(Target {
        name: (*name).trim().to_string(),
        arch: (*arch).trim().to_string(),
        version: RpmVersion::new(epoch, version.trim(), release.trim(), distepoch),
    })
}

/// Split a comma-separated string at top-level commas only, treating
/// any run of balanced parens as opaque.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn splits_top_level_commas_only() {
        assert_eq!(split_top_level("a,(b,c),d"), vec!["a", "(b,c)", "d"]);
    }

    #[test]
    fn parses_target_tuple() {
        let target = parse_target("((libfoo,x86_64),(0,1.1,1,))").unwrap();
        assert_eq!(target.name, "libfoo");
        assert_eq!(target.arch, "x86_64");
        assert_eq!(target.version, RpmVersion::new(0, "1.1", "1", None));
    }

    #[test]
    fn parses_target_tuple_with_distepoch() {
        let target = parse_target("((libfoo,x86_64),(0,1.1,1,2))").unwrap();
        assert_eq!(target.version.distepoch.as_deref(), Some("2"));
    }

    #[test]
    fn parses_selected_line() {
        let fields = ["%MDVPKG", "SELECTED", "action-install", "((libfoo,x86_64),(0,1.1,1,))"];
        let selected = parse_selected(&fields).unwrap();
        assert_eq!(selected.action, ActionTag::Install);
        assert_eq!(selected.target.name, "libfoo");
    }

    #[test]
    fn parses_rejected_line_with_subjects() {
        let fields = [
            "%MDVPKG",
            "REJECTED",
            "reject-install-unsatisfied",
            "((libfoo,x86_64),(0,1.1,1,))",
            "libmissing >= 1",
        ];
        let rejected = parse_rejected(&fields).unwrap();
        assert_eq!(rejected.reason, RejectReason::Unsatisfied);
        assert_eq!(rejected.subjects, vec!["libmissing >= 1".to_string()]);
    }

    #[test]
    fn nvra_token_omits_epoch() {
        let req = ResolveRequest {
            name: "libfoo".to_string(),
            arch: "x86_64".to_string(),
            version: RpmVersion::new(0, "1.1", "1", None),
        };
        assert_eq!(nvra_token(&req), "libfoo-1.1-1.x86_64");
    }
}
