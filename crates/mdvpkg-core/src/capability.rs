//! The `NAME[COND VER]` capability token grammar used by `requires`,
//! `provides`, `conflicts` and `obsoletes` lists.
//!
//! Grounded on `original_source/mdvpkg/urpmi/media.py`'s capability-list
//! parsing (`_cap_re`), which accepts a bare name or a name followed by
//! a bracketed relational condition and version.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A relational operator inside a bracketed capability condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapabilityCondition {
    /// `=`
    Eq,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CapabilityCondition {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "=" | "==" => Some(Self::Eq),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            _ => None,
        }
    }
}

impl fmt::Display for CapabilityCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Eq => "=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        };
        f.write_str(symbol)
    }
}

/// A single dependency token: a capability name, optionally qualified
/// by a relational version condition.
///
/// Parses the `NAME[COND VER]` grammar: a bare name (`libc.so.6`), or a
/// name followed by a bracketed condition and version
/// (`bash[>= 5.0]`). Malformed bracket contents are dropped silently —
/// the token degrades to a bare name, matching the source parser's
/// permissive handling of hand-edited synthesis files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    /// The capability name, e.g. `bash` or `libc.so.6(GLIBC_2.2.5)`.
    pub name: String,
    /// The relational condition, if the token carried one.
    pub condition: Option<CapabilityCondition>,
    /// The version the condition applies to, if the token carried one.
    pub version: Option<String>,
}

impl Capability {
    /// A bare capability with no version condition.
    #[must_use]
    pub fn unversioned(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            condition: None,
            version: None,
        }
    }
}

impl FromStr for Capability {
    type Err = std::convert::Infallible;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let token = token.trim();
        let Some(bracket_start) = token.find('[') else {
            return Ok(Self::unversioned(token));
        };
        let Some(bracket_end) = token[bracket_start..].find(']') else {
            return Ok(Self::unversioned(token));
        };
        let name = token[..bracket_start].trim();
        let inner = token[bracket_start + 1..bracket_start + bracket_end].trim();

        let mut parts = inner.splitn(2, char::is_whitespace);
        let (Some(cond_token), Some(version_token)) = (parts.next(), parts.next()) else {
            return Ok(Self::unversioned(name));
        };
        let Some(condition) = CapabilityCondition::parse(cond_token) else {
            return Ok(Self::unversioned(name));
        };
        let version = version_token.trim();
        if version.is_empty() {
            return Ok(Self::unversioned(name));
        }

        Ok(Self {
            name: name.to_string(),
            condition: Some(condition),
            version: Some(version.to_string()),
        })
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.condition, &self.version) {
            (Some(condition), Some(version)) => {
                write!(f, "{}[{condition} {version}]", self.name)
            }
            _ => f.write_str(&self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn bare_name() {
        let cap: Capability = "bash".parse().unwrap();
        assert_eq!(cap, Capability::unversioned("bash"));
    }

    #[test]
    fn versioned_condition() {
        let cap: Capability = "bash[>= 5.0]".parse().unwrap();
        assert_eq!(cap.name, "bash");
        assert_eq!(cap.condition, Some(CapabilityCondition::Ge));
        assert_eq!(cap.version.as_deref(), Some("5.0"));
    }

    #[test]
    fn equality_condition() {
        let cap: Capability = "libfoo[= 1.2.3]".parse().unwrap();
        assert_eq!(cap.condition, Some(CapabilityCondition::Eq));
    }

    #[test]
    fn malformed_bracket_degrades_to_bare_name() {
        let cap: Capability = "bash[garbage]".parse().unwrap();
        assert_eq!(cap, Capability::unversioned("bash"));

        let cap: Capability = "bash[".parse().unwrap();
        assert_eq!(cap, Capability::unversioned("bash["));
    }

    #[test]
    fn display_round_trips_versioned() {
        let cap: Capability = "bash[>= 5.0]".parse().unwrap();
        assert_eq!(cap.to_string(), "bash[>= 5.0]");
    }

    #[test]
    fn display_round_trips_bare() {
        let cap: Capability = "libc.so.6(GLIBC_2.2.5)".parse().unwrap();
        assert_eq!(cap.to_string(), "libc.so.6(GLIBC_2.2.5)");
    }
}
