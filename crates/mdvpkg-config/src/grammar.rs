//! The URPMI configuration block grammar.
//!
//! `NAME [URL] { KEY[:VALUE]? … }`, one anonymous `{ … }` block at the top
//! level for global settings, and any number of named media blocks. See
//! spec §6 "Configuration file format" for the full grammar description;
//! this module is a hand-written recursive-descent parser over it, in the
//! error-reporting style of the teacher's `ConfigError` (offending
//! path/line carried on every variant).

use mdvpkg_core::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Boolean, presence-only flags.
const BOOLEAN_FLAGS: &[&str] = &[
    "update",
    "ignore",
    "synthesis",
    "noreconfigure",
    "no-suggests",
    "no-media-info",
    "static",
    "virtual",
    "disable-certificate-check",
];

/// Flags with an implicit default, a bare/`:yes`/`:on`/`:1` true form, and
/// a `no-`-prefixed false form.
const THREE_STATE_FLAGS: &[&str] = &[
    "verify-rpm",
    "norebuild",
    "fuzzy",
    "allow-force",
    "pre-clean",
    "post-clean",
    "compress",
    "keep",
    "auto",
];

/// The resolved value of a three-state flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreeState {
    /// Never mentioned in the block.
    #[default]
    Unset,
    /// Mentioned bare, or with a truthy value.
    True,
    /// Mentioned with the `no-` prefix, or a non-truthy value.
    False,
}

impl ThreeState {
    /// Treat `Unset` as `false`, the conventional default for these flags.
    #[must_use]
    pub fn unwrap_or_false(self) -> bool {
        matches!(self, Self::True)
    }
}

/// The parsed body of a block: recognized flags, three-state flags, and
/// free-form `key:value` settings.
#[derive(Debug, Clone, Default)]
pub struct ConfigBlock {
    flags: BTreeSet<String>,
    three_state: BTreeMap<String, ThreeState>,
    settings: BTreeMap<String, String>,
}

impl ConfigBlock {
    /// Whether a boolean flag was present in the block.
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        self.flags.contains(name)
    }

    /// The resolved state of a three-state flag.
    #[must_use]
    pub fn three_state(&self, name: &str) -> ThreeState {
        self.three_state.get(name).copied().unwrap_or_default()
    }

    /// A `key:value` setting, if present.
    #[must_use]
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }

    /// All `key:value` settings.
    #[must_use]
    pub fn settings(&self) -> &BTreeMap<String, String> {
        &self.settings
    }
}

/// One named media block: `NAME [URL] { … }`.
#[derive(Debug, Clone)]
pub struct MediaEntry {
    /// Media name; unique within a configuration file.
    pub name: String,
    /// Optional source URL or path.
    pub url: Option<String>,
    /// The block's flags and settings.
    pub block: ConfigBlock,
}

impl MediaEntry {
    /// `ignore` boolean flag.
    #[must_use]
    pub fn ignore(&self) -> bool {
        self.block.flag("ignore")
    }

    /// `update` boolean flag.
    #[must_use]
    pub fn update(&self) -> bool {
        self.block.flag("update")
    }
}

/// A fully parsed URPMI configuration file: the anonymous global block
/// plus every named media block, in file order.
#[derive(Debug, Clone, Default)]
pub struct UrpmiConfig {
    /// The single top-level anonymous block, if the file had one.
    pub global: ConfigBlock,
    /// Media blocks, in the order they appeared in the file.
    pub media: Vec<MediaEntry>,
}

/// Values used to expand `$HOST`, `$ARCH`, `$RELEASE` tokens before
/// tokenizing each line.
#[derive(Debug, Clone)]
pub struct HostVars {
    /// Expansion for `$HOST`.
    pub host: String,
    /// Expansion for `$ARCH`.
    pub arch: String,
    /// Expansion for `$RELEASE`, read from `/etc/release`.
    pub release: String,
}

impl HostVars {
    /// Read host/arch/release from the running system, the way the
    /// original reads `uname()` and `/etc/release`.
    #[must_use]
    pub fn from_system() -> Self {
        let host = std::fs::read_to_string("/proc/sys/kernel/hostname")
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        let release = std::fs::read_to_string("/etc/release")
            .ok()
            .and_then(|s| s.lines().next().map(str::trim).map(str::to_string))
            .unwrap_or_default();
        Self {
            host,
            arch: std::env::consts::ARCH.to_string(),
            release,
        }
    }

    fn expand(&self, line: &str) -> String {
        line.replace("$HOST", &self.host)
            .replace("$ARCH", &self.arch)
            .replace("$RELEASE", &self.release)
    }
}

/// Parse a configuration file's contents.
///
/// # Errors
/// Returns [`Error::ConfigInvalid`] on any grammar violation: an unknown
/// token, a duplicate media name, or more than one anonymous block.
pub fn parse(path: &Path, contents: &str, vars: &HostVars) -> Result<UrpmiConfig> {
    let expanded: String = contents
        .lines()
        .map(|line| vars.expand(line))
        .collect::<Vec<_>>()
        .join("\n");
    let tokens = tokenize(path, &expanded)?;
    parse_tokens(path, &tokens)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    BraceOpen,
    BraceClose,
}

fn tokenize(path: &Path, text: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    for (line_no, raw_line) in text.lines().enumerate() {
        let line = match raw_line.find('#') {
            Some(idx) => &raw_line[..idx],
            None => raw_line,
        };
        let bytes = line.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            let c = bytes[i] as char;
            if c.is_whitespace() {
                i += 1;
                continue;
            }
            if c == '{' {
                tokens.push(Token::BraceOpen);
                i += 1;
                continue;
            }
            if c == '}' {
                tokens.push(Token::BraceClose);
                i += 1;
                continue;
            }
            if c == '"' {
                let start = i + 1;
                let Some(rel_end) = line[start..].find('"') else {
                    return Err(invalid(
                        path,
                        line_no,
                        "unterminated quoted string".to_string(),
                    ));
                };
                let end = start + rel_end;
                tokens.push(Token::Word(line[start..end].to_string()));
                i = end + 1;
                continue;
            }
            let start = i;
            while i < bytes.len() && !(bytes[i] as char).is_whitespace() && bytes[i] != b'{' && bytes[i] != b'}'
            {
                i += 1;
            }
            tokens.push(Token::Word(line[start..i].to_string()));
        }
    }
    Ok(tokens)
}

fn invalid(path: &Path, line_no: usize, message: String) -> Error {
    Error::ConfigInvalid {
        path: path.to_path_buf(),
        message: format!("line {}: {message}", line_no + 1),
    }
}

fn parse_tokens(path: &Path, tokens: &[Token]) -> Result<UrpmiConfig> {
    let mut config = UrpmiConfig::default();
    let mut seen_global = false;
    let mut seen_names: BTreeSet<String> = BTreeSet::new();
    let mut i = 0;

    while i < tokens.len() {
        let mut header = Vec::new();
        while i < tokens.len() && tokens[i] != Token::BraceOpen {
            match &tokens[i] {
                Token::Word(w) => header.push(w.clone()),
                Token::BraceClose => {
                    return Err(Error::ConfigInvalid {
                        path: path.to_path_buf(),
                        message: "unexpected '}' with no matching block".to_string(),
                    });
                }
                Token::BraceOpen => unreachable!(),
            }
            i += 1;
        }
        if i >= tokens.len() {
            if header.is_empty() {
                break;
            }
            return Err(Error::ConfigInvalid {
                path: path.to_path_buf(),
                message: format!("block header {header:?} not followed by '{{'"),
            });
        }
        // tokens[i] is BraceOpen
        i += 1;
        let body_start = i;
        let mut depth = 1;
        while i < tokens.len() && depth > 0 {
            match tokens[i] {
                Token::BraceOpen => depth += 1,
                Token::BraceClose => depth -= 1,
                Token::Word(_) => {}
            }
            i += 1;
        }
        if depth != 0 {
            return Err(Error::ConfigInvalid {
                path: path.to_path_buf(),
                message: "unterminated block".to_string(),
            });
        }
        let body = &tokens[body_start..i - 1];
        let block = parse_block(path, body)?;

        match header.len() {
            0 => {
                if seen_global {
                    return Err(Error::ConfigInvalid {
                        path: path.to_path_buf(),
                        message: "more than one anonymous global block".to_string(),
                    });
                }
                seen_global = true;
                config.global = block;
            }
            1 | 2 => {
                let name = header[0].clone();
                if !seen_names.insert(name.clone()) {
                    return Err(Error::ConfigInvalid {
                        path: path.to_path_buf(),
                        message: format!("duplicate media name {name:?}"),
                    });
                }
                config.media.push(MediaEntry {
                    name,
                    url: header.get(1).cloned(),
                    block,
                });
            }
            _ => {
                return Err(Error::ConfigInvalid {
                    path: path.to_path_buf(),
                    message: format!("block header {header:?} has too many tokens"),
                });
            }
        }
    }

    Ok(config)
}

fn parse_block(path: &Path, body: &[Token]) -> Result<ConfigBlock> {
    let mut block = ConfigBlock::default();
    let mut i = 0;
    while i < body.len() {
        let Token::Word(word) = &body[i] else {
            return Err(Error::ConfigInvalid {
                path: path.to_path_buf(),
                message: "unexpected '{' inside block body".to_string(),
            });
        };

        if let Some((key, value)) = word.split_once(':') {
            let value = if value.is_empty() {
                // `key-ids: "…"` form: value is the next (quoted) token.
                i += 1;
                let Some(Token::Word(next)) = body.get(i) else {
                    return Err(Error::ConfigInvalid {
                        path: path.to_path_buf(),
                        message: format!("setting {key:?} has no value"),
                    });
                };
                next.clone()
            } else {
                value.to_string()
            };
            apply_keyed_token(&mut block, key, &value);
        } else if let Some(bare) = word.strip_prefix("no-").filter(|b| THREE_STATE_FLAGS.contains(b)) {
            block.three_state.insert(bare.to_string(), ThreeState::False);
        } else if BOOLEAN_FLAGS.contains(&word.as_str()) {
            block.flags.insert(word.clone());
        } else if THREE_STATE_FLAGS.contains(&word.as_str()) {
            block.three_state.insert(word.clone(), ThreeState::True);
        } else {
            return Err(Error::ConfigInvalid {
                path: path.to_path_buf(),
                message: format!("unrecognized token {word:?}"),
            });
        }
        i += 1;
    }
    Ok(block)
}

fn apply_keyed_token(block: &mut ConfigBlock, key: &str, value: &str) {
    if THREE_STATE_FLAGS.contains(&key) {
        let truthy = matches!(value.to_ascii_lowercase().as_str(), "yes" | "on" | "1");
        block.three_state.insert(
            key.to_string(),
            if truthy { ThreeState::True } else { ThreeState::False },
        );
    } else {
        block.settings.insert(key.to_string(), value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn vars() -> HostVars {
        HostVars {
            host: "box".to_string(),
            arch: "x86_64".to_string(),
            release: "1".to_string(),
        }
    }

    #[test]
    fn parses_global_and_named_media() {
        let text = r#"
            {
                verify-rpm
            }

            main http://example.org/main {
                update
                hdlist: hdlist.cz
                priority-upgrade: 1
            }

            extras {
                ignore
                no-verify-rpm
            }
        "#;
        let config = parse(&PathBuf::from("/etc/urpmi/urpmi.cfg"), text, &vars()).unwrap();
        assert_eq!(config.global.three_state("verify-rpm"), ThreeState::True);
        assert_eq!(config.media.len(), 2);

        let main = &config.media[0];
        assert_eq!(main.name, "main");
        assert_eq!(main.url.as_deref(), Some("http://example.org/main"));
        assert!(main.update());
        assert_eq!(main.block.setting("hdlist"), Some("hdlist.cz"));
        assert_eq!(main.block.setting("priority-upgrade"), Some("1"));

        let extras = &config.media[1];
        assert!(extras.ignore());
        assert_eq!(extras.block.three_state("verify-rpm"), ThreeState::False);
    }

    #[test]
    fn duplicate_media_name_is_an_error() {
        let text = "main { update }\nmain { ignore }\n";
        let err = parse(&PathBuf::from("/x"), text, &vars()).unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid { .. }));
    }

    #[test]
    fn unknown_token_is_a_syntax_error() {
        let text = "main { bogus-flag }\n";
        let err = parse(&PathBuf::from("/x"), text, &vars()).unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid { .. }));
    }

    #[test]
    fn second_anonymous_block_is_an_error() {
        let text = "{ update }\n{ ignore }\n";
        let err = parse(&PathBuf::from("/x"), text, &vars()).unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid { .. }));
    }

    #[test]
    fn quoted_key_ids_value() {
        let text = r#"main { key-ids: "123 456" }"#;
        let config = parse(&PathBuf::from("/x"), text, &vars()).unwrap();
        assert_eq!(config.media[0].block.setting("key-ids"), Some("123 456"));
    }

    #[test]
    fn host_arch_release_expansion() {
        let text = "repo-$ARCH http://mirror/$HOST/$RELEASE { update }\n";
        let config = parse(&PathBuf::from("/x"), text, &vars()).unwrap();
        assert_eq!(config.media[0].name, "repo-x86_64");
        assert_eq!(config.media[0].url.as_deref(), Some("http://mirror/box/1"));
    }
}
