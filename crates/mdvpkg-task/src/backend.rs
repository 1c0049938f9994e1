//! `BackendChannel`: the long-lived urpmi backend child process (spec
//! §4.6).
//!
//! Grounded on `original_source/mdvpkg/worker.py`'s `Backend` class:
//! lazy `start()`, `<verb>\targ1\t...\n` request framing, a single
//! holder at a time, `SIGTERM` + wait on `kill()`. Ported onto
//! `tokio::process::Child` + `BufReader`/line-framed I/O, the same idiom
//! `mdvpkg-index::resolver` uses for the (short-lived) resolver process.

use mdvpkg_core::{Error, Result};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout};

/// One parsed `%MDVPKG\t<tag>\t...` response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendResponse {
    /// A named signal with its tab-separated arguments, to be dispatched
    /// to the current task's mutation hook on the `PackageIndex`.
    Signal { name: String, args: Vec<String> },
    /// `(code, message)` error payload. The current task's monitor
    /// receives this as an error tuple; the channel remains usable.
    Error { code: String, message: String },
    /// Free-form exception message; surfaces as a task exception.
    Exception { message: String },
    /// The current task is complete; the channel is free again.
    Done,
}

/// Owns one urpmi backend child process.
pub struct BackendChannel {
    path: PathBuf,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    lines: Option<Lines<BufReader<ChildStdout>>>,
    busy: bool,
}

impl std::fmt::Debug for BackendChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendChannel")
            .field("path", &self.path)
            .field("running", &self.child.is_some())
            .field("busy", &self.busy)
            .finish()
    }
}

impl BackendChannel {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            child: None,
            stdin: None,
            lines: None,
            busy: false,
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    /// Exactly one task may hold the channel between `send_task` and the
    /// matching `Done`/`Error`/`Exception` response.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    async fn start(&mut self) -> Result<()> {
        let mut child = tokio::process::Command::new(&self.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| Error::BackendError {
                message: format!("failed to spawn backend {}: {err}", self.path.display()),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| Error::BackendError {
            message: "backend process has no stdin".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| Error::BackendError {
            message: "backend process has no stdout".to_string(),
        })?;

        self.lines = Some(BufReader::new(stdout).lines());
        self.stdin = Some(stdin);
        self.child = Some(child);
        Ok(())
    }

    /// Send SIGTERM and wait for the child to exit, per spec §4.6.
    pub async fn kill(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        self.stdin = None;
        self.lines = None;
        self.busy = false;
        if let Some(id) = child.id() {
            // SAFETY: `id` is a live child PID owned by `child`; sending
            // SIGTERM to it is the documented graceful-shutdown request.
            #[allow(unsafe_code)]
            unsafe {
                libc::kill(id as libc::pid_t, libc::SIGTERM);
            }
        }
        child.wait().await.map_err(|err| Error::BackendError {
            message: format!("waiting for backend process: {err}"),
        })?;
        Ok(())
    }

    /// Enqueue a request, starting the backend if it is not already
    /// running. Marks the channel busy until the matching terminal
    /// response arrives.
    ///
    /// # Errors
    /// [`Error::BackendError`] if already busy, or if spawning/writing
    /// fails.
    pub async fn send_task(&mut self, verb: &str, args: &[String]) -> Result<()> {
        if self.busy {
            return Err(Error::BackendError {
                message: "backend already running a task".to_string(),
            });
        }
        if !self.is_running() {
            self.start().await?;
        }
        let mut line = verb.to_string();
        for arg in args {
            line.push('\t');
            line.push_str(arg);
        }
        line.push('\n');

        let stdin = self.stdin.as_mut().ok_or_else(|| Error::BackendError {
            message: "backend process has no stdin".to_string(),
        })?;
        stdin.write_all(line.as_bytes()).await.map_err(|err| Error::BackendError {
            message: format!("writing backend request: {err}"),
        })?;
        self.busy = true;
        Ok(())
    }

    /// Read and parse the next response line. Returns `Ok(None)` on
    /// clean EOF (the child exited without a pipe error). A
    /// `Done`/`Error`/`Exception` response clears `busy`.
    ///
    /// # Errors
    /// [`Error::BackendError`] on a pipe read failure or an
    /// unrecognized response line.
    pub async fn next_response(&mut self) -> Result<Option<BackendResponse>> {
        let Some(lines) = self.lines.as_mut() else {
            return Ok(None);
        };
        let Some(raw) = lines.next_line().await.map_err(|err| Error::BackendError {
            message: format!("pipe error with backend: {err}"),
        })?
        else {
            self.busy = false;
            return Ok(None);
        };

        let response = parse_response_line(&raw)?;
        if let Some(response) = &response {
            if matches!(
                response,
                BackendResponse::Done | BackendResponse::Error { .. } | BackendResponse::Exception { .. }
            ) {
                self.busy = false;
            }
        }
        Ok(response)
    }
}

fn parse_response_line(raw: &str) -> Result<Option<BackendResponse>> {
    let fields: Vec<&str> = raw.split('\t').collect();
    if fields.first() != Some(&"%MDVPKG") {
        tracing::warn!(line = %raw, "unrecognized backend output line");
        return Ok(None);
    }
    match fields.get(1).copied() {
        Some("SIGNAL") => {
            let name = fields.get(2).ok_or_else(|| backend_malformed("SIGNAL missing name"))?;
            let args = fields[3.min(fields.len())..].iter().map(|s| (*s).to_string()).collect();
            Ok(Some(BackendResponse::Signal {
                name: (*name).to_string(),
                args,
            }))
        }
        Some("ERROR") => {
            let payload = fields.get(2).copied().unwrap_or("()");
            let (code, message) = parse_error_tuple(payload)?;
            Ok(Some(BackendResponse::Error { code, message }))
        }
        Some("EXCEPTION") => {
            let message = fields[2.min(fields.len())..].join("\t");
            Ok(Some(BackendResponse::Exception { message }))
        }
        Some("DONE") => Ok(Some(BackendResponse::Done)),
        _ => {
            tracing::warn!(line = %raw, "unrecognized backend tag");
            Ok(None)
        }
    }
}

fn backend_malformed(message: &str) -> Error {
    Error::BackendError {
        message: message.to_string(),
    }
}

/// Parse a `(code,message)` tuple literal.
fn parse_error_tuple(s: &str) -> Result<(String, String)> {
    let inner = s
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| backend_malformed("ERROR payload missing parens"))?;
    let mut parts = inner.splitn(2, ',');
    let code = parts.next().ok_or_else(|| backend_malformed("ERROR payload missing code"))?;
    let message = parts.next().unwrap_or("");
    Ok((code.trim().to_string(), message.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_signal_line() {
        let parsed = parse_response_line("%MDVPKG\tSIGNAL\tdownload_start\tlibfoo\tx86_64\t0:1.1-1").unwrap().unwrap();
        assert_eq!(
            parsed,
            BackendResponse::Signal {
                name: "download_start".to_string(),
                args: vec!["libfoo".to_string(), "x86_64".to_string(), "0:1.1-1".to_string()],
            }
        );
    }

    #[test]
    fn parses_error_line() {
        let parsed = parse_response_line("%MDVPKG\tERROR\t(error-download-failed,connection refused)").unwrap().unwrap();
        assert_eq!(
            parsed,
            BackendResponse::Error {
                code: "error-download-failed".to_string(),
                message: "connection refused".to_string(),
            }
        );
    }

    #[test]
    fn parses_done_line() {
        let parsed = parse_response_line("%MDVPKG\tDONE").unwrap().unwrap();
        assert_eq!(parsed, BackendResponse::Done);
    }

    #[test]
    fn non_mdvpkg_line_is_ignored() {
        assert_eq!(parse_response_line("some unrelated stderr-ish line").unwrap(), None);
    }

    #[test]
    fn new_channel_is_not_running() {
        let channel = BackendChannel::new("/usr/libexec/mdvpkg/backend");
        assert!(!channel.is_running());
        assert!(!channel.is_busy());
    }
}
