//! `Task`: the unit of work run by [`crate::runner::TaskRunner`], and the
//! five task bodies named in spec §4.5 (`list-medias`, `list-groups`,
//! `list-packages`, `install-packages`, `commit`).
//!
//! Grounded on `original_source/mdvpkg/tasks.py`'s `TaskBase` subclasses
//! (`ListMediasTask`, `ListGroupsTask`, `ListPackagesTask`,
//! `InstallPackagesTask`): each subclass there is a coroutine `run()`
//! that `yield`s once per unit of work, checked against
//! `self.canceled` by the runner between resumes. Here that becomes an
//! `async fn run` that checks a [`CancelFlag`] between suspension
//! points, per SPEC_FULL.md §5.5's "cooperative run loop as polled
//! streams with explicit suspension points".

use crate::backend::BackendChannel;
use crate::state::{ExitStatus, TaskState};
use async_trait::async_trait;
use mdvpkg_core::{Error, Result, RpmVersion};
use mdvpkg_index::PackageIndex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// A cooperative cancellation flag, consulted at each suspension point
/// (spec §5 "Cancellation: cooperative").
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Events a running Task emits toward its owning session. The service
/// layer translates these into the concrete D-Bus signals of spec §6.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    StateChanged(TaskState),
    Finished(ExitStatus),
    Error { code: String, message: String },
    Media { name: String, update: bool, ignore: bool },
    Group { name: String, count: u32 },
    /// One package row, pre-filtered by the body (list-packages task).
    Package { index: u32, name: String, arch: String, status: &'static str },
    PreparingStart { total: u32 },
    Preparing { amount: u32, total: u32 },
    PreparingDone,
    DownloadStart { name: String, arch: String },
    DownloadProgress { name: String, arch: String, fraction: f64 },
    DownloadDone { name: String, arch: String },
    InstallStart { name: String, arch: String },
    InstallProgress { name: String, arch: String, fraction: f64 },
    InstallDone { name: String, arch: String },
    RemoveStart { name: String, arch: String },
    RemoveProgress { name: String, arch: String, fraction: f64 },
    RemoveDone { name: String, arch: String },
}

/// Everything a running task body needs.
pub struct TaskContext<'a> {
    pub index: &'a PackageIndex,
    pub backend: &'a mut BackendChannel,
    pub events: &'a UnboundedSender<TaskEvent>,
    pub cancel: &'a CancelFlag,
}

impl TaskContext<'_> {
    fn emit(&self, event: TaskEvent) {
        // The receiver may already be gone (session disconnected); a
        // task body must not fail just because nobody is listening.
        let _ = self.events.send(event);
    }
}

/// One of the five task bodies named in spec §4.5.
#[async_trait]
pub trait TaskBody: Send {
    /// The granular `TaskState` reported while this body runs.
    fn running_state(&self) -> TaskState;

    /// Run to completion (or until `ctx.cancel` is observed), emitting
    /// `TaskEvent`s as it goes.
    ///
    /// # Errors
    /// Any `Err` is reported as `error-task-exception` and the task
    /// transitions to `failed`; cooperative cancellation is signalled
    /// via `ctx.cancel`, not via a body-level `Err`.
    async fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<()>;
}

/// `list-medias`: enumerate every configured Media.
#[derive(Debug, Default)]
pub struct ListMediasBody;

#[async_trait]
impl TaskBody for ListMediasBody {
    fn running_state(&self) -> TaskState {
        TaskState::Listing
    }

    async fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<()> {
        for medium in ctx.index.media() {
            if ctx.cancel.is_cancelled() {
                return Ok(());
            }
            ctx.emit(TaskEvent::Media {
                name: medium.name,
                update: medium.update,
                ignore: medium.ignore,
            });
            tokio::task::yield_now().await;
        }
        Ok(())
    }
}

/// `list-groups`: enumerate the distinct RPM groups and their package
/// counts.
///
/// With `scope` set, only the named `(name, arch)` keys are counted —
/// backs `PackageList::get_groups`, which groups the session's current
/// filtered view rather than the whole index (`GetAllGroups` passes
/// `scope: None`).
#[derive(Debug, Default)]
pub struct ListGroupsBody {
    pub scope: Option<Vec<(String, String)>>,
}

#[async_trait]
impl TaskBody for ListGroupsBody {
    fn running_state(&self) -> TaskState {
        TaskState::Listing
    }

    async fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<()> {
        let mut counts: BTreeMap<String, u32> = BTreeMap::new();
        match &self.scope {
            Some(keys) => {
                for (name, arch) in keys {
                    if let Ok(pkg) = ctx.index.get(name, arch) {
                        if let Some(artifact) = pkg.latest() {
                            *counts.entry(artifact.group.clone()).or_insert(0) += 1;
                        }
                    }
                }
            }
            None => {
                for pkg in ctx.index.iter() {
                    if let Some(artifact) = pkg.latest() {
                        *counts.entry(artifact.group.clone()).or_insert(0) += 1;
                    }
                }
            }
        }
        for (group, count) in counts {
            if ctx.cancel.is_cancelled() {
                return Ok(());
            }
            ctx.emit(TaskEvent::Group { name: group, count });
            tokio::task::yield_now().await;
        }
        Ok(())
    }
}

/// `list-packages`: enumerate every package with at least one relevant
/// version (installed or upgrade candidate), per the filter-and-select
/// logic of `ListPackagesTask.run` in the original.
#[derive(Debug, Default)]
pub struct ListPackagesBody;

#[async_trait]
impl TaskBody for ListPackagesBody {
    fn running_state(&self) -> TaskState {
        TaskState::Listing
    }

    async fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<()> {
        let mut index = 0u32;
        for pkg in ctx.index.iter() {
            if ctx.cancel.is_cancelled() {
                return Ok(());
            }
            if pkg.has_installs() || pkg.has_upgrades() {
                let status = match pkg.status() {
                    mdvpkg_index::Status::New => "new",
                    mdvpkg_index::Status::Upgrade => "upgrade",
                    mdvpkg_index::Status::Installed => "installed",
                    mdvpkg_index::Status::Installing => "installing",
                    mdvpkg_index::Status::Removing => "removing",
                };
                ctx.emit(TaskEvent::Package {
                    index,
                    name: pkg.name().to_string(),
                    arch: pkg.arch().to_string(),
                    status,
                });
                index += 1;
            }
            tokio::task::yield_now().await;
        }
        Ok(())
    }
}

/// `install-packages`: drive the backend through a single
/// `install_packages` request, dispatching each `SIGNAL` to the
/// `PackageIndex`'s mutation hooks as it arrives.
#[derive(Debug)]
pub struct InstallPackagesBody {
    pub names: Vec<String>,
}

#[async_trait]
impl TaskBody for InstallPackagesBody {
    fn running_state(&self) -> TaskState {
        TaskState::Installing
    }

    async fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<()> {
        ctx.backend.send_task("install_packages", &self.names).await?;
        drive_backend_until_done(ctx).await
    }
}

/// `commit`: drive the backend through a resolved install/remove plan.
#[derive(Debug)]
pub struct CommitBody {
    pub installs: Vec<String>,
    pub removes: Vec<String>,
}

#[async_trait]
impl TaskBody for CommitBody {
    fn running_state(&self) -> TaskState {
        TaskState::Installing
    }

    async fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<()> {
        let mut args = self.installs.clone();
        args.extend(self.removes.iter().map(|r| format!("r:{r}")));
        ctx.backend.send_task("commit", &args).await?;
        drive_backend_until_done(ctx).await
    }
}

async fn drive_backend_until_done(ctx: &mut TaskContext<'_>) -> Result<()> {
    use crate::backend::BackendResponse;

    loop {
        if ctx.cancel.is_cancelled() {
            // No mid-line preemption (spec §5): the in-flight request is
            // left to finish; the next suspension point is the next
            // response line.
        }
        let Some(response) = ctx.backend.next_response().await? else {
            return Err(Error::BackendError {
                message: "backend closed its pipe before a terminal response".to_string(),
            });
        };
        match response {
            BackendResponse::Signal { name, args } => {
                dispatch_signal(ctx, &name, &args)?;
                if ctx.cancel.is_cancelled() {
                    return Ok(());
                }
            }
            BackendResponse::Done => return Ok(()),
            BackendResponse::Error { code, message } => {
                ctx.emit(TaskEvent::Error { code, message });
                return Ok(());
            }
            BackendResponse::Exception { message } => {
                return Err(Error::BackendError { message });
            }
        }
    }
}

/// Dispatch one backend `SIGNAL` to the corresponding `PackageIndex`
/// mutation hook, per spec §4.6 ("the named signal is dispatched to the
/// current task's mutation hook on the PackageIndex").
fn dispatch_signal(ctx: &mut TaskContext<'_>, name: &str, args: &[String]) -> Result<()> {
    let malformed = || Error::BackendError {
        message: format!("SIGNAL {name} missing required arguments"),
    };
    let pkg_name = args.first().ok_or_else(malformed)?;
    let arch = args.get(1).ok_or_else(malformed)?;

    match name {
        "download_start" | "install_start" | "remove_start" => {
            let version = parse_version_token(args.get(2).ok_or_else(malformed)?)?;
            match name {
                "download_start" => {
                    ctx.index.download_start(pkg_name, arch, &version)?;
                    ctx.emit(TaskEvent::DownloadStart { name: pkg_name.clone(), arch: arch.clone() });
                }
                "install_start" => {
                    ctx.index.install_start(pkg_name, arch, &version)?;
                    ctx.emit(TaskEvent::InstallStart { name: pkg_name.clone(), arch: arch.clone() });
                }
                _ => {
                    ctx.index.remove_start(pkg_name, arch, &version)?;
                    ctx.emit(TaskEvent::RemoveStart { name: pkg_name.clone(), arch: arch.clone() });
                }
            }
            Ok(())
        }
        "download_progress" | "install_progress" | "remove_progress" => {
            let version = parse_version_token(args.get(2).ok_or_else(malformed)?)?;
            let fraction: f64 = args.get(3).ok_or_else(malformed)?.parse().map_err(|_| malformed())?;
            match name {
                "download_progress" => {
                    ctx.index.download_progress(pkg_name, arch, &version, fraction)?;
                    ctx.emit(TaskEvent::DownloadProgress { name: pkg_name.clone(), arch: arch.clone(), fraction });
                }
                "install_progress" => {
                    ctx.index.install_progress(pkg_name, arch, &version, fraction)?;
                    ctx.emit(TaskEvent::InstallProgress { name: pkg_name.clone(), arch: arch.clone(), fraction });
                }
                _ => {
                    ctx.index.remove_progress(pkg_name, arch, &version, fraction)?;
                    ctx.emit(TaskEvent::RemoveProgress { name: pkg_name.clone(), arch: arch.clone(), fraction });
                }
            }
            Ok(())
        }
        "download_done" | "install_done" | "remove_done" => {
            let version = parse_version_token(args.get(2).ok_or_else(malformed)?)?;
            match name {
                "download_done" => {
                    ctx.index.download_done(pkg_name, arch, &version)?;
                    ctx.emit(TaskEvent::DownloadDone { name: pkg_name.clone(), arch: arch.clone() });
                }
                "install_done" => {
                    ctx.index.install_done(pkg_name, arch, &version)?;
                    ctx.emit(TaskEvent::InstallDone { name: pkg_name.clone(), arch: arch.clone() });
                }
                _ => {
                    ctx.index.remove_done(pkg_name, arch, &version)?;
                    ctx.emit(TaskEvent::RemoveDone { name: pkg_name.clone(), arch: arch.clone() });
                }
            }
            Ok(())
        }
        _ => Err(Error::BackendError {
            message: format!("unrecognized backend signal: {name}"),
        }),
    }
}

/// Parse an `epoch:version-release[:distepoch]` version token, the
/// inverse of `RpmVersion`'s `Display` impl, used on the backend wire
/// protocol for SIGNAL arguments.
fn parse_version_token(token: &str) -> Result<RpmVersion> {
    let malformed = || Error::BackendError {
        message: format!("malformed version token: {token}"),
    };
    let mut parts = token.splitn(2, ':');
    let epoch: u32 = parts.next().ok_or_else(malformed)?.parse().map_err(|_| malformed())?;
    let rest = parts.next().ok_or_else(malformed)?;
    let mut rest_parts = rest.splitn(2, ':');
    let version_release = rest_parts.next().ok_or_else(malformed)?;
    let distepoch = rest_parts.next().map(str::to_string);
    let (version, release) = version_release.rsplit_once('-').ok_or_else(malformed)?;
    Ok(RpmVersion::new(epoch, version, release, distepoch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn cancel_flag_defaults_to_false() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());
        flag.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn parses_version_token_without_distepoch() {
        let version = parse_version_token("0:1.1-1").unwrap();
        assert_eq!(version, RpmVersion::new(0, "1.1", "1", None));
    }

    #[test]
    fn parses_version_token_with_distepoch() {
        let version = parse_version_token("0:1.1-1mdv:2").unwrap();
        assert_eq!(version, RpmVersion::new(0, "1.1", "1mdv", Some("2".to_string())));
    }

    #[test]
    fn malformed_version_token_is_an_error() {
        assert!(parse_version_token("not-a-version").is_err());
    }
}
