//! `mdvpkgd` — the daemon binary: parses its environment, builds the
//! [`PackageIndex`]/[`TaskRunner`] pair, serves the D-Bus object surface
//! named in spec §6, and drives config-file reload until `Quit()`.
//!
//! Grounded on `libretto-cli/src/main.rs`'s bring-up shape (parse →
//! `tracing-subscriber` init → build context → run) and
//! `original_source/mdvpkg/daemon.py`'s `main()` (config load, media
//! signal emission, `gobject.MainLoop().run()`), re-expressed as a
//! `tokio` main serving one `zbus::Connection` until a `Quit()` call
//! or `SIGTERM`/`SIGINT`.

#![warn(clippy::all)]

use clap::Parser;
use mdvpkg_config::{ConfigWatcher, EnvConfig, ReloadOutcome};
use mdvpkg_index::{EmptyInstalledSource, PackageIndex};
use mdvpkg_service::Root;
use mdvpkg_task::TaskRunner;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use zbus::object_server::SignalEmitter;

/// Bring-up flags. The daemon is otherwise driven by `MDVPKG_`-prefixed
/// environment variables (`EnvConfig`); CLI argument parsing beyond
/// these few overrides is an explicit Non-goal of the core (spec §1),
/// so this stays deliberately thin.
#[derive(Debug, Parser)]
#[command(name = "mdvpkgd", about = "mdvpkg package-management daemon")]
struct Cli {
    /// Path to the URPMI configuration file, overriding
    /// `MDVPKG_CONFIG_PATH`.
    #[arg(long, env = "MDVPKG_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// `tracing-subscriber` filter directive, overriding `MDVPKG_LOG`.
    #[arg(long)]
    log: Option<String>,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let mut env = EnvConfig::from_env();
    if let Some(config) = cli.config {
        env.config_path = config;
    }
    if let Some(log) = cli.log {
        env.log_filter = log;
    }

    let filter = EnvFilter::try_new(&env.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    match run(env).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "daemon exited with a fatal error");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(env: EnvConfig) -> anyhow::Result<()> {
    // Config errors on startup are fatal (spec §7's propagation policy);
    // the real rpmdb reader is out of scope (spec §1) so an empty
    // `InstalledSource` stands in for it.
    let index = Arc::new(PackageIndex::new(
        Box::new(EmptyInstalledSource),
        env.media_data_dir.clone(),
        env.resolver_path.clone(),
    ));
    index.configure(&env.config_path)?;
    index.load()?;
    tracing::info!(config = %env.config_path.display(), media = index.media().len(), "package index built");

    let runner = Arc::new(TaskRunner::new(index.clone(), env.backend_path.clone()));
    let shutdown = Arc::new(tokio::sync::Notify::new());

    let root = Root::new(index.clone(), runner.clone(), shutdown.clone());
    let connection = zbus::connection::Builder::system()?
        .name(env.bus_name.as_str())?
        .serve_at("/", root)?
        .build()
        .await?;
    tracing::info!(bus_name = %env.bus_name, "service registered on the bus");

    emit_media_signals(&connection, &index).await;

    let reload_task = tokio::spawn(watch_config(index.clone(), env.config_path.clone(), connection.clone()));

    tokio::select! {
        () = shutdown.notified() => {
            tracing::info!("Quit() received, shutting down");
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                tracing::warn!(error = %err, "failed to install ctrl-c handler");
            }
            tracing::info!("signal received, shutting down");
        }
    }

    reload_task.abort();
    Ok(())
}

/// The config-reload loop (spec §4.1): a filesystem watch on the
/// configuration directory that re-configures and re-loads on modify,
/// or clears the media set on delete/move. Runs for the lifetime of
/// the daemon; errors here never kill the process (spec §7 "config
/// errors on reload ... keep the service up").
async fn watch_config(index: Arc<PackageIndex>, config_path: PathBuf, connection: zbus::Connection) {
    let mut watcher = match ConfigWatcher::open(&config_path) {
        Ok((watcher, _initial)) => watcher,
        Err(err) => {
            tracing::error!(error = %err, "could not establish configuration watch");
            return;
        }
    };

    loop {
        match watcher.next_reload().await {
            Some(Ok(ReloadOutcome::Reconfigured(_))) => {
                if let Err(err) = index.configure(&config_path) {
                    tracing::error!(error = %err, "configuration reload failed, keeping prior media set");
                    continue;
                }
                if let Err(err) = index.load() {
                    tracing::error!(error = %err, "index rebuild after reload failed");
                    continue;
                }
                tracing::info!(media = index.media().len(), "configuration reloaded");
                emit_media_signals(&connection, &index).await;
            }
            Some(Ok(ReloadOutcome::Cleared)) => {
                tracing::warn!("configuration file removed, clearing media set");
                index.clear_media();
                if let Err(err) = index.load() {
                    tracing::error!(error = %err, "index rebuild after config removal failed");
                }
            }
            Some(Err(err)) => {
                tracing::error!(error = %err, "configuration reload failed, keeping prior media set");
            }
            None => {
                tracing::warn!("configuration watch ended");
                break;
            }
        }
    }
}

/// Fire one `Media(name, update, ignore)` signal per configured medium
/// (spec §6), grounded on `original_source/mdvpkg/daemon.py`'s
/// per-media emission inside `configure_medias`.
async fn emit_media_signals(connection: &zbus::Connection, index: &PackageIndex) {
    let Ok(emitter) = SignalEmitter::new(connection, "/") else {
        tracing::warn!("could not build a signal emitter for the root object");
        return;
    };
    for medium in index.media() {
        if let Err(err) = Root::media(&emitter, medium.name.clone(), medium.update, medium.ignore).await {
            tracing::warn!(media = %medium.name, error = %err, "failed to emit Media signal");
        }
    }
}
