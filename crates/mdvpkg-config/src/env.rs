//! Process-level settings read from `MDVPKG_`-prefixed environment
//! variables, distinct from the URPMI configuration file itself.
//!
//! Grounded on `libretto-config::env`'s `EnvConfig::from_env` pattern: a
//! plain struct of `Option<T>`/defaulted fields populated by a single
//! `from_env` constructor, with no hidden global state.

use std::path::PathBuf;

/// Default path to the resolver executable.
const DEFAULT_RESOLVER_PATH: &str = "/usr/libexec/mdvpkg/resolver";
/// Default path to the install backend executable.
const DEFAULT_BACKEND_PATH: &str = "/usr/libexec/mdvpkg/backend";
/// Default D-Bus well-known name the service requests.
const DEFAULT_BUS_NAME: &str = "org.mandrivalinux.mdvpkg";
/// Default directory holding synthesis hdlist files, keyed by media name.
const DEFAULT_MEDIA_DATA_DIR: &str = "/var/lib/urpmi";

/// Daemon-wide settings sourced from the process environment.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Path to the external resolver executable (`MDVPKG_RESOLVER_PATH`).
    pub resolver_path: PathBuf,
    /// Path to the external install backend executable
    /// (`MDVPKG_BACKEND_PATH`).
    pub backend_path: PathBuf,
    /// Directory holding per-media synthesis data (`MDVPKG_MEDIA_DATA_DIR`).
    pub media_data_dir: PathBuf,
    /// D-Bus well-known name to request (`MDVPKG_BUS_NAME`).
    pub bus_name: String,
    /// Path to the URPMI configuration file (`MDVPKG_CONFIG_PATH`).
    pub config_path: PathBuf,
    /// `tracing-subscriber` `EnvFilter` directive (`MDVPKG_LOG`, default
    /// `info`).
    pub log_filter: String,
}

impl EnvConfig {
    /// Build settings from the process environment, defaulting any
    /// variable that is absent or fails to parse.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            resolver_path: path_var("MDVPKG_RESOLVER_PATH", DEFAULT_RESOLVER_PATH),
            backend_path: path_var("MDVPKG_BACKEND_PATH", DEFAULT_BACKEND_PATH),
            media_data_dir: path_var("MDVPKG_MEDIA_DATA_DIR", DEFAULT_MEDIA_DATA_DIR),
            bus_name: std::env::var("MDVPKG_BUS_NAME").unwrap_or_else(|_| DEFAULT_BUS_NAME.to_string()),
            config_path: path_var("MDVPKG_CONFIG_PATH", "/etc/urpmi/urpmi.cfg"),
            log_filter: std::env::var("MDVPKG_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

fn path_var(name: &str, default: &str) -> PathBuf {
    std::env::var_os(name).map_or_else(|| PathBuf::from(default), PathBuf::from)
}

#[cfg(test)]
#[allow(unsafe_code)] // std::env::set_var/remove_var, single-threaded test process
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset() {
        unsafe {
            std::env::remove_var("MDVPKG_RESOLVER_PATH");
            std::env::remove_var("MDVPKG_LOG");
        }
        let env = EnvConfig::from_env();
        assert_eq!(env.resolver_path, PathBuf::from(DEFAULT_RESOLVER_PATH));
        assert_eq!(env.log_filter, "info");
    }

    #[test]
    fn overrides_are_read() {
        unsafe {
            std::env::set_var("MDVPKG_LOG", "debug");
        }
        let env = EnvConfig::from_env();
        assert_eq!(env.log_filter, "debug");
        unsafe {
            std::env::remove_var("MDVPKG_LOG");
        }
    }
}
