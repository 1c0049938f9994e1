//! `PackageIndex`: the (name,arch) → [`Package`] map, its ingestion
//! pipeline, and its public read/mutation contract (spec §4.1).
//!
//! Grounded on `libretto-resolver/src/index.rs`'s indexing idiom (a
//! `DashMap` of cheap-to-look-up entries with an atomic rebuild path),
//! adapted to the simpler single-writer model described in SPEC_FULL.md
//! §2: `RwLock<Arc<DashMap<...>>>` so that `load()` constructs an
//! entirely new map and swaps it in under one guard acquisition, and
//! concurrent `get()`/`iter()` callers never observe a partially
//! rebuilt index.

use crate::package::{InProgress, Package};
use crate::resolver::{self, ResolveOutcome, ResolveRequest};
use dashmap::DashMap;
use mdvpkg_config::{grammar, HostVars};
use mdvpkg_core::{Error, Result, RpmArtifact, RpmVersion};
use mdvpkg_media::Media;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;

/// A `(name, arch)` Package's classification/progress changed. `PackageList`s
/// subscribe to re-run `sort_and_filter` when a change concerns a visible
/// item (spec §4.4); no back-pointer from the index to its subscribers is
/// kept — each subscriber just holds a `broadcast::Receiver` that stops
/// receiving once dropped (spec §9 "cyclic event wiring").
#[derive(Debug, Clone)]
pub struct PackageChanged {
    pub name: String,
    pub arch: String,
}

/// Default capacity of the `PackageChanged` broadcast channel. Lagging
/// subscribers drop the oldest events rather than stall a mutation hook;
/// a lagged `PackageList` simply re-synchronizes itself on its next full
/// `sort_and_filter`.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Yields every artifact currently recorded as installed (`installtime`
/// set). The real implementation reads rpmdb; out of scope here per
/// spec §1 ("the synthesis-file parser and rpmdb reader ... only the
/// record shape they must yield is specified").
pub trait InstalledSource: Send + Sync {
    /// # Errors
    /// Implementation-defined; surfaced as-is to `load()`'s caller.
    fn list(&self) -> Result<Vec<RpmArtifact>>;
}

/// An `InstalledSource` with no installed packages, used by tests and
/// by a daemon instance running against an empty rpmdb.
#[derive(Debug, Default)]
pub struct EmptyInstalledSource;

impl InstalledSource for EmptyInstalledSource {
    fn list(&self) -> Result<Vec<RpmArtifact>> {
        Ok(Vec::new())
    }
}

type PackageMap = DashMap<(String, String), Package>;

/// Fully resolved selections/rejections for an `install`/`remove`
/// request set, as returned by [`PackageIndex::resolve`].
pub type Resolved = ResolveOutcome;

/// The in-memory model of every known package.
pub struct PackageIndex {
    packages: RwLock<Arc<PackageMap>>,
    media: RwLock<Vec<Media>>,
    installed_source: Box<dyn InstalledSource>,
    media_data_dir: PathBuf,
    resolver_path: PathBuf,
    events: broadcast::Sender<PackageChanged>,
}

impl PackageIndex {
    /// Build an empty index. `load()` must be called before `get`/`iter`
    /// return anything meaningful.
    #[must_use]
    pub fn new(installed_source: Box<dyn InstalledSource>, media_data_dir: PathBuf, resolver_path: PathBuf) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            packages: RwLock::new(Arc::new(DashMap::new())),
            media: RwLock::new(Vec::new()),
            installed_source,
            media_data_dir,
            resolver_path,
            events,
        }
    }

    /// Subscribe to `package-changed` events. The subscription ends
    /// simply by dropping the returned receiver; the index keeps no
    /// record of who is listening.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PackageChanged> {
        self.events.subscribe()
    }

    /// Parse the URPMI configuration file and materialize the Media
    /// set, replacing whatever was configured before.
    ///
    /// # Errors
    /// [`Error::ConfigMissing`] if the file is absent;
    /// [`Error::ConfigInvalid`] on a grammar violation.
    pub fn configure(&self, config_path: &Path) -> Result<()> {
        let vars = HostVars::from_system();
        let contents = std::fs::read_to_string(config_path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                Error::ConfigMissing { path: config_path.to_path_buf() }
            } else {
                Error::io(config_path, err)
            }
        })?;
        let config = grammar::parse(config_path, &contents, &vars)?;
        let media = config
            .media
            .iter()
            .map(|entry| Media {
                name: entry.name.clone(),
                ignore: entry.ignore(),
                update: entry.update(),
                data_dir: self.media_data_dir.clone(),
            })
            .collect();
        *self.media.write() = media;
        Ok(())
    }

    /// Clear the Media set, as happens when the configuration file is
    /// deleted or moved away (spec §4.1 "Config reload").
    pub fn clear_media(&self) {
        self.media.write().clear();
    }

    /// Rebuild the index: installed artifacts first, then every
    /// non-ignored Media, in configuration order. Atomic: readers never
    /// observe a partially built map.
    pub fn load(&self) -> Result<()> {
        let fresh: PackageMap = DashMap::new();

        for artifact in self.installed_source.list()? {
            ingest(&fresh, artifact);
        }

        let media = self.media.read().clone();
        for medium in &media {
            if medium.ignore {
                continue;
            }
            match medium.list() {
                Ok(artifacts) => {
                    for artifact in artifacts {
                        ingest(&fresh, artifact);
                    }
                }
                Err(err) => {
                    tracing::error!(media = %medium.name, error = %err, "failed to read media synthesis data");
                }
            }
        }

        *self.packages.write() = Arc::new(fresh);
        Ok(())
    }

    /// Look up a single Package by key.
    ///
    /// # Errors
    /// [`Error::UnknownPackage`] if no entry exists for `(name, arch)`.
    pub fn get(&self, name: &str, arch: &str) -> Result<Package> {
        let packages = self.packages.read().clone();
        packages
            .get(&(name.to_string(), arch.to_string()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::UnknownPackage {
                name: name.to_string(),
                arch: arch.to_string(),
            })
    }

    /// A snapshot of every Package, taken at call time. Packages added
    /// to the index by a concurrent `load()` after this call are not
    /// observed, per spec §4.1's snapshot semantics.
    #[must_use]
    pub fn iter(&self) -> Vec<Package> {
        let packages = self.packages.read().clone();
        packages.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Every currently configured Media, in configuration order
    /// (used by `list-medias` and the root object's `Media` signal).
    #[must_use]
    pub fn media(&self) -> Vec<Media> {
        self.media.read().clone()
    }

    /// Invoke the external resolver to expand an install/remove plan
    /// (spec §4.3/§4.4). Does not mutate the index: the caller applies
    /// the outcome's selections via the mutation hooks below once it has
    /// decided to commit.
    ///
    /// # Errors
    /// [`Error::ResolverError`] on any resolver protocol failure.
    pub async fn resolve(&self, installs: &[(String, String)], removes: &[(String, String)]) -> Result<Resolved> {
        let to_request = |(name, arch): &(String, String)| -> Result<ResolveRequest> {
            let pkg = self.get(name, arch)?;
            let version = pkg.latest().ok_or_else(|| Error::UnknownPackage {
                name: name.clone(),
                arch: arch.clone(),
            })?.version.clone();
            Ok(ResolveRequest { name: name.clone(), arch: arch.clone(), version })
        };
        let install_reqs = installs.iter().map(to_request).collect::<Result<Vec<_>>>()?;
        let remove_reqs = removes.iter().map(to_request).collect::<Result<Vec<_>>>()?;
        resolver::resolve(&self.resolver_path, &install_reqs, &remove_reqs).await
    }

    fn with_package_mut<F, T>(&self, name: &str, arch: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Package) -> Result<T>,
    {
        let packages = self.packages.read().clone();
        let mut entry = packages
            .get_mut(&(name.to_string(), arch.to_string()))
            .ok_or_else(|| Error::UnknownPackage {
                name: name.to_string(),
                arch: arch.to_string(),
            })?;
        let result = f(entry.value_mut())?;
        // No active subscribers is not an error; `send` only fails then.
        let _ = self.events.send(PackageChanged {
            name: name.to_string(),
            arch: arch.to_string(),
        });
        Ok(result)
    }

    /// Mark a Package as beginning an install/remove transaction.
    pub fn begin_action(&self, name: &str, arch: &str, kind: InProgress) -> Result<()> {
        self.with_package_mut(name, arch, |pkg| {
            pkg.begin(kind);
            Ok(())
        })
    }

    pub fn download_start(&self, name: &str, arch: &str, version: &RpmVersion) -> Result<()> {
        self.with_package_mut(name, arch, |pkg| pkg.on_download_start(version))
    }

    pub fn download_progress(&self, name: &str, arch: &str, version: &RpmVersion, fraction: f64) -> Result<()> {
        self.with_package_mut(name, arch, |pkg| pkg.on_download_progress(version, fraction))
    }

    pub fn download_done(&self, name: &str, arch: &str, version: &RpmVersion) -> Result<()> {
        self.with_package_mut(name, arch, |pkg| pkg.on_download_done(version))
    }

    pub fn install_start(&self, name: &str, arch: &str, version: &RpmVersion) -> Result<()> {
        self.with_package_mut(name, arch, |pkg| pkg.on_install_start(version))
    }

    pub fn install_progress(&self, name: &str, arch: &str, version: &RpmVersion, fraction: f64) -> Result<()> {
        self.with_package_mut(name, arch, |pkg| pkg.on_install_progress(version, fraction))
    }

    pub fn install_done(&self, name: &str, arch: &str, version: &RpmVersion) -> Result<()> {
        self.with_package_mut(name, arch, |pkg| pkg.on_install_done(version))
    }

    pub fn remove_start(&self, name: &str, arch: &str, version: &RpmVersion) -> Result<()> {
        self.with_package_mut(name, arch, |pkg| pkg.on_remove_start(version))
    }

    pub fn remove_progress(&self, name: &str, arch: &str, version: &RpmVersion, fraction: f64) -> Result<()> {
        self.with_package_mut(name, arch, |pkg| pkg.on_remove_progress(version, fraction))
    }

    pub fn remove_done(&self, name: &str, arch: &str, version: &RpmVersion) -> Result<()> {
        self.with_package_mut(name, arch, |pkg| pkg.on_remove_done(version))
    }
}

/// Ingest one artifact into the map under construction, creating the
/// Package entry on first observation (spec §3 "Package lifecycle").
fn ingest(map: &PackageMap, artifact: RpmArtifact) {
    let key = (artifact.name.clone(), artifact.arch.clone());
    map.entry(key.clone())
        .or_insert_with(|| Package::new(key.0.clone(), key.1.clone()))
        .add_version(artifact);
}

/// Count distinct `(name, arch)` keys in a set of artifacts, used by
/// callers that want a pre-ingestion size estimate (e.g. progress
/// reporting during `load()`). Not part of the spec's public contract;
/// a small convenience used by `mdvpkg-task`'s `list-packages` body.
#[must_use]
pub fn distinct_keys(artifacts: &[RpmArtifact]) -> usize {
    let mut seen: HashMap<(&str, &str), ()> = HashMap::new();
    for artifact in artifacts {
        seen.insert((artifact.name.as_str(), artifact.arch.as_str()), ());
    }
    seen.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct FixedInstalled(Vec<RpmArtifact>);

    impl InstalledSource for FixedInstalled {
        fn list(&self) -> Result<Vec<RpmArtifact>> {
            Ok(self.0.clone())
        }
    }

    fn artifact(name: &str, version: &str, release: &str, installtime: Option<i64>) -> RpmArtifact {
        RpmArtifact {
            name: name.to_string(),
            arch: "x86_64".to_string(),
            version: RpmVersion::new(0, version, release, None),
            group: "System/Libraries".to_string(),
            summary: String::new(),
            size: 0,
            media: None,
            disttag: None,
            installtime,
            requires: Vec::new(),
            provides: Vec::new(),
            conflicts: Vec::new(),
            obsoletes: Vec::new(),
        }
    }

    #[test]
    fn unconfigured_load_yields_only_installed_packages() {
        let index = PackageIndex::new(
            Box::new(FixedInstalled(vec![artifact("libfoo", "1.0", "1", Some(100))])),
            PathBuf::from("/var/lib/urpmi"),
            PathBuf::from("/usr/libexec/mdvpkg/resolver"),
        );
        index.load().unwrap();
        let pkg = index.get("libfoo", "x86_64").unwrap();
        assert_eq!(pkg.installs().len(), 1);
    }

    #[test]
    fn unknown_package_is_an_error() {
        let index = PackageIndex::new(
            Box::new(EmptyInstalledSource),
            PathBuf::from("/var/lib/urpmi"),
            PathBuf::from("/usr/libexec/mdvpkg/resolver"),
        );
        index.load().unwrap();
        let err = index.get("nope", "x86_64").unwrap_err();
        assert!(matches!(err, Error::UnknownPackage { .. }));
    }

    #[test]
    fn clear_media_empties_the_media_set() {
        let index = PackageIndex::new(
            Box::new(EmptyInstalledSource),
            PathBuf::from("/var/lib/urpmi"),
            PathBuf::from("/usr/libexec/mdvpkg/resolver"),
        );
        index.media.write().push(Media {
            name: "core".to_string(),
            ignore: false,
            update: true,
            data_dir: PathBuf::from("/var/lib/urpmi"),
        });
        assert_eq!(index.media().len(), 1);
        index.clear_media();
        assert_eq!(index.media().len(), 0);
    }

    #[test]
    fn mutation_hook_on_unknown_package_is_an_error() {
        let index = PackageIndex::new(
            Box::new(EmptyInstalledSource),
            PathBuf::from("/var/lib/urpmi"),
            PathBuf::from("/usr/libexec/mdvpkg/resolver"),
        );
        index.load().unwrap();
        let version = RpmVersion::new(0, "1.0", "1", None);
        let err = index.download_start("nope", "x86_64", &version).unwrap_err();
        assert!(matches!(err, Error::UnknownPackage { .. }));
    }

    #[test]
    fn subscribers_observe_mutation_hooks_and_unsubscribe_on_drop() {
        let index = PackageIndex::new(
            Box::new(FixedInstalled(vec![
                artifact("libfoo", "1.0", "1", Some(100)),
                artifact("libfoo", "2.0", "1", None),
            ])),
            PathBuf::from("/var/lib/urpmi"),
            PathBuf::from("/usr/libexec/mdvpkg/resolver"),
        );
        index.load().unwrap();
        let mut events = index.subscribe();
        let version = RpmVersion::new(0, "2.0", "1", None);

        index.begin_action("libfoo", "x86_64", InProgress::Installing).unwrap();
        let _begin_event = events.try_recv().expect("begin_action should emit an event");

        index.download_start("libfoo", "x86_64", &version).unwrap();

        let event = events.try_recv().expect("mutation hook should emit an event");
        assert_eq!(event.name, "libfoo");
        assert_eq!(event.arch, "x86_64");

        drop(events);
        // Dropping the receiver is the only "unsubscribe": a send with no
        // live receivers must not error the mutation hook itself.
        index.download_progress("libfoo", "x86_64", &version, 0.5).unwrap();
    }
}
