//! `Session`: a thin per-client owner identity, wrapping exactly one
//! `PackageList` (spec §3 "Session owner identity", SPEC_FULL.md §5.7).
//!
//! Grounded on `original_source/mdvpkg/daemon.py`'s `DBusPackageList`:
//! the Python original authenticates the caller via the D-Bus `sender`
//! keyword and keeps a `_sender_watch` on that unique name. Here the
//! "owner watch" is just the D-Bus unique name captured at `GetList()`
//! time, checked on every subsequent call; teardown-on-disconnect is
//! driven by the service layer's `NameOwnerChanged` listener
//! (`mdvpkg-service::dbus::Root`), not by this type.

use crate::package_list::PackageList;
use mdvpkg_core::{Error, Result};
use std::sync::Arc;

/// One client's ownership of a `PackageList`.
///
/// The owner is the D-Bus unique name (`:1.42`-style) observed on the
/// `GetList()` call that created this session; every subsequent method
/// on the owned `PackageList` object must be made by that same unique
/// name, per spec §4.4 ("caller must be the owning session; otherwise
/// `NotOwner`").
#[derive(Debug)]
pub struct Session {
    owner: String,
    list: Arc<PackageList>,
}

impl Session {
    #[must_use]
    pub fn new(owner: impl Into<String>, list: Arc<PackageList>) -> Self {
        Self { owner: owner.into(), list }
    }

    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    #[must_use]
    pub fn list(&self) -> &Arc<PackageList> {
        &self.list
    }

    /// Reject a call from anyone but `owner`.
    ///
    /// # Errors
    /// [`Error::NotOwner`] on a mismatch.
    pub fn check_owner(&self, sender: &str) -> Result<()> {
        if sender == self.owner {
            Ok(())
        } else {
            Err(Error::NotOwner)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package_list::PackageList;
    use mdvpkg_index::{EmptyInstalledSource, PackageIndex};
    use mdvpkg_task::TaskRunner;
    use std::path::PathBuf;

    fn session() -> Session {
        let index = Arc::new(PackageIndex::new(
            Box::new(EmptyInstalledSource),
            PathBuf::from("/var/lib/urpmi"),
            PathBuf::from("/usr/libexec/mdvpkg/resolver"),
        ));
        index.load().unwrap();
        let runner = Arc::new(TaskRunner::new(index.clone(), PathBuf::from("/usr/libexec/mdvpkg/backend")));
        let list = PackageList::new(index, runner);
        Session::new(":1.7", list)
    }

    #[test]
    fn owner_may_call() {
        assert!(session().check_owner(":1.7").is_ok());
    }

    #[test]
    fn foreign_caller_is_rejected() {
        let err = session().check_owner(":1.8").unwrap_err();
        assert!(matches!(err, Error::NotOwner));
    }
}
