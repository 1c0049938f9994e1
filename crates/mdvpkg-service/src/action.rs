//! The per-key pending action plan a `PackageList` maintains (spec
//! §4.4): a closed enum rather than the resolver's raw action-tag
//! strings, converted at the `mdvpkg-index::resolver` boundary.

use mdvpkg_index::ActionTag;

/// A Package's pending action within one `PackageList`'s plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Explicitly requested by the client via `install()`.
    Install,
    /// Selected by the resolver to satisfy another install.
    AutoInstall,
    /// Explicitly requested by the client via `remove()`.
    Remove,
    /// Selected by the resolver to satisfy another removal.
    AutoRemove,
}

impl Action {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::AutoInstall => "auto-install",
            Self::Remove => "remove",
            Self::AutoRemove => "auto-remove",
        }
    }

    /// Resolver-derived actions cannot be cleared directly by
    /// `no_action` (spec §4.4, `Error::ActionRequired`).
    #[must_use]
    pub fn is_auto(self) -> bool {
        matches!(self, Self::AutoInstall | Self::AutoRemove)
    }

    #[must_use]
    pub fn is_install_side(self) -> bool {
        matches!(self, Self::Install | Self::AutoInstall)
    }
}

impl From<ActionTag> for Action {
    fn from(tag: ActionTag) -> Self {
        match tag {
            ActionTag::Install => Self::Install,
            ActionTag::AutoInstall => Self::AutoInstall,
            ActionTag::Remove => Self::Remove,
            ActionTag::AutoRemove => Self::AutoRemove,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn auto_actions_cannot_be_cleared_directly() {
        assert!(Action::AutoInstall.is_auto());
        assert!(Action::AutoRemove.is_auto());
        assert!(!Action::Install.is_auto());
        assert!(!Action::Remove.is_auto());
    }

    #[test]
    fn as_str_matches_wire_vocabulary() {
        assert_eq!(Action::Install.as_str(), "install");
        assert_eq!(Action::AutoRemove.as_str(), "auto-remove");
    }
}
