//! Task lifecycle/state and exit status, per spec §6 "Task & error codes".
//!
//! Grounded on `original_source/mdvpkg/tasks.py`'s `STATE_*` constants: the
//! Python original keeps a single free-form state string; here it is a
//! closed enum, still rendered to the identical wire strings for the
//! `StateChanged` signal payload.

/// A Task's lifecycle/phase state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    SettingUp,
    Queued,
    Running,
    Listing,
    Searching,
    Resolving,
    Downloading,
    Installing,
    Ready,
    Cancelling,
}

impl TaskState {
    /// The literal wire string for this state, as named in spec §6.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SettingUp => "state-setting-up",
            Self::Queued => "state-queued",
            Self::Running => "state-running",
            Self::Listing => "state-listing",
            Self::Searching => "state-searching",
            Self::Resolving => "state-resolving",
            Self::Downloading => "state-downloading",
            Self::Installing => "state-installing",
            Self::Ready => "state-ready",
            Self::Cancelling => "state-cancelling",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The final outcome a `Finished` signal carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Failed,
    Cancelled,
}

impl ExitStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "exit-success",
            Self::Failed => "exit-failed",
            Self::Cancelled => "exit-cancelled",
        }
    }
}

impl std::fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed error code raised when a task body panics/returns an
/// unexpected error (spec §6: `error-task-exception`).
pub const ERROR_TASK_EXCEPTION: &str = "error-task-exception";

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn state_strings_match_wire_format() {
        assert_eq!(TaskState::SettingUp.as_str(), "state-setting-up");
        assert_eq!(TaskState::Cancelling.as_str(), "state-cancelling");
    }

    #[test]
    fn exit_status_strings_match_wire_format() {
        assert_eq!(ExitStatus::Cancelled.as_str(), "exit-cancelled");
    }
}
