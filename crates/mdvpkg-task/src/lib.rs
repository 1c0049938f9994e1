//! Task lifecycle, FIFO single-worker scheduling, and the backend
//! child-process channel (spec §4.5, §4.6).

mod backend;
mod runner;
mod state;
mod task;

pub use backend::{BackendChannel, BackendResponse};
pub use runner::{TaskHandle, TaskRunner};
pub use state::{ExitStatus, TaskState, ERROR_TASK_EXCEPTION};
pub use task::{
    CancelFlag, CommitBody, InstallPackagesBody, ListGroupsBody, ListMediasBody, ListPackagesBody,
    TaskBody, TaskContext, TaskEvent,
};
