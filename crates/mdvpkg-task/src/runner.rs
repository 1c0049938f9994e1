//! `TaskRunner`: single-worker FIFO scheduling of Tasks over one shared
//! `BackendChannel` (spec §4.5).
//!
//! Grounded on `original_source/mdvpkg/worker.py`'s commented-out
//! `TaskQueue` sketch (`collections.OrderedDict` + `gobject.idle_add`)
//! and `libretto-plugin-system/src/sandbox.rs`'s `DashMap`-per-operation
//! bookkeeping idiom, re-expressed as a `tokio`-driven loop: a
//! `VecDeque` queue behind a `tokio::sync::Mutex`, woken by a
//! `tokio::sync::Notify` on enqueue, with exactly one task run to
//! completion (or cancellation) before the next is popped.

use crate::backend::BackendChannel;
use crate::state::{ExitStatus, TaskState, ERROR_TASK_EXCEPTION};
use crate::task::{CancelFlag, TaskBody, TaskContext, TaskEvent};
use mdvpkg_index::PackageIndex;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

struct QueuedTask {
    id: Uuid,
    body: Box<dyn TaskBody>,
    cancel: CancelFlag,
    state: Arc<RwLock<TaskState>>,
    events: mpsc::UnboundedSender<TaskEvent>,
}

/// A caller-side reference to an enqueued or running Task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub id: Uuid,
    cancel: CancelFlag,
    state: Arc<RwLock<TaskState>>,
}

impl TaskHandle {
    /// Request cancellation. If the task is still queued, its body is
    /// never invoked; if running, it is observed at the next suspension
    /// point (spec §5).
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn state(&self) -> TaskState {
        *self.state.read()
    }
}

/// Owns the queue and the single `BackendChannel`, driving one task at
/// a time to completion.
pub struct TaskRunner {
    index: Arc<PackageIndex>,
    backend: Mutex<BackendChannel>,
    queue: Mutex<VecDeque<QueuedTask>>,
    notify: Notify,
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner").finish_non_exhaustive()
    }
}

impl TaskRunner {
    #[must_use]
    pub fn new(index: Arc<PackageIndex>, backend_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            index,
            backend: Mutex::new(BackendChannel::new(backend_path)),
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Enqueue a task body in `queued` state. Returns a handle the
    /// caller can cancel, and a receiver for the task's events.
    pub async fn enqueue(&self, body: Box<dyn TaskBody>) -> (TaskHandle, UnboundedReceiver<TaskEvent>) {
        let id = Uuid::new_v4();
        let cancel = CancelFlag::new();
        let state = Arc::new(RwLock::new(TaskState::Queued));
        let (tx, rx) = mpsc::unbounded_channel();

        let queued = QueuedTask {
            id,
            body,
            cancel: cancel.clone(),
            state: state.clone(),
            events: tx.clone(),
        };

        let _ = tx.send(TaskEvent::StateChanged(TaskState::Queued));
        let mut queue = self.queue.lock().await;
        let was_empty = queue.is_empty();
        queue.push_back(queued);
        drop(queue);
        if was_empty {
            self.notify.notify_one();
        }

        (TaskHandle { id, cancel, state }, rx)
    }

    /// Drive the queue forever. Intended to be spawned once at daemon
    /// startup; this is the async analogue of spec §5's single-threaded
    /// cooperative event loop's task-scheduling slice.
    pub async fn drive(&self) {
        loop {
            let next = self.queue.lock().await.pop_front();
            let Some(task) = next else {
                self.notify.notified().await;
                continue;
            };
            self.run_one(task).await;
        }
    }

    /// Pop and run exactly one task, if any is queued. Returns `true` if
    /// a task was run (used by tests and by a caller that wants to drive
    /// the loop manually rather than via `drive()`).
    pub async fn run_next(&self) -> bool {
        let Some(task) = self.queue.lock().await.pop_front() else {
            return false;
        };
        self.run_one(task).await;
        true
    }

    async fn run_one(&self, task: QueuedTask) {
        let QueuedTask { id: _, mut body, cancel, state, events } = task;

        if cancel.is_cancelled() {
            finish(&state, &events, TaskState::Cancelling, ExitStatus::Cancelled);
            return;
        }

        let running_state = body.running_state();
        *state.write() = running_state;
        let _ = events.send(TaskEvent::StateChanged(running_state));

        let mut backend = self.backend.lock().await;
        let result = {
            let mut ctx = TaskContext {
                index: &self.index,
                backend: &mut backend,
                events: &events,
                cancel: &cancel,
            };
            body.run(&mut ctx).await
        };
        drop(backend);

        if cancel.is_cancelled() {
            finish(&state, &events, TaskState::Cancelling, ExitStatus::Cancelled);
            return;
        }

        match result {
            Ok(()) => finish(&state, &events, TaskState::Ready, ExitStatus::Success),
            Err(err) => {
                // A body can fail mid-stream without ever seeing a
                // DONE/ERROR/EXCEPTION terminal response (a pipe read
                // error, an unrecognized SIGNAL) — in that case `busy`
                // is still set. Kill the channel so the next `send_task`
                // restarts the child lazily instead of short-circuiting
                // on "backend already running a task" forever (spec
                // §4.6, §7 "backend errors kill the channel").
                let mut backend = self.backend.lock().await;
                if backend.is_busy() {
                    let _ = backend.kill().await;
                }
                drop(backend);
                let _ = events.send(TaskEvent::Error {
                    code: ERROR_TASK_EXCEPTION.to_string(),
                    message: err.to_string(),
                });
                let _ = events.send(TaskEvent::Finished(ExitStatus::Failed));
            }
        }
    }
}

fn finish(state: &Arc<RwLock<TaskState>>, events: &mpsc::UnboundedSender<TaskEvent>, to: TaskState, exit: ExitStatus) {
    *state.write() = to;
    let _ = events.send(TaskEvent::StateChanged(to));
    let _ = events.send(TaskEvent::Finished(exit));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::ListMediasBody;
    use mdvpkg_index::EmptyInstalledSource;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[tokio::test]
    async fn enqueue_and_run_next_completes_a_list_task() {
        let index = Arc::new(PackageIndex::new(
            Box::new(EmptyInstalledSource),
            PathBuf::from("/var/lib/urpmi"),
            PathBuf::from("/usr/libexec/mdvpkg/resolver"),
        ));
        index.load().unwrap();
        let runner = TaskRunner::new(index, PathBuf::from("/usr/libexec/mdvpkg/backend"));

        let (handle, mut events) = runner.enqueue(Box::new(ListMediasBody)).await;
        assert_eq!(handle.state(), TaskState::Queued);

        assert!(runner.run_next().await);

        let mut saw_finished = false;
        while let Some(event) = events.recv().await {
            if let TaskEvent::Finished(status) = event {
                assert_eq!(status, ExitStatus::Success);
                saw_finished = true;
                break;
            }
        }
        assert!(saw_finished);
        assert_eq!(handle.state(), TaskState::Ready);
    }

    #[tokio::test]
    async fn cancelling_a_queued_task_skips_its_body() {
        let index = Arc::new(PackageIndex::new(
            Box::new(EmptyInstalledSource),
            PathBuf::from("/var/lib/urpmi"),
            PathBuf::from("/usr/libexec/mdvpkg/resolver"),
        ));
        index.load().unwrap();
        let runner = TaskRunner::new(index, PathBuf::from("/usr/libexec/mdvpkg/backend"));

        let (handle, mut events) = runner.enqueue(Box::new(ListMediasBody)).await;
        handle.cancel();
        assert!(runner.run_next().await);

        let mut saw_cancelled = false;
        while let Some(event) = events.recv().await {
            if let TaskEvent::Finished(status) = event {
                assert_eq!(status, ExitStatus::Cancelled);
                saw_cancelled = true;
                break;
            }
        }
        assert!(saw_cancelled);
    }
}
