//! Shell command execution with captured output.
//!
//! Each dequeued task runs `sh -c <command>` on its own tokio task. A
//! semaphore bounds how many child processes exist at once; due tasks past
//! the limit queue for a permit instead of spawning unboundedly. Once the
//! command finishes, its stdout, stderr, and exit code are written to
//! per-task artifact files and the outcome is recorded in the store.

use crate::error::LaterError;
use crate::paths;
use crate::store::TaskStore;
use crate::task::Task;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

/// Exit code recorded when the shell could not be spawned or the child was
/// terminated by a signal.
const EXIT_CODE_UNKNOWN: i32 = -1;

/// Runs dequeued tasks to completion and records their outcomes.
pub struct Executor {
    store: Arc<TaskStore>,
    artifact_dir: PathBuf,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl Executor {
    /// Create an executor writing artifacts under `artifact_dir`, with at
    /// most `max_concurrent` commands running at once.
    #[must_use]
    pub fn new(store: Arc<TaskStore>, artifact_dir: PathBuf, max_concurrent: usize) -> Self {
        Self {
            store,
            artifact_dir,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            tracker: TaskTracker::new(),
        }
    }

    /// Queue one dequeued task for execution.
    ///
    /// Returns immediately; the execution runs on its own tokio task once a
    /// concurrency permit is available.
    pub fn dispatch(&self, task: Task) {
        let store = Arc::clone(&self.store);
        let artifact_dir = self.artifact_dir.clone();
        let permits = Arc::clone(&self.permits);
        self.tracker.spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            run_task(&store, &artifact_dir, &task).await;
        });
    }

    /// Stop accepting work and wait up to `grace` for in-flight
    /// executions to finish.
    pub async fn shutdown(&self, grace: Duration) {
        self.tracker.close();
        if tokio::time::timeout(grace, self.tracker.wait())
            .await
            .is_err()
        {
            warn!("shutdown grace period expired with executions still running");
        }
    }
}

/// Run one command to completion and record the outcome.
async fn run_task(store: &TaskStore, artifact_dir: &Path, task: &Task) {
    info!(task_id = %task.id, command = %task.command, "executing task");

    let output = Command::new("sh").arg("-c").arg(&task.command).output().await;
    let (exit_code, stdout, stderr) = match output {
        Ok(output) => (
            output.status.code().unwrap_or(EXIT_CODE_UNKNOWN),
            output.stdout,
            output.stderr,
        ),
        // The shell itself failed to start; the error text stands in for
        // the command's stderr, like any other failing invocation.
        Err(e) => {
            let err = LaterError::Execution(format!("cannot spawn shell: {e}"));
            warn!(task_id = %task.id, "{err}");
            (EXIT_CODE_UNKNOWN, Vec::new(), format!("{err}\n").into_bytes())
        }
    };

    if let Err(e) = write_artifacts(artifact_dir, &task.id, &stdout, &stderr, exit_code).await {
        error!(task_id = %task.id, "cannot write execution artifacts: {e}");
    }

    store.record_completion(&task.id, &task.command, exit_code, Utc::now());
    info!(task_id = %task.id, exit_code, "task completed");
}

async fn write_artifacts(
    dir: &Path,
    task_id: &str,
    stdout: &[u8],
    stderr: &[u8],
    exit_code: i32,
) -> crate::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let artifacts = paths::artifact_paths(dir, task_id);
    tokio::fs::write(&artifacts.stdout, stdout).await?;
    tokio::fs::write(&artifacts.stderr, stderr).await?;
    tokio::fs::write(&artifacts.exit_code, exit_code.to_string()).await?;
    Ok(())
}
