//! The task store: active and completed collections with snapshot
//! persistence.
//!
//! All task state lives behind one mutex so every operation, including its
//! snapshot write, is atomic with respect to concurrent connections and
//! the scheduler. Snapshots are whole-file JSON rewrites, replaced via a
//! temp file and rename so a crash mid-write never leaves a torn file.
//! Persistence failures are logged and swallowed; the in-memory state stays
//! authoritative for the running process.

use crate::error::{LaterError, Result};
use crate::task::Task;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{error, info, warn};

/// Snapshot file holding the active set.
const TASKS_FILE: &str = "tasks.json";

/// Snapshot file holding the completed set.
const COMPLETED_TASKS_FILE: &str = "completed_tasks.json";

/// Sole authority over the active and completed task collections.
pub struct TaskStore {
    state: Mutex<StoreState>,
    tasks_file: PathBuf,
    completed_file: PathBuf,
    history_limit: usize,
}

#[derive(Debug, Default)]
struct StoreState {
    active: BTreeMap<String, Task>,
    completed: BTreeMap<String, Task>,
}

impl TaskStore {
    /// Open the store, loading any persisted state from `state_dir`.
    ///
    /// Persisted active tasks whose target time has already passed are
    /// dropped, not fired. Unreadable or malformed snapshots are treated
    /// as empty state, never as a fatal error.
    #[must_use]
    pub fn open(state_dir: &Path, history_limit: usize) -> Self {
        let tasks_file = state_dir.join(TASKS_FILE);
        let completed_file = state_dir.join(COMPLETED_TASKS_FILE);

        let now = Utc::now();
        let mut active = load_snapshot(&tasks_file);
        let loaded = active.len();
        active.retain(|_, task| task.target_time > now);
        let expired = loaded - active.len();
        if expired > 0 {
            info!(expired, "dropped expired tasks from persisted state");
        }

        let mut completed = load_snapshot(&completed_file);
        prune_completed(&mut completed, history_limit);

        info!(
            active = active.len(),
            completed = completed.len(),
            "task store loaded"
        );

        Self {
            state: Mutex::new(StoreState { active, completed }),
            tasks_file,
            completed_file,
            history_limit,
        }
    }

    /// Schedule `command` to run `delay_seconds` from now.
    ///
    /// Returns the new task's id and target time.
    pub fn schedule(&self, command: &str, delay_seconds: u64) -> Result<(String, DateTime<Utc>)> {
        if command.trim().is_empty() {
            return Err(LaterError::InvalidRequest(
                "command must not be empty".to_owned(),
            ));
        }
        let target_time = i64::try_from(delay_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|delay| Utc::now().checked_add_signed(delay))
            .ok_or_else(|| {
                LaterError::InvalidRequest(format!("delay of {delay_seconds}s is out of range"))
            })?;
        let task = Task::new(command, target_time);
        let id = task.id.clone();

        let mut state = self.lock();
        state.active.insert(id.clone(), task);
        self.persist_active(&state.active);
        Ok((id, target_time))
    }

    /// Snapshot of the active set, ordered by insertion.
    #[must_use]
    pub fn list_active(&self) -> BTreeMap<String, Task> {
        self.lock().active.clone()
    }

    /// Up to `limit` completed tasks, most recent completion first.
    #[must_use]
    pub fn list_history(&self, limit: usize) -> Vec<Task> {
        let state = self.lock();
        let mut tasks: Vec<Task> = state.completed.values().cloned().collect();
        tasks.sort_by(|a, b| b.completion_time.cmp(&a.completion_time));
        tasks.truncate(limit);
        tasks
    }

    /// Cancel an active task.
    ///
    /// Fails with `NotFound` when the id is not in the active set; already
    /// fired, already completed, and never-existed are indistinguishable.
    pub fn cancel(&self, task_id: &str) -> Result<()> {
        let mut state = self.lock();
        if state.active.remove(task_id).is_none() {
            return Err(LaterError::NotFound(format!(
                "task {task_id} is not an active task"
            )));
        }
        self.persist_active(&state.active);
        Ok(())
    }

    /// Remove and return every active task due at `now`.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<Task> {
        let mut state = self.lock();
        let due_ids: Vec<String> = state
            .active
            .iter()
            .filter(|(_, task)| task.is_due(now))
            .map(|(id, _)| id.clone())
            .collect();
        if due_ids.is_empty() {
            return Vec::new();
        }

        let mut due = Vec::with_capacity(due_ids.len());
        for id in due_ids {
            if let Some(task) = state.active.remove(&id) {
                due.push(task);
            }
        }
        self.persist_active(&state.active);
        due
    }

    /// Record one finished execution into the completed set.
    pub fn record_completion(
        &self,
        task_id: &str,
        command: &str,
        exit_code: i32,
        completion_time: DateTime<Utc>,
    ) {
        let task = Task::from_outcome(task_id, command, exit_code, completion_time);
        let mut state = self.lock();
        state.completed.insert(task_id.to_owned(), task);
        prune_completed(&mut state.completed, self.history_limit);
        self.persist_completed(&state.completed);
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist_active(&self, active: &BTreeMap<String, Task>) {
        if let Err(e) = persist_snapshot(&self.tasks_file, active) {
            error!("cannot persist active tasks: {e}");
        }
    }

    fn persist_completed(&self, completed: &BTreeMap<String, Task>) {
        if let Err(e) = persist_snapshot(&self.completed_file, completed) {
            error!("cannot persist completed tasks: {e}");
        }
    }
}

/// Trim the completed set to the `limit` entries with the most recent
/// completion times.
fn prune_completed(completed: &mut BTreeMap<String, Task>, limit: usize) {
    if completed.len() <= limit {
        return;
    }
    let mut by_recency: Vec<(String, Option<DateTime<Utc>>)> = completed
        .iter()
        .map(|(id, task)| (id.clone(), task.completion_time))
        .collect();
    by_recency.sort_by(|a, b| b.1.cmp(&a.1));
    for (id, _) in by_recency.into_iter().skip(limit) {
        completed.remove(&id);
    }
}

fn load_snapshot(path: &Path) -> BTreeMap<String, Task> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            warn!("cannot read task snapshot {}: {e}", path.display());
            return BTreeMap::new();
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(tasks) => tasks,
        Err(e) => {
            warn!("ignoring malformed task snapshot {}: {e}", path.display());
            BTreeMap::new()
        }
    }
}

/// Rewrite a snapshot file, replacing it atomically via a temp file.
fn persist_snapshot(path: &Path, tasks: &BTreeMap<String, Task>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| LaterError::Persistence(format!("cannot create state dir: {e}")))?;
    }
    let json = serde_json::to_vec_pretty(tasks)
        .map_err(|e| LaterError::Persistence(format!("cannot serialize snapshot: {e}")))?;
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, json)
        .map_err(|e| LaterError::Persistence(format!("cannot write snapshot temp file: {e}")))?;
    std::fs::rename(&tmp_path, path)
        .map_err(|e| LaterError::Persistence(format!("cannot replace snapshot: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store(dir: &Path) -> TaskStore {
        TaskStore::open(dir, 100)
    }

    #[test]
    fn schedule_makes_task_visible() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path());

        let (id, target_time) = store.schedule("echo test", 300).expect("schedule");
        let active = store.list_active();
        assert_eq!(active.len(), 1);
        let task = active.get(&id).expect("task listed");
        assert_eq!(task.command, "echo test");
        assert_eq!(task.target_time, target_time);
        assert!(!task.completed);

        let delta = (target_time - Utc::now()).num_seconds();
        assert!((295..=300).contains(&delta), "target ~300s out, got {delta}");
    }

    #[test]
    fn schedule_rejects_empty_command() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path());
        let result = store.schedule("   ", 10);
        assert!(matches!(result, Err(LaterError::InvalidRequest(_))));
        assert!(store.list_active().is_empty());
    }

    #[test]
    fn cancel_succeeds_exactly_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path());

        let (id, _) = store.schedule("echo test", 300).expect("schedule");
        store.cancel(&id).expect("first cancel succeeds");
        let second = store.cancel(&id);
        assert!(matches!(second, Err(LaterError::NotFound(_))));
        assert!(store.list_active().is_empty());
    }

    #[test]
    fn take_due_moves_only_due_tasks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path());

        let (due_id, _) = store.schedule("echo now", 0).expect("schedule");
        let (later_id, _) = store.schedule("echo later", 3600).expect("schedule");

        let due = store.take_due(Utc::now());
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, due_id);

        let active = store.list_active();
        assert_eq!(active.len(), 1);
        assert!(active.contains_key(&later_id));

        // Nothing further is due on a second scan.
        assert!(store.take_due(Utc::now()).is_empty());
    }

    #[test]
    fn record_completion_appears_in_history() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path());

        let done_at = Utc::now();
        store.record_completion("task-1", "echo hi", 0, done_at);

        let history = store.list_history(10);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, "task-1");
        assert_eq!(history[0].exit_code, Some(0));
        assert_eq!(history[0].completion_time, Some(done_at));
        assert!(history[0].completed);
    }

    #[test]
    fn history_is_most_recent_first_and_limited() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path());

        let base = Utc::now();
        for i in 0..5 {
            store.record_completion(
                &format!("task-{i}"),
                "true",
                0,
                base + chrono::Duration::seconds(i),
            );
        }

        let history = store.list_history(3);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].id, "task-4");
        assert_eq!(history[1].id, "task-3");
        assert_eq!(history[2].id, "task-2");
    }

    #[test]
    fn completed_set_is_pruned_to_the_most_recent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = TaskStore::open(dir.path(), 100);

        let base = Utc::now();
        for i in 0..150 {
            store.record_completion(
                &format!("task-{i:03}"),
                "true",
                0,
                base + chrono::Duration::seconds(i),
            );
        }

        let history = store.list_history(1000);
        assert_eq!(history.len(), 100);
        // The survivors are exactly the 100 most recent completions.
        assert_eq!(history[0].id, "task-149");
        assert_eq!(history[99].id, "task-050");
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (id, target_time) = {
            let store = open_store(dir.path());
            store.record_completion("done-1", "true", 0, Utc::now());
            store.schedule("echo test", 3600).expect("schedule")
        };

        let reopened = open_store(dir.path());
        let active = reopened.list_active();
        assert_eq!(active.len(), 1);
        let task = active.get(&id).expect("task reloaded");
        assert_eq!(task.target_time, target_time);

        let history = reopened.list_history(10);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, "done-1");
    }

    #[test]
    fn expired_tasks_are_dropped_on_load_not_fired() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let store = open_store(dir.path());
            store.schedule("echo stale", 0).expect("schedule");
            store.schedule("echo fresh", 3600).expect("schedule");
        }

        // Reopen after the first task's target time has passed.
        std::thread::sleep(std::time::Duration::from_millis(20));
        let reopened = open_store(dir.path());
        let active = reopened.list_active();
        assert_eq!(active.len(), 1);
        let task = active.values().next().expect("one task");
        assert_eq!(task.command, "echo fresh");
        assert!(reopened.take_due(Utc::now()).is_empty());
    }

    #[test]
    fn malformed_snapshot_is_treated_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(TASKS_FILE), "not json at all").expect("write");
        std::fs::write(dir.path().join(COMPLETED_TASKS_FILE), "{\"half\":").expect("write");

        let store = open_store(dir.path());
        assert!(store.list_active().is_empty());
        assert!(store.list_history(10).is_empty());
    }

    #[test]
    fn snapshot_replace_leaves_no_temp_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path());
        store.schedule("echo test", 60).expect("schedule");

        assert!(dir.path().join(TASKS_FILE).exists());
        assert!(!dir.path().join("tasks.tmp").exists());
    }

    #[test]
    fn persistence_failure_keeps_memory_authoritative() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocked = dir.path().join("blocked");
        // A plain file where the state dir should be makes every snapshot
        // write fail.
        std::fs::write(&blocked, "occupied").expect("write");

        let store = TaskStore::open(&blocked.join("nested"), 100);
        let (id, _) = store.schedule("echo test", 60).expect("schedule");
        assert!(store.list_active().contains_key(&id));
    }
}
