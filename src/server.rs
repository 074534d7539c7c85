//! Unix-socket server: accept loop and request dispatch.
//!
//! One connection carries one request. The handler reads until the peer
//! shuts down its write side, parses a single JSON object, dispatches on
//! its `action` field, writes a single JSON response, and closes. Malformed
//! input is answered with an error response; connection-level failures are
//! logged and never reach the accept loop.

use crate::config::DaemonConfig;
use crate::error::{LaterError, Result};
use crate::executor::Executor;
use crate::protocol::{
    Action, CancelRequest, DEFAULT_HISTORY_LIMIT, HistoryRequest, Response, ScheduleRequest,
};
use crate::scheduler::Scheduler;
use crate::store::TaskStore;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Run the daemon until `cancel` fires: store, scheduler, executor, and
/// the accept loop, followed by a graceful drain.
pub async fn run(config: DaemonConfig, cancel: CancellationToken) -> Result<()> {
    let store = Arc::new(TaskStore::open(&config.state_dir, config.history_limit));
    let executor = Arc::new(Executor::new(
        Arc::clone(&store),
        config.artifact_dir.clone(),
        config.max_concurrent_executions,
    ));
    let scheduler = Scheduler::new(
        Arc::clone(&store),
        Arc::clone(&executor),
        config.tick_interval(),
        cancel.child_token(),
    );
    let scheduler_handle = scheduler.run();

    let listener = bind_socket(&config.socket_path)?;
    info!(socket = %config.socket_path.display(), "server listening");

    let connections = TaskTracker::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    let store = Arc::clone(&store);
                    connections.spawn(async move {
                        if let Err(e) = handle_connection(stream, &store).await {
                            warn!("connection error: {e}");
                        }
                    });
                }
                Err(e) => warn!("accept failed: {e}"),
            },
        }
    }

    info!("shutting down");
    drop(listener);
    if let Err(e) = std::fs::remove_file(&config.socket_path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("cannot remove socket file: {e}");
        }
    }

    let _ = scheduler_handle.await;
    connections.close();
    let _ = tokio::time::timeout(Duration::from_secs(1), connections.wait()).await;
    executor.shutdown(config.shutdown_grace()).await;
    info!("server stopped");
    Ok(())
}

/// Bind the control socket, removing any stale socket file first.
fn bind_socket(path: &Path) -> Result<UnixListener> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match std::fs::remove_file(path) {
        Ok(()) => info!(socket = %path.display(), "removed stale socket file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(LaterError::Io(e)),
    }
    Ok(UnixListener::bind(path)?)
}

/// Serve exactly one request on `stream`.
async fn handle_connection(mut stream: UnixStream, store: &TaskStore) -> Result<()> {
    let mut raw = Vec::new();
    stream
        .read_to_end(&mut raw)
        .await
        .map_err(|e| LaterError::Protocol(format!("cannot read request: {e}")))?;

    let response = handle_request(store, &raw);

    let json = serde_json::to_vec(&response)
        .map_err(|e| LaterError::Protocol(format!("cannot serialize response: {e}")))?;
    stream
        .write_all(&json)
        .await
        .map_err(|e| LaterError::Protocol(format!("cannot write response: {e}")))?;
    stream
        .shutdown()
        .await
        .map_err(|e| LaterError::Protocol(format!("cannot close connection: {e}")))?;
    Ok(())
}

/// Decode one request and dispatch it against the store.
///
/// Always produces a response: malformed JSON, an unrecognized action, and
/// missing fields all map to error responses rather than failures.
pub fn handle_request(store: &TaskStore, raw: &[u8]) -> Response {
    let message: Value = match serde_json::from_slice(raw) {
        Ok(value) => value,
        Err(e) => return Response::error(format!("invalid request JSON: {e}")),
    };
    let Some(action_raw) = message.get("action").and_then(Value::as_str) else {
        return Response::error("missing action field");
    };
    let Some(action) = Action::parse(action_raw) else {
        return Response::error(LaterError::UnknownAction(action_raw.to_owned()).to_string());
    };

    match action {
        Action::Schedule => handle_schedule(store, message),
        Action::List => Response::tasks(store.list_active()),
        Action::History => handle_history(store, message),
        Action::Cancel => handle_cancel(store, message),
    }
}

fn handle_schedule(store: &TaskStore, message: Value) -> Response {
    let Ok(request) = serde_json::from_value::<ScheduleRequest>(message) else {
        return Response::error("Missing command or delay");
    };
    if request.command.trim().is_empty() {
        return Response::error("Missing command or delay");
    }
    match store.schedule(&request.command, request.delay_seconds) {
        Ok((task_id, target_time)) => Response::scheduled(task_id, target_time),
        Err(e) => Response::error(e.to_string()),
    }
}

fn handle_history(store: &TaskStore, message: Value) -> Response {
    let request: HistoryRequest = match serde_json::from_value(message) {
        Ok(request) => request,
        Err(e) => return Response::error(format!("invalid history request: {e}")),
    };
    let limit = request.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let tasks: BTreeMap<String, crate::task::Task> = store
        .list_history(limit)
        .into_iter()
        .map(|task| (task.id.clone(), task))
        .collect();
    Response::tasks(tasks)
}

fn handle_cancel(store: &TaskStore, message: Value) -> Response {
    let Ok(request) = serde_json::from_value::<CancelRequest>(message) else {
        return Response::error("Missing task_id");
    };
    match store.cancel(&request.task_id) {
        Ok(()) => Response::ok(format!("Task {} cancelled", request.task_id)),
        Err(e) => Response::error(e.to_string()),
    }
}
