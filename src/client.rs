//! Protocol client: the requester side of the control socket.
//!
//! One request per connection: write the JSON object, shut down the write
//! side to mark end-of-message, then read the response until the server
//! closes. A connect failure usually just means the daemon is not running.

use crate::error::{LaterError, Result};
use crate::protocol::Response;
use serde_json::{Value, json};
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

/// Send one raw request object and return the decoded response.
pub async fn send_request(socket_path: &Path, request: &Value) -> Result<Response> {
    let mut stream = UnixStream::connect(socket_path).await.map_err(|e| {
        LaterError::Protocol(format!(
            "cannot connect to {}: {e} (is the daemon running?)",
            socket_path.display()
        ))
    })?;

    let body = serde_json::to_vec(request)
        .map_err(|e| LaterError::Protocol(format!("cannot serialize request: {e}")))?;
    stream
        .write_all(&body)
        .await
        .map_err(|e| LaterError::Protocol(format!("cannot send request: {e}")))?;
    stream
        .shutdown()
        .await
        .map_err(|e| LaterError::Protocol(format!("cannot finish request: {e}")))?;

    let mut raw = Vec::new();
    stream
        .read_to_end(&mut raw)
        .await
        .map_err(|e| LaterError::Protocol(format!("cannot read response: {e}")))?;
    serde_json::from_slice(&raw)
        .map_err(|e| LaterError::Protocol(format!("invalid response JSON: {e}")))
}

/// Schedule `command` to run after `delay_seconds`.
pub async fn schedule(socket_path: &Path, command: &str, delay_seconds: u64) -> Result<Response> {
    send_request(
        socket_path,
        &json!({
            "action": "schedule",
            "command": command,
            "delay_seconds": delay_seconds,
        }),
    )
    .await
}

/// List all active tasks.
pub async fn list(socket_path: &Path) -> Result<Response> {
    send_request(socket_path, &json!({"action": "list"})).await
}

/// List completed tasks, newest first; the server defaults `limit` to 10.
pub async fn history(socket_path: &Path, limit: Option<usize>) -> Result<Response> {
    let request = match limit {
        Some(limit) => json!({"action": "history", "limit": limit}),
        None => json!({"action": "history"}),
    };
    send_request(socket_path, &request).await
}

/// Cancel an active task by id.
pub async fn cancel(socket_path: &Path, task_id: &str) -> Result<Response> {
    send_request(socket_path, &json!({"action": "cancel", "task_id": task_id})).await
}
