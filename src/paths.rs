//! Per-user path resolution for the socket, state files, and artifacts.

use std::path::{Path, PathBuf};

/// File name of the per-user control socket.
pub const SOCKET_FILE_NAME: &str = "later.sock";

/// Resolve the per-user control socket path.
///
/// Prefers `$XDG_RUNTIME_DIR`, falling back to a per-uid directory under
/// the system temp dir so every user still gets a private socket.
#[must_use]
pub fn socket_path() -> PathBuf {
    if let Some(runtime) = std::env::var_os("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime).join(SOCKET_FILE_NAME)
    } else {
        per_user_temp_dir().join(SOCKET_FILE_NAME)
    }
}

/// Resolve the directory holding the persisted task snapshots.
///
/// `$XDG_CONFIG_HOME/later` when set, otherwise `~/.config/later`.
#[must_use]
pub fn state_dir() -> PathBuf {
    if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(config).join("later")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".config").join("later")
    } else {
        per_user_temp_dir().join("state")
    }
}

/// Resolve the directory execution artifacts are written under.
#[must_use]
pub fn artifact_dir() -> PathBuf {
    std::env::temp_dir()
}

fn per_user_temp_dir() -> PathBuf {
    // SAFETY: getuid has no failure modes and touches no shared state.
    let uid = unsafe { libc::getuid() };
    std::env::temp_dir().join(format!("later-{uid}"))
}

/// The three artifact files one execution leaves behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Captured standard output.
    pub stdout: PathBuf,
    /// Captured standard error.
    pub stderr: PathBuf,
    /// Exit code as decimal text.
    pub exit_code: PathBuf,
}

/// Artifact file locations for a task id under the given directory.
#[must_use]
pub fn artifact_paths(dir: &Path, task_id: &str) -> ArtifactPaths {
    ArtifactPaths {
        stdout: dir.join(format!("later_{task_id}.stdout")),
        stderr: dir.join(format!("later_{task_id}.stderr")),
        exit_code: dir.join(format!("later_{task_id}.exit")),
    }
}
