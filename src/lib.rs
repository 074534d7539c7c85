//! later: a one-shot deferred shell-command daemon.
//!
//! A caller submits a shell command and a delay over a per-user Unix
//! socket; the long-lived daemon fires the command once the delay has
//! elapsed, captures its output to per-task artifact files, and keeps a
//! bounded history of completed runs.
//!
//! # Architecture
//!
//! Independent tokio tasks share a single [`store::TaskStore`]:
//! - **Server**: accepts one JSON request per connection and dispatches it
//! - **Scheduler**: a fixed-interval polling loop that dequeues due tasks
//! - **Executor**: semaphore-bounded `sh -c` runs with captured output
//!
//! All store operations are serialized by one lock, so no operation is
//! ever observed partially applied.

pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod paths;
pub mod protocol;
pub mod scheduler;
pub mod server;
pub mod store;
pub mod task;

pub use config::DaemonConfig;
pub use error::{LaterError, Result};
pub use protocol::{Action, Response, Status};
pub use store::TaskStore;
pub use task::Task;
