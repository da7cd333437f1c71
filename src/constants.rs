//! Constants and tunables for the conc daemon.
//!
//! This module centralizes the magic numbers, file names and timing values
//! used throughout the daemon to improve maintainability and clarity.

use std::time::Duration;

// ============================================================================
// File System Layout
// ============================================================================

/// Directory under the daemon's working directory holding all project state.
pub const PROJECTS_DIR: &str = "./projects";

/// Name of the per-service log file inside a service directory.
pub const LOG_FILE_NAME: &str = "log";

/// Name of the metadata file used at both the project and the service level.
/// At the project level it holds serialized settings; at the service level it
/// holds the recorded PID and its creation time as two decimal lines.
pub const META_FILE_NAME: &str = "meta";

/// Mode bits for service log files.
pub const LOG_FILE_MODE: u32 = 0o644;

// ============================================================================
// Control Socket
// ============================================================================

/// Name of the control socket created in the daemon's working directory.
pub const SOCKET_PATH: &str = "conc.sock";

/// Listen backlog for the control socket.
pub const MAX_WAITING_REQUESTS: i32 = 10;

/// Interval at which the accept loop re-checks its stop flag.
pub const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Number of worker threads serving client requests.
pub const THREAD_POOL_CONCURRENCY: usize = 5;

/// Bound on queued-but-not-started client requests.
pub const THREAD_POOL_QUEUE_CAPACITY: usize = 1024;

// ============================================================================
// Process Termination
// ============================================================================

/// Total number of signal attempts before giving up on a child.
pub const KILL_MAX_ATTEMPTS: usize = 10;

/// Attempts sent as `SIGTERM`; every later attempt is `SIGKILL`.
pub const KILL_TERM_ATTEMPTS: usize = 7;

/// Sleep between signal attempts.
pub const KILL_RETRY_DELAY: Duration = Duration::from_millis(50);

// ============================================================================
// Entry Layer
// ============================================================================

/// Interval at which the main thread polls the signal flags.
pub const SIGNAL_POLL_INTERVAL: Duration = Duration::from_millis(100);
