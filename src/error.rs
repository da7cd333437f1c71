//! Error handling for conc.
use thiserror::Error;

/// Settings validation and parse errors.
///
/// The `Display` output of each variant is the dotted machine code returned
/// verbatim as a protocol `ERROR` payload, e.g. `settings.name.invalid`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    /// The payload is not a well-formed settings document.
    #[error("settings.parse")]
    Parse,

    /// The project name is missing or contains characters outside `[A-Za-z0-9_-]`.
    #[error("settings.name.invalid")]
    InvalidName,

    /// The project working directory is missing or empty.
    #[error("settings.cwd.invalid")]
    InvalidCwd,

    /// The project declares no services.
    #[error("settings.services.missing")]
    MissingServices,

    /// A service name is missing or contains characters outside `[A-Za-z0-9_-]`.
    #[error("settings.service.{0}.name.invalid")]
    InvalidServiceName(String),

    /// Two services within one project share a name.
    #[error("settings.service.{0}.name.duplicate")]
    DuplicateServiceName(String),

    /// A service declares an empty command.
    #[error("settings.service.{0}.command.invalid")]
    InvalidServiceCommand(String),

    /// A freestanding environment document is not a JSON object of strings.
    #[error("env.parse")]
    EnvParse,
}

/// Errors surfaced by the filesystem driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Filesystem I/O failure underneath the driver root.
    #[error("driver filesystem error: {0}")]
    Fs(#[from] std::io::Error),

    /// Spawn failure or exhausted kill escalation for a supervised child.
    #[error("process control error for '{id}': {detail}")]
    Proc {
        /// The `<project>/<service>` identifier of the affected child.
        id: String,
        /// What went wrong.
        detail: String,
    },
}

/// Errors surfaced by manager operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The driver reported a filesystem or process error.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// No project with the requested name is registered.
    #[error("project not found")]
    ProjectNotFound,

    /// The project exists but has no service with the requested name.
    #[error("service not found")]
    ServiceNotFound,

    /// A store or project lock was poisoned by a panicking holder.
    #[error("manager lock poisoned: {0}")]
    Poisoned(String),
}

impl<T> From<std::sync::PoisonError<T>> for ManagerError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        ManagerError::Poisoned(err.to_string())
    }
}

/// Errors surfaced by the thread pool lifecycle.
#[derive(Debug, Error)]
pub enum PoolError {
    /// `start` was called while the pool was already running.
    #[error("thread pool '{0}' is already running")]
    AlreadyRunning(String),

    /// A stop or pause was requested while the pool was not running.
    #[error("thread pool '{0}' is not running")]
    NotRunning(String),

    /// The job queue is at capacity.
    #[error("thread pool '{name}' is full, max capacity: {capacity}")]
    QueueFull {
        /// Name of the rejecting pool.
        name: String,
        /// The configured queue bound.
        capacity: usize,
    },

    /// The pool lock was poisoned by a panicking holder.
    #[error("thread pool lock poisoned: {0}")]
    Poisoned(String),
}

impl<T> From<std::sync::PoisonError<T>> for PoolError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        PoolError::Poisoned(err.to_string())
    }
}

/// Errors raised while setting up or running the socket server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Socket creation, bind or listen failed.
    #[error("socket server I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<nix::errno::Errno> for ServerError {
    fn from(err: nix::errno::Errno) -> Self {
        ServerError::Io(std::io::Error::from_raw_os_error(err as i32))
    }
}
