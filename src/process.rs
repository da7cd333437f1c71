//! Child process launch and termination for supervised services.
//!
//! The launcher composes a full process descriptor (argument vector, working
//! directory, environment, log redirection target) from the project and
//! service settings, spawns the child in its own process group and reports
//! the new PID. Termination escalates `SIGTERM` into `SIGKILL` against the
//! whole group, bounded by a fixed retry budget.

use std::{
    fs::OpenOptions,
    os::unix::{fs::OpenOptionsExt, process::CommandExt},
    path::{Path, PathBuf},
    process::Command,
    thread,
};

use nix::{
    sys::signal::{Signal, killpg},
    unistd::Pid,
};
use tracing::debug;

use crate::{
    constants::{KILL_MAX_ATTEMPTS, KILL_RETRY_DELAY, KILL_TERM_ATTEMPTS, LOG_FILE_MODE},
    error::DriverError,
    settings::{EnvMap, ProjectSettings, ServiceSettings},
};

/// Everything needed to launch one supervised child.
#[derive(Debug, Clone)]
pub struct ProcessDescriptor {
    /// `<project>/<service>`, used in log lines only.
    pub id: String,
    /// Argument vector; element 0 is the program, resolved via `PATH`.
    pub command: Vec<String>,
    /// Working directory for the child; `None` inherits the daemon's.
    pub pwd: Option<PathBuf>,
    /// Fully composed environment applied on top of the daemon's own.
    pub env: EnvMap,
    /// Log file receiving the child's stdout and stderr.
    pub logfile_path: PathBuf,
}

impl ProcessDescriptor {
    /// Composes a descriptor from the service settings and its project
    /// context.
    ///
    /// The working directory is the service `pwd` when absolute, otherwise
    /// the project `cwd` joined with it; an absent or empty `pwd` inherits
    /// the daemon's directory. Environment scopes merge first-writer-wins
    /// in the order service, project, caller.
    pub fn compose(
        project: &ProjectSettings,
        service: &ServiceSettings,
        extra_env: &EnvMap,
        logfile_path: &Path,
    ) -> Self {
        let pwd = match service.pwd.as_deref() {
            None | Some("") => None,
            Some(dir) => {
                let dir = Path::new(dir);
                if dir.is_absolute() {
                    Some(dir.to_path_buf())
                } else {
                    Some(Path::new(&project.cwd).join(dir))
                }
            }
        };

        let mut env = service.env.clone();
        for (key, value) in project.env.iter().chain(extra_env.iter()) {
            env.entry(key.clone()).or_insert_with(|| value.clone());
        }

        ProcessDescriptor {
            id: format!("{}/{}", project.name, service.name),
            command: service.command.clone(),
            pwd,
            env,
            logfile_path: logfile_path.to_path_buf(),
        }
    }
}

/// Spawns the described child and returns its PID.
///
/// stdout and stderr are appended to the log file; the child becomes the
/// leader of a fresh process group so later signals reach everything the
/// command itself spawns. The child is never waited on here: the daemon
/// ignores `SIGCHLD`, so the OS reaps it.
pub fn process_start(pd: &ProcessDescriptor) -> Result<u32, DriverError> {
    let logfile = OpenOptions::new()
        .append(true)
        .create(true)
        .mode(LOG_FILE_MODE)
        .open(&pd.logfile_path)?;

    debug!("Starting process '{}'", pd.id);

    let mut command = Command::new(&pd.command[0]);
    command
        .args(&pd.command[1..])
        .stdout(logfile.try_clone()?)
        .stderr(logfile)
        .envs(&pd.env)
        .process_group(0);
    if let Some(pwd) = &pd.pwd {
        command.current_dir(pwd);
    }

    let child = command.spawn().map_err(|err| DriverError::Proc {
        id: pd.id.clone(),
        detail: format!("unable to execute: {err}"),
    })?;

    Ok(child.id())
}

/// Terminates the child's process group, escalating from `SIGTERM` to
/// `SIGKILL` within a bounded budget.
///
/// Succeeds as soon as the liveness check turns false; exhausting the
/// budget is a process error.
pub fn process_kill(pid: u32, c_time: i64, id: &str) -> Result<(), DriverError> {
    if !pid_matches(pid, c_time) {
        return Ok(());
    }

    for attempt in 0..KILL_MAX_ATTEMPTS {
        let signal = if attempt < KILL_TERM_ATTEMPTS {
            Signal::SIGTERM
        } else {
            Signal::SIGKILL
        };

        // The group may already be gone; a failed send is not an error as
        // long as the liveness check agrees.
        let _ = killpg(Pid::from_raw(pid as i32), signal);

        thread::sleep(KILL_RETRY_DELAY);

        if !pid_matches(pid, c_time) {
            return Ok(());
        }
    }

    Err(DriverError::Proc {
        id: id.to_string(),
        detail: format!("kill escalation budget exhausted for PID {pid}"),
    })
}

/// Reports the OS-recorded creation time of a live PID, or `None` when no
/// such process exists.
///
/// PIDs wrap, so liveness of a recorded child is always judged by comparing
/// this value against the creation time captured at launch.
#[cfg(target_os = "linux")]
pub fn pid_ctime(pid: u32) -> Option<i64> {
    use std::os::unix::fs::MetadataExt;

    std::fs::metadata(format!("/proc/{pid}"))
        .ok()
        .map(|meta| meta.ctime())
}

/// Fallback liveness probe for kernels without `/proc`: a null signal tells
/// us whether the PID exists. The creation time is pinned to a fixed
/// nonzero value on both the record and check sides so the comparison
/// stays meaningful (zero is the meta reader's "never launched" sentinel).
#[cfg(not(target_os = "linux"))]
pub fn pid_ctime(pid: u32) -> Option<i64> {
    nix::sys::signal::kill(Pid::from_raw(pid as i32), None)
        .ok()
        .map(|_| 1)
}

/// True when the PID exists and its creation time matches the recorded one.
pub fn pid_matches(pid: u32, c_time: i64) -> bool {
    pid_ctime(pid) == Some(c_time)
}
