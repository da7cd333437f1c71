//! Filesystem-backed driver: ground truth about which children exist.
//!
//! The driver owns a root directory (by default `./projects` under the
//! daemon's working directory) with one subdirectory per project:
//!
//! ```text
//! <root>/<project>/meta            JSON-serialized project settings
//! <root>/<project>/<service>/log   child stdout+stderr, append-only
//! <root>/<project>/<service>/meta  "<pid>\n<c_time>" as decimal lines
//! ```
//!
//! A recorded PID counts as running only when the OS knows the PID *and*
//! its creation time matches the recorded `c_time`; a bare PID check would
//! mistake a recycled PID for our child after a daemon restart.

use std::{fs, path::PathBuf};

use tracing::{debug, error, info};

use crate::{
    constants::{LOG_FILE_NAME, META_FILE_NAME},
    error::DriverError,
    process::{self, ProcessDescriptor},
    settings::{EnvMap, ProjectSettings, ServiceSettings},
};

/// Result of a state-changing operation that may legitimately be a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The operation changed daemon or OS state.
    Changed,
    /// The operation was accepted but nothing needed to happen.
    NoAction,
}

/// Driver-level view of one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DServiceStatus {
    /// No metadata recorded; the service was never launched here.
    None,
    /// The recorded PID is alive and matches its recorded creation time.
    Running,
    /// Metadata exists but the recorded PID is gone or recycled.
    Stopped,
}

/// Snapshot of one service's on-disk and OS state.
#[derive(Debug, Clone)]
pub struct DServiceInfo {
    /// Liveness classification.
    pub status: DServiceStatus,
    /// The recorded PID, if any was ever recorded.
    pub pid: Option<u32>,
    /// Canonicalized log file path, when the file exists.
    pub logfile_path: Option<PathBuf>,
    /// Creation time recorded at the last launch.
    pub start_time: i64,
}

/// The persisted `{pid, c_time}` pair for one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ServiceMetadata {
    pid: u32,
    c_time: i64,
}

/// Filesystem driver rooted at a projects directory.
#[derive(Debug)]
pub struct Driver {
    root: PathBuf,
}

impl Driver {
    /// Creates a driver over the given root directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Driver { root: root.into() }
    }

    /// Ensures the root directory exists and is readable.
    pub fn mount(&self) -> Result<(), DriverError> {
        fs::create_dir_all(&self.root)?;
        fs::read_dir(&self.root)?;
        info!("Driver mounted");
        Ok(())
    }

    /// Informational counterpart of [`Driver::mount`]; releases nothing.
    pub fn unmount(&self) -> Outcome {
        info!("Driver unmounted");
        Outcome::NoAction
    }

    /// Returns the raw textual contents of every stored project `meta`
    /// file. Entries that cannot be read are logged and skipped.
    pub fn stored_settings(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };

        let mut documents = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }

            let meta_path = self.root.join(&name).join(META_FILE_NAME);
            match fs::read_to_string(&meta_path) {
                Ok(content) => documents.push(content),
                Err(_) => error!("Unable to load settings from {:?}", meta_path),
            }
        }

        documents
    }

    /// Creates the project directory, persists its settings and prepares a
    /// directory and log file for each service. Re-initialization overwrites
    /// the settings and fills in any missing service directories.
    pub fn project_init(&self, settings: &ProjectSettings) -> Result<Outcome, DriverError> {
        fs::create_dir_all(self.project_dir(&settings.name))?;
        fs::write(
            self.project_meta_path(&settings.name),
            settings.stringify(),
        )?;

        for service in &settings.services {
            fs::create_dir_all(self.service_dir(&settings.name, &service.name))?;
            fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(self.service_logfile_path(&settings.name, &service.name))?;
        }

        Ok(Outcome::Changed)
    }

    /// Deletes every service's files and directory, then the project's meta
    /// file and directory. Succeeds only if the project directory is gone
    /// afterwards.
    pub fn project_remove(&self, settings: &ProjectSettings) -> Result<Outcome, DriverError> {
        for service in &settings.services {
            let _ = fs::remove_file(self.service_meta_path(&settings.name, &service.name));
            let _ = fs::remove_file(self.service_logfile_path(&settings.name, &service.name));
            let _ = fs::remove_dir(self.service_dir(&settings.name, &service.name));
        }

        let _ = fs::remove_file(self.project_meta_path(&settings.name));

        let project_dir = self.project_dir(&settings.name);
        let _ = fs::remove_dir(&project_dir);

        if project_dir.exists() {
            error!("Unable to remove project directory {:?}", project_dir);
            return Err(std::io::Error::other("project directory still present").into());
        }

        Ok(Outcome::Changed)
    }

    /// Reports the service's liveness, recorded PID and log location.
    /// A service that was never launched reports no log path even though
    /// project init pre-creates the file; the log only becomes interesting
    /// once a child could have written to it.
    pub fn service_info(&self, proj_name: &str, serv_name: &str) -> DServiceInfo {
        let (status, pid, start_time) = match self.read_service_meta(proj_name, serv_name) {
            None => (DServiceStatus::None, None, 0),
            Some(meta) if process::pid_matches(meta.pid, meta.c_time) => {
                (DServiceStatus::Running, Some(meta.pid), meta.c_time)
            }
            Some(meta) => (DServiceStatus::Stopped, Some(meta.pid), meta.c_time),
        };

        let logfile_path = if status == DServiceStatus::None {
            None
        } else {
            fs::canonicalize(self.service_logfile_path(proj_name, serv_name)).ok()
        };

        DServiceInfo {
            status,
            pid,
            logfile_path,
            start_time,
        }
    }

    /// Launches the service unless its recorded PID is still alive.
    ///
    /// On success the fresh PID and its OS-reported creation time are
    /// persisted. If the metadata cannot be written, the child is killed
    /// again so no untracked process survives.
    pub fn service_start(
        &self,
        project: &ProjectSettings,
        service: &ServiceSettings,
        extra_env: &EnvMap,
    ) -> Result<Outcome, DriverError> {
        if self.running_service(&project.name, &service.name).is_some() {
            return Ok(Outcome::NoAction);
        }

        let logfile_path = self.service_logfile_path(&project.name, &service.name);
        let pd = ProcessDescriptor::compose(project, service, extra_env, &logfile_path);
        let pid = process::process_start(&pd)?;

        let c_time = process::pid_ctime(pid).unwrap_or(0);
        let meta = ServiceMetadata { pid, c_time };

        if let Err(err) = self.write_service_meta(&project.name, &service.name, meta) {
            error!(
                "Unable to write service meta for '{}', killing fresh PID {}",
                pd.id, pid
            );
            let _ = process::process_kill(pid, c_time, &pd.id);
            return Err(err);
        }

        Ok(Outcome::Changed)
    }

    /// Stops the service's process group if its recorded PID is alive.
    /// The metadata stays in place; liveness checks classify the service
    /// as stopped once the group is gone.
    pub fn service_stop(
        &self,
        proj_name: &str,
        service: &ServiceSettings,
    ) -> Result<Outcome, DriverError> {
        let Some(meta) = self.running_service(proj_name, &service.name) else {
            return Ok(Outcome::NoAction);
        };

        let id = format!("{}/{}", proj_name, service.name);
        debug!("Stopping process '{} - {}'", id, meta.pid);
        process::process_kill(meta.pid, meta.c_time, &id)?;

        Ok(Outcome::Changed)
    }

    /// Truncates the service's log file to zero length; absent log files
    /// are a no-op.
    pub fn service_clear_logs(
        &self,
        proj_name: &str,
        serv_name: &str,
    ) -> Result<Outcome, DriverError> {
        let logfile_path = self.service_logfile_path(proj_name, serv_name);
        if !logfile_path.exists() {
            return Ok(Outcome::NoAction);
        }

        fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&logfile_path)?;

        Ok(Outcome::Changed)
    }

    /// Recorded metadata, but only when the PID is verifiably ours.
    fn running_service(&self, proj_name: &str, serv_name: &str) -> Option<ServiceMetadata> {
        self.read_service_meta(proj_name, serv_name)
            .filter(|meta| process::pid_matches(meta.pid, meta.c_time))
    }

    fn read_service_meta(&self, proj_name: &str, serv_name: &str) -> Option<ServiceMetadata> {
        let content = fs::read_to_string(self.service_meta_path(proj_name, serv_name)).ok()?;
        let mut lines = content.lines();

        let pid = lines.next()?.trim().parse::<u32>().ok().filter(|pid| *pid != 0)?;
        let c_time = lines.next()?.trim().parse::<i64>().ok().filter(|t| *t != 0)?;
        // Legacy records carry a third stop-time line; ignore anything extra.

        Some(ServiceMetadata { pid, c_time })
    }

    fn write_service_meta(
        &self,
        proj_name: &str,
        serv_name: &str,
        meta: ServiceMetadata,
    ) -> Result<(), DriverError> {
        fs::write(
            self.service_meta_path(proj_name, serv_name),
            format!("{}\n{}", meta.pid, meta.c_time),
        )?;
        Ok(())
    }

    fn project_dir(&self, proj_name: &str) -> PathBuf {
        self.root.join(proj_name)
    }

    fn project_meta_path(&self, proj_name: &str) -> PathBuf {
        self.project_dir(proj_name).join(META_FILE_NAME)
    }

    fn service_dir(&self, proj_name: &str, serv_name: &str) -> PathBuf {
        self.project_dir(proj_name).join(serv_name)
    }

    fn service_meta_path(&self, proj_name: &str, serv_name: &str) -> PathBuf {
        self.service_dir(proj_name, serv_name).join(META_FILE_NAME)
    }

    /// Path of the service's log file; public so callers can locate logs
    /// without duplicating layout knowledge.
    pub fn service_logfile_path(&self, proj_name: &str, serv_name: &str) -> PathBuf {
        self.service_dir(proj_name, serv_name).join(LOG_FILE_NAME)
    }
}
