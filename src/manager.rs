//! In-memory concurrent registry of projects orchestrating the driver.
//!
//! The manager is the single mutable hub: a store of projects guarded by a
//! store-wide lock, each project carrying its own lock. Callers always take
//! the store lock first, locate the project, take the project's lock and
//! release the store lock before any driver work, so a slow fork or signal
//! escalation on one project never blocks the others. Structural mutations
//! (upsert, remove) hold both locks for the store update itself.

use std::sync::{Arc, Mutex};

use tracing::{error, info};

use crate::{
    driver::{DServiceStatus, Driver, Outcome},
    error::{DriverError, ManagerError},
    settings::{EnvMap, ProjectSettings},
};

/// Human-readable service state exposed over the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    /// Never launched here.
    Idle,
    /// Alive and verified as ours.
    Running,
    /// Launched before, not running now.
    Stopped,
}

impl ServiceStatus {
    /// Protocol spelling of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Idle => "IDLE",
            ServiceStatus::Running => "RUNNING",
            ServiceStatus::Stopped => "STOPPED",
        }
    }
}

/// Snapshot of one service as reported to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    /// Service name.
    pub name: String,
    /// Current liveness classification.
    pub status: ServiceStatus,
    /// Recorded PID; `0` when the service was never launched.
    pub pid: u32,
    /// Absolute log file path, when the log exists.
    pub logfile_path: Option<String>,
    /// Creation time recorded at the last launch.
    pub start_time: i64,
    /// Stop time; the current driver does not record it and reports `0`.
    pub stop_time: i64,
}

/// Snapshot of one project and all of its services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectInfo {
    /// Project name.
    pub name: String,
    /// Per-service snapshots in declaration order.
    pub services: Vec<ServiceInfo>,
}

/// A stored project: immutable settings plus the lock serializing all
/// driver work done on the project's behalf.
struct Project {
    settings: ProjectSettings,
    gate: Mutex<()>,
}

impl Project {
    fn new(settings: ProjectSettings) -> Arc<Self> {
        Arc::new(Project {
            settings,
            gate: Mutex::new(()),
        })
    }
}

/// The concurrent project registry.
pub struct Manager {
    driver: Driver,
    store: Mutex<Vec<Arc<Project>>>,
}

impl Manager {
    /// Creates a manager over the given driver with an empty store.
    pub fn new(driver: Driver) -> Self {
        Manager {
            driver,
            store: Mutex::new(Vec::new()),
        }
    }

    /// Mounts the driver and loads every persisted project, stopping any
    /// children left over from an abrupt prior shutdown before declaring
    /// the manager started. Malformed settings documents are logged and
    /// skipped.
    pub fn init(&self) -> Result<(), ManagerError> {
        self.driver.mount()?;

        let mut store = self.store.lock()?;
        for document in self.driver.stored_settings() {
            let settings = match ProjectSettings::parse(&document) {
                Ok(settings) => settings,
                Err(err) => {
                    error!("Unable to parse stored settings '{document}': {err}");
                    continue;
                }
            };

            info!("Loaded stored project '{}'", settings.name);
            let project = Project::new(settings);
            {
                let _gate = project.gate.lock()?;
                if let Err(err) = services_stop(&self.driver, &project.settings) {
                    error!(
                        "Unable to stop leftover services of '{}': {err}",
                        project.settings.name
                    );
                }
            }
            store.push(project);
        }
        drop(store);

        info!("Manager initialized");
        Ok(())
    }

    /// Stops every service of every project and releases the store.
    pub fn stop(&self) -> Result<(), ManagerError> {
        let mut store = self.store.lock()?;
        for project in store.iter() {
            let _gate = project.gate.lock()?;
            if let Err(err) = services_stop(&self.driver, &project.settings) {
                error!(
                    "Unable to stop services of '{}': {err}",
                    project.settings.name
                );
            }
        }
        store.clear();
        drop(store);

        self.driver.unmount();
        info!("Manager stopped");
        Ok(())
    }

    /// Deep-copies the settings of every stored project, newest first.
    pub fn projects_settings(&self) -> Result<Vec<ProjectSettings>, ManagerError> {
        let store = self.store.lock()?;
        let mut settings = Vec::with_capacity(store.len());
        for project in store.iter() {
            let _gate = project.gate.lock()?;
            settings.push(project.settings.clone());
        }
        Ok(settings)
    }

    /// Computes a status snapshot of every stored project, newest first.
    pub fn projects_info(&self) -> Result<Vec<ProjectInfo>, ManagerError> {
        let store = self.store.lock()?;
        let mut infos = Vec::with_capacity(store.len());
        for project in store.iter() {
            let _gate = project.gate.lock()?;
            infos.push(project_info_create(&self.driver, &project.settings));
        }
        Ok(infos)
    }

    /// Deep-copies one project's settings.
    pub fn project_settings(&self, proj_name: &str) -> Result<ProjectSettings, ManagerError> {
        self.with_project(proj_name, |_, settings| settings.clone())
    }

    /// Computes one project's status snapshot.
    pub fn project_info(&self, proj_name: &str) -> Result<ProjectInfo, ManagerError> {
        self.with_project(proj_name, |driver, settings| {
            project_info_create(driver, settings)
        })
    }

    /// Inserts a project or replaces its namesake. A replaced project has
    /// all of its services stopped and its driver state removed before the
    /// new project becomes visible; the store keeps the newest entry first.
    pub fn project_upsert(&self, settings: ProjectSettings) -> Result<Outcome, ManagerError> {
        let mut store = self.store.lock()?;

        if let Some(pos) = store
            .iter()
            .position(|p| p.settings.name == settings.name)
        {
            let project = store[pos].clone();
            let _gate = project.gate.lock()?;
            services_stop(&self.driver, &project.settings)?;
            self.driver.project_remove(&project.settings)?;
            store.remove(pos);
        }

        self.driver.project_init(&settings)?;
        store.insert(0, Project::new(settings));

        Ok(Outcome::Changed)
    }

    /// Starts every service of the project; see [`worst`] for how the
    /// per-service results aggregate.
    pub fn project_start(
        &self,
        proj_name: &str,
        env: &EnvMap,
    ) -> Result<Outcome, ManagerError> {
        self.with_project(proj_name, |driver, settings| {
            services_start(driver, settings, env)
        })?
        .map_err(Into::into)
    }

    /// Stops then starts every service of the project.
    pub fn project_restart(
        &self,
        proj_name: &str,
        env: &EnvMap,
    ) -> Result<Outcome, ManagerError> {
        self.with_project(proj_name, |driver, settings| {
            services_stop(driver, settings)?;
            services_start(driver, settings, env)?;
            Ok::<_, DriverError>(Outcome::Changed)
        })?
        .map_err(Into::into)
    }

    /// Stops every service of the project.
    pub fn project_stop(&self, proj_name: &str) -> Result<Outcome, ManagerError> {
        self.with_project(proj_name, |driver, settings| {
            services_stop(driver, settings)
        })?
        .map_err(Into::into)
    }

    /// Truncates the log of every service of the project.
    pub fn project_clear_logs(&self, proj_name: &str) -> Result<Outcome, ManagerError> {
        self.with_project(proj_name, |driver, settings| {
            services_clear_logs(driver, settings)
        })?
        .map_err(Into::into)
    }

    /// Stops every service, removes the project from the driver and drops
    /// it from the store.
    pub fn project_remove(&self, proj_name: &str) -> Result<Outcome, ManagerError> {
        let mut store = self.store.lock()?;
        let Some(pos) = store.iter().position(|p| p.settings.name == proj_name) else {
            return Err(ManagerError::ProjectNotFound);
        };

        let project = store[pos].clone();
        let _gate = project.gate.lock()?;
        services_stop(&self.driver, &project.settings)?;
        self.driver.project_remove(&project.settings)?;
        store.remove(pos);

        Ok(Outcome::Changed)
    }

    /// Computes one service's status snapshot.
    pub fn service_info(
        &self,
        proj_name: &str,
        serv_name: &str,
    ) -> Result<ServiceInfo, ManagerError> {
        self.with_project(proj_name, |driver, settings| {
            settings
                .service(serv_name)
                .ok_or(ManagerError::ServiceNotFound)
                .map(|service| service_info_create(driver, &settings.name, &service.name))
        })?
    }

    /// Starts one service with the full project context.
    pub fn service_start(
        &self,
        proj_name: &str,
        serv_name: &str,
        env: &EnvMap,
    ) -> Result<Outcome, ManagerError> {
        self.with_project(proj_name, |driver, settings| {
            let service = settings
                .service(serv_name)
                .ok_or(ManagerError::ServiceNotFound)?;
            Ok(driver.service_start(settings, service, env)?)
        })?
    }

    /// Stops then starts one service.
    pub fn service_restart(
        &self,
        proj_name: &str,
        serv_name: &str,
        env: &EnvMap,
    ) -> Result<Outcome, ManagerError> {
        self.with_project(proj_name, |driver, settings| {
            let service = settings
                .service(serv_name)
                .ok_or(ManagerError::ServiceNotFound)?;
            driver.service_stop(&settings.name, service)?;
            driver.service_start(settings, service, env)?;
            Ok(Outcome::Changed)
        })?
    }

    /// Stops one service.
    pub fn service_stop(
        &self,
        proj_name: &str,
        serv_name: &str,
    ) -> Result<Outcome, ManagerError> {
        self.with_project(proj_name, |driver, settings| {
            let service = settings
                .service(serv_name)
                .ok_or(ManagerError::ServiceNotFound)?;
            Ok(driver.service_stop(&settings.name, service)?)
        })?
    }

    /// Truncates one service's log.
    pub fn service_clear_logs(
        &self,
        proj_name: &str,
        serv_name: &str,
    ) -> Result<Outcome, ManagerError> {
        self.with_project(proj_name, |driver, settings| {
            let service = settings
                .service(serv_name)
                .ok_or(ManagerError::ServiceNotFound)?;
            Ok(driver.service_clear_logs(&settings.name, &service.name)?)
        })?
    }

    /// Runs `f` with the project's lock held and the store lock already
    /// released. The project lock is acquired under the store lock, so a
    /// concurrent upsert or remove cannot interleave with the lookup.
    fn with_project<T>(
        &self,
        proj_name: &str,
        f: impl FnOnce(&Driver, &ProjectSettings) -> T,
    ) -> Result<T, ManagerError> {
        let store = self.store.lock()?;
        let Some(project) = store
            .iter()
            .find(|p| p.settings.name == proj_name)
            .cloned()
        else {
            return Err(ManagerError::ProjectNotFound);
        };

        let gate = project.gate.lock();
        drop(store);
        let _gate = gate?;

        Ok(f(&self.driver, &project.settings))
    }
}

/// Folds two per-service results into the project-level one under the
/// ordering `driver error < changed < no action`: errors dominate (the
/// first one wins), and a single changed service outweighs any number of
/// no-ops.
fn worst(
    aggregate: Result<Outcome, DriverError>,
    next: Result<Outcome, DriverError>,
) -> Result<Outcome, DriverError> {
    match (aggregate, next) {
        (Err(err), _) => Err(err),
        (Ok(_), Err(err)) => Err(err),
        (Ok(Outcome::Changed), Ok(_)) => Ok(Outcome::Changed),
        (Ok(Outcome::NoAction), Ok(outcome)) => Ok(outcome),
    }
}

fn services_start(
    driver: &Driver,
    project: &ProjectSettings,
    env: &EnvMap,
) -> Result<Outcome, DriverError> {
    let mut aggregate = Ok(Outcome::NoAction);
    for service in &project.services {
        aggregate = worst(aggregate, driver.service_start(project, service, env));
    }
    aggregate
}

fn services_stop(driver: &Driver, project: &ProjectSettings) -> Result<Outcome, DriverError> {
    let mut aggregate = Ok(Outcome::NoAction);
    for service in &project.services {
        aggregate = worst(aggregate, driver.service_stop(&project.name, service));
    }
    aggregate
}

fn services_clear_logs(
    driver: &Driver,
    project: &ProjectSettings,
) -> Result<Outcome, DriverError> {
    let mut aggregate = Ok(Outcome::NoAction);
    for service in &project.services {
        aggregate = worst(
            aggregate,
            driver.service_clear_logs(&project.name, &service.name),
        );
    }
    aggregate
}

fn project_info_create(driver: &Driver, settings: &ProjectSettings) -> ProjectInfo {
    ProjectInfo {
        name: settings.name.clone(),
        services: settings
            .services
            .iter()
            .map(|service| service_info_create(driver, &settings.name, &service.name))
            .collect(),
    }
}

fn service_info_create(driver: &Driver, proj_name: &str, serv_name: &str) -> ServiceInfo {
    let d_info = driver.service_info(proj_name, serv_name);

    let status = match d_info.status {
        DServiceStatus::Running => ServiceStatus::Running,
        DServiceStatus::Stopped => ServiceStatus::Stopped,
        DServiceStatus::None => ServiceStatus::Idle,
    };

    ServiceInfo {
        name: serv_name.to_string(),
        status,
        pid: d_info.pid.unwrap_or(0),
        logfile_path: d_info
            .logfile_path
            .map(|path| path.to_string_lossy().into_owned()),
        start_time: d_info.start_time,
        stop_time: 0,
    }
}
