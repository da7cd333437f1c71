//! Line-oriented command protocol mapped onto manager operations.
//!
//! A request is a sequence of newline-separated tokens: the verb first,
//! positional arguments after. The dispatch table is declarative — verb,
//! arity, handler — so adding a verb is a one-line change. Responses start
//! with `OK` or `ERROR`; state-changing verbs echo the post-change info so
//! clients see the effect without a second round trip.

use std::sync::Arc;

use crate::{
    error::ManagerError,
    manager::{Manager, ServiceInfo},
    settings::{EnvMap, ProjectSettings},
};

type Handler = fn(&Dispatcher, &[&str]) -> String;

/// Verb → arity → handler. Matched case-sensitively, first hit wins.
const COMMANDS: &[(&str, usize, Handler)] = &[
    ("PROJECTS-NAMES", 0, handle_projects_names),
    ("PROJECTS-SETTINGS", 0, handle_projects_settings),
    ("PROJECTS-INFO", 0, handle_projects_info),
    ("PROJECT-SETTINGS", 1, handle_project_settings),
    ("PROJECT-INFO", 1, handle_project_info),
    ("PROJECT-UPSERT", 1, handle_project_upsert),
    ("PROJECT-START", 1, handle_project_start),
    ("PROJECT-RESTART", 1, handle_project_restart),
    ("PROJECT-STOP", 1, handle_project_stop),
    ("PROJECT-CLEAR-LOGS", 1, handle_project_clear_logs),
    ("PROJECT-REMOVE", 1, handle_project_remove),
    ("SERVICES-NAMES", 1, handle_services_names),
    ("SERVICE-INFO", 2, handle_service_info),
    ("SERVICE-START", 2, handle_service_start),
    ("SERVICE-RESTART", 2, handle_service_restart),
    ("SERVICE-STOP", 2, handle_service_stop),
    ("SERVICE-CLEAR-LOGS", 2, handle_service_clear_logs),
];

/// Maps textual requests onto the manager.
pub struct Dispatcher {
    manager: Arc<Manager>,
}

impl Dispatcher {
    /// Creates a dispatcher over the shared manager.
    pub fn new(manager: Arc<Manager>) -> Self {
        Dispatcher { manager }
    }

    /// Tokenizes a request, validates verb and arity, and runs the handler.
    pub fn dispatch(&self, input: &str) -> String {
        let tokens = tokenize(input);
        let Some((verb, args)) = tokens.split_first() else {
            return resp_error("unknown_command");
        };

        for (name, arity, handler) in COMMANDS {
            if verb == name {
                if args.len() != *arity {
                    return resp_error("invalid_argument_count");
                }
                return handler(self, args);
            }
        }

        resp_error("unknown_command")
    }
}

/// Splits a request into lines. A single trailing newline does not produce
/// an empty argument.
fn tokenize(input: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = input.split('\n').collect();
    if tokens.last() == Some(&"") {
        tokens.pop();
    }
    tokens
}

fn resp_ok(payload: &str) -> String {
    if payload.is_empty() {
        "OK".to_string()
    } else {
        format!("OK\n{payload}")
    }
}

fn resp_error(code: &str) -> String {
    format!("ERROR\n{code}")
}

fn error_response(err: &ManagerError) -> String {
    resp_error(match err {
        ManagerError::Driver(_) => "driver_error",
        ManagerError::ProjectNotFound => "project_not_found",
        ManagerError::ServiceNotFound => "service_not_found",
        ManagerError::Poisoned(_) => "manager_error",
    })
}

/// `<name> <STATUS> <pid> <logfile_or_dash>`
fn format_service_info(info: &ServiceInfo) -> String {
    format!(
        "{} {} {} {}",
        info.name,
        info.status.as_str(),
        info.pid,
        info.logfile_path.as_deref().unwrap_or("-")
    )
}

fn handle_projects_names(d: &Dispatcher, _args: &[&str]) -> String {
    match d.manager.projects_settings() {
        Ok(projects) => {
            let names: Vec<&str> = projects.iter().map(|p| p.name.as_str()).collect();
            resp_ok(&names.join("\n"))
        }
        Err(err) => error_response(&err),
    }
}

fn handle_projects_settings(d: &Dispatcher, _args: &[&str]) -> String {
    match d.manager.projects_settings() {
        Ok(projects) => {
            let lines: Vec<String> = projects
                .iter()
                .map(|p| format!("{} {}", p.name, p.stringify()))
                .collect();
            resp_ok(&lines.join("\n"))
        }
        Err(err) => error_response(&err),
    }
}

fn handle_projects_info(d: &Dispatcher, _args: &[&str]) -> String {
    match d.manager.projects_info() {
        Ok(infos) => {
            let mut lines = Vec::new();
            for info in &infos {
                lines.push(info.name.clone());
                for service in &info.services {
                    lines.push(format_service_info(service));
                }
            }
            resp_ok(&lines.join("\n"))
        }
        Err(err) => error_response(&err),
    }
}

fn handle_project_settings(d: &Dispatcher, args: &[&str]) -> String {
    match d.manager.project_settings(args[0]) {
        Ok(settings) => resp_ok(&settings.stringify()),
        Err(err) => error_response(&err),
    }
}

fn handle_project_info(d: &Dispatcher, args: &[&str]) -> String {
    match d.manager.project_info(args[0]) {
        Ok(info) => {
            let lines: Vec<String> =
                info.services.iter().map(format_service_info).collect();
            resp_ok(&lines.join("\n"))
        }
        Err(err) => error_response(&err),
    }
}

fn handle_project_upsert(d: &Dispatcher, args: &[&str]) -> String {
    let settings = match ProjectSettings::parse(args[0]) {
        Ok(settings) => settings,
        Err(err) => return resp_error(&err.to_string()),
    };

    let name = settings.name.clone();
    match d.manager.project_upsert(settings) {
        Ok(_) => handle_project_info(d, &[name.as_str()]),
        Err(err) => error_response(&err),
    }
}

fn handle_project_start(d: &Dispatcher, args: &[&str]) -> String {
    match d.manager.project_start(args[0], &EnvMap::new()) {
        Ok(_) => handle_project_info(d, args),
        Err(err) => error_response(&err),
    }
}

fn handle_project_restart(d: &Dispatcher, args: &[&str]) -> String {
    match d.manager.project_restart(args[0], &EnvMap::new()) {
        Ok(_) => handle_project_info(d, args),
        Err(err) => error_response(&err),
    }
}

fn handle_project_stop(d: &Dispatcher, args: &[&str]) -> String {
    match d.manager.project_stop(args[0]) {
        Ok(_) => handle_project_info(d, args),
        Err(err) => error_response(&err),
    }
}

fn handle_project_clear_logs(d: &Dispatcher, args: &[&str]) -> String {
    match d.manager.project_clear_logs(args[0]) {
        Ok(_) => handle_project_info(d, args),
        Err(err) => error_response(&err),
    }
}

fn handle_project_remove(d: &Dispatcher, args: &[&str]) -> String {
    match d.manager.project_remove(args[0]) {
        Ok(_) => resp_ok(""),
        Err(err) => error_response(&err),
    }
}

fn handle_services_names(d: &Dispatcher, args: &[&str]) -> String {
    match d.manager.project_settings(args[0]) {
        Ok(settings) => {
            let names: Vec<&str> =
                settings.services.iter().map(|s| s.name.as_str()).collect();
            resp_ok(&names.join("\n"))
        }
        Err(err) => error_response(&err),
    }
}

fn handle_service_info(d: &Dispatcher, args: &[&str]) -> String {
    match d.manager.service_info(args[0], args[1]) {
        Ok(info) => resp_ok(&format_service_info(&info)),
        Err(err) => error_response(&err),
    }
}

fn handle_service_start(d: &Dispatcher, args: &[&str]) -> String {
    match d.manager.service_start(args[0], args[1], &EnvMap::new()) {
        Ok(_) => handle_service_info(d, args),
        Err(err) => error_response(&err),
    }
}

fn handle_service_restart(d: &Dispatcher, args: &[&str]) -> String {
    match d.manager.service_restart(args[0], args[1], &EnvMap::new()) {
        Ok(_) => handle_service_info(d, args),
        Err(err) => error_response(&err),
    }
}

fn handle_service_stop(d: &Dispatcher, args: &[&str]) -> String {
    match d.manager.service_stop(args[0], args[1]) {
        Ok(_) => handle_service_info(d, args),
        Err(err) => error_response(&err),
    }
}

fn handle_service_clear_logs(d: &Dispatcher, args: &[&str]) -> String {
    match d.manager.service_clear_logs(args[0], args[1]) {
        Ok(_) => handle_service_info(d, args),
        Err(err) => error_response(&err),
    }
}
