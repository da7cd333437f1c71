//! Project and service settings: JSON parsing, validation and printing.
//!
//! A project is described by a single JSON document persisted verbatim in the
//! project's `meta` file and accepted over the wire by `PROJECT-UPSERT`.
//! Parsing is tolerant of missing fields; validation afterwards produces the
//! dotted machine codes from [`SettingsError`] so clients get a stable,
//! field-precise error payload.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// An environment scope: variable names mapped to values.
///
/// Scopes compose first-writer-wins in the order service, project, caller;
/// see [`crate::process::ProcessDescriptor::compose`].
pub type EnvMap = BTreeMap<String, String>;

/// Immutable descriptor of one supervised service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Service name, unique within its project.
    #[serde(default)]
    pub name: String,

    /// Working directory for the child. Absolute, or relative to the
    /// project's `cwd`; absent or empty means the daemon's own directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pwd: Option<String>,

    /// Argument vector; element 0 is the program.
    #[serde(default)]
    pub command: Vec<String>,

    /// Service-level environment variables.
    #[serde(default)]
    pub env: EnvMap,
}

/// A named group of services sharing a base directory and environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSettings {
    /// Project name, unique within the daemon.
    #[serde(default)]
    pub name: String,

    /// Base directory resolved against relative service `pwd`s.
    #[serde(default)]
    pub cwd: String,

    /// Project-level environment variables.
    #[serde(default)]
    pub env: EnvMap,

    /// The services of this project, in declaration order.
    #[serde(default)]
    pub services: Vec<ServiceSettings>,
}

impl ProjectSettings {
    /// Parses and validates a settings document.
    pub fn parse(data: &str) -> Result<Self, SettingsError> {
        let settings: ProjectSettings =
            serde_json::from_str(data).map_err(|_| SettingsError::Parse)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Serializes the settings back into their canonical JSON form.
    pub fn stringify(&self) -> String {
        // Serialization of these plain data types cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Checks the naming rules, command arity and service uniqueness,
    /// reporting the first violation in field order.
    pub fn validate(&self) -> Result<(), SettingsError> {
        for (pos, service) in self.services.iter().enumerate() {
            if !is_name_valid(&service.name) {
                return Err(SettingsError::InvalidServiceName(service.name.clone()));
            }
            if service.command.is_empty() {
                return Err(SettingsError::InvalidServiceCommand(service.name.clone()));
            }
            if self.services[..pos].iter().any(|s| s.name == service.name) {
                return Err(SettingsError::DuplicateServiceName(service.name.clone()));
            }
        }

        if !is_name_valid(&self.name) {
            return Err(SettingsError::InvalidName);
        }
        if self.cwd.is_empty() {
            return Err(SettingsError::InvalidCwd);
        }
        if self.services.is_empty() {
            return Err(SettingsError::MissingServices);
        }

        Ok(())
    }

    /// Looks up a service by name.
    pub fn service(&self, name: &str) -> Option<&ServiceSettings> {
        self.services.iter().find(|s| s.name == name)
    }
}

/// Parses a freestanding environment document: a JSON object whose values
/// are all strings.
pub fn environment_vars_parse(data: &str) -> Result<EnvMap, SettingsError> {
    serde_json::from_str(data).map_err(|_| SettingsError::EnvParse)
}

/// Project and service names: non-empty, `[A-Za-z0-9_-]` only.
fn is_name_valid(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
