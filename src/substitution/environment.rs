//! Runtime environment consulted during resolution

use std::{collections::HashMap, time::Duration};

/// Default bound on a single `$(command ...)` substitution.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Read-only view of the process environment for one launch invocation.
///
/// The OS environment is snapshotted when the value is created so that every
/// lookup during a launch sees the same variables, and so tests can supply
/// their own variables without touching the real process environment.
#[derive(Debug, Clone)]
pub struct RuntimeEnvironment {
    vars: HashMap<String, String>,
    command_timeout: Duration,
}

impl RuntimeEnvironment {
    /// Snapshot the current process environment.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// An environment with no variables at all.
    pub fn empty() -> Self {
        Self {
            vars: HashMap::new(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn without_var(mut self, name: &str) -> Self {
        self.vars.remove(name);
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn vars(&self) -> &HashMap<String, String> {
        &self.vars
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Entries of a colon separated search path variable such as
    /// `AMENT_PREFIX_PATH`, skipping empty entries.
    pub fn search_path(&self, name: &str) -> Vec<&str> {
        self.get(name)
            .map(|value| value.split(':').filter(|p| !p.is_empty()).collect())
            .unwrap_or_default()
    }
}

impl Default for RuntimeEnvironment {
    fn default() -> Self {
        Self::from_process()
    }
}
