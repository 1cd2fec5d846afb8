//! Flattened process manifest

use crate::substitution::RuntimeEnvironment;
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path, str::FromStr};

/// Where a child's output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Forward lines to the orchestrator's stdout/stderr, tagged with the name
    Screen,
    /// Forward stdout to the logger at debug level and stderr to the
    /// orchestrator's stderr, tagged with the name
    #[default]
    Log,
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "screen" | "both" => Ok(OutputMode::Screen),
            "log" => Ok(OutputMode::Log),
            other => Err(format!("unknown output mode '{}'", other)),
        }
    }
}

/// A fully resolved process to start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub package: Option<String>,
    pub executable: String,
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub arguments: Vec<String>,
    pub parameters: Vec<(String, String)>,
    /// Files whose parameters were merged into `parameters`
    pub param_files: Vec<String>,
    pub env: Vec<(String, String)>,
    pub output: OutputMode,
    pub critical: bool,
}

impl ProcessSpec {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            package: None,
            executable: executable.into(),
            name: None,
            namespace: None,
            arguments: Vec::new(),
            parameters: Vec::new(),
            param_files: Vec::new(),
            env: Vec::new(),
            output: OutputMode::default(),
            critical: false,
        }
    }

    /// Name used to tag output and report exits: the declared name, or the
    /// executable when none was declared.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.executable)
    }

    /// Insert or replace a parameter, keeping first-insertion order.
    pub fn set_parameter(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.parameters.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.parameters.push((key, value)),
        }
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Full argv for this process.
    ///
    /// Packaged executables are looked up as `<prefix>/lib/<package>/<exe>`
    /// under `AMENT_PREFIX_PATH`; anything else is left for `PATH` lookup at
    /// spawn time. Name, namespace and parameters follow a `--ros-args`
    /// delimiter. Parameter files are already merged into `parameters`.
    pub fn command_line(&self, env: &RuntimeEnvironment) -> Vec<String> {
        let mut cmd = vec![self.program(env)];
        cmd.extend(self.arguments.iter().cloned());

        let has_node_args =
            self.name.is_some() || self.namespace.is_some() || !self.parameters.is_empty();
        if !has_node_args {
            return cmd;
        }

        cmd.push("--ros-args".to_string());
        if let Some(name) = &self.name {
            cmd.push("-r".to_string());
            cmd.push(format!("__node:={}", name));
        }
        if let Some(namespace) = &self.namespace {
            cmd.push("-r".to_string());
            cmd.push(format!("__ns:={}", namespace));
        }
        for (key, value) in &self.parameters {
            cmd.push("-p".to_string());
            cmd.push(format!("{}:={}", key, value));
        }
        cmd
    }

    fn program(&self, env: &RuntimeEnvironment) -> String {
        if let Some(package) = &self.package {
            for prefix in env.search_path("AMENT_PREFIX_PATH") {
                let candidate = Path::new(prefix)
                    .join("lib")
                    .join(package)
                    .join(&self.executable);
                if candidate.is_file() {
                    return candidate.to_string_lossy().into_owned();
                }
            }
            log::debug!(
                "Executable '{}' not found in package '{}', falling back to PATH",
                self.executable,
                package
            );
        }
        self.executable.clone()
    }
}

impl fmt::Display for ProcessSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.package {
            Some(package) => write!(f, "{} ({}/{})", self.display_name(), package, self.executable),
            None => write!(f, "{} ({})", self.display_name(), self.executable),
        }
    }
}

/// Ordered set of processes produced by composition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub processes: Vec<ProcessSpec>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessSpec> {
        self.processes.iter()
    }

    /// First process whose display name is `name`.
    pub fn find(&self, name: &str) -> Option<&ProcessSpec> {
        self.processes.iter().find(|p| p.display_name() == name)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
