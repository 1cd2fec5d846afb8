//! Error types for scene_launch

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("XML parsing error: {0}")]
    XmlError(#[from] roxmltree::Error),

    #[error("Missing required attribute '{attribute}' on element '<{element}>'")]
    MissingAttribute { element: String, attribute: String },

    #[error("Type coercion failed for attribute '{attribute}' with value '{value}' (expected {expected_type})")]
    TypeCoercion {
        attribute: String,
        value: String,
        expected_type: &'static str,
    },

    #[error("Unexpected element '<{child}>' in '<{parent}>'")]
    UnexpectedElement { parent: String, child: String },

    #[error("Invalid substitution syntax: {0}")]
    InvalidSubstitution(String),

    #[error("Invalid parameter file {path}: {message}")]
    InvalidParamFile { path: String, message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum SubstitutionError {
    #[error("Undefined variable: '{0}'. Did you forget to declare it with <arg>?")]
    UndefinedVariable(String),

    #[error(
        "Undefined environment variable: '{0}'. Make sure the variable is set in your environment."
    )]
    UndefinedEnvVar(String),

    #[error("Package '{0}' not found. Ensure the package is installed and sourced.")]
    PackageNotFound(String),

    #[error("Invalid substitution: {0}")]
    InvalidSubstitution(String),

    #[error("Command not found: '{command}': {source}")]
    CommandNotFound {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command '{command}' failed with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Command '{command}' did not finish within {timeout:?}")]
    CommandTimeout { command: String, timeout: Duration },

    #[error("No case matches value '{value}' (cases: {cases:?})")]
    NoMatchingCase { value: String, cases: Vec<String> },

    #[error("Invalid condition value '{0}' (expected true/false)")]
    InvalidCondition(String),
}

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Argument '{0}' is already declared in this scope")]
    DuplicateArgument(String),

    #[error("Argument '{0}' has no value: no override was given and it declares no default")]
    UnresolvedArgument(String),

    #[error("Argument '{name}' got '{value}', expected one of {choices:?}")]
    InvalidChoice {
        name: String,
        value: String,
        choices: Vec<String>,
    },

    #[error("Substitution error: {0}")]
    Resolution(#[from] SubstitutionError),

    #[error("Included description '{locator}' not found: {reason}")]
    IncludeNotFound { locator: String, reason: String },

    #[error("Include cycle detected: {}", chain.join(" -> "))]
    IncludeCycle { chain: Vec<String> },

    #[error("Failed to parse '{locator}': {source}")]
    Parse {
        locator: String,
        #[source]
        source: ParseError,
    },

    #[error("Failed to spawn process '{name}': {source}")]
    ProcessSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Critical process '{name}' exited unexpectedly ({status})")]
    UnexpectedExit { name: String, status: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("In {action}: {source}")]
    Action {
        action: String,
        #[source]
        source: Box<LaunchError>,
    },
}

impl LaunchError {
    /// Attach the identity of the action that produced this error.
    ///
    /// Only the innermost action is recorded; the cause chain already shows
    /// the nesting of includes.
    pub fn in_action(self, action: impl Into<String>) -> Self {
        match self {
            err @ LaunchError::Action { .. } => err,
            err => LaunchError::Action {
                action: action.into(),
                source: Box::new(err),
            },
        }
    }

    /// The error with any action context stripped.
    pub fn root(&self) -> &LaunchError {
        match self {
            LaunchError::Action { source, .. } => source.root(),
            err => err,
        }
    }

    /// Process exit code used by the command line front end.
    pub fn exit_code(&self) -> i32 {
        match self.root() {
            LaunchError::UnexpectedExit { .. } => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, LaunchError>;
