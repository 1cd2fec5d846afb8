//! Substitution types

use crate::{
    condition::Selector,
    error::SubstitutionError,
    substitution::{command, context::LaunchContext},
};
use std::path::{Path, MAIN_SEPARATOR, MAIN_SEPARATOR_STR};

/// A substitution expression, resolved to a string at launch time.
///
/// Lists of substitutions (`Vec<Substitution>`) resolve to the concatenation
/// of their elements in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Substitution {
    /// Plain text (no substitution)
    Text(String),
    /// $(env NAME [default]) - Environment variable with optional default
    Env {
        name: String,
        default: Option<Vec<Substitution>>,
    },
    /// $(var name) - Launch argument
    Argument(String),
    /// $(command ...) - Stdout of a subprocess, trailing whitespace removed
    Command(Vec<Substitution>),
    /// Ordered concatenation of parts
    Concat(Vec<Substitution>),
    /// $(path-join a b ...) - Parts joined with the platform separator
    PathJoin(Vec<Substitution>),
    /// $(find-pkg-share package_name) - Package share directory
    FindPackageShare(Vec<Substitution>),
    /// $(select cond key=value ... *=default) - N-way conditional
    Select(Box<Selector<Substitution>>),
}

impl Substitution {
    pub fn text(text: impl Into<String>) -> Self {
        Substitution::Text(text.into())
    }

    pub fn arg(name: impl Into<String>) -> Self {
        Substitution::Argument(name.into())
    }

    pub fn env(name: impl Into<String>) -> Self {
        Substitution::Env {
            name: name.into(),
            default: None,
        }
    }

    pub fn env_or(name: impl Into<String>, default: impl Into<String>) -> Self {
        Substitution::Env {
            name: name.into(),
            default: Some(vec![Substitution::Text(default.into())]),
        }
    }

    pub fn command(parts: impl IntoIterator<Item = Substitution>) -> Self {
        Substitution::Command(parts.into_iter().collect())
    }

    pub fn concat(parts: impl IntoIterator<Item = Substitution>) -> Self {
        Substitution::Concat(parts.into_iter().collect())
    }

    pub fn path_join(parts: impl IntoIterator<Item = Substitution>) -> Self {
        Substitution::PathJoin(parts.into_iter().collect())
    }

    pub fn find_package_share(parts: impl IntoIterator<Item = Substitution>) -> Self {
        Substitution::FindPackageShare(parts.into_iter().collect())
    }

    pub fn select(selector: Selector<Substitution>) -> Self {
        Substitution::Select(Box::new(selector))
    }

    /// Collapse a parsed list into a single expression.
    pub fn from_parts(mut parts: Vec<Substitution>) -> Self {
        match parts.len() {
            0 => Substitution::Text(String::new()),
            1 => parts.remove(0),
            _ => Substitution::Concat(parts),
        }
    }

    /// Resolve substitution to string value
    pub fn resolve(&self, context: &LaunchContext) -> Result<String, SubstitutionError> {
        match self {
            Substitution::Text(s) => Ok(s.clone()),
            Substitution::Env { name, default } => match context.env().get(name) {
                Some(value) => Ok(value.to_string()),
                None => match default {
                    Some(default) => resolve_substitutions(default, context),
                    None => Err(SubstitutionError::UndefinedEnvVar(name.clone())),
                },
            },
            Substitution::Argument(name) => context
                .arguments()
                .lookup(name)
                .map(str::to_string)
                .ok_or_else(|| SubstitutionError::UndefinedVariable(name.clone())),
            Substitution::Command(parts) => {
                let command_line = resolve_substitutions(parts, context)?;
                match context.command_cache() {
                    Some(cache) => cache.get_or_run(&command_line, context.env()),
                    None => command::run_command(&command_line, context.env()),
                }
            }
            Substitution::Concat(parts) => resolve_substitutions(parts, context),
            Substitution::PathJoin(parts) => {
                let segments = parts
                    .iter()
                    .map(|p| p.resolve(context))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(join_path(&segments))
            }
            Substitution::FindPackageShare(parts) => {
                let package = resolve_substitutions(parts, context)?;
                find_package_share(&package, context)
                    .ok_or(SubstitutionError::PackageNotFound(package))
            }
            Substitution::Select(selector) => selector.select(context)?.resolve(context),
        }
    }
}

/// Resolve list of substitutions to single string
pub fn resolve_substitutions(
    subs: &[Substitution],
    context: &LaunchContext,
) -> Result<String, SubstitutionError> {
    let mut result = String::new();
    for sub in subs {
        result.push_str(&sub.resolve(context)?);
    }
    Ok(result)
}

/// Join path segments with the platform separator and collapse redundant
/// separators. A leading separator is kept, a trailing one is dropped.
pub fn join_path(segments: &[String]) -> String {
    let joined = segments
        .iter()
        .filter(|s| !s.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(MAIN_SEPARATOR_STR);

    let mut normalized = String::with_capacity(joined.len());
    let mut previous_was_separator = false;
    for ch in joined.chars() {
        let is_separator = ch == '/' || ch == MAIN_SEPARATOR;
        if is_separator {
            if !previous_was_separator {
                normalized.push(MAIN_SEPARATOR);
            }
        } else {
            normalized.push(ch);
        }
        previous_was_separator = is_separator;
    }

    if normalized.len() > 1 && normalized.ends_with(MAIN_SEPARATOR) {
        normalized.pop();
    }
    normalized
}

/// Find a package share directory under the prefixes of the runtime
/// environment.
fn find_package_share(package_name: &str, context: &LaunchContext) -> Option<String> {
    let env = context.env();

    for prefix in env.search_path("AMENT_PREFIX_PATH") {
        let share_path = Path::new(prefix).join("share").join(package_name);
        if share_path.exists() {
            return Some(share_path.to_string_lossy().into_owned());
        }
    }

    if let Some(distro) = env.get("ROS_DISTRO") {
        let share_path = format!("/opt/ros/{}/share/{}", distro, package_name);
        if Path::new(&share_path).exists() {
            return Some(share_path);
        }
    }

    None
}
