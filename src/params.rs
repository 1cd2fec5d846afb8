//! YAML parameter files
//!
//! Files follow the usual layout, one section per node:
//!
//! ```yaml
//! joy_node:
//!   ros__parameters:
//!     deadzone: 0.1
//!     buttons: [0, 1]
//! ```
//!
//! Nested maps are flattened with `.`, sequences are rendered as JSON.

use crate::error::ParseError;
use serde_yaml::{Mapping, Value};
use std::{fs, path::Path};

const PARAMETERS_KEY: &str = "ros__parameters";

/// Load the parameters of `path` that apply to the process named `node`.
///
/// A section applies when its key is a wildcard (`**` or `/**`), equals the
/// node name, or ends with `/<node>`. With no node name every section
/// applies. Later sections override earlier keys.
pub fn load_param_file(
    path: &Path,
    node: Option<&str>,
) -> Result<Vec<(String, String)>, ParseError> {
    let invalid = |message: String| ParseError::InvalidParamFile {
        path: path.display().to_string(),
        message,
    };

    let content = fs::read_to_string(path)?;
    let yaml: Value = serde_yaml::from_str(&content).map_err(|e| invalid(e.to_string()))?;

    let sections = match yaml {
        Value::Mapping(sections) => sections,
        Value::Null => return Ok(Vec::new()),
        _ => return Err(invalid("top level must be a mapping of node names".to_string())),
    };

    let mut params: Vec<(String, String)> = Vec::new();
    for (section, body) in &sections {
        let Value::String(section) = section else {
            continue;
        };
        if !section_applies(section, node) {
            log::trace!("Skipping parameter section '{}' in {}", section, path.display());
            continue;
        }
        match body.get(PARAMETERS_KEY) {
            Some(Value::Mapping(map)) => flatten_params("", map, &mut params),
            Some(_) => {
                let message = format!("'{}.{}' must be a mapping", section, PARAMETERS_KEY);
                return Err(invalid(message));
            }
            None => log::debug!(
                "Section '{}' in {} has no {}",
                section,
                path.display(),
                PARAMETERS_KEY
            ),
        }
    }

    log::debug!("Loaded {} parameter(s) from {}", params.len(), path.display());
    Ok(params)
}

fn section_applies(section: &str, node: Option<&str>) -> bool {
    let Some(node) = node else {
        return true;
    };
    let section = section.trim_end_matches('/');
    section == "**"
        || section == "/**"
        || section == node
        || section.rsplit_once('/').is_some_and(|(_, last)| last == node)
}

fn flatten_params(prefix: &str, map: &Mapping, output: &mut Vec<(String, String)>) {
    for (key, value) in map {
        let key = match key {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        let full_key = if prefix.is_empty() {
            key
        } else {
            format!("{}.{}", prefix, key)
        };

        let rendered = match value {
            Value::Mapping(nested) => {
                flatten_params(&full_key, nested, output);
                continue;
            }
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => "null".to_string(),
            Value::Sequence(seq) => {
                serde_json::to_string(seq).unwrap_or_else(|_| format!("{:?}", seq))
            }
            Value::Tagged(tagged) => format!("{:?}", tagged.value),
        };

        match output.iter_mut().find(|(k, _)| *k == full_key) {
            Some(entry) => entry.1 = rendered,
            None => output.push((full_key, rendered)),
        }
    }
}
