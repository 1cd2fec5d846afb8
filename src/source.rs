//! Where included descriptions come from

use crate::{
    actions::LaunchDescription,
    error::{LaunchError, Result},
    file_cache::read_launch_file,
    xml::parse_description,
};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

/// A description loaded from a source, with the key used for cycle
/// detection and as the base for relative includes inside it.
#[derive(Debug, Clone)]
pub struct LoadedDescription {
    pub key: String,
    pub description: LaunchDescription,
}

/// Resolves an include locator to a launch description.
pub trait DescriptionSource {
    /// Load `locator`. `including` is the key of the description that
    /// contains the include, or `None` at the top level.
    fn load(&self, locator: &str, including: Option<&str>) -> Result<LoadedDescription>;
}

/// Loads XML launch files from disk.
///
/// Relative locators are resolved against the directory of the including
/// file, or the current directory at the top level.
#[derive(Debug, Clone, Default)]
pub struct XmlFileSource;

impl XmlFileSource {
    pub fn new() -> Self {
        Self
    }

    fn resolve_path(locator: &str, including: Option<&str>) -> PathBuf {
        let path = Path::new(locator);
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match including.and_then(|parent| Path::new(parent).parent()) {
            Some(dir) => dir.join(path),
            None => path.to_path_buf(),
        }
    }
}

impl DescriptionSource for XmlFileSource {
    fn load(&self, locator: &str, including: Option<&str>) -> Result<LoadedDescription> {
        let path = Self::resolve_path(locator, including);
        let path = path.canonicalize().map_err(|e| LaunchError::IncludeNotFound {
            locator: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let key = path.display().to_string();

        let content = read_launch_file(&path).map_err(|e| LaunchError::IncludeNotFound {
            locator: key.clone(),
            reason: e.to_string(),
        })?;
        let description = parse_description(&content).map_err(|source| LaunchError::Parse {
            locator: key.clone(),
            source,
        })?;

        log::debug!("Loaded {} action(s) from {}", description.len(), key);
        Ok(LoadedDescription { key, description })
    }
}

/// In-memory descriptions keyed by locator, for descriptions built in code.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    descriptions: HashMap<String, LaunchDescription>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, locator: impl Into<String>, description: LaunchDescription) -> Self {
        self.insert(locator, description);
        self
    }

    pub fn insert(&mut self, locator: impl Into<String>, description: LaunchDescription) {
        self.descriptions.insert(locator.into(), description);
    }
}

impl DescriptionSource for MemorySource {
    fn load(&self, locator: &str, _including: Option<&str>) -> Result<LoadedDescription> {
        self.descriptions
            .get(locator)
            .map(|description| LoadedDescription {
                key: locator.to_string(),
                description: description.clone(),
            })
            .ok_or_else(|| LaunchError::IncludeNotFound {
                locator: locator.to_string(),
                reason: "no description registered under this name".to_string(),
            })
    }
}
