//! scene_launch library
//!
//! Turns a tree of launch declarations into an ordered manifest of processes
//! ([`compose_file`]) and runs that manifest ([`supervisor::Supervisor`]).

pub mod actions;
pub mod arguments;
pub mod compose;
pub mod condition;
pub mod error;
mod file_cache;
pub mod manifest;
pub mod params;
pub mod source;
pub mod substitution;
pub mod supervisor;
pub mod xml;

pub use actions::{
    DeclareArgumentAction, IncludeAction, LaunchAction, LaunchDescription, ProcessTemplate,
};
pub use compose::{Composer, Composition};
pub use error::{LaunchError, Result};
pub use manifest::{Manifest, OutputMode, ProcessSpec};
pub use source::{DescriptionSource, MemorySource, XmlFileSource};
pub use substitution::{RuntimeEnvironment, Substitution};
pub use supervisor::{LaunchHandle, Supervisor, SupervisorConfig};

use std::{collections::HashMap, path::Path};

/// Compose an XML launch file with the given argument overrides.
pub fn compose_file(
    path: &Path,
    overrides: HashMap<String, String>,
    env: &RuntimeEnvironment,
) -> Result<Composition> {
    let source = XmlFileSource::new();
    Composer::new(&source, env).compose_locator(&path.to_string_lossy(), overrides)
}
