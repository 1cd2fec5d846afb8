//! Substitution module

pub mod command;
pub mod context;
pub mod environment;
pub mod parser;
pub mod types;

pub use command::CommandCache;
pub use context::LaunchContext;
pub use environment::RuntimeEnvironment;
pub use parser::parse_substitutions;
pub use types::{join_path, resolve_substitutions, Substitution};
