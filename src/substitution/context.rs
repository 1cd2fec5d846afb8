//! Resolution context

use crate::{
    arguments::ArgumentTable,
    substitution::{command::CommandCache, environment::RuntimeEnvironment},
};

/// Everything a substitution may consult while resolving: the runtime
/// environment, the argument scope that is current at the action being
/// resolved, and optionally a command cache shared by the whole composition.
#[derive(Clone, Copy)]
pub struct LaunchContext<'a> {
    env: &'a RuntimeEnvironment,
    arguments: &'a ArgumentTable,
    commands: Option<&'a CommandCache>,
}

impl<'a> LaunchContext<'a> {
    pub fn new(env: &'a RuntimeEnvironment, arguments: &'a ArgumentTable) -> Self {
        Self {
            env,
            arguments,
            commands: None,
        }
    }

    pub fn with_command_cache(mut self, cache: &'a CommandCache) -> Self {
        self.commands = Some(cache);
        self
    }

    pub fn env(&self) -> &'a RuntimeEnvironment {
        self.env
    }

    pub fn arguments(&self) -> &'a ArgumentTable {
        self.arguments
    }

    pub(crate) fn command_cache(&self) -> Option<&'a CommandCache> {
        self.commands
    }
}
