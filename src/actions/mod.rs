//! Launch description model

pub mod declare_argument;
pub mod include;
pub mod process;

pub use declare_argument::DeclareArgumentAction;
pub use include::IncludeAction;
pub use process::{Parameter, ProcessTemplate};

use crate::{
    condition::Condition,
    error::ParseError,
    substitution::parse_substitutions,
    xml::Entity,
};

/// One step of a launch description.
#[derive(Debug, Clone, PartialEq)]
pub enum LaunchAction {
    DeclareArgument(DeclareArgumentAction),
    StartProcess(ProcessTemplate),
    Include(IncludeAction),
}

impl LaunchAction {
    pub fn conditions(&self) -> &[Condition] {
        match self {
            LaunchAction::DeclareArgument(action) => &action.conditions,
            LaunchAction::StartProcess(action) => &action.conditions,
            LaunchAction::Include(action) => &action.conditions,
        }
    }
}

impl From<DeclareArgumentAction> for LaunchAction {
    fn from(action: DeclareArgumentAction) -> Self {
        LaunchAction::DeclareArgument(action)
    }
}

impl From<ProcessTemplate> for LaunchAction {
    fn from(action: ProcessTemplate) -> Self {
        LaunchAction::StartProcess(action)
    }
}

impl From<IncludeAction> for LaunchAction {
    fn from(action: IncludeAction) -> Self {
        LaunchAction::Include(action)
    }
}

/// Ordered list of launch actions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaunchDescription {
    pub actions: Vec<LaunchAction>,
}

impl LaunchDescription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action.
    pub fn with(mut self, action: impl Into<LaunchAction>) -> Self {
        self.actions.push(action.into());
        self
    }

    pub fn push(&mut self, action: impl Into<LaunchAction>) {
        self.actions.push(action.into());
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl FromIterator<LaunchAction> for LaunchDescription {
    fn from_iter<I: IntoIterator<Item = LaunchAction>>(iter: I) -> Self {
        Self {
            actions: iter.into_iter().collect(),
        }
    }
}

/// Read the `if` and `unless` attributes of an element.
pub(crate) fn conditions_from_entity<E: Entity>(entity: &E) -> Result<Vec<Condition>, ParseError> {
    let mut conditions = Vec::new();
    if let Some(expr) = entity.get_attr_str("if", true)? {
        conditions.push(Condition::If(parse_substitutions(&expr)?));
    }
    if let Some(expr) = entity.get_attr_str("unless", true)? {
        conditions.push(Condition::Unless(parse_substitutions(&expr)?));
    }
    Ok(conditions)
}
