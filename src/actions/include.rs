//! Include action

use crate::{
    actions::conditions_from_entity,
    condition::Condition,
    error::ParseError,
    substitution::{parse_substitutions, Substitution},
    xml::{Entity, EntityExt, XmlEntity},
};

/// Include of a nested launch description.
#[derive(Debug, Clone, PartialEq)]
pub struct IncludeAction {
    pub locator: Vec<Substitution>,
    /// Kept in order: later overrides may refer to earlier ones
    pub overrides: Vec<(String, Vec<Substitution>)>,
    pub conditions: Vec<Condition>,
}

impl IncludeAction {
    pub fn new(locator: Substitution) -> Self {
        Self {
            locator: vec![locator],
            overrides: Vec::new(),
            conditions: Vec::new(),
        }
    }

    pub fn with_override(mut self, name: impl Into<String>, value: Substitution) -> Self {
        self.overrides.push((name.into(), vec![value]));
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn from_entity(entity: &XmlEntity) -> Result<Self, ParseError> {
        let locator = parse_substitutions(&entity.require_attr("file")?)?;

        let mut overrides = Vec::new();
        for child in entity.children() {
            match child.type_name() {
                "arg" => {
                    let name = child.require_attr("name")?;
                    let value = parse_substitutions(&child.require_attr("value")?)?;
                    overrides.push((name, value));
                }
                other => {
                    return Err(ParseError::UnexpectedElement {
                        parent: "include".to_string(),
                        child: other.to_string(),
                    })
                }
            }
        }

        Ok(Self {
            locator,
            overrides,
            conditions: conditions_from_entity(entity)?,
        })
    }
}
