//! Declare argument action

use crate::{
    actions::conditions_from_entity,
    condition::Condition,
    error::ParseError,
    substitution::{parse_substitutions, Substitution},
    xml::{Entity, EntityExt, XmlEntity},
};

/// Declares a launch argument; the default is resolved when the action runs.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclareArgumentAction {
    pub name: String,
    pub default: Option<Vec<Substitution>>,
    pub description: String,
    pub choices: Option<Vec<String>>,
    pub conditions: Vec<Condition>,
}

impl DeclareArgumentAction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            description: String::new(),
            choices: None,
            conditions: Vec::new(),
        }
    }

    pub fn with_default(mut self, default: Substitution) -> Self {
        self.default = Some(vec![default]);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Build from an `<arg>` element. Choices come from a comma separated
    /// `choices` attribute or from `<choice value="..."/>` children.
    pub fn from_entity(entity: &XmlEntity) -> Result<Self, ParseError> {
        let name = entity.require_attr("name")?;

        let default = entity
            .get_attr_str("default", true)?
            .map(|s| parse_substitutions(&s))
            .transpose()?;

        let description = entity.get_attr_str("description", true)?.unwrap_or_default();

        let mut choices: Option<Vec<String>> = entity.get_attr_str("choices", true)?.map(|s| {
            s.split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect()
        });

        for child in entity.children() {
            match child.type_name() {
                "choice" => choices
                    .get_or_insert_with(Vec::new)
                    .push(child.require_attr("value")?),
                other => {
                    return Err(ParseError::UnexpectedElement {
                        parent: "arg".to_string(),
                        child: other.to_string(),
                    })
                }
            }
        }

        Ok(Self {
            name,
            default,
            description,
            choices,
            conditions: conditions_from_entity(entity)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roxmltree::Document;

    fn parse(xml: &str) -> Result<DeclareArgumentAction, ParseError> {
        let doc = Document::parse(xml).unwrap();
        DeclareArgumentAction::from_entity(&XmlEntity::new(doc.root_element()))
    }

    #[test]
    fn test_parse_minimal() {
        let action = parse(r#"<arg name="rname" />"#).unwrap();
        assert_eq!(action.name, "rname");
        assert!(action.default.is_none());
        assert!(action.description.is_empty());
        assert!(action.choices.is_none());
    }

    #[test]
    fn test_parse_with_default_and_description() {
        let action = parse(
            r#"<arg name="world" default="$(var rname)_world" description="Simulation world" />"#,
        )
        .unwrap();
        assert_eq!(
            action.default,
            Some(vec![
                Substitution::arg("rname"),
                Substitution::text("_world"),
            ])
        );
        assert_eq!(action.description, "Simulation world");
    }

    #[test]
    fn test_parse_choices() {
        let action = parse(r#"<arg name="rname" default="go2" choices="go2, a1" />"#).unwrap();
        assert_eq!(action.choices, Some(vec!["go2".to_string(), "a1".to_string()]));

        let action = parse(
            r#"<arg name="rname" default="go2">
                <choice value="go2" />
                <choice value="a1" />
            </arg>"#,
        )
        .unwrap();
        assert_eq!(action.choices, Some(vec!["go2".to_string(), "a1".to_string()]));
    }

    #[test]
    fn test_missing_name() {
        let err = parse(r#"<arg default="go2" />"#).unwrap_err();
        assert!(matches!(
            err,
            ParseError::MissingAttribute { ref attribute, .. } if attribute == "name"
        ));
    }

    #[test]
    fn test_unexpected_child() {
        let err = parse(r#"<arg name="rname"><param name="x" value="1" /></arg>"#).unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedElement { .. }));
    }
}
