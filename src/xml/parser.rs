//! XML launch file parser

use crate::{
    actions::{
        DeclareArgumentAction, IncludeAction, LaunchAction, LaunchDescription, ProcessTemplate,
    },
    error::ParseError,
    xml::entity::{Entity, XmlEntity},
};

/// Parse the text of a launch file into a description.
///
/// The root element must be `<launch>`; unknown elements are rejected.
pub fn parse_description(content: &str) -> Result<LaunchDescription, ParseError> {
    let doc = roxmltree::Document::parse(content)?;
    let root = XmlEntity::new(doc.root_element());
    if root.type_name() != "launch" {
        return Err(ParseError::UnexpectedElement {
            parent: "document".to_string(),
            child: root.type_name().to_string(),
        });
    }

    root.children().map(|child| parse_action(&child)).collect()
}

fn parse_action(entity: &XmlEntity) -> Result<LaunchAction, ParseError> {
    let action = match entity.type_name() {
        "arg" => LaunchAction::DeclareArgument(DeclareArgumentAction::from_entity(entity)?),
        "node" => LaunchAction::StartProcess(ProcessTemplate::from_entity(entity)?),
        "executable" => {
            LaunchAction::StartProcess(ProcessTemplate::from_executable_entity(entity)?)
        }
        "include" => LaunchAction::Include(IncludeAction::from_entity(entity)?),
        other => {
            return Err(ParseError::UnexpectedElement {
                parent: "launch".to_string(),
                child: other.to_string(),
            })
        }
    };
    log::trace!("Parsed <{}> action", entity.type_name());
    Ok(action)
}
