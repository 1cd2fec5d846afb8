//! XML front end

pub mod entity;
pub mod parser;

pub use entity::{Entity, EntityExt, XmlEntity};
pub use parser::parse_description;
