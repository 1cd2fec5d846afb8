//! Start-process action

use crate::{
    actions::conditions_from_entity,
    condition::Condition,
    error::ParseError,
    manifest::OutputMode,
    substitution::{parse_substitutions, parser::parse_word_list, Substitution},
    xml::{Entity, EntityExt, XmlEntity},
};

/// Unresolved description of a process to start.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessTemplate {
    pub package: Option<Vec<Substitution>>,
    pub executable: Vec<Substitution>,
    pub name: Option<Vec<Substitution>>,
    pub namespace: Option<Vec<Substitution>>,
    pub arguments: Vec<Vec<Substitution>>,
    pub parameters: Vec<Parameter>,
    pub param_files: Vec<Vec<Substitution>>,
    pub environment: Vec<(String, Vec<Substitution>)>,
    pub output: OutputMode,
    pub critical: bool,
    pub conditions: Vec<Condition>,
}

/// Inline `name := value` parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: Vec<Substitution>,
}

impl Parameter {
    pub fn from_entity(entity: &XmlEntity) -> Result<Self, ParseError> {
        let name = entity.require_attr("name")?;
        let value = parse_substitutions(&entity.require_attr("value")?)?;
        Ok(Self { name, value })
    }
}

impl ProcessTemplate {
    pub fn new(executable: Substitution) -> Self {
        Self {
            package: None,
            executable: vec![executable],
            name: None,
            namespace: None,
            arguments: Vec::new(),
            parameters: Vec::new(),
            param_files: Vec::new(),
            environment: Vec::new(),
            output: OutputMode::default(),
            critical: false,
            conditions: Vec::new(),
        }
    }

    pub fn package(mut self, package: Substitution) -> Self {
        self.package = Some(vec![package]);
        self
    }

    pub fn name(mut self, name: Substitution) -> Self {
        self.name = Some(vec![name]);
        self
    }

    pub fn namespace(mut self, namespace: Substitution) -> Self {
        self.namespace = Some(vec![namespace]);
        self
    }

    pub fn arg(mut self, argument: Substitution) -> Self {
        self.arguments.push(vec![argument]);
        self
    }

    pub fn args<I>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = Substitution>,
    {
        self.arguments.extend(arguments.into_iter().map(|a| vec![a]));
        self
    }

    pub fn parameter(mut self, name: impl Into<String>, value: Substitution) -> Self {
        self.parameters.push(Parameter {
            name: name.into(),
            value: vec![value],
        });
        self
    }

    pub fn param_file(mut self, path: Substitution) -> Self {
        self.param_files.push(vec![path]);
        self
    }

    pub fn env(mut self, name: impl Into<String>, value: Substitution) -> Self {
        self.environment.push((name.into(), vec![value]));
        self
    }

    pub fn output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Short label for error context and logs, taken from the literal parts
    /// of the name or executable.
    pub fn label(&self) -> String {
        let exprs = self.name.as_ref().unwrap_or(&self.executable);
        exprs
            .iter()
            .map(|sub| match sub {
                Substitution::Text(text) => text.clone(),
                Substitution::Argument(name) => format!("$(var {})", name),
                _ => "$(...)".to_string(),
            })
            .collect()
    }

    /// Build from a `<node>` element.
    pub fn from_entity(entity: &XmlEntity) -> Result<Self, ParseError> {
        let package = entity
            .get_attr_str("pkg", true)?
            .map(|s| parse_substitutions(&s))
            .transpose()?;
        let executable = parse_substitutions(&entity.require_attr("exec")?)?;

        let arguments = match entity.get_attr_str("args", true)? {
            Some(args) => parse_word_list(&args)?,
            None => Vec::new(),
        };

        let mut template = Self {
            package,
            executable,
            arguments,
            ..Self::common_attributes(entity)?
        };
        template.read_children(entity, "node")?;
        Ok(template)
    }

    /// Build from an `<executable cmd="...">` element: the first word of
    /// `cmd` is the program, the rest are its arguments.
    pub fn from_executable_entity(entity: &XmlEntity) -> Result<Self, ParseError> {
        let cmd = entity.require_attr("cmd")?;
        let mut words = parse_word_list(&cmd)?.into_iter();
        let executable = words.next().ok_or_else(|| {
            ParseError::InvalidSubstitution("empty 'cmd' on <executable>".to_string())
        })?;

        let mut template = Self {
            executable,
            arguments: words.collect(),
            ..Self::common_attributes(entity)?
        };
        if let Some(args) = entity.get_attr_str("args", true)? {
            template.arguments.extend(parse_word_list(&args)?);
        }
        template.read_children(entity, "executable")?;
        Ok(template)
    }

    fn common_attributes(entity: &XmlEntity) -> Result<Self, ParseError> {
        let optional = |attr: &str| -> Result<Option<Vec<Substitution>>, ParseError> {
            entity
                .get_attr_str(attr, true)?
                .map(|s| parse_substitutions(&s))
                .transpose()
        };

        Ok(Self {
            name: optional("name")?,
            namespace: optional("namespace")?,
            output: entity.get_attr("output", true)?.unwrap_or_default(),
            critical: entity.get_attr("critical", true)?.unwrap_or(false),
            conditions: conditions_from_entity(entity)?,
            ..Self::new(Substitution::text(""))
        })
    }

    fn read_children(&mut self, entity: &XmlEntity, parent: &str) -> Result<(), ParseError> {
        for child in entity.children() {
            match child.type_name() {
                "param" => {
                    if let Some(from) = child.get_attr_str("from", true)? {
                        self.param_files.push(parse_substitutions(&from)?);
                    } else {
                        self.parameters.push(Parameter::from_entity(&child)?);
                    }
                }
                "arg" => {
                    let value = child.require_attr("value")?;
                    self.arguments.push(parse_substitutions(&value)?);
                }
                "env" => self.environment.push(parse_env(&child)?),
                other => {
                    return Err(ParseError::UnexpectedElement {
                        parent: parent.to_string(),
                        child: other.to_string(),
                    })
                }
            }
        }
        Ok(())
    }
}

fn parse_env(entity: &XmlEntity) -> Result<(String, Vec<Substitution>), ParseError> {
    let name = entity.require_attr("name")?;
    let value = parse_substitutions(&entity.require_attr("value")?)?;
    Ok((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use roxmltree::Document;

    fn parse_node(xml: &str) -> Result<ProcessTemplate, ParseError> {
        let doc = Document::parse(xml).unwrap();
        ProcessTemplate::from_entity(&XmlEntity::new(doc.root_element()))
    }

    #[test]
    fn test_parse_node() {
        let template = parse_node(
            r#"<node pkg="robot_state_publisher" exec="robot_state_publisher"
                     name="robot_state_publisher" namespace="/$(var rname)_gazebo"
                     output="screen" critical="true">
                <param name="use_sim_time" value="true" />
                <param from="$(var config_file)" />
                <env name="GAZEBO_MODEL_PATH" value="/models" />
            </node>"#,
        )
        .unwrap();

        assert_eq!(template.package, Some(vec![Substitution::text("robot_state_publisher")]));
        assert_eq!(
            template.namespace,
            Some(vec![
                Substitution::text("/"),
                Substitution::arg("rname"),
                Substitution::text("_gazebo"),
            ])
        );
        assert_eq!(template.output, OutputMode::Screen);
        assert!(template.critical);
        assert_eq!(template.parameters.len(), 1);
        assert_eq!(template.parameters[0].name, "use_sim_time");
        assert_eq!(template.param_files, vec![vec![Substitution::arg("config_file")]]);
        assert_eq!(template.environment[0].0, "GAZEBO_MODEL_PATH");
        assert_eq!(template.label(), "robot_state_publisher");
    }

    #[test]
    fn test_parse_node_args() {
        let template = parse_node(
            r#"<node pkg="gazebo_ros" exec="spawn_entity.py"
                     args="-topic /robot_description -entity $(var rname)">
                <arg value="-z" />
                <arg value="0.4" />
            </node>"#,
        )
        .unwrap();

        assert_eq!(
            template.arguments,
            vec![
                vec![Substitution::text("-topic")],
                vec![Substitution::text("/robot_description")],
                vec![Substitution::text("-entity")],
                vec![Substitution::arg("rname")],
                vec![Substitution::text("-z")],
                vec![Substitution::text("0.4")],
            ]
        );
        assert_eq!(template.output, OutputMode::Log);
        assert!(!template.critical);
    }

    #[test]
    fn test_parse_node_select_executable() {
        let template = parse_node(
            r#"<node pkg="controller_manager"
                     exec="$(select $(env ROS_DISTRO '') foxy=spawner.py *=spawner)"
                     args="joint_state_broadcaster" />"#,
        )
        .unwrap();
        assert!(matches!(template.executable[0], Substitution::Select(_)));
        assert_eq!(template.label(), "$(...)");
    }

    #[test]
    fn test_parse_executable() {
        let doc = Document::parse(
            r#"<executable cmd="gzserver --verbose $(var world)" name="gzserver"
                           unless="$(var headless)" />"#,
        )
        .unwrap();
        let entity = XmlEntity::new(doc.root_element());
        let template = ProcessTemplate::from_executable_entity(&entity).unwrap();

        assert!(template.package.is_none());
        assert_eq!(template.executable, vec![Substitution::text("gzserver")]);
        assert_eq!(template.arguments.len(), 2);
        assert_eq!(template.conditions.len(), 1);
    }

    #[test]
    fn test_invalid_output_mode() {
        let err = parse_node(r#"<node exec="joy_node" output="loud" />"#).unwrap_err();
        assert!(matches!(err, ParseError::TypeCoercion { .. }));
    }

    #[test]
    fn test_unexpected_child() {
        let err =
            parse_node(r#"<node exec="joy_node"><remap from="a" to="b" /></node>"#).unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedElement { ref child, .. } if child == "remap"));
    }

    #[test]
    fn test_builder() {
        let template = ProcessTemplate::new(Substitution::text("spawn_entity.py"))
            .package(Substitution::text("gazebo_ros"))
            .args([Substitution::text("-entity"), Substitution::text("robot_model")])
            .parameter("use_sim_time", Substitution::text("true"))
            .output(OutputMode::Screen)
            .critical(true);

        assert_eq!(template.arguments.len(), 2);
        assert_eq!(template.parameters[0].value, vec![Substitution::text("true")]);
        assert_eq!(template.label(), "spawn_entity.py");
    }
}
