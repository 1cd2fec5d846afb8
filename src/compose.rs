//! Launch description composer
//!
//! Walks a description depth-first and flattens it into a [`Manifest`].
//! Includes are composed recursively in their own argument scope, and the
//! processes they start are spliced in at the include's position. Nothing
//! is started here: composition either yields the whole manifest or fails.

use crate::{
    actions::{
        DeclareArgumentAction, IncludeAction, LaunchAction, LaunchDescription, ProcessTemplate,
    },
    arguments::{ArgumentDeclaration, ArgumentTable},
    condition::should_process,
    error::{LaunchError, Result, SubstitutionError},
    manifest::{Manifest, ProcessSpec},
    params::load_param_file,
    source::{DescriptionSource, LoadedDescription},
    substitution::{
        resolve_substitutions, CommandCache, LaunchContext, RuntimeEnvironment, Substitution,
    },
};
use std::{collections::HashMap, path::Path};

/// Result of a composition: the manifest plus the arguments the top-level
/// description declared, with their effective values.
#[derive(Debug, Clone)]
pub struct Composition {
    pub manifest: Manifest,
    pub arguments: Vec<(ArgumentDeclaration, Option<String>)>,
}

pub struct Composer<'a> {
    source: &'a dyn DescriptionSource,
    env: &'a RuntimeEnvironment,
}

impl<'a> Composer<'a> {
    pub fn new(source: &'a dyn DescriptionSource, env: &'a RuntimeEnvironment) -> Self {
        Self { source, env }
    }

    /// Compose an in-memory description. Relative includes inside it are
    /// resolved from the current directory.
    pub fn compose(
        &self,
        description: &LaunchDescription,
        overrides: HashMap<String, String>,
    ) -> Result<Manifest> {
        Ok(self.compose_detailed(description, None, overrides)?.manifest)
    }

    /// Load `locator` through the source and compose it.
    pub fn compose_locator(
        &self,
        locator: &str,
        overrides: HashMap<String, String>,
    ) -> Result<Composition> {
        let LoadedDescription { key, description } = self.source.load(locator, None)?;
        log::info!("Composing {}", key);
        self.compose_detailed(&description, Some(key), overrides)
    }

    fn compose_detailed(
        &self,
        description: &LaunchDescription,
        key: Option<String>,
        overrides: HashMap<String, String>,
    ) -> Result<Composition> {
        let mut walk = Walk {
            source: self.source,
            env: self.env,
            table: ArgumentTable::new(overrides),
            commands: CommandCache::new(),
            chain: key.into_iter().collect(),
            manifest: Manifest::new(),
        };
        walk.description(description)?;

        let arguments = walk
            .table
            .declarations()
            .iter()
            .map(|decl| (decl.clone(), walk.table.lookup(&decl.name).map(str::to_string)))
            .collect();
        log::info!(
            "Composed {} process(es), {} distinct command substitution(s)",
            walk.manifest.len(),
            walk.commands.len()
        );
        Ok(Composition {
            manifest: walk.manifest,
            arguments,
        })
    }
}

/// Mutable state of one composition.
struct Walk<'a> {
    source: &'a dyn DescriptionSource,
    env: &'a RuntimeEnvironment,
    table: ArgumentTable,
    commands: CommandCache,
    /// Keys of the descriptions currently being composed, outermost first
    chain: Vec<String>,
    manifest: Manifest,
}

impl Walk<'_> {
    fn context(&self) -> LaunchContext<'_> {
        LaunchContext::new(self.env, &self.table).with_command_cache(&self.commands)
    }

    fn resolve(&self, exprs: &[Substitution]) -> Result<String> {
        resolve_substitutions(exprs, &self.context()).map_err(resolution_error)
    }

    fn description(&mut self, description: &LaunchDescription) -> Result<()> {
        for action in &description.actions {
            let identity = identify(action);
            self.action(action).map_err(|e| e.in_action(identity))?;
        }
        Ok(())
    }

    fn action(&mut self, action: &LaunchAction) -> Result<()> {
        if !should_process(action.conditions(), &self.context()).map_err(resolution_error)? {
            log::debug!("Skipping {}: condition is false", identify(action));
            return Ok(());
        }
        match action {
            LaunchAction::DeclareArgument(declare) => self.declare(declare),
            LaunchAction::StartProcess(template) => {
                let spec = self.process(template)?;
                log::debug!("Adding process {}", spec);
                self.manifest.processes.push(spec);
                Ok(())
            }
            LaunchAction::Include(include) => self.include(include),
        }
    }

    fn declare(&mut self, action: &DeclareArgumentAction) -> Result<()> {
        let default = action
            .default
            .as_deref()
            .map(|default| self.resolve(default))
            .transpose()?;

        let mut declaration = ArgumentDeclaration::new(action.name.clone())
            .with_description(action.description.clone());
        declaration.default = default;
        declaration.choices = action.choices.clone();
        self.table.declare(declaration)
    }

    fn process(&self, template: &ProcessTemplate) -> Result<ProcessSpec> {
        let optional = |exprs: &Option<Vec<Substitution>>| {
            exprs.as_deref().map(|e| self.resolve(e)).transpose()
        };

        let mut spec = ProcessSpec::new(self.resolve(&template.executable)?);
        spec.package = optional(&template.package)?;
        spec.name = optional(&template.name)?;
        spec.namespace = optional(&template.namespace)?;
        spec.arguments = template
            .arguments
            .iter()
            .map(|arg| self.resolve(arg))
            .collect::<Result<_>>()?;
        spec.output = template.output;
        spec.critical = template.critical;

        for parameter in &template.parameters {
            spec.set_parameter(parameter.name.clone(), self.resolve(&parameter.value)?);
        }

        // file parameters are applied after the inline ones
        for file in &template.param_files {
            let path = self.resolve(file)?;
            let node = spec.name.clone().unwrap_or_else(|| spec.executable.clone());
            let params = load_param_file(Path::new(&path), Some(&node)).map_err(|source| {
                LaunchError::Parse {
                    locator: path.clone(),
                    source,
                }
            })?;
            for (key, value) in params {
                spec.set_parameter(key, value);
            }
            spec.param_files.push(path);
        }

        spec.env = template
            .environment
            .iter()
            .map(|(name, value)| -> Result<(String, String)> {
                Ok((name.clone(), self.resolve(value)?))
            })
            .collect::<Result<_>>()?;

        Ok(spec)
    }

    fn include(&mut self, include: &IncludeAction) -> Result<()> {
        let locator = self.resolve(&include.locator)?;
        let including = self.chain.last().map(String::as_str);
        let LoadedDescription { key, description } = self.source.load(&locator, including)?;

        if self.chain.contains(&key) {
            let mut chain = self.chain.clone();
            chain.push(key);
            return Err(LaunchError::IncludeCycle { chain });
        }
        log::info!("Including {}", key);

        self.table.push_scope(key.clone(), Vec::new());
        self.chain.push(key);
        let result = self.include_body(include, &description);
        self.chain.pop();
        self.table.pop_scope();
        result
    }

    fn include_body(
        &mut self,
        include: &IncludeAction,
        description: &LaunchDescription,
    ) -> Result<()> {
        // the child scope is empty so far, so these see the parent's values
        // plus the overrides set before them
        for (name, value) in &include.overrides {
            let value = self.resolve(value)?;
            log::debug!("Include override {}:={}", name, value);
            self.table.set_override(name.clone(), value);
        }
        self.description(description)
    }
}

/// An undefined `$(var ...)` is an argument problem, not a substitution one.
fn resolution_error(err: SubstitutionError) -> LaunchError {
    match err {
        SubstitutionError::UndefinedVariable(name) => LaunchError::UnresolvedArgument(name),
        err => LaunchError::Resolution(err),
    }
}

fn identify(action: &LaunchAction) -> String {
    match action {
        LaunchAction::DeclareArgument(declare) => format!("argument '{}'", declare.name),
        LaunchAction::StartProcess(template) => format!("process '{}'", template.label()),
        LaunchAction::Include(include) => {
            let locator: String = include
                .locator
                .iter()
                .map(|sub| match sub {
                    Substitution::Text(text) => text.as_str(),
                    _ => "$(...)",
                })
                .collect();
            format!("include '{}'", locator)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        condition::{Condition, Selector, WILDCARD},
        source::MemorySource,
    };

    fn overrides(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_processes_in_declaration_order() {
        let description = LaunchDescription::new()
            .with(ProcessTemplate::new(Substitution::text("gzserver")))
            .with(ProcessTemplate::new(Substitution::text("robot_state_publisher")))
            .with(ProcessTemplate::new(Substitution::text("joy_node")));

        let source = MemorySource::new();
        let env = RuntimeEnvironment::empty();
        let manifest = Composer::new(&source, &env).compose(&description, HashMap::new()).unwrap();
        let names: Vec<_> = manifest.iter().map(|p| p.executable.as_str()).collect();
        assert_eq!(names, vec!["gzserver", "robot_state_publisher", "joy_node"]);
    }

    #[test]
    fn test_namespace_from_argument() {
        let description = LaunchDescription::new()
            .with(DeclareArgumentAction::new("rname").with_default(Substitution::text("go2")))
            .with(
                ProcessTemplate::new(Substitution::text("robot_state_publisher"))
                    .namespace(Substitution::concat([
                        Substitution::text("/"),
                        Substitution::arg("rname"),
                        Substitution::text("_gazebo"),
                    ])),
            );

        let source = MemorySource::new();
        let env = RuntimeEnvironment::empty();
        let composer = Composer::new(&source, &env);

        let manifest = composer.compose(&description, HashMap::new()).unwrap();
        assert_eq!(manifest.processes[0].namespace.as_deref(), Some("/go2_gazebo"));

        let manifest = composer.compose(&description, overrides(&[("rname", "a1")])).unwrap();
        assert_eq!(manifest.processes[0].namespace.as_deref(), Some("/a1_gazebo"));
    }

    #[test]
    fn test_conditions_skip_actions() {
        let description = LaunchDescription::new()
            .with(DeclareArgumentAction::new("use_joy").with_default(Substitution::text("false")))
            .with(
                ProcessTemplate::new(Substitution::text("joy_node"))
                    .with_condition(Condition::If(vec![Substitution::arg("use_joy")])),
            )
            .with(
                ProcessTemplate::new(Substitution::text("teleop_keyboard"))
                    .with_condition(Condition::Unless(vec![Substitution::arg("use_joy")])),
            );

        let source = MemorySource::new();
        let env = RuntimeEnvironment::empty();
        let manifest = Composer::new(&source, &env).compose(&description, HashMap::new()).unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.processes[0].executable, "teleop_keyboard");
    }

    #[test]
    fn test_selector_executable() {
        let spawner = Selector::new(Substitution::env_or("ROS_DISTRO", ""))
            .case("foxy", Substitution::text("spawner.py"))
            .case(WILDCARD, Substitution::text("spawner"));
        let description = LaunchDescription::new().with(
            ProcessTemplate::new(Substitution::select(spawner))
                .package(Substitution::text("controller_manager"))
                .arg(Substitution::text("joint_state_broadcaster")),
        );

        let source = MemorySource::new();
        for (distro, expected) in [("foxy", "spawner.py"), ("humble", "spawner")] {
            let env = RuntimeEnvironment::empty().with_var("ROS_DISTRO", distro);
            let manifest = Composer::new(&source, &env)
                .compose(&description, HashMap::new())
                .unwrap();
            assert_eq!(manifest.processes[0].executable, expected);
        }
    }

    #[test]
    fn test_undefined_variable_is_unresolved_argument() {
        let description = LaunchDescription::new().with(
            ProcessTemplate::new(Substitution::text("spawn_entity.py"))
                .args([Substitution::text("-entity"), Substitution::arg("entity_name")]),
        );
        let source = MemorySource::new();
        let env = RuntimeEnvironment::empty();
        let err = Composer::new(&source, &env)
            .compose(&description, HashMap::new())
            .unwrap_err();

        assert!(err.to_string().contains("spawn_entity.py"), "{err}");
        assert!(matches!(err.root(), LaunchError::UnresolvedArgument(n) if n == "entity_name"));
    }

    #[test]
    fn test_include_scope_and_overrides() {
        let display = LaunchDescription::new()
            .with(
                DeclareArgumentAction::new("use_sim_time")
                    .with_default(Substitution::text("false")),
            )
            .with(DeclareArgumentAction::new("frame_prefix").with_default(Substitution::text("")))
            .with(
                ProcessTemplate::new(Substitution::text("rviz2"))
                    .parameter("use_sim_time", Substitution::arg("use_sim_time"))
                    .parameter("frame_prefix", Substitution::arg("frame_prefix")),
            );
        let main = LaunchDescription::new()
            .with(DeclareArgumentAction::new("rname").with_default(Substitution::text("go2")))
            .with(
                IncludeAction::new(Substitution::text("display"))
                    .with_override("use_sim_time", Substitution::text("true"))
                    .with_override(
                        "frame_prefix",
                        Substitution::concat([Substitution::arg("rname"), Substitution::text("/")]),
                    ),
            )
            .with(ProcessTemplate::new(Substitution::text("joy_node")));

        let source = MemorySource::new().with("display", display);
        let env = RuntimeEnvironment::empty();
        let manifest = Composer::new(&source, &env).compose(&main, HashMap::new()).unwrap();

        assert_eq!(manifest.len(), 2);
        let rviz = &manifest.processes[0];
        assert_eq!(rviz.executable, "rviz2");
        assert_eq!(rviz.parameter("use_sim_time"), Some("true"));
        assert_eq!(rviz.parameter("frame_prefix"), Some("go2/"));
        assert_eq!(manifest.processes[1].executable, "joy_node");
    }

    #[test]
    fn test_child_arguments_do_not_leak() {
        let child = LaunchDescription::new()
            .with(DeclareArgumentAction::new("world").with_default(Substitution::text("empty")));
        let main = LaunchDescription::new()
            .with(IncludeAction::new(Substitution::text("gazebo")))
            .with(
                ProcessTemplate::new(Substitution::text("gzclient"))
                    .arg(Substitution::arg("world")),
            );

        let source = MemorySource::new().with("gazebo", child);
        let env = RuntimeEnvironment::empty();
        let err = Composer::new(&source, &env).compose(&main, HashMap::new()).unwrap_err();
        assert!(matches!(err.root(), LaunchError::UnresolvedArgument(n) if n == "world"));
    }

    #[test]
    fn test_include_cycle() {
        let a = LaunchDescription::new().with(IncludeAction::new(Substitution::text("b")));
        let b = LaunchDescription::new().with(IncludeAction::new(Substitution::text("a")));
        let source = MemorySource::new().with("a", a).with("b", b);
        let env = RuntimeEnvironment::empty();

        let err = Composer::new(&source, &env)
            .compose_locator("a", HashMap::new())
            .unwrap_err();
        match err.root() {
            LaunchError::IncludeCycle { chain } => assert_eq!(chain, &vec!["a", "b", "a"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_include() {
        let main = LaunchDescription::new().with(IncludeAction::new(Substitution::text("missing")));
        let source = MemorySource::new();
        let env = RuntimeEnvironment::empty();
        let err = Composer::new(&source, &env).compose(&main, HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("include 'missing'"), "{err}");
        assert!(matches!(err.root(), LaunchError::IncludeNotFound { .. }));
    }

    #[test]
    fn test_composition_reports_top_level_arguments() {
        let main = LaunchDescription::new()
            .with(
                DeclareArgumentAction::new("rname")
                    .with_default(Substitution::text("go2"))
                    .with_description("Robot name"),
            )
            .with(DeclareArgumentAction::new("world"));
        let source = MemorySource::new().with("main", main);
        let env = RuntimeEnvironment::empty();

        let composition = Composer::new(&source, &env)
            .compose_locator("main", overrides(&[("rname", "a1")]))
            .unwrap();
        assert_eq!(composition.arguments.len(), 2);
        assert_eq!(composition.arguments[0].0.description, "Robot name");
        assert_eq!(composition.arguments[0].1.as_deref(), Some("a1"));
        assert_eq!(composition.arguments[1].1, None);
    }
}
