//! Conditional selection and if/unless conditions

use crate::{
    error::SubstitutionError,
    substitution::{resolve_substitutions, LaunchContext, Substitution},
};

/// Case key that matches any condition value.
pub const WILDCARD: &str = "*";

/// N-way selector: resolves `condition` and picks the first case whose key
/// equals the resolved value. A `*` case, or the explicit default, catches
/// everything else.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector<T> {
    pub condition: Substitution,
    pub cases: Vec<(String, T)>,
    pub default: Option<T>,
}

impl<T> Selector<T> {
    pub fn new(condition: Substitution) -> Self {
        Self {
            condition,
            cases: Vec::new(),
            default: None,
        }
    }

    pub fn case(mut self, key: impl Into<String>, value: T) -> Self {
        self.cases.push((key.into(), value));
        self
    }

    pub fn otherwise(mut self, value: T) -> Self {
        self.default = Some(value);
        self
    }

    /// Evaluate the condition and return the matching case.
    pub fn select(&self, context: &LaunchContext) -> Result<&T, SubstitutionError> {
        let value = self.condition.resolve(context)?;
        log::debug!("Selector condition resolved to '{}'", value);
        self.select_value(&value)
    }

    /// Match an already resolved condition value.
    pub fn select_value(&self, value: &str) -> Result<&T, SubstitutionError> {
        if let Some((_, result)) = self.cases.iter().find(|(key, _)| key == value) {
            return Ok(result);
        }
        if let Some((_, result)) = self.cases.iter().find(|(key, _)| key == WILDCARD) {
            return Ok(result);
        }
        self.default
            .as_ref()
            .ok_or_else(|| SubstitutionError::NoMatchingCase {
                value: value.to_string(),
                cases: self.cases.iter().map(|(key, _)| key.clone()).collect(),
            })
    }
}

/// Condition attached to a launch action.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    If(Vec<Substitution>),
    Unless(Vec<Substitution>),
}

impl Condition {
    /// Whether the guarded action should be processed.
    pub fn evaluate(&self, context: &LaunchContext) -> Result<bool, SubstitutionError> {
        match self {
            Condition::If(expr) => parse_bool(&resolve_substitutions(expr, context)?),
            Condition::Unless(expr) => Ok(!parse_bool(&resolve_substitutions(expr, context)?)?),
        }
    }
}

/// Evaluate every condition of an action; all must hold.
pub fn should_process(
    conditions: &[Condition],
    context: &LaunchContext,
) -> Result<bool, SubstitutionError> {
    for condition in conditions {
        if !condition.evaluate(context)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Interpret a resolved condition value.
pub(crate) fn parse_bool(value: &str) -> Result<bool, SubstitutionError> {
    let normalized = value.trim().to_lowercase();
    match normalized.as_str() {
        "true" | "1" | "yes" | "y" | "on" | "enabled" => Ok(true),
        "false" | "0" | "no" | "n" | "off" | "disabled" | "" => Ok(false),
        _ => Err(SubstitutionError::InvalidCondition(value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        arguments::{ArgumentDeclaration, ArgumentTable},
        substitution::RuntimeEnvironment,
    };

    fn spawner_selector() -> Selector<Substitution> {
        Selector::new(Substitution::env_or("ROS_DISTRO", ""))
            .case("foxy", Substitution::text("spawner.py"))
            .case(WILDCARD, Substitution::text("spawner"))
    }

    #[test]
    fn test_select_foxy() {
        let env = RuntimeEnvironment::empty().with_var("ROS_DISTRO", "foxy");
        let table = ArgumentTable::default();
        let context = LaunchContext::new(&env, &table);
        let chosen = spawner_selector().select(&context).unwrap().resolve(&context).unwrap();
        assert_eq!(chosen, "spawner.py");
    }

    #[test]
    fn test_select_wildcard() {
        let env = RuntimeEnvironment::empty().with_var("ROS_DISTRO", "humble");
        let table = ArgumentTable::default();
        let context = LaunchContext::new(&env, &table);
        let chosen = spawner_selector().select(&context).unwrap().resolve(&context).unwrap();
        assert_eq!(chosen, "spawner");

        // unset distro resolves to "" and also falls through to the wildcard
        let env = RuntimeEnvironment::empty();
        let context = LaunchContext::new(&env, &table);
        let chosen = spawner_selector().select(&context).unwrap().resolve(&context).unwrap();
        assert_eq!(chosen, "spawner");
    }

    #[test]
    fn test_select_n_way() {
        let selector = Selector::new(Substitution::text("unused"))
            .case("foxy", 1)
            .case("galactic", 2)
            .case("humble", 3)
            .otherwise(0);
        assert_eq!(*selector.select_value("galactic").unwrap(), 2);
        assert_eq!(*selector.select_value("humble").unwrap(), 3);
        assert_eq!(*selector.select_value("rolling").unwrap(), 0);
    }

    #[test]
    fn test_exact_case_beats_wildcard_regardless_of_order() {
        let selector = Selector::new(Substitution::text("unused"))
            .case(WILDCARD, "generic")
            .case("foxy", "specific");
        assert_eq!(*selector.select_value("foxy").unwrap(), "specific");
    }

    #[test]
    fn test_no_matching_case() {
        let selector = Selector::new(Substitution::text("unused")).case("foxy", "spawner.py");
        let err = selector.select_value("humble").unwrap_err();
        assert!(matches!(
            err,
            SubstitutionError::NoMatchingCase { ref value, .. } if value == "humble"
        ));
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true").unwrap());
        assert!(parse_bool("True").unwrap());
        assert!(parse_bool("1").unwrap());
        assert!(parse_bool("  yes  ").unwrap());
        assert!(parse_bool("enabled").unwrap());

        assert!(!parse_bool("false").unwrap());
        assert!(!parse_bool("0").unwrap());
        assert!(!parse_bool("").unwrap());
        assert!(parse_bool("random").is_err());
    }

    #[test]
    fn test_conditions() {
        let env = RuntimeEnvironment::empty();
        let mut table = ArgumentTable::default();
        table
            .declare(ArgumentDeclaration::new("use_joy").with_default("true"))
            .unwrap();
        table
            .declare(ArgumentDeclaration::new("headless").with_default("false"))
            .unwrap();
        let context = LaunchContext::new(&env, &table);

        let if_joy = Condition::If(vec![Substitution::arg("use_joy")]);
        let unless_headless = Condition::Unless(vec![Substitution::arg("headless")]);
        let if_headless = Condition::If(vec![Substitution::arg("headless")]);

        assert!(should_process(&[if_joy.clone(), unless_headless], &context).unwrap());
        assert!(!should_process(&[if_joy, if_headless], &context).unwrap());
        assert!(should_process(&[], &context).unwrap());
    }
}
