//! Scoped launch argument table
//!
//! Every description declares its arguments into the scope that is current
//! while it is being composed. The root scope carries the caller's overrides;
//! each include pushes a child scope carrying the include-site overrides.
//!
//! Lookup order for a name, starting at the current scope:
//! 1. the scope's own overrides,
//! 2. the value visible from the enclosing scope,
//! 3. the scope's own declared default.
//!
//! So an include-site override always beats the included description's
//! default, and a value set further out flows into nested descriptions that
//! redeclare the same argument.

use crate::error::{LaunchError, Result};
use serde::Serialize;
use std::collections::HashMap;

/// A declared launch argument. The default is stored already resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArgumentDeclaration {
    pub name: String,
    pub default: Option<String>,
    pub description: String,
    pub choices: Option<Vec<String>>,
}

impl ArgumentDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            description: String::new(),
            choices: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
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
}

#[derive(Debug, Clone)]
struct Scope {
    label: String,
    overrides: HashMap<String, String>,
    declarations: Vec<ArgumentDeclaration>,
}

impl Scope {
    fn new(label: String, overrides: HashMap<String, String>) -> Self {
        Self {
            label,
            overrides,
            declarations: Vec::new(),
        }
    }

    fn declaration(&self, name: &str) -> Option<&ArgumentDeclaration> {
        self.declarations.iter().find(|d| d.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct ArgumentTable {
    scopes: Vec<Scope>,
}

impl ArgumentTable {
    /// Create a table whose root scope carries the caller's overrides.
    pub fn new(overrides: HashMap<String, String>) -> Self {
        Self {
            scopes: vec![Scope::new("<root>".to_string(), overrides)],
        }
    }

    /// Register a declaration in the current scope.
    pub fn declare(&mut self, declaration: ArgumentDeclaration) -> Result<()> {
        let scope = self.current_mut();
        if scope.declaration(&declaration.name).is_some() {
            return Err(LaunchError::DuplicateArgument(declaration.name));
        }
        log::trace!(
            "Declaring argument '{}' in scope {} (default: {:?})",
            declaration.name,
            scope.label,
            declaration.default
        );
        let name = declaration.name.clone();
        let choices = declaration.choices.clone();
        scope.declarations.push(declaration);

        if let (Some(choices), Some(value)) = (choices, self.lookup(&name)) {
            if !choices.iter().any(|c| c == value) {
                return Err(LaunchError::InvalidChoice {
                    name,
                    value: value.to_string(),
                    choices,
                });
            }
        }
        Ok(())
    }

    /// Value of `name` as seen from the current scope.
    pub fn resolve(&self, name: &str) -> Result<String> {
        self.lookup(name)
            .map(str::to_string)
            .ok_or_else(|| LaunchError::UnresolvedArgument(name.to_string()))
    }

    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.lookup_in(self.scopes.len() - 1, name)
    }

    fn lookup_in(&self, depth: usize, name: &str) -> Option<&str> {
        let scope = &self.scopes[depth];
        if let Some(value) = scope.overrides.get(name) {
            return Some(value);
        }
        if depth > 0 {
            if let Some(value) = self.lookup_in(depth - 1, name) {
                return Some(value);
            }
        }
        scope.declaration(name).and_then(|d| d.default.as_deref())
    }

    /// Enter a child scope for an included description.
    pub fn push_scope(&mut self, label: impl Into<String>, overrides: Vec<(String, String)>) {
        let label = label.into();
        log::trace!("Entering argument scope {} with {} override(s)", label, overrides.len());
        self.scopes
            .push(Scope::new(label, overrides.into_iter().collect()));
    }

    /// Set an override in the current scope. Include-site overrides are
    /// added one at a time so later ones can refer to earlier ones.
    pub fn set_override(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.current_mut().overrides.insert(name.into(), value.into());
    }

    /// Leave the current child scope. The root scope is never popped.
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Number of nested scopes, the root counting as one.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Declarations of the current scope, in declaration order.
    pub fn declarations(&self) -> &[ArgumentDeclaration] {
        &self.current().declarations
    }

    fn current(&self) -> &Scope {
        &self.scopes[self.scopes.len() - 1]
    }

    fn current_mut(&mut self) -> &mut Scope {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }
}

impl Default for ArgumentTable {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}
