//! The registration table mapping protected operations to their rules.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use config::RouteConfig;
use http::Method;

use crate::{Limit, Rule, RuleError};

/// Fully-qualified name of a handler function, e.g. `my_app::routes::login`.
pub fn operation_name<H>(_handler: &H) -> &'static str {
    std::any::type_name::<H>()
}

/// Identifies a protected operation by the route path template it is mounted at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    path: String,
    name: Option<String>,
}

impl Operation {
    /// An operation mounted at `path`, e.g. `/users/{id}`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: None,
        }
    }

    /// An operation mounted at `path` and named after `handler`.
    pub fn of<H>(path: impl Into<String>, handler: &H) -> Self {
        Self::new(path).named(operation_name(handler))
    }

    /// Set the operation name. It becomes the default key of the rules
    /// attached to this operation.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The route path template.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The operation name, if one was given.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// The deduplicated rules owned by one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: BTreeSet<Rule>,
}

impl RuleSet {
    /// Add a rule. Returns false when an equal rule was already present.
    pub fn insert(&mut self, rule: Rule) -> bool {
        self.rules.insert(rule)
    }

    /// Number of distinct rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the set holds no rule.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterate the rules in their canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// The rules that apply to a request with this method from an identity
    /// holding these scopes.
    pub fn applicable<S: AsRef<str>>(&self, method: &Method, scopes: &[S]) -> Vec<&Rule> {
        self.rules.iter().filter(|rule| rule.applies_to(method, scopes)).collect()
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::collections::btree_set::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

/// Immutable table of rule sets, keyed by route path template.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    operations: HashMap<String, RuleSet>,
}

impl RuleRegistry {
    /// Start declaring rules.
    pub fn builder() -> RuleRegistryBuilder {
        RuleRegistryBuilder::default()
    }

    /// Build a registry from the `[[routes]]` configuration section.
    pub fn from_routes(routes: &[RouteConfig]) -> Result<Self, RuleError> {
        Self::builder().routes(routes).build()
    }

    /// The rules of the operation mounted at `path`, if it is protected.
    pub fn rules_for(&self, path: &str) -> Option<&RuleSet> {
        self.operations.get(path)
    }

    /// Number of protected operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether no operation is protected.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Wrap the registry for sharing between request tasks.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[derive(Debug, Default)]
struct PendingOperation {
    name: Option<String>,
    limits: Vec<Limit>,
}

/// Collects rule declarations and validates them into a [`RuleRegistry`].
#[derive(Debug, Default)]
pub struct RuleRegistryBuilder {
    operations: BTreeMap<String, PendingOperation>,
    error: Option<RuleError>,
}

impl RuleRegistryBuilder {
    /// Attach one rule to an operation.
    pub fn attach(self, operation: Operation, limit: Limit) -> Self {
        self.attach_all(operation, [limit])
    }

    /// Attach several rules to an operation. Attaching nothing is a no-op.
    pub fn attach_all(mut self, operation: Operation, limits: impl IntoIterator<Item = Limit>) -> Self {
        let mut limits = limits.into_iter().peekable();

        if limits.peek().is_none() {
            return self;
        }

        let Operation { path, name } = operation;
        let pending = self.operations.entry(path.clone()).or_default();

        if let Some(name) = name {
            match &pending.name {
                Some(first) if *first != name => {
                    let first = first.clone();

                    self.error.get_or_insert(RuleError::ConflictingOperationName {
                        path,
                        first,
                        second: name,
                    });
                }
                Some(_) => (),
                None => pending.name = Some(name),
            }
        }

        pending.limits.extend(limits);

        self
    }

    /// Attach the rules declared in the `[[routes]]` configuration section.
    pub fn routes(mut self, routes: &[RouteConfig]) -> Self {
        for route in routes {
            let mut operation = Operation::new(route.path.clone());

            if let Some(name) = &route.operation {
                operation = operation.named(name.clone());
            }

            let limits = route.limits.iter().map(|limit| {
                let mut declared = Limit::new(limit.capacity, limit.window.as_secs());

                if let Some(key) = &limit.key {
                    declared = declared.key(key.clone());
                }

                if let Some(methods) = &limit.methods {
                    declared = declared.methods(methods.iter().cloned());
                }

                if let Some(scopes) = &limit.scopes {
                    declared = declared.scopes(scopes.iter().cloned());
                }

                declared
            });

            self = self.attach_all(operation, limits);
        }

        self
    }

    /// Fold every declaration of `other` into this builder.
    pub fn merge(mut self, other: RuleRegistryBuilder) -> Self {
        if let Some(error) = other.error {
            self.error.get_or_insert(error);
        }

        for (path, pending) in other.operations {
            let mut operation = Operation::new(path);
            operation.name = pending.name;

            self = self.attach_all(operation, pending.limits);
        }

        self
    }

    /// Validate every declaration. Fails on the first configuration error.
    pub fn build(self) -> Result<RuleRegistry, RuleError> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let mut operations = HashMap::with_capacity(self.operations.len());

        for (path, pending) in self.operations {
            let default_key = pending.name.as_deref().unwrap_or(&path);
            let mut rules = RuleSet::default();

            for limit in pending.limits {
                let rule = limit.into_rule(default_key)?;

                if !rules.insert(rule) {
                    log::debug!("Ignoring duplicate throttle rule on '{path}'");
                }
            }

            log::debug!("Registered {} throttle rule(s) on '{path}'", rules.len());

            operations.insert(path, rules);
        }

        Ok(RuleRegistry { operations })
    }
}
