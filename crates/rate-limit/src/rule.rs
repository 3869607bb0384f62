//! Throttle rules and their declaration form.

use std::{collections::BTreeSet, fmt, time::Duration};

use http::Method;

use crate::RuleError;

/// A throttle rule as declared on an operation, before validation.
///
/// ```
/// # use rate_limit::Limit;
/// let limit = Limit::new(5, 60).methods(["POST"]).scopes(["anonymous"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limit {
    capacity: u32,
    window: u64,
    key: Option<String>,
    methods: Option<Vec<String>>,
    scopes: Option<Vec<String>>,
}

impl Limit {
    /// Admit `capacity` requests per sliding window of `window_seconds`.
    pub fn new(capacity: u32, window_seconds: u64) -> Self {
        Self {
            capacity,
            window: window_seconds,
            key: None,
            methods: None,
            scopes: None,
        }
    }

    /// Override the counter key. Rules with the same key, capacity and window
    /// share a counter, also across operations.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Only apply the rule to these HTTP methods.
    pub fn methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.methods = Some(methods.into_iter().map(Into::into).collect());
        self
    }

    /// Only apply the rule to identities holding at least one of these scopes.
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = Some(scopes.into_iter().map(Into::into).collect());
        self
    }

    pub(crate) fn into_rule(self, default_key: &str) -> Result<Rule, RuleError> {
        if self.capacity == 0 {
            return Err(RuleError::ZeroCapacity);
        }

        if self.window == 0 {
            return Err(RuleError::ZeroWindow);
        }

        let key = match self.key {
            Some(key) if key.is_empty() => return Err(RuleError::EmptyKey),
            Some(key) => key,
            None => default_key.to_string(),
        };

        let methods = match self.methods {
            Some(methods) if methods.is_empty() => return Err(RuleError::EmptyMethods { key }),
            Some(methods) => {
                let mut set = BTreeSet::new();

                for method in methods {
                    let upper = method.to_ascii_uppercase();

                    if upper.is_empty() || Method::from_bytes(upper.as_bytes()).is_err() {
                        return Err(RuleError::InvalidMethod { key, method });
                    }

                    set.insert(upper);
                }

                set
            }
            None => BTreeSet::new(),
        };

        let scopes = match self.scopes {
            Some(scopes) if scopes.is_empty() => return Err(RuleError::EmptyScopes { key }),
            Some(scopes) => scopes.into_iter().collect(),
            None => BTreeSet::new(),
        };

        Ok(Rule {
            capacity: self.capacity,
            window: self.window,
            key,
            methods,
            scopes,
        })
    }
}

/// A validated, immutable throttle rule.
///
/// Empty method or scope sets mean the rule applies to every method or scope.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rule {
    capacity: u32,
    window: u64,
    key: String,
    methods: BTreeSet<String>,
    scopes: BTreeSet<String>,
}

impl Rule {
    /// Requests admitted per window.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Window length in whole seconds.
    pub fn window_secs(&self) -> u64 {
        self.window
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window)
    }

    /// Counter key, without the identifier.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Upper-cased method names the rule is restricted to.
    pub fn methods(&self) -> &BTreeSet<String> {
        &self.methods
    }

    /// Scopes the rule is restricted to.
    pub fn scopes(&self) -> &BTreeSet<String> {
        &self.scopes
    }

    /// Whether the rule applies to a request with this method made by an
    /// identity holding these scopes.
    pub fn applies_to<S: AsRef<str>>(&self, method: &Method, scopes: &[S]) -> bool {
        if !self.methods.is_empty() && !self.methods.contains(method.as_str()) {
            return false;
        }

        if !self.scopes.is_empty() && !scopes.iter().any(|scope| self.scopes.contains(scope.as_ref())) {
            return false;
        }

        true
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} per {}s on '{}'", self.capacity, self.window, self.key)
    }
}
