//! Error types for rule declaration.

/// Errors raised while declaring throttle rules.
///
/// These are configuration mistakes and are meant to abort startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    /// A rule admits no requests at all.
    #[error("Rule capacity must be greater than zero")]
    ZeroCapacity,

    /// A rule has an empty sliding window.
    #[error("Rule window must be at least one second")]
    ZeroWindow,

    /// A rule key was explicitly set to an empty string.
    #[error("Rule key must not be empty")]
    EmptyKey,

    /// A method filter was given without any method in it.
    #[error("Method filter on rule '{key}' is empty; omit it to match every method")]
    EmptyMethods {
        /// Key of the offending rule.
        key: String,
    },

    /// A scope filter was given without any scope in it.
    #[error("Scope filter on rule '{key}' is empty; omit it to match every scope")]
    EmptyScopes {
        /// Key of the offending rule.
        key: String,
    },

    /// A method filter names something that is not an HTTP method token.
    #[error("Invalid HTTP method '{method}' on rule '{key}'")]
    InvalidMethod {
        /// Key of the offending rule.
        key: String,
        /// The rejected method.
        method: String,
    },

    /// The same operation path was registered under two different names.
    #[error("Operation '{path}' is registered as both '{first}' and '{second}'")]
    ConflictingOperationName {
        /// Route path of the operation.
        path: String,
        /// Name from the first registration.
        first: String,
        /// Name from the conflicting registration.
        second: String,
    },
}

/// Errors raised while evaluating throttle rules.
#[derive(Debug, thiserror::Error)]
pub enum LimiterError {
    /// The counter store failed or answered with something unexpected.
    #[error(transparent)]
    Storage(#[from] crate::StorageError),

    /// The evaluation task was aborted before it finished.
    #[error("Rate limit evaluation aborted: {0}")]
    Aborted(String),
}
