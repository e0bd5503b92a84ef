//! Error types for the reconciler.
//!
//! Most stages of a run keep going after a failure and report everything that
//! went wrong at the end. [`Errors`] collects those failures, possibly from
//! several tasks at once, and turns them into one [`AggregateError`].

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;

/// Errors that can occur while building, loading, diffing or applying state.
#[derive(Error, Debug)]
pub enum Error {
    /// The configuration could not be loaded or validated.
    #[error("invalid configuration: {0}")]
    Config(#[from] config_manager::ConfigurationError),

    /// The desired state could not be built from the configuration.
    #[error("failed to build desired state: {0}")]
    Validation(AggregateError),

    /// The current state could not be (completely) loaded from GitLab.
    #[error("failed to load current state: {0}")]
    Load(AggregateError),

    /// The differ refused to emit one or more actions.
    #[error("failed to reconcile: {0}")]
    Reconciliation(AggregateError),

    /// The differ was called without one of its input states.
    #[error("invalid {0} state: none")]
    MissingState(&'static str),

    /// An action refers to a user that does not exist on the instance.
    #[error("unknown user '{0}'")]
    UnknownUser(String),

    /// An action refers to a group that does not exist on the instance.
    #[error("unknown group '{0}'")]
    UnknownGroup(String),

    /// A call to the GitLab API failed.
    #[error("failed to {action}: {source}")]
    Remote {
        action: String,
        #[source]
        source: gitlab_client::Error,
    },
}

impl Error {
    /// Wraps a failed GitLab call, `action` completing "failed to ...".
    pub fn remote(action: impl Into<String>, source: gitlab_client::Error) -> Self {
        Error::Remote {
            action: action.into(),
            source,
        }
    }
}

/// Result type alias for reconciler operations.
pub type WardenResult<T> = Result<T, Error>;

/// Several independent failures reported as one error.
///
/// Renders as `1 error: <e>` or `<n> errors: <e1>; <e2>; ...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateError {
    messages: Vec<String>,
}

impl AggregateError {
    pub fn new(messages: Vec<String>) -> Self {
        Self { messages }
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns true if any collected message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.messages.iter().any(|m| m.contains(needle))
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.messages.len() {
            0 => write!(f, "0 errors"),
            1 => write!(f, "1 error: {}", self.messages[0]),
            n => write!(f, "{} errors: {}", n, self.messages.join("; ")),
        }
    }
}

impl std::error::Error for AggregateError {}

/// A thread safe collector of failures.
///
/// # Examples
///
/// ```rust
/// use acl_warden_core::Errors;
///
/// let errors = Errors::new();
/// errors.append("Group 'a' does not exist");
/// errors.append(format!("project '{}' does not exist", "b"));
///
/// let aggregate = errors.into_error().unwrap();
/// assert_eq!(
///     aggregate.to_string(),
///     "2 errors: Group 'a' does not exist; project 'b' does not exist"
/// );
/// ```
#[derive(Debug, Default)]
pub struct Errors {
    messages: Mutex<Vec<String>>,
}

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records one failure.
    pub fn append(&self, error: impl fmt::Display) {
        self.lock().push(error.to_string());
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns the failures collected so far, if any.
    pub fn snapshot(&self) -> Option<AggregateError> {
        let messages = self.lock();
        if messages.is_empty() {
            None
        } else {
            Some(AggregateError::new(messages.clone()))
        }
    }

    /// Consumes the collector, returning the failures if there were any.
    pub fn into_error(self) -> Option<AggregateError> {
        let messages = self
            .messages
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        if messages.is_empty() {
            None
        } else {
            Some(AggregateError::new(messages))
        }
    }
}

/// A result that may be partially complete.
///
/// Used where a stage should hand back everything it managed to produce
/// together with what went wrong, leaving the decision to abort to the caller.
#[derive(Debug)]
pub struct BestEffort<T> {
    pub value: T,
    pub error: Option<AggregateError>,
}

impl<T> BestEffort<T> {
    pub fn new(value: T, error: Option<AggregateError>) -> Self {
        Self { value, error }
    }

    /// Returns true when no failure was recorded.
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Turns the partial result into a strict one, wrapping a recorded failure with `wrap`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use acl_warden_core::{BestEffort, Error};
    ///
    /// let complete = BestEffort::new(3, None);
    /// assert_eq!(complete.into_result(Error::Load).unwrap(), 3);
    /// ```
    pub fn into_result(self, wrap: fn(AggregateError) -> Error) -> WardenResult<T> {
        match self.error {
            None => Ok(self.value),
            Some(error) => Err(wrap(error)),
        }
    }
}
