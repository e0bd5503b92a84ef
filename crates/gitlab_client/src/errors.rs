//! Error types for GitLab client operations.
//!
//! This module defines the error types that can occur when talking to the GitLab REST API
//! through the gitlab_client crate.

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;

/// Errors that can occur during GitLab client operations.
///
/// Status codes the caller is expected to react to (403, 404, 429) get their own variants so
/// that callers can match on them instead of parsing messages.
///
/// ## Examples
///
/// ```rust,ignore
/// use gitlab_client::Error;
///
/// match client.list_group_variables("my-group").await {
///     Ok(vars) => println!("{} variables", vars.len()),
///     Err(Error::Forbidden) => println!("variables are not readable"),
///     Err(err) => eprintln!("Other error: {}", err),
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The GitLab API answered with an unexpected, non-successful status code.
    ///
    /// The message holds the response body as returned by GitLab.
    #[error("API request failed with status {status}: {message}")]
    ApiError { status: u16, message: String },

    /// The token was rejected by GitLab (HTTP 401).
    #[error("Failed to authenticate against GitLab: {0}")]
    AuthError(String),

    /// Error deserializing the response from GitLab.
    ///
    /// This usually means the API version differs from the one the models were written for.
    #[error("Failed to deserialize GitLab response: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// The token is valid but lacks permission for the resource (HTTP 403).
    #[error("Access to the resource is forbidden")]
    Forbidden,

    /// The request could not be sent or its body could not be read.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The configured base URL cannot be used to build request URLs.
    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// The GitLab API returned a response in an unexpected format.
    #[error("Invalid response format")]
    InvalidResponse,

    /// The requested resource was not found (HTTP 404).
    #[error("Resource not found")]
    NotFound,

    /// GitLab kept answering HTTP 429 after every retry was spent.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,
}
