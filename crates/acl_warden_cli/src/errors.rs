use thiserror::Error;

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;

/// Errors that can occur in the ACL Warden CLI application.
///
/// Each variant wraps the error of the stage that failed so that the message
/// logged before exiting points at the configuration, the connection or the
/// reconciliation itself.
#[derive(Error, Debug)]
pub enum Error {
    /// The configuration could not be loaded.
    ///
    /// This error is returned when a configuration file is missing, is not
    /// valid YAML, fails its checksum check or defines something twice, and
    /// when the bot pattern given on the command line does not compile.
    #[error("Configuration error: {0}")]
    Config(#[from] config_manager::ConfigurationError),

    /// The GitLab client could not be created.
    ///
    /// This error is returned when the base URL cannot be parsed or the HTTP
    /// client cannot be built.
    #[error("GitLab client error: {0}")]
    Client(#[from] gitlab_client::Error),

    /// Loading, validating, diffing or applying state failed.
    ///
    /// This error carries every problem the failing stage reported.
    #[error("{0}")]
    Reconcile(#[from] acl_warden_core::Error),

    /// Invalid command-line arguments were provided.
    ///
    /// This error is returned when arguments are individually valid but cannot
    /// be used together.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}
