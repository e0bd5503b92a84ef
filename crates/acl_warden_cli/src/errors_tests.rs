use super::*;
use acl_warden_core::AggregateError;
use config_manager::ConfigurationError;

#[test]
fn test_config_error_display() {
    let error = Error::from(ConfigurationError::ChecksumMissing {
        path: "config.yaml".to_string(),
    });
    assert_eq!(
        error.to_string(),
        "Configuration error: Checksum file not found for configuration file: config.yaml"
    );
}

#[test]
fn test_client_error_display() {
    let error = Error::from(gitlab_client::Error::InvalidBaseUrl {
        url: "not a url".to_string(),
        reason: "relative URL without a base".to_string(),
    });
    assert!(error.to_string().starts_with("GitLab client error: "));
}

#[test]
fn test_reconcile_error_keeps_core_message() {
    let error = Error::from(acl_warden_core::Error::Validation(AggregateError::new(vec![
        "Group 'missing' does not exist".to_string(),
    ])));
    assert!(error.to_string().starts_with("failed to build desired state: "));
    assert!(error.to_string().contains("Group 'missing' does not exist"));
}

#[test]
fn test_invalid_arguments_error_display() {
    let error = Error::InvalidArguments("--skip-groups conflicts".to_string());
    assert_eq!(
        error.to_string(),
        "Invalid arguments: --skip-groups conflicts"
    );
}

#[test]
fn test_error_debug_format() {
    let error = Error::InvalidArguments("test".to_string());
    let debug_output = format!("{:?}", error);
    assert!(debug_output.contains("InvalidArguments"));
    assert!(debug_output.contains("test"));
}

#[test]
fn test_error_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Error>();
}
