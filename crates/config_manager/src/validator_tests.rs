use super::*;

fn bot(username: &str, email: &str) -> Bot {
    Bot {
        username: username.to_string(),
        email: email.to_string(),
    }
}

#[test]
fn test_valid_bots_pass() {
    let pattern = compile_bot_pattern("^bot-.*$").unwrap();
    let bots = vec![bot("bot-deploy", "deploy@example.com")];

    assert!(validate_bots(&bots, Some(&pattern)).is_ok());
}

#[test]
fn test_without_pattern_only_email_is_checked() {
    let bots = vec![bot("anything", "a@example.com")];

    assert!(validate_bots(&bots, None).is_ok());
}

#[test]
fn test_every_problem_is_reported() {
    let pattern = compile_bot_pattern("^bot-.*$").unwrap();
    let bots = vec![
        bot("deploy", "deploy@example.com"),
        bot("bot-release", " "),
    ];

    let result = validate_bots(&bots, Some(&pattern));

    assert_eq!(
        result,
        Err(ConfigurationError::ValidationFailed {
            error_count: 2,
            errors: vec![
                "invalid bot username deploy".to_string(),
                "bot bot-release has an empty email".to_string(),
            ],
        })
    );
}

#[test]
fn test_invalid_pattern() {
    let result = compile_bot_pattern("([unclosed");

    assert!(matches!(
        result,
        Err(ConfigurationError::InvalidPattern { .. })
    ));
}

#[test]
fn test_duplicate_bot_usernames_are_reported() {
    let bots = vec![
        bot("bot-deploy", "deploy@example.com"),
        bot("bot-release", "release@example.com"),
        bot("bot-deploy", "other@example.com"),
    ];

    let result = validate_bots(&bots, None);

    assert_eq!(
        result,
        Err(ConfigurationError::ValidationFailed {
            error_count: 1,
            errors: vec!["bot bot-deploy is defined more than once".to_string()],
        })
    );
}
