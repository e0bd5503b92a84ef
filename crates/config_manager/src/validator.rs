//! Validation of the bot section.

use std::collections::HashSet;

use regex::Regex;

use crate::{Bot, ConfigurationError, ConfigurationResult};

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;

/// Compiles a bot username pattern supplied on the command line.
///
/// # Errors
///
/// Returns `ConfigurationError::InvalidPattern` if the pattern does not compile.
pub fn compile_bot_pattern(pattern: &str) -> ConfigurationResult<Regex> {
    Regex::new(pattern).map_err(|e| ConfigurationError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Checks every configured bot.
///
/// A bot needs a unique username, a non-empty email and, when a pattern is
/// given, a username matching it. All problems are reported together.
///
/// # Errors
///
/// Returns `ConfigurationError::ValidationFailed` listing every invalid bot.
pub fn validate_bots(bots: &[Bot], username_pattern: Option<&Regex>) -> ConfigurationResult<()> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for bot in bots {
        if !seen.insert(bot.username.as_str()) {
            errors.push(format!("bot {} is defined more than once", bot.username));
        }
        if let Some(pattern) = username_pattern {
            if !pattern.is_match(&bot.username) {
                errors.push(format!("invalid bot username {}", bot.username));
            }
        }
        if bot.email.trim().is_empty() {
            errors.push(format!("bot {} has an empty email", bot.username));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigurationError::ValidationFailed {
            error_count: errors.len(),
            errors,
        })
    }
}
