//! The `query:` directive language.
//!
//! ```text
//! users                          every regular user on the instance
//! admins                         every admin on the instance
//! <list> from|in <group>         members of a configured group
//! ```
//!
//! `<list>` is one of `guests`, `reporters`, `developers`, `maintainers`,
//! `owners` (members holding exactly that level) or `admins`, `users` (members
//! that are instance admins or regular users). Case is ignored.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::Level;

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;

static MEMBERS_OF: LazyLock<Regex> = LazyLock::new(|| {
    // The pattern is a literal, checked by the tests
    Regex::new(r"^(.*?) (?:from|in) (.*?)$").expect("query pattern is a valid regular expression")
});

/// Errors produced when parsing a query expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Invalid query '{0}'")]
    Invalid(String),

    #[error("unknown access list '{list}' in query '{query}'")]
    UnknownList { list: String, query: String },
}

/// Which members of the referenced group a query selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberFilter {
    /// Members holding exactly this level
    Level(Level),
    /// Members that are instance admins
    Admins,
    /// Members that are regular users
    Users,
}

/// A parsed query expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Every regular user on the instance
    Users,
    /// Every admin on the instance
    Admins,
    /// Selected members of a configured group
    MembersOf { filter: MemberFilter, group: String },
}

impl Query {
    /// Parses a query expression (without the `query:` prefix).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use acl_warden_core::{Level, MemberFilter, Query};
    ///
    /// assert_eq!(Query::parse("users").unwrap(), Query::Users);
    /// assert_eq!(
    ///     Query::parse("developers from root_group").unwrap(),
    ///     Query::MembersOf {
    ///         filter: MemberFilter::Level(Level::DEVELOPER),
    ///         group: "root_group".to_string(),
    ///     }
    /// );
    /// ```
    pub fn parse(expression: &str) -> Result<Query, QueryError> {
        let expression = expression.trim();
        if expression.eq_ignore_ascii_case("users") {
            return Ok(Query::Users);
        }
        if expression.eq_ignore_ascii_case("admins") {
            return Ok(Query::Admins);
        }

        let captures = MEMBERS_OF
            .captures(expression)
            .ok_or_else(|| QueryError::Invalid(expression.to_string()))?;
        let list = title_case(captures[1].trim());
        let group = captures[2].trim();
        if list.is_empty() || group.is_empty() {
            return Err(QueryError::Invalid(expression.to_string()));
        }

        let filter = match list.as_str() {
            "Admins" => MemberFilter::Admins,
            "Users" => MemberFilter::Users,
            other => Level::from_acl_name(other)
                .map(MemberFilter::Level)
                .ok_or_else(|| QueryError::UnknownList {
                    list: list.clone(),
                    query: expression.to_string(),
                })?,
        };

        Ok(Query::MembersOf {
            filter,
            group: group.to_string(),
        })
    }
}

fn title_case(word: &str) -> String {
    let lower = word.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
