//! # Models
//!
//! Data models for the subset of the GitLab REST API this client talks to.
//!
//! Only the fields needed to reconcile memberships, sharing, variables and users are
//! modelled; everything else in the responses is ignored during deserialization.

use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "models_tests.rs"]
mod tests;

/// The `state` value GitLab reports for blocked accounts.
pub const BLOCKED_STATE: &str = "blocked";

/// A GitLab user account.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct User {
    /// The unique ID of the account
    pub id: u64,
    /// The login name of the account
    pub username: String,
    /// Primary email, only visible to administrators
    #[serde(default)]
    pub email: Option<String>,
    /// Account state, e.g. `active` or `blocked`
    #[serde(default)]
    pub state: String,
    /// Whether the account is an instance administrator
    #[serde(default)]
    pub is_admin: bool,
}

impl User {
    /// Returns true when GitLab reports the account as blocked.
    pub fn is_blocked(&self) -> bool {
        self.state == BLOCKED_STATE
    }
}

/// A group that was given access to another group or to a project.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SharedGroup {
    pub group_id: u64,
    /// Not every GitLab version reports the full path; callers resolve it by ID when absent.
    #[serde(default)]
    pub group_full_path: Option<String>,
    pub group_access_level: u8,
}

/// A GitLab group.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Group {
    pub id: u64,
    pub full_path: String,
    #[serde(default)]
    pub shared_with_groups: Vec<SharedGroup>,
}

fn enabled_by_default() -> bool {
    true
}

/// A GitLab project.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Project {
    pub id: u64,
    pub path_with_namespace: String,
    #[serde(default)]
    pub archived: bool,
    #[serde(default = "enabled_by_default")]
    pub jobs_enabled: bool,
    #[serde(default)]
    pub shared_with_groups: Vec<SharedGroup>,
}

/// A direct member of a group or project.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Member {
    pub id: u64,
    pub username: String,
    pub access_level: u8,
}

/// A CI/CD variable defined on a group or project.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Variable {
    pub key: String,
    pub value: String,
}

/// A secondary email address attached to a user account.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Email {
    pub id: u64,
    pub email: String,
}

/// Payload for creating a new user account.
///
/// The password is only ever sent to GitLab; it is skipped when the payload is debug printed.
#[derive(Serialize, Clone)]
pub struct NewUser {
    pub username: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub skip_confirmation: bool,
}

impl std::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUser")
            .field("username", &self.username)
            .field("name", &self.name)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// The items on this page
    pub items: Vec<T>,
    /// The 1-based index of this page
    pub page: u32,
    /// The number of pages GitLab reported for the whole listing
    pub total_pages: u32,
}

impl<T> Page<T> {
    /// Returns true when no page follows this one.
    pub fn is_last(&self) -> bool {
        self.page >= self.total_pages
    }
}
