//! Read-only facts about the GitLab instance.
//!
//! The [`Querier`] trait answers the existence and role questions the desired
//! state builder and the differ need. [`PreloadedQuerier`] is the snapshot the
//! loader fills in once per run; it is also handy to assemble by hand in tests.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;

#[cfg(test)]
#[path = "querier_tests.rs"]
mod tests;

/// The single role a user account is classified into at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    User,
    Blocked,
    Bot,
}

/// Existence and identity lookups against the instance.
///
/// All listings are sorted. `users()` and `admins()` never include the ghost user.
pub trait Querier: Send + Sync {
    /// The username the token belongs to.
    fn current_user(&self) -> &str;

    /// True for regular and bot accounts.
    fn is_user(&self, username: &str) -> bool;

    fn is_admin(&self, username: &str) -> bool;

    fn is_blocked(&self, username: &str) -> bool;

    fn is_bot(&self, username: &str) -> bool;

    fn user_id(&self, username: &str) -> Option<u64>;

    fn user_email(&self, username: &str) -> Option<&str>;

    fn group_id(&self, fullpath: &str) -> Option<u64>;

    fn group_exists(&self, fullpath: &str) -> bool {
        self.group_id(fullpath).is_some()
    }

    fn project_exists(&self, fullpath: &str) -> bool;

    fn users(&self) -> Vec<String>;

    fn admins(&self) -> Vec<String>;

    fn blocked(&self) -> Vec<String>;

    fn bots(&self) -> Vec<String>;

    fn groups(&self) -> Vec<String>;

    fn projects(&self) -> Vec<String>;
}

/// Decides which accounts are bots.
///
/// An account is a bot when it is declared in the configuration or, if a
/// pattern is configured, when its username matches the pattern.
#[derive(Debug, Clone, Default)]
pub struct BotDetector {
    declared: BTreeSet<String>,
    pattern: Option<Regex>,
}

impl BotDetector {
    pub fn new(declared: impl IntoIterator<Item = String>, pattern: Option<Regex>) -> Self {
        Self {
            declared: declared.into_iter().collect(),
            pattern,
        }
    }

    pub fn is_bot(&self, username: &str) -> bool {
        self.declared.contains(username)
            || self
                .pattern
                .as_ref()
                .is_some_and(|pattern| pattern.is_match(username))
    }

    /// Classifies an account. Blocked wins over admin, admin wins over bot.
    pub fn classify(&self, username: &str, blocked: bool, admin: bool) -> Role {
        if blocked {
            Role::Blocked
        } else if admin {
            Role::Admin
        } else if self.is_bot(username) {
            Role::Bot
        } else {
            Role::User
        }
    }
}

/// What the snapshot knows about one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: u64,
    pub role: Role,
    pub email: Option<String>,
}

/// An in-memory [`Querier`].
///
/// # Examples
///
/// ```rust
/// use acl_warden_core::{PreloadedQuerier, Querier, Role};
///
/// let mut querier = PreloadedQuerier::new("root");
/// querier.add_user("root", 1, Role::Admin, None);
/// querier.add_user("user1", 2, Role::User, None);
/// querier.add_group("root_group", 10);
///
/// assert!(querier.is_admin("root"));
/// assert_eq!(querier.user_id("user1"), Some(2));
/// assert!(querier.group_exists("root_group"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct PreloadedQuerier {
    current_user: String,
    ghost_user: Option<String>,
    users: BTreeMap<String, UserRecord>,
    groups: BTreeMap<String, u64>,
    projects: BTreeMap<String, u64>,
}

impl PreloadedQuerier {
    pub fn new(current_user: impl Into<String>) -> Self {
        Self {
            current_user: current_user.into(),
            ..Self::default()
        }
    }

    /// Sets the account hidden from `users()` and `admins()`.
    pub fn with_ghost_user(mut self, ghost_user: Option<String>) -> Self {
        self.ghost_user = ghost_user;
        self
    }

    pub fn add_user(
        &mut self,
        username: impl Into<String>,
        id: u64,
        role: Role,
        email: Option<String>,
    ) {
        self.users
            .insert(username.into(), UserRecord { id, role, email });
    }

    pub fn add_group(&mut self, fullpath: impl Into<String>, id: u64) {
        self.groups.insert(fullpath.into(), id);
    }

    pub fn add_project(&mut self, fullpath: impl Into<String>, id: u64) {
        self.projects.insert(fullpath.into(), id);
    }

    pub fn user(&self, username: &str) -> Option<&UserRecord> {
        self.users.get(username)
    }

    /// Returns the full path of the group with the given ID.
    pub fn group_path(&self, id: u64) -> Option<&str> {
        self.groups
            .iter()
            .find(|(_, group_id)| **group_id == id)
            .map(|(path, _)| path.as_str())
    }

    /// Every account with `role`, sorted, the ghost user included.
    pub fn with_role(&self, role: Role) -> Vec<String> {
        self.usernames(|r| r == role, false)
    }

    fn has_role(&self, username: &str, role: Role) -> bool {
        self.users.get(username).is_some_and(|u| u.role == role)
    }

    fn is_ghost(&self, username: &str) -> bool {
        self.ghost_user.as_deref() == Some(username)
    }

    fn usernames(&self, keep: impl Fn(Role) -> bool, hide_ghost: bool) -> Vec<String> {
        self.users
            .iter()
            .filter(|(name, record)| keep(record.role) && !(hide_ghost && self.is_ghost(name)))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl Querier for PreloadedQuerier {
    fn current_user(&self) -> &str {
        &self.current_user
    }

    fn is_user(&self, username: &str) -> bool {
        self.has_role(username, Role::User) || self.has_role(username, Role::Bot)
    }

    fn is_admin(&self, username: &str) -> bool {
        self.has_role(username, Role::Admin)
    }

    fn is_blocked(&self, username: &str) -> bool {
        self.has_role(username, Role::Blocked)
    }

    fn is_bot(&self, username: &str) -> bool {
        self.has_role(username, Role::Bot)
    }

    fn user_id(&self, username: &str) -> Option<u64> {
        self.users.get(username).map(|u| u.id)
    }

    fn user_email(&self, username: &str) -> Option<&str> {
        self.users.get(username).and_then(|u| u.email.as_deref())
    }

    fn group_id(&self, fullpath: &str) -> Option<u64> {
        self.groups.get(fullpath).copied()
    }

    fn project_exists(&self, fullpath: &str) -> bool {
        self.projects.contains_key(fullpath)
    }

    fn users(&self) -> Vec<String> {
        self.usernames(|role| matches!(role, Role::User | Role::Bot), true)
    }

    fn admins(&self) -> Vec<String> {
        self.usernames(|role| role == Role::Admin, true)
    }

    fn blocked(&self) -> Vec<String> {
        self.usernames(|role| role == Role::Blocked, false)
    }

    fn bots(&self) -> Vec<String> {
        self.usernames(|role| role == Role::Bot, false)
    }

    fn groups(&self) -> Vec<String> {
        self.groups.keys().cloned().collect()
    }

    fn projects(&self) -> Vec<String> {
        self.projects.keys().cloned().collect()
    }
}
