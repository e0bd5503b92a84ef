//! A [`Querier`] for tokens without admin rights.
//!
//! Listing every user and group of an instance needs an admin token, and is
//! slow on large instances. [`LazyQuerier`] instead looks names up one at a
//! time as they are resolved and remembers the answers, including the names
//! that do not exist. The synchronous [`Querier`] methods answer from what has
//! been resolved so far; anything not yet resolved is reported as unknown.
//!
//! The instance wide listings it can offer are therefore partial: `admins()`,
//! `blocked()` and `bots()` are always empty.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use gitlab_client::{models, GitLabApi};
use tracing::debug;

use crate::{Querier, Role, UserRecord};

#[cfg(test)]
#[path = "lazy_querier_tests.rs"]
mod tests;

/// Looks users, groups and projects up on demand and caches the answers.
pub struct LazyQuerier {
    client: Arc<dyn GitLabApi>,
    current_user: String,
    users: Mutex<BTreeMap<String, Option<UserRecord>>>,
    groups: Mutex<BTreeMap<String, Option<u64>>>,
    projects: Mutex<BTreeMap<String, Option<u64>>>,
}

impl std::fmt::Debug for LazyQuerier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyQuerier")
            .field("current_user", &self.current_user)
            .field("users", &self.users)
            .field("groups", &self.groups)
            .field("projects", &self.projects)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LazyQuerier {
    pub fn new(client: Arc<dyn GitLabApi>, current_user: impl Into<String>) -> Self {
        Self {
            client,
            current_user: current_user.into(),
            users: Mutex::default(),
            groups: Mutex::default(),
            projects: Mutex::default(),
        }
    }

    /// Returns the ID of `username`, fetching the account on first use.
    pub async fn resolve_user(&self, username: &str) -> Result<Option<u64>, gitlab_client::Error> {
        let cached = lock(&self.users)
            .get(username)
            .map(|known| known.as_ref().map(|record| record.id));
        if let Some(id) = cached {
            return Ok(id);
        }

        let record = self.client.find_user(username).await?.map(|user| {
            let role = if user.is_blocked() {
                Role::Blocked
            } else if user.is_admin {
                Role::Admin
            } else {
                Role::User
            };
            UserRecord {
                id: user.id,
                role,
                email: user.email,
            }
        });
        debug!(username, found = record.is_some(), "Resolved user");

        let id = record.as_ref().map(|r| r.id);
        lock(&self.users).insert(username.to_string(), record);
        Ok(id)
    }

    /// Returns the ID of the group at `fullpath`, fetching it on first use.
    pub async fn resolve_group(&self, fullpath: &str) -> Result<Option<u64>, gitlab_client::Error> {
        let cached = lock(&self.groups).get(fullpath).copied();
        if let Some(id) = cached {
            return Ok(id);
        }

        let id = match self.client.get_group_by_path(fullpath).await {
            Ok(group) => Some(group.id),
            Err(gitlab_client::Error::NotFound) => None,
            Err(e) => return Err(e),
        };
        debug!(group = fullpath, found = id.is_some(), "Resolved group");

        lock(&self.groups).insert(fullpath.to_string(), id);
        Ok(id)
    }

    /// Fetches the project at `fullpath` and remembers whether it exists.
    pub async fn fetch_project(
        &self,
        fullpath: &str,
    ) -> Result<Option<models::Project>, gitlab_client::Error> {
        let project = match self.client.get_project(fullpath).await {
            Ok(project) => Some(project),
            Err(gitlab_client::Error::NotFound) => None,
            Err(e) => return Err(e),
        };

        lock(&self.projects).insert(fullpath.to_string(), project.as_ref().map(|p| p.id));
        Ok(project)
    }

    /// Resolved groups as `(fullpath, id)` pairs.
    pub fn known_groups(&self) -> Vec<(String, u64)> {
        lock(&self.groups)
            .iter()
            .filter_map(|(path, id)| id.map(|id| (path.clone(), id)))
            .collect()
    }

    fn has_role(&self, username: &str, role: Role) -> bool {
        lock(&self.users)
            .get(username)
            .is_some_and(|record| record.as_ref().is_some_and(|r| r.role == role))
    }

    fn usernames(&self, keep: impl Fn(Role) -> bool) -> Vec<String> {
        lock(&self.users)
            .iter()
            .filter(|(_, record)| record.as_ref().is_some_and(|r| keep(r.role)))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl Querier for LazyQuerier {
    fn current_user(&self) -> &str {
        &self.current_user
    }

    fn is_user(&self, username: &str) -> bool {
        self.has_role(username, Role::User)
    }

    fn is_admin(&self, username: &str) -> bool {
        self.has_role(username, Role::Admin)
    }

    fn is_blocked(&self, username: &str) -> bool {
        self.has_role(username, Role::Blocked)
    }

    fn is_bot(&self, _username: &str) -> bool {
        false
    }

    fn user_id(&self, username: &str) -> Option<u64> {
        lock(&self.users)
            .get(username)
            .and_then(|record| record.as_ref().map(|r| r.id))
    }

    /// Emails are not tracked for lazily resolved accounts.
    fn user_email(&self, _username: &str) -> Option<&str> {
        None
    }

    fn group_id(&self, fullpath: &str) -> Option<u64> {
        lock(&self.groups).get(fullpath).copied().flatten()
    }

    fn project_exists(&self, fullpath: &str) -> bool {
        lock(&self.projects)
            .get(fullpath)
            .is_some_and(|id| id.is_some())
    }

    fn users(&self) -> Vec<String> {
        self.usernames(|role| role == Role::User)
    }

    fn admins(&self) -> Vec<String> {
        Vec::new()
    }

    fn blocked(&self) -> Vec<String> {
        Vec::new()
    }

    fn bots(&self) -> Vec<String> {
        Vec::new()
    }

    fn groups(&self) -> Vec<String> {
        self.known_groups().into_iter().map(|(path, _)| path).collect()
    }

    fn projects(&self) -> Vec<String> {
        lock(&self.projects)
            .iter()
            .filter(|(_, id)| id.is_some())
            .map(|(path, _)| path.clone())
            .collect()
    }
}
