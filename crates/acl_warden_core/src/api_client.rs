//! The mutation surface the reconciler drives.
//!
//! [`ApiClient`] is implemented twice: by [`DryRunClient`], which only records
//! what would happen, and by [`crate::GitLabApiClient`], which performs the
//! calls against the instance.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::{Level, WardenResult};

#[cfg(test)]
#[path = "api_client_tests.rs"]
mod tests;

/// Remote mutations, addressed by username and full path.
///
/// Every method fails with an error describing the remote call that failed.
#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn add_group_membership(&self, username: &str, group: &str, level: Level)
        -> WardenResult<()>;

    async fn change_group_membership(
        &self,
        username: &str,
        group: &str,
        level: Level,
    ) -> WardenResult<()>;

    async fn remove_group_membership(&self, username: &str, group: &str) -> WardenResult<()>;

    async fn add_project_sharing(&self, project: &str, group: &str, level: Level)
        -> WardenResult<()>;

    async fn remove_project_sharing(&self, project: &str, group: &str) -> WardenResult<()>;

    async fn add_project_membership(
        &self,
        username: &str,
        project: &str,
        level: Level,
    ) -> WardenResult<()>;

    async fn change_project_membership(
        &self,
        username: &str,
        project: &str,
        level: Level,
    ) -> WardenResult<()>;

    async fn remove_project_membership(&self, username: &str, project: &str)
        -> WardenResult<()>;

    async fn create_group_variable(&self, group: &str, key: &str, value: &str)
        -> WardenResult<()>;

    async fn update_group_variable(&self, group: &str, key: &str, value: &str)
        -> WardenResult<()>;

    async fn create_project_variable(&self, project: &str, key: &str, value: &str)
        -> WardenResult<()>;

    async fn update_project_variable(&self, project: &str, key: &str, value: &str)
        -> WardenResult<()>;

    async fn block_user(&self, username: &str) -> WardenResult<()>;

    async fn unblock_user(&self, username: &str) -> WardenResult<()>;

    async fn set_admin_user(&self, username: &str) -> WardenResult<()>;

    async fn unset_admin_user(&self, username: &str) -> WardenResult<()>;

    async fn create_bot_user(&self, username: &str, email: &str) -> WardenResult<()>;

    async fn update_bot_email(&self, username: &str, email: &str) -> WardenResult<()>;
}

/// Records a description of every call instead of performing it.
///
/// Variable values never appear in the descriptions.
///
/// # Examples
///
/// ```rust
/// use acl_warden_core::{ApiClient, DryRunClient, Level};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let client = DryRunClient::new();
/// client
///     .add_group_membership("user1", "root_group", Level::DEVELOPER)
///     .await
///     .unwrap();
///
/// assert_eq!(
///     client.calls(),
///     vec!["add 'user1' to 'root_group' at level 'Developer'"]
/// );
/// # }
/// ```
#[derive(Debug, Default)]
pub struct DryRunClient {
    calls: Mutex<Vec<String>>,
}

impl DryRunClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded calls, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, call: String) -> WardenResult<()> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
        Ok(())
    }
}

#[async_trait]
impl ApiClient for DryRunClient {
    async fn add_group_membership(
        &self,
        username: &str,
        group: &str,
        level: Level,
    ) -> WardenResult<()> {
        self.record(format!("add '{username}' to '{group}' at level '{level}'"))
    }

    async fn change_group_membership(
        &self,
        username: &str,
        group: &str,
        level: Level,
    ) -> WardenResult<()> {
        self.record(format!("change '{username}' in '{group}' at level '{level}'"))
    }

    async fn remove_group_membership(&self, username: &str, group: &str) -> WardenResult<()> {
        self.record(format!("remove '{username}' from '{group}'"))
    }

    async fn add_project_sharing(
        &self,
        project: &str,
        group: &str,
        level: Level,
    ) -> WardenResult<()> {
        self.record(format!(
            "share project '{project}' with group '{group}' at level '{level}'"
        ))
    }

    async fn remove_project_sharing(&self, project: &str, group: &str) -> WardenResult<()> {
        self.record(format!(
            "remove project sharing from '{project}' with group '{group}'"
        ))
    }

    async fn add_project_membership(
        &self,
        username: &str,
        project: &str,
        level: Level,
    ) -> WardenResult<()> {
        self.record(format!("add '{username}' to '{project}' at level '{level}'"))
    }

    async fn change_project_membership(
        &self,
        username: &str,
        project: &str,
        level: Level,
    ) -> WardenResult<()> {
        self.record(format!("change '{username}' in '{project}' to level '{level}'"))
    }

    async fn remove_project_membership(
        &self,
        username: &str,
        project: &str,
    ) -> WardenResult<()> {
        self.record(format!("remove '{username}' from '{project}'"))
    }

    async fn create_group_variable(
        &self,
        group: &str,
        key: &str,
        _value: &str,
    ) -> WardenResult<()> {
        self.record(format!("create group variable '{key}' in '{group}'"))
    }

    async fn update_group_variable(
        &self,
        group: &str,
        key: &str,
        _value: &str,
    ) -> WardenResult<()> {
        self.record(format!("update group variable '{key}' in '{group}'"))
    }

    async fn create_project_variable(
        &self,
        project: &str,
        key: &str,
        _value: &str,
    ) -> WardenResult<()> {
        self.record(format!("create project variable '{key}' in '{project}'"))
    }

    async fn update_project_variable(
        &self,
        project: &str,
        key: &str,
        _value: &str,
    ) -> WardenResult<()> {
        self.record(format!("update project variable '{key}' in '{project}'"))
    }

    async fn block_user(&self, username: &str) -> WardenResult<()> {
        self.record(format!("block '{username}'"))
    }

    async fn unblock_user(&self, username: &str) -> WardenResult<()> {
        self.record(format!("unblock '{username}'"))
    }

    async fn set_admin_user(&self, username: &str) -> WardenResult<()> {
        self.record(format!("set '{username}' as admin"))
    }

    async fn unset_admin_user(&self, username: &str) -> WardenResult<()> {
        self.record(format!("unset '{username}' as admin"))
    }

    async fn create_bot_user(&self, username: &str, email: &str) -> WardenResult<()> {
        self.record(format!("create bot user '{username}' with email '{email}'"))
    }

    async fn update_bot_email(&self, username: &str, email: &str) -> WardenResult<()> {
        self.record(format!("update bot user '{username}' email to '{email}'"))
    }
}
