//! The [`ApiClient`] that applies actions to a GitLab instance.

use std::sync::Arc;

use async_trait::async_trait;
use gitlab_client::{models::NewUser, GitLabApi};
use rand::{distributions::Alphanumeric, Rng};
use tracing::{info, instrument, warn};

use crate::{ApiClient, Error, Level, Querier, WardenResult};

#[cfg(test)]
#[path = "gitlab_api_tests.rs"]
mod tests;

/// Length of the throwaway password bot accounts are created with.
pub const BOT_PASSWORD_LENGTH: usize = 32;

/// Returns a random alphanumeric string of `length` characters.
pub fn random_password(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Performs actions through a [`GitLabApi`], resolving names to IDs with a [`Querier`].
pub struct GitLabApiClient<'a> {
    client: Arc<dyn GitLabApi>,
    querier: &'a dyn Querier,
}

impl<'a> GitLabApiClient<'a> {
    pub fn new(client: Arc<dyn GitLabApi>, querier: &'a dyn Querier) -> Self {
        Self { client, querier }
    }

    fn user_id(&self, username: &str) -> WardenResult<u64> {
        self.querier
            .user_id(username)
            .ok_or_else(|| Error::UnknownUser(username.to_string()))
    }

    fn group_id(&self, group: &str) -> WardenResult<u64> {
        self.querier
            .group_id(group)
            .ok_or_else(|| Error::UnknownGroup(group.to_string()))
    }
}

#[async_trait]
impl ApiClient for GitLabApiClient<'_> {
    #[instrument(skip(self))]
    async fn add_group_membership(
        &self,
        username: &str,
        group: &str,
        level: Level,
    ) -> WardenResult<()> {
        let user_id = self.user_id(username)?;
        self.client
            .add_group_member(group, user_id, level.access_level())
            .await
            .map_err(|e| Error::remote(format!("add '{username}' to group '{group}'"), e))?;
        info!(user = username, group, level = %level, "[apply] added user to group");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn change_group_membership(
        &self,
        username: &str,
        group: &str,
        level: Level,
    ) -> WardenResult<()> {
        let user_id = self.user_id(username)?;
        self.client
            .edit_group_member(group, user_id, level.access_level())
            .await
            .map_err(|e| {
                Error::remote(format!("change '{username}' in group '{group}'"), e)
            })?;
        info!(user = username, group, level = %level, "[apply] changed group membership");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_group_membership(&self, username: &str, group: &str) -> WardenResult<()> {
        let user_id = self.user_id(username)?;
        self.client
            .remove_group_member(group, user_id)
            .await
            .map_err(|e| {
                Error::remote(format!("remove '{username}' from group '{group}'"), e)
            })?;
        info!(user = username, group, "[apply] removed user from group");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn add_project_sharing(
        &self,
        project: &str,
        group: &str,
        level: Level,
    ) -> WardenResult<()> {
        let group_id = self.group_id(group)?;
        self.client
            .share_project_with_group(project, group_id, level.access_level())
            .await
            .map_err(|e| {
                Error::remote(format!("share project '{project}' with group '{group}'"), e)
            })?;
        info!(project, group, level = %level, "[apply] shared project with group");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_project_sharing(&self, project: &str, group: &str) -> WardenResult<()> {
        let group_id = self.group_id(group)?;
        self.client
            .unshare_project_with_group(project, group_id)
            .await
            .map_err(|e| {
                Error::remote(
                    format!("remove sharing of project '{project}' with group '{group}'"),
                    e,
                )
            })?;
        info!(project, group, "[apply] removed project sharing");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn add_project_membership(
        &self,
        username: &str,
        project: &str,
        level: Level,
    ) -> WardenResult<()> {
        let user_id = self.user_id(username)?;
        self.client
            .add_project_member(project, user_id, level.access_level())
            .await
            .map_err(|e| {
                Error::remote(format!("add '{username}' to project '{project}'"), e)
            })?;
        info!(user = username, project, level = %level, "[apply] added user to project");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn change_project_membership(
        &self,
        username: &str,
        project: &str,
        level: Level,
    ) -> WardenResult<()> {
        let user_id = self.user_id(username)?;
        self.client
            .edit_project_member(project, user_id, level.access_level())
            .await
            .map_err(|e| {
                Error::remote(format!("change '{username}' in project '{project}'"), e)
            })?;
        info!(user = username, project, level = %level, "[apply] changed project membership");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_project_membership(
        &self,
        username: &str,
        project: &str,
    ) -> WardenResult<()> {
        let user_id = self.user_id(username)?;
        self.client
            .remove_project_member(project, user_id)
            .await
            .map_err(|e| {
                Error::remote(format!("remove '{username}' from project '{project}'"), e)
            })?;
        info!(user = username, project, "[apply] removed user from project");
        Ok(())
    }

    #[instrument(skip(self, value))]
    async fn create_group_variable(
        &self,
        group: &str,
        key: &str,
        value: &str,
    ) -> WardenResult<()> {
        self.client
            .create_group_variable(group, key, value)
            .await
            .map_err(|e| {
                Error::remote(format!("create variable '{key}' in group '{group}'"), e)
            })?;
        info!(group, key, "[apply] created group variable");
        Ok(())
    }

    #[instrument(skip(self, value))]
    async fn update_group_variable(
        &self,
        group: &str,
        key: &str,
        value: &str,
    ) -> WardenResult<()> {
        self.client
            .update_group_variable(group, key, value)
            .await
            .map_err(|e| {
                Error::remote(format!("update variable '{key}' in group '{group}'"), e)
            })?;
        info!(group, key, "[apply] updated group variable");
        Ok(())
    }

    #[instrument(skip(self, value))]
    async fn create_project_variable(
        &self,
        project: &str,
        key: &str,
        value: &str,
    ) -> WardenResult<()> {
        self.client
            .create_project_variable(project, key, value)
            .await
            .map_err(|e| {
                Error::remote(format!("create variable '{key}' in project '{project}'"), e)
            })?;
        info!(project, key, "[apply] created project variable");
        Ok(())
    }

    #[instrument(skip(self, value))]
    async fn update_project_variable(
        &self,
        project: &str,
        key: &str,
        value: &str,
    ) -> WardenResult<()> {
        self.client
            .update_project_variable(project, key, value)
            .await
            .map_err(|e| {
                Error::remote(format!("update variable '{key}' in project '{project}'"), e)
            })?;
        info!(project, key, "[apply] updated project variable");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn block_user(&self, username: &str) -> WardenResult<()> {
        let user_id = self.user_id(username)?;
        self.client
            .block_user(user_id)
            .await
            .map_err(|e| Error::remote(format!("block '{username}'"), e))?;
        info!(user = username, "[apply] blocked user");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn unblock_user(&self, username: &str) -> WardenResult<()> {
        let user_id = self.user_id(username)?;
        self.client
            .unblock_user(user_id)
            .await
            .map_err(|e| Error::remote(format!("unblock '{username}'"), e))?;
        info!(user = username, "[apply] unblocked user");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_admin_user(&self, username: &str) -> WardenResult<()> {
        let user_id = self.user_id(username)?;
        self.client
            .set_admin(user_id, true)
            .await
            .map_err(|e| Error::remote(format!("set '{username}' as admin"), e))?;
        info!(user = username, "[apply] set user as admin");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn unset_admin_user(&self, username: &str) -> WardenResult<()> {
        let user_id = self.user_id(username)?;
        self.client
            .set_admin(user_id, false)
            .await
            .map_err(|e| Error::remote(format!("unset '{username}' as admin"), e))?;
        info!(user = username, "[apply] unset user as admin");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn create_bot_user(&self, username: &str, email: &str) -> WardenResult<()> {
        let user = NewUser {
            username: username.to_string(),
            name: format!("[BOT] {username}"),
            email: email.to_string(),
            password: random_password(BOT_PASSWORD_LENGTH),
            skip_confirmation: true,
        };
        self.client
            .create_user(&user)
            .await
            .map_err(|e| Error::remote(format!("create bot user '{username}'"), e))?;
        info!(user = username, email, "[apply] created bot user");
        Ok(())
    }

    /// Sets the primary email and deletes every other email of the account.
    #[instrument(skip(self))]
    async fn update_bot_email(&self, username: &str, email: &str) -> WardenResult<()> {
        let user_id = self.user_id(username)?;
        self.client
            .update_user_email(user_id, email)
            .await
            .map_err(|e| {
                Error::remote(format!("update bot user '{username}' email to '{email}'"), e)
            })?;

        match self.client.list_user_emails(user_id).await {
            Ok(emails) => {
                for stale in emails.into_iter().filter(|e| e.email != email) {
                    if let Err(e) = self.client.delete_user_email(user_id, stale.id).await {
                        warn!(
                            user = username,
                            email = %stale.email,
                            error = %e,
                            "Failed to delete secondary email"
                        );
                    }
                }
            }
            Err(e) => warn!(user = username, error = %e, "Failed to list emails"),
        }

        info!(user = username, email, "[apply] changed bot user email");
        Ok(())
    }
}
