//! Actions emitted by the differ.

use tracing::{debug, info};

use crate::{ApiClient, Level, WardenResult};

#[cfg(test)]
#[path = "action_tests.rs"]
mod tests;

/// Execution buckets, run in declaration order.
///
/// Unblocking comes first so that unblocked users can be given access in the
/// same run; blocking comes last so that memberships are cleaned up before.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    UnblockUser,
    ManageAdminUser,
    ManageGroup,
    ManageProject,
    BlockUser,
}

impl Priority {
    pub const ALL: [Priority; 5] = [
        Priority::UnblockUser,
        Priority::ManageAdminUser,
        Priority::ManageGroup,
        Priority::ManageProject,
        Priority::BlockUser,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// One remote mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    AddGroupMembership {
        username: String,
        group: String,
        level: Level,
    },
    ChangeGroupMembership {
        username: String,
        group: String,
        level: Level,
    },
    RemoveGroupMembership {
        username: String,
        group: String,
    },
    AddProjectSharing {
        project: String,
        group: String,
        level: Level,
    },
    RemoveProjectSharing {
        project: String,
        group: String,
    },
    AddProjectMembership {
        username: String,
        project: String,
        level: Level,
    },
    ChangeProjectMembership {
        username: String,
        project: String,
        level: Level,
    },
    RemoveProjectMembership {
        username: String,
        project: String,
    },
    CreateGroupVariable {
        group: String,
        key: String,
        value: String,
    },
    UpdateGroupVariable {
        group: String,
        key: String,
        value: String,
    },
    CreateProjectVariable {
        project: String,
        key: String,
        value: String,
    },
    UpdateProjectVariable {
        project: String,
        key: String,
        value: String,
    },
    SetAdmin {
        username: String,
    },
    UnsetAdmin {
        username: String,
    },
    BlockUser {
        username: String,
    },
    UnblockUser {
        username: String,
    },
    CreateBot {
        username: String,
        email: String,
    },
    UpdateBotEmail {
        username: String,
        email: String,
    },
}

impl Action {
    pub fn priority(&self) -> Priority {
        match self {
            Action::UnblockUser { .. } => Priority::UnblockUser,
            Action::SetAdmin { .. }
            | Action::UnsetAdmin { .. }
            | Action::CreateBot { .. }
            | Action::UpdateBotEmail { .. } => Priority::ManageAdminUser,
            Action::AddGroupMembership { .. }
            | Action::ChangeGroupMembership { .. }
            | Action::RemoveGroupMembership { .. }
            | Action::CreateGroupVariable { .. }
            | Action::UpdateGroupVariable { .. } => Priority::ManageGroup,
            Action::AddProjectSharing { .. }
            | Action::RemoveProjectSharing { .. }
            | Action::AddProjectMembership { .. }
            | Action::ChangeProjectMembership { .. }
            | Action::RemoveProjectMembership { .. }
            | Action::CreateProjectVariable { .. }
            | Action::UpdateProjectVariable { .. } => Priority::ManageProject,
            Action::BlockUser { .. } => Priority::BlockUser,
        }
    }

    /// Performs the action through `client`.
    pub async fn execute(&self, client: &dyn ApiClient) -> WardenResult<()> {
        match self {
            Action::AddGroupMembership {
                username,
                group,
                level,
            } => client.add_group_membership(username, group, *level).await,
            Action::ChangeGroupMembership {
                username,
                group,
                level,
            } => client.change_group_membership(username, group, *level).await,
            Action::RemoveGroupMembership { username, group } => {
                client.remove_group_membership(username, group).await
            }
            Action::AddProjectSharing {
                project,
                group,
                level,
            } => client.add_project_sharing(project, group, *level).await,
            Action::RemoveProjectSharing { project, group } => {
                client.remove_project_sharing(project, group).await
            }
            Action::AddProjectMembership {
                username,
                project,
                level,
            } => client.add_project_membership(username, project, *level).await,
            Action::ChangeProjectMembership {
                username,
                project,
                level,
            } => {
                client
                    .change_project_membership(username, project, *level)
                    .await
            }
            Action::RemoveProjectMembership { username, project } => {
                client.remove_project_membership(username, project).await
            }
            Action::CreateGroupVariable { group, key, value } => {
                client.create_group_variable(group, key, value).await
            }
            Action::UpdateGroupVariable { group, key, value } => {
                client.update_group_variable(group, key, value).await
            }
            Action::CreateProjectVariable {
                project,
                key,
                value,
            } => client.create_project_variable(project, key, value).await,
            Action::UpdateProjectVariable {
                project,
                key,
                value,
            } => client.update_project_variable(project, key, value).await,
            Action::SetAdmin { username } => client.set_admin_user(username).await,
            Action::UnsetAdmin { username } => client.unset_admin_user(username).await,
            Action::BlockUser { username } => client.block_user(username).await,
            Action::UnblockUser { username } => client.unblock_user(username).await,
            Action::CreateBot { username, email } => {
                client.create_bot_user(username, email).await
            }
            Action::UpdateBotEmail { username, email } => {
                client.update_bot_email(username, email).await
            }
        }
    }
}

/// Executes `actions` in order, stopping at the first failure.
///
/// # Errors
///
/// Returns the error of the first action that failed; later actions are not attempted.
pub async fn execute_actions(actions: &[Action], client: &dyn ApiClient) -> WardenResult<()> {
    for (index, action) in actions.iter().enumerate() {
        debug!(
            step = index + 1,
            total = actions.len(),
            priority = ?action.priority(),
            "Executing action"
        );
        action.execute(client).await?;
    }
    info!(count = actions.len(), "All actions executed");
    Ok(())
}
