//! Fixtures shared by the unit tests of this crate.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use config_manager::Config;
use gitlab_client::{models, GitLabApi, Page};

use crate::{Group, Level, PreloadedQuerier, Project, Role, State};

/// An instance with two admins, two regular users, one blocked user, one bot,
/// three groups and one project. The token belongs to `admin`.
pub(crate) fn sample_querier() -> PreloadedQuerier {
    let mut querier = PreloadedQuerier::new("admin");
    querier.add_user("admin", 1, Role::Admin, Some("admin@example.com".to_string()));
    querier.add_user("root", 2, Role::Admin, None);
    querier.add_user("user1", 3, Role::User, Some("user1@example.com".to_string()));
    querier.add_user("user2", 4, Role::User, None);
    querier.add_user("user3", 5, Role::Blocked, None);
    querier.add_user(
        "deploy-bot",
        6,
        Role::Bot,
        Some("deploy@example.com".to_string()),
    );
    querier.add_group("root_group", 10);
    querier.add_group("other_group", 11);
    querier.add_group("skip_group", 12);
    querier.add_project("root_group/a_project", 20);
    querier
}

pub(crate) fn config(yaml: &str) -> Config {
    serde_yaml::from_str(yaml).expect("test configuration should parse")
}

pub(crate) fn group(fullpath: &str, members: &[(&str, Level)]) -> Group {
    let mut group = Group::new(fullpath);
    for (username, level) in members {
        group.members_mut().merge(*username, *level);
    }
    group
}

pub(crate) fn project(fullpath: &str, members: &[(&str, Level)], shares: &[(&str, Level)]) -> Project {
    let mut project = Project::new(fullpath);
    for (username, level) in members {
        project.members_mut().merge(*username, *level);
    }
    for (group, level) in shares {
        project.shared_groups_mut().merge(*group, *level);
    }
    project
}

/// A state with the given groups, admins `admin` and `root`, run as `admin`.
pub(crate) fn state_with_groups(groups: Vec<Group>) -> State {
    let mut state = State::new("admin");
    for group in groups {
        state.insert_group(group);
    }
    state.add_admin("admin");
    state.add_admin("root");
    state
}

/// An in-memory GitLab instance.
///
/// Listings are served in pages of `page_size` items. Mutations are recorded
/// in `calls` and fail for the IDs and paths listed in `failing`.
#[derive(Default)]
pub(crate) struct MockGitLab {
    pub current_user: String,
    pub users: Vec<models::User>,
    pub groups: Vec<models::Group>,
    pub projects: Vec<models::Project>,
    pub members: HashMap<String, Vec<models::Member>>,
    pub variables: HashMap<String, Vec<models::Variable>>,
    pub forbidden_variables: HashSet<String>,
    pub emails: HashMap<u64, Vec<models::Email>>,
    pub failing: HashSet<String>,
    pub page_size: usize,
    pub calls: Mutex<Vec<String>>,
}

pub(crate) fn gitlab_user(id: u64, username: &str, state: &str, is_admin: bool) -> models::User {
    models::User {
        id,
        username: username.to_string(),
        email: Some(format!("{username}@example.com")),
        state: state.to_string(),
        is_admin,
    }
}

pub(crate) fn member(id: u64, username: &str, level: Level) -> models::Member {
    models::Member {
        id,
        username: username.to_string(),
        access_level: level.access_level(),
    }
}

pub(crate) fn variable(key: &str, value: &str) -> models::Variable {
    models::Variable {
        key: key.to_string(),
        value: value.to_string(),
    }
}

impl MockGitLab {
    pub(crate) fn new(current_user: &str) -> Self {
        Self {
            current_user: current_user.to_string(),
            page_size: 2,
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn page<T: Clone>(&self, items: &[T], page: u32) -> Page<T> {
        let size = self.page_size.max(1);
        let total_pages = items.len().div_ceil(size).max(1) as u32;
        let start = (page as usize - 1) * size;
        Page {
            items: items.iter().skip(start).take(size).cloned().collect(),
            page,
            total_pages,
        }
    }

    fn fail_if_broken(&self, key: &str) -> Result<(), gitlab_client::Error> {
        if self.failing.contains(key) {
            Err(gitlab_client::Error::ApiError {
                status: 500,
                message: format!("{key} is broken"),
            })
        } else {
            Ok(())
        }
    }

    fn record(&self, call: String) -> Result<(), gitlab_client::Error> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
        Ok(())
    }

    fn mutate(&self, key: String, call: String) -> Result<(), gitlab_client::Error> {
        self.fail_if_broken(&key)?;
        self.record(call)
    }
}

#[async_trait]
impl GitLabApi for MockGitLab {
    async fn current_user(&self) -> Result<models::User, gitlab_client::Error> {
        self.fail_if_broken("current_user")?;
        Ok(self
            .users
            .iter()
            .find(|u| u.username == self.current_user)
            .cloned()
            .unwrap_or_else(|| gitlab_user(1, &self.current_user, "active", true)))
    }

    async fn list_users(&self, page: u32) -> Result<Page<models::User>, gitlab_client::Error> {
        self.fail_if_broken(&format!("users:{page}"))?;
        Ok(self.page(&self.users, page))
    }

    async fn list_groups(&self, page: u32) -> Result<Page<models::Group>, gitlab_client::Error> {
        self.fail_if_broken(&format!("groups:{page}"))?;
        let mut listed = self.page(&self.groups, page);
        for group in &mut listed.items {
            group.shared_with_groups.clear();
        }
        Ok(listed)
    }

    async fn list_projects(
        &self,
        page: u32,
    ) -> Result<Page<models::Project>, gitlab_client::Error> {
        self.fail_if_broken(&format!("projects:{page}"))?;
        Ok(self.page(&self.projects, page))
    }

    async fn get_group(&self, group_id: u64) -> Result<models::Group, gitlab_client::Error> {
        self.fail_if_broken(&format!("get_group:{group_id}"))?;
        self.groups
            .iter()
            .find(|g| g.id == group_id)
            .cloned()
            .ok_or(gitlab_client::Error::NotFound)
    }

    async fn get_group_by_path(
        &self,
        fullpath: &str,
    ) -> Result<models::Group, gitlab_client::Error> {
        self.fail_if_broken(&format!("get_group:{fullpath}"))?;
        self.record(format!("get_group_by_path {fullpath}"))?;
        self.groups
            .iter()
            .find(|g| g.full_path == fullpath)
            .cloned()
            .ok_or(gitlab_client::Error::NotFound)
    }

    async fn get_project(
        &self,
        fullpath: &str,
    ) -> Result<models::Project, gitlab_client::Error> {
        self.fail_if_broken(&format!("get_project:{fullpath}"))?;
        self.record(format!("get_project {fullpath}"))?;
        self.projects
            .iter()
            .find(|p| p.path_with_namespace == fullpath)
            .cloned()
            .ok_or(gitlab_client::Error::NotFound)
    }

    async fn find_user(
        &self,
        username: &str,
    ) -> Result<Option<models::User>, gitlab_client::Error> {
        self.fail_if_broken(&format!("find_user:{username}"))?;
        self.record(format!("find_user {username}"))?;
        Ok(self.users.iter().find(|u| u.username == username).cloned())
    }

    async fn list_group_members(
        &self,
        group: &str,
        page: u32,
    ) -> Result<Page<models::Member>, gitlab_client::Error> {
        self.fail_if_broken(&format!("members:{group}"))?;
        let members = self.members.get(group).cloned().unwrap_or_default();
        Ok(self.page(&members, page))
    }

    async fn list_project_members(
        &self,
        project: &str,
        page: u32,
    ) -> Result<Page<models::Member>, gitlab_client::Error> {
        self.list_group_members(project, page).await
    }

    async fn list_group_variables(
        &self,
        group: &str,
    ) -> Result<Vec<models::Variable>, gitlab_client::Error> {
        if self.forbidden_variables.contains(group) {
            return Err(gitlab_client::Error::Forbidden);
        }
        self.fail_if_broken(&format!("variables:{group}"))?;
        Ok(self.variables.get(group).cloned().unwrap_or_default())
    }

    async fn list_project_variables(
        &self,
        project: &str,
    ) -> Result<Vec<models::Variable>, gitlab_client::Error> {
        self.list_group_variables(project).await
    }

    async fn add_group_member(
        &self,
        group: &str,
        user_id: u64,
        access_level: u8,
    ) -> Result<(), gitlab_client::Error> {
        self.mutate(
            format!("user:{user_id}"),
            format!("add_group_member {group} {user_id} {access_level}"),
        )
    }

    async fn edit_group_member(
        &self,
        group: &str,
        user_id: u64,
        access_level: u8,
    ) -> Result<(), gitlab_client::Error> {
        self.mutate(
            format!("user:{user_id}"),
            format!("edit_group_member {group} {user_id} {access_level}"),
        )
    }

    async fn remove_group_member(
        &self,
        group: &str,
        user_id: u64,
    ) -> Result<(), gitlab_client::Error> {
        self.mutate(
            format!("user:{user_id}"),
            format!("remove_group_member {group} {user_id}"),
        )
    }

    async fn add_project_member(
        &self,
        project: &str,
        user_id: u64,
        access_level: u8,
    ) -> Result<(), gitlab_client::Error> {
        self.mutate(
            format!("user:{user_id}"),
            format!("add_project_member {project} {user_id} {access_level}"),
        )
    }

    async fn edit_project_member(
        &self,
        project: &str,
        user_id: u64,
        access_level: u8,
    ) -> Result<(), gitlab_client::Error> {
        self.mutate(
            format!("user:{user_id}"),
            format!("edit_project_member {project} {user_id} {access_level}"),
        )
    }

    async fn remove_project_member(
        &self,
        project: &str,
        user_id: u64,
    ) -> Result<(), gitlab_client::Error> {
        self.mutate(
            format!("user:{user_id}"),
            format!("remove_project_member {project} {user_id}"),
        )
    }

    async fn share_project_with_group(
        &self,
        project: &str,
        group_id: u64,
        access_level: u8,
    ) -> Result<(), gitlab_client::Error> {
        self.mutate(
            format!("group:{group_id}"),
            format!("share_project_with_group {project} {group_id} {access_level}"),
        )
    }

    async fn unshare_project_with_group(
        &self,
        project: &str,
        group_id: u64,
    ) -> Result<(), gitlab_client::Error> {
        self.mutate(
            format!("group:{group_id}"),
            format!("unshare_project_with_group {project} {group_id}"),
        )
    }

    async fn create_group_variable(
        &self,
        group: &str,
        key: &str,
        _value: &str,
    ) -> Result<(), gitlab_client::Error> {
        self.mutate(
            format!("variable:{key}"),
            format!("create_group_variable {group} {key}"),
        )
    }

    async fn update_group_variable(
        &self,
        group: &str,
        key: &str,
        _value: &str,
    ) -> Result<(), gitlab_client::Error> {
        self.mutate(
            format!("variable:{key}"),
            format!("update_group_variable {group} {key}"),
        )
    }

    async fn create_project_variable(
        &self,
        project: &str,
        key: &str,
        _value: &str,
    ) -> Result<(), gitlab_client::Error> {
        self.mutate(
            format!("variable:{key}"),
            format!("create_project_variable {project} {key}"),
        )
    }

    async fn update_project_variable(
        &self,
        project: &str,
        key: &str,
        _value: &str,
    ) -> Result<(), gitlab_client::Error> {
        self.mutate(
            format!("variable:{key}"),
            format!("update_project_variable {project} {key}"),
        )
    }

    async fn block_user(&self, user_id: u64) -> Result<(), gitlab_client::Error> {
        self.mutate(format!("user:{user_id}"), format!("block_user {user_id}"))
    }

    async fn unblock_user(&self, user_id: u64) -> Result<(), gitlab_client::Error> {
        self.mutate(format!("user:{user_id}"), format!("unblock_user {user_id}"))
    }

    async fn set_admin(&self, user_id: u64, admin: bool) -> Result<(), gitlab_client::Error> {
        self.mutate(
            format!("user:{user_id}"),
            format!("set_admin {user_id} {admin}"),
        )
    }

    async fn create_user(
        &self,
        user: &models::NewUser,
    ) -> Result<models::User, gitlab_client::Error> {
        self.mutate(
            format!("new_user:{}", user.username),
            format!(
                "create_user {} '{}' {} {}",
                user.username,
                user.name,
                user.email,
                user.password.len()
            ),
        )?;
        Ok(gitlab_user(99, &user.username, "active", false))
    }

    async fn update_user_email(
        &self,
        user_id: u64,
        email: &str,
    ) -> Result<(), gitlab_client::Error> {
        self.mutate(
            format!("user:{user_id}"),
            format!("update_user_email {user_id} {email}"),
        )
    }

    async fn list_user_emails(
        &self,
        user_id: u64,
    ) -> Result<Vec<models::Email>, gitlab_client::Error> {
        self.fail_if_broken(&format!("emails:{user_id}"))?;
        Ok(self.emails.get(&user_id).cloned().unwrap_or_default())
    }

    async fn delete_user_email(
        &self,
        user_id: u64,
        email_id: u64,
    ) -> Result<(), gitlab_client::Error> {
        self.mutate(
            format!("email:{email_id}"),
            format!("delete_user_email {user_id} {email_id}"),
        )
    }
}
