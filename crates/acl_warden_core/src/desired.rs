//! Building the desired state from configuration.
//!
//! The builder validates every reference in the configuration against the
//! [`Querier`], expands `query:` directives and resolves secret variables from
//! the environment. It never stops at the first problem: everything that is
//! wrong with the configuration is reported in one [`Error::Validation`].

use std::fmt;

use config_manager::{validate_bots, AclEntry, Acls, Config, ConfigurationError};
use regex::Regex;
use tracing::{debug, info};

use crate::query::{MemberFilter, Query};
use crate::{Error, Errors, Group, Level, Project, Querier, State, WardenResult};

#[cfg(test)]
#[path = "desired_tests.rs"]
mod tests;

type EnvLookup<'a> = Box<dyn Fn(&str) -> Option<String> + 'a>;

/// Where the members selected by a query end up.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Group(String),
    Project(String),
}

impl Target {
    fn path(&self) -> &str {
        match self {
            Target::Group(path) | Target::Project(path) => path,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingQuery {
    target: Target,
    level: Level,
    expression: String,
}

impl fmt::Display for PendingQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' for '{}/{}'",
            self.expression,
            self.target.path(),
            self.level
        )
    }
}

/// Lowest level first.
pub(crate) fn acl_lists(acls: &Acls) -> [(Level, &[String]); 5] {
    [
        (Level::GUEST, acls.guests.as_slice()),
        (Level::REPORTER, acls.reporters.as_slice()),
        (Level::DEVELOPER, acls.developers.as_slice()),
        (Level::MAINTAINER, acls.maintainers.as_slice()),
        (Level::OWNER, acls.owners.as_slice()),
    ]
}

/// Turns a [`Config`] into a validated desired [`State`].
///
/// # Examples
///
/// ```rust
/// use acl_warden_core::{DesiredStateBuilder, Level, PreloadedQuerier, Role};
/// use config_manager::{Acls, Config};
///
/// let mut querier = PreloadedQuerier::new("admin");
/// querier.add_user("admin", 1, Role::Admin, None);
/// querier.add_user("user1", 2, Role::User, None);
/// querier.add_group("root_group", 10);
///
/// let mut config = Config::default();
/// config.groups.insert(
///     "root_group".to_string(),
///     Acls {
///         owners: vec!["admin".to_string()],
///         developers: vec!["query: users".to_string()],
///         ..Acls::default()
///     },
/// );
///
/// let state = DesiredStateBuilder::new(&querier).build(&config).unwrap();
/// let group = state.group("root_group").unwrap();
/// assert_eq!(group.members().get("user1"), Some(Level::DEVELOPER));
/// ```
pub struct DesiredStateBuilder<'a> {
    querier: &'a dyn Querier,
    env: EnvLookup<'a>,
    bot_pattern: Option<&'a Regex>,
}

impl<'a> DesiredStateBuilder<'a> {
    /// Creates a builder reading secret values from the process environment.
    pub fn new(querier: &'a dyn Querier) -> Self {
        Self {
            querier,
            env: Box::new(|name| std::env::var(name).ok()),
            bot_pattern: None,
        }
    }

    /// Replaces the environment lookup used for secret variables.
    pub fn with_env_lookup(mut self, lookup: impl Fn(&str) -> Option<String> + 'a) -> Self {
        self.env = Box::new(lookup);
        self
    }

    /// Requires every configured bot username to match `pattern`.
    pub fn with_bot_pattern(mut self, pattern: Option<&'a Regex>) -> Self {
        self.bot_pattern = pattern;
        self
    }

    /// Builds the desired state.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` listing every problem found, among them:
    /// missing groups, projects or users, blocked users given access, invalid or
    /// chained queries, groups without an owner, unset secret variables and
    /// invalid bots.
    pub fn build(&self, config: &Config) -> WardenResult<State> {
        let errors = Errors::new();
        let mut state = State::new(self.querier.current_user());
        let mut pending = Vec::new();

        for (fullpath, acls) in &config.groups {
            if let Some(group) = self.build_group(fullpath, acls, &mut pending, &errors) {
                state.insert_group(group);
            }
        }

        for (fullpath, acls) in &config.projects {
            if let Some(project) = self.build_project(fullpath, acls, &mut pending, &errors) {
                state.insert_project(project);
            }
        }

        for query in &pending {
            self.resolve_query(&mut state, query, &errors);
        }

        for group in state.groups() {
            if group.members().with_level(Level::OWNER).next().is_none() {
                errors.append(format!("no owner in group '{}'", group.fullpath()));
            }
        }

        let unhandled: Vec<String> = self
            .querier
            .groups()
            .into_iter()
            .filter(|path| !config.groups.contains_key(path))
            .collect();
        state.set_unhandled_groups(unhandled);

        self.add_users(&mut state, config, &errors);
        self.add_bots(&mut state, config, &errors);

        match errors.into_error() {
            Some(aggregate) => Err(Error::Validation(aggregate)),
            None => {
                info!(
                    groups = config.groups.len(),
                    projects = config.projects.len(),
                    queries = pending.len(),
                    unhandled_groups = state.unhandled_groups().len(),
                    "Desired state built"
                );
                Ok(state)
            }
        }
    }

    fn build_group(
        &self,
        fullpath: &str,
        acls: &Acls,
        pending: &mut Vec<PendingQuery>,
        errors: &Errors,
    ) -> Option<Group> {
        if !self.querier.group_exists(fullpath) {
            errors.append(format!("Group '{fullpath}' does not exist"));
            return None;
        }

        let mut group = Group::new(fullpath);
        for (level, entries) in acl_lists(acls) {
            for raw in entries {
                match AclEntry::parse(raw) {
                    AclEntry::Query(expression) => {
                        group.mark_subquery();
                        pending.push(PendingQuery {
                            target: Target::Group(fullpath.to_string()),
                            level,
                            expression: expression.to_string(),
                        });
                    }
                    AclEntry::ShareWith(other) => errors.append(format!(
                        "group '{fullpath}' can't be shared with '{other}', sharing is only supported for projects"
                    )),
                    AclEntry::User(username) => {
                        if self.check_member(username, "group", fullpath, errors) {
                            group.members_mut().merge(username, level);
                        }
                    }
                }
            }
        }

        for (key, value) in self.resolve_variables("group", fullpath, acls, errors) {
            group.set_variable(key, value);
        }
        Some(group)
    }

    fn build_project(
        &self,
        fullpath: &str,
        acls: &Acls,
        pending: &mut Vec<PendingQuery>,
        errors: &Errors,
    ) -> Option<Project> {
        if !self.querier.project_exists(fullpath) {
            errors.append(format!("project '{fullpath}' does not exist"));
            return None;
        }

        let mut project = Project::new(fullpath);
        for (level, entries) in acl_lists(acls).into_iter().rev() {
            for raw in entries {
                match AclEntry::parse(raw) {
                    AclEntry::Query(expression) => pending.push(PendingQuery {
                        target: Target::Project(fullpath.to_string()),
                        level,
                        expression: expression.to_string(),
                    }),
                    AclEntry::ShareWith(group) => {
                        if self.querier.group_exists(group) {
                            project.shared_groups_mut().merge(group, level);
                        } else {
                            errors.append(format!(
                                "can't share project '{fullpath}' with non-existing group '{group}'"
                            ));
                        }
                    }
                    AclEntry::User(username) => {
                        if self.check_member(username, "project", fullpath, errors) {
                            project.members_mut().merge(username, level);
                        }
                    }
                }
            }
        }

        for (key, value) in self.resolve_variables("project", fullpath, acls, errors) {
            project.set_variable(key, value);
        }
        Some(project)
    }

    fn check_member(&self, username: &str, kind: &str, fullpath: &str, errors: &Errors) -> bool {
        if self.querier.is_blocked(username) {
            errors.append(format!(
                "User '{username}' is blocked, it should not be included in {kind} '{fullpath}'"
            ));
            return false;
        }
        if !self.querier.is_user(username) && !self.querier.is_admin(username) {
            errors.append(format!(
                "User '{username}' does not exist for {kind} '{fullpath}'"
            ));
            return false;
        }
        true
    }

    fn resolve_variables(
        &self,
        kind: &str,
        fullpath: &str,
        acls: &Acls,
        errors: &Errors,
    ) -> Vec<(String, String)> {
        let mut resolved = Vec::new();
        for (key, env_name) in &acls.secret_variables {
            match (self.env)(env_name) {
                Some(value) => resolved.push((key.clone(), value)),
                None => errors.append(format!(
                    "secret variable '{key}' in {kind} '{fullpath}' references environment variable '{env_name}' which is not set"
                )),
            }
        }
        resolved
    }

    fn resolve_query(&self, state: &mut State, query: &PendingQuery, errors: &Errors) {
        let parsed = match Query::parse(&query.expression) {
            Ok(parsed) => parsed,
            Err(e) => {
                errors.append(format!("failed to execute query {query}: {e}"));
                return;
            }
        };

        let selected: Vec<String> = match parsed {
            Query::Users => self.querier.users(),
            Query::Admins => self.querier.admins(),
            Query::MembersOf { filter, group } => {
                let Some(source) = state.group(&group) else {
                    errors.append(format!(
                        "could not find group '{group}' to resolve query {query}"
                    ));
                    return;
                };
                if source.has_subquery() {
                    errors.append(format!(
                        "group '{group}' referenced by query {query} contains queries itself. Subquerying is not allowed"
                    ));
                    return;
                }

                source
                    .members()
                    .iter()
                    .filter(|(username, level)| match filter {
                        MemberFilter::Level(wanted) => *level == wanted,
                        MemberFilter::Admins => self.querier.is_admin(username),
                        MemberFilter::Users => self.querier.is_user(username),
                    })
                    .map(|(username, _)| username.to_string())
                    .collect()
            }
        };

        debug!(
            query = %query,
            matches = selected.len(),
            "Resolved query"
        );

        let members = match &query.target {
            Target::Group(path) => state.group_mut(path).map(Group::members_mut),
            Target::Project(path) => state.project_mut(path).map(Project::members_mut),
        };
        if let Some(members) = members {
            for username in selected {
                members.merge(username, query.level);
            }
        }
    }

    fn add_users(&self, state: &mut State, config: &Config, errors: &Errors) {
        for admin in &config.users.admins {
            if config.users.blocked.contains(admin) {
                errors.append(format!("user '{admin}' can't be both admin and blocked"));
            } else if self.querier.user_id(admin).is_none() {
                errors.append(format!("admin user '{admin}' does not exist"));
            } else {
                state.add_admin(admin.as_str());
            }
        }

        for blocked in &config.users.blocked {
            if self.querier.user_id(blocked).is_none() {
                errors.append(format!("blocked user '{blocked}' does not exist"));
            } else {
                state.add_blocked(blocked.as_str());
            }
        }
    }

    fn add_bots(&self, state: &mut State, config: &Config, errors: &Errors) {
        match validate_bots(&config.bots, self.bot_pattern) {
            Ok(()) => {}
            Err(ConfigurationError::ValidationFailed {
                errors: problems, ..
            }) => {
                for problem in problems {
                    errors.append(problem);
                }
            }
            Err(other) => errors.append(other),
        }

        for bot in &config.bots {
            state.add_bot(bot.username.as_str(), bot.email.as_str());
        }
    }
}
