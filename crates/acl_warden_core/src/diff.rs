//! Computing the actions that turn the current state into the desired one.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::{Action, BestEffort, Error, Errors, LevelMap, Querier, State, WardenResult};

#[cfg(test)]
#[path = "diff_tests.rs"]
mod tests;

/// Selects what the differ compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffArgs {
    pub groups: bool,
    pub projects: bool,
    pub users: bool,
    pub bots: bool,
    /// Allows overwriting variables whose current value differs.
    pub yolo: bool,
}

impl Default for DiffArgs {
    fn default() -> Self {
        Self {
            groups: true,
            projects: true,
            users: true,
            bots: true,
            yolo: false,
        }
    }
}

/// Where a membership or variable action applies.
#[derive(Clone, Copy)]
enum Scope<'a> {
    Group(&'a str),
    Project(&'a str),
}

impl Scope<'_> {
    fn kind(&self) -> &'static str {
        match self {
            Scope::Group(_) => "group",
            Scope::Project(_) => "project",
        }
    }

    fn path(&self) -> &str {
        match self {
            Scope::Group(path) | Scope::Project(path) => path,
        }
    }
}

/// Compares two states.
///
/// # Examples
///
/// ```rust
/// use acl_warden_core::{Action, DiffArgs, Differ, Group, Level, PreloadedQuerier, State};
///
/// let querier = PreloadedQuerier::new("admin");
///
/// let mut current = State::new("admin");
/// let mut group = Group::new("root_group");
/// group.members_mut().merge("admin", Level::OWNER);
/// current.insert_group(group.clone());
///
/// let mut desired = State::new("admin");
/// group.members_mut().merge("user1", Level::DEVELOPER);
/// desired.insert_group(group);
///
/// let actions = Differ::new(&querier, DiffArgs::default())
///     .diff(Some(&current), Some(&desired))
///     .unwrap();
/// assert!(actions.is_complete());
/// assert_eq!(
///     actions.value,
///     vec![Action::AddGroupMembership {
///         username: "user1".to_string(),
///         group: "root_group".to_string(),
///         level: Level::DEVELOPER,
///     }]
/// );
/// ```
pub struct Differ<'a> {
    querier: &'a dyn Querier,
    args: DiffArgs,
}

impl<'a> Differ<'a> {
    pub fn new(querier: &'a dyn Querier, args: DiffArgs) -> Self {
        Self { querier, args }
    }

    /// Returns the actions ordered by [`crate::Priority`], together with the
    /// reconciliation failures found along the way.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingState` when either state is absent.
    pub fn diff(
        &self,
        current: Option<&State>,
        desired: Option<&State>,
    ) -> WardenResult<BestEffort<Vec<Action>>> {
        let current = current.ok_or(Error::MissingState("current"))?;
        let desired = desired.ok_or(Error::MissingState("desired"))?;

        let errors = Errors::new();
        let mut actions = Vec::new();

        if self.args.groups {
            for group in desired.groups() {
                let scope = Scope::Group(group.fullpath());
                let existing = current.group(group.fullpath());
                debug!(group = group.fullpath(), present = existing.is_some(), "Diffing group");

                diff_members(
                    scope,
                    existing.map(|g| g.members()),
                    group.members(),
                    &mut actions,
                );
                self.diff_variables(
                    scope,
                    existing.map(|g| g.variables()),
                    group.variables(),
                    &mut actions,
                    &errors,
                );
            }
        }

        if self.args.projects {
            for project in desired.projects() {
                let scope = Scope::Project(project.fullpath());
                let existing = current.project(project.fullpath());
                debug!(
                    project = project.fullpath(),
                    present = existing.is_some(),
                    "Diffing project"
                );

                diff_sharing(
                    project.fullpath(),
                    existing.map(|p| p.shared_groups()),
                    project.shared_groups(),
                    &mut actions,
                );
                diff_members(
                    scope,
                    existing.map(|p| p.members()),
                    project.members(),
                    &mut actions,
                );
                self.diff_variables(
                    scope,
                    existing.map(|p| p.variables()),
                    project.variables(),
                    &mut actions,
                    &errors,
                );
            }
        }

        if self.args.users {
            diff_users(current, desired, &mut actions, &errors);
        }

        if self.args.bots {
            self.diff_bots(current, desired, &mut actions, &errors);
        }

        let actions = by_priority(actions);
        info!(
            actions = actions.len(),
            errors = errors.len(),
            "Diff computed"
        );
        Ok(BestEffort::new(actions, errors.into_error()))
    }

    fn diff_variables(
        &self,
        scope: Scope<'_>,
        current: Option<&BTreeMap<String, String>>,
        desired: &BTreeMap<String, String>,
        actions: &mut Vec<Action>,
        errors: &Errors,
    ) {
        for (key, value) in desired {
            match current.and_then(|variables| variables.get(key)) {
                None => actions.push(variable_action(scope, key, value, false)),
                Some(existing) if existing == value => {}
                Some(_) if self.args.yolo => actions.push(variable_action(scope, key, value, true)),
                Some(_) => errors.append(format!(
                    "variable '{key}' in {} '{}' is not as expected",
                    scope.kind(),
                    scope.path()
                )),
            }
        }
    }

    fn diff_bots(&self, current: &State, desired: &State, actions: &mut Vec<Action>, errors: &Errors) {
        for (username, email) in desired.bots() {
            match current.bot_email(username) {
                None if self.querier.user_id(username).is_some() => errors.append(format!(
                    "bot '{username}' already exists as an admin or blocked account"
                )),
                None => actions.push(Action::CreateBot {
                    username: username.clone(),
                    email: email.clone(),
                }),
                Some(existing) if existing != email.as_str() => actions.push(Action::UpdateBotEmail {
                    username: username.clone(),
                    email: email.clone(),
                }),
                Some(_) => {}
            }
        }
    }
}

fn variable_action(scope: Scope<'_>, key: &str, value: &str, update: bool) -> Action {
    let (key, value) = (key.to_string(), value.to_string());
    match (scope, update) {
        (Scope::Group(group), false) => Action::CreateGroupVariable {
            group: group.to_string(),
            key,
            value,
        },
        (Scope::Group(group), true) => Action::UpdateGroupVariable {
            group: group.to_string(),
            key,
            value,
        },
        (Scope::Project(project), false) => Action::CreateProjectVariable {
            project: project.to_string(),
            key,
            value,
        },
        (Scope::Project(project), true) => Action::UpdateProjectVariable {
            project: project.to_string(),
            key,
            value,
        },
    }
}

/// Adds and changes come owners first; removals follow in name order.
fn diff_members(
    scope: Scope<'_>,
    current: Option<&LevelMap>,
    desired: &LevelMap,
    actions: &mut Vec<Action>,
) {
    for (username, level) in desired.by_precedence() {
        let existing = current.and_then(|members| members.get(username));
        if existing == Some(level) {
            continue;
        }

        let username = username.to_string();
        actions.push(match (scope, existing) {
            (Scope::Group(group), None) => Action::AddGroupMembership {
                username,
                group: group.to_string(),
                level,
            },
            (Scope::Group(group), Some(_)) => Action::ChangeGroupMembership {
                username,
                group: group.to_string(),
                level,
            },
            (Scope::Project(project), None) => Action::AddProjectMembership {
                username,
                project: project.to_string(),
                level,
            },
            (Scope::Project(project), Some(_)) => Action::ChangeProjectMembership {
                username,
                project: project.to_string(),
                level,
            },
        });
    }

    let Some(current) = current else {
        return;
    };
    for (username, _) in current.iter() {
        if desired.contains(username) {
            continue;
        }
        let username = username.to_string();
        actions.push(match scope {
            Scope::Group(group) => Action::RemoveGroupMembership {
                username,
                group: group.to_string(),
            },
            Scope::Project(project) => Action::RemoveProjectMembership {
                username,
                project: project.to_string(),
            },
        });
    }
}

/// A level change is a removal followed by a new share.
fn diff_sharing(
    project: &str,
    current: Option<&LevelMap>,
    desired: &LevelMap,
    actions: &mut Vec<Action>,
) {
    for (group, level) in desired.iter() {
        match current.and_then(|shares| shares.get(group)) {
            Some(existing) if existing == level => continue,
            Some(_) => actions.push(Action::RemoveProjectSharing {
                project: project.to_string(),
                group: group.to_string(),
            }),
            None => {}
        }
        actions.push(Action::AddProjectSharing {
            project: project.to_string(),
            group: group.to_string(),
            level,
        });
    }

    let Some(current) = current else {
        return;
    };
    for (group, _) in current.iter() {
        if !desired.contains(group) {
            actions.push(Action::RemoveProjectSharing {
                project: project.to_string(),
                group: group.to_string(),
            });
        }
    }
}

fn diff_users(current: &State, desired: &State, actions: &mut Vec<Action>, errors: &Errors) {
    let myself = desired.current_user();

    for username in desired.admins().difference(current.admins()) {
        actions.push(Action::SetAdmin {
            username: username.clone(),
        });
    }

    for username in current.admins().difference(desired.admins()) {
        if username == myself {
            errors.append(format!(
                "can't unset '{username}' as admin, would shoot myself in the foot"
            ));
            continue;
        }
        actions.push(Action::UnsetAdmin {
            username: username.clone(),
        });
    }

    for username in desired.blocked().difference(current.blocked()) {
        if username == myself {
            errors.append(format!(
                "can't block '{username}', would shoot myself in the foot"
            ));
            continue;
        }
        actions.push(Action::BlockUser {
            username: username.clone(),
        });
    }

    for username in current.blocked().difference(desired.blocked()) {
        actions.push(Action::UnblockUser {
            username: username.clone(),
        });
    }
}

/// Stable bucketing: emission order is kept inside each priority.
fn by_priority(actions: Vec<Action>) -> Vec<Action> {
    let mut buckets: [Vec<Action>; 5] = Default::default();
    for action in actions {
        buckets[action.priority().index()].push(action);
    }
    buckets.into_iter().flatten().collect()
}
