//! The access control graph shared by the builder, the loader and the differ.

use std::collections::{BTreeMap, BTreeSet};

use crate::Level;

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;

/// Names mapped to access levels, keeping the highest level on repeated inserts.
///
/// Used both for members (keyed by username) and for groups a project is
/// shared with (keyed by group full path).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelMap {
    entries: BTreeMap<String, Level>,
}

impl LevelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `name` at `level` unless it is already present at a higher level.
    pub fn merge(&mut self, name: impl Into<String>, level: Level) {
        let entry = self.entries.entry(name.into()).or_insert(level);
        if level > *entry {
            *entry = level;
        }
    }

    /// Inserts `name` at `level`, replacing whatever was there.
    pub fn set(&mut self, name: impl Into<String>, level: Level) {
        self.entries.insert(name.into(), level);
    }

    pub fn get(&self, name: &str) -> Option<Level> {
        self.entries.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Level)> {
        self.entries.iter().map(|(name, level)| (name.as_str(), *level))
    }

    /// Names holding exactly `level`, in name order.
    pub fn with_level(&self, level: Level) -> impl Iterator<Item = &str> {
        self.iter()
            .filter(move |(_, l)| *l == level)
            .map(|(name, _)| name)
    }

    /// Entries ordered owners first: by descending level, then by name.
    pub fn by_precedence(&self) -> Vec<(&str, Level)> {
        let mut entries: Vec<(&str, Level)> = self.iter().collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries
    }
}

impl<S: Into<String>> FromIterator<(S, Level)> for LevelMap {
    fn from_iter<I: IntoIterator<Item = (S, Level)>>(iter: I) -> Self {
        let mut map = LevelMap::new();
        for (name, level) in iter {
            map.merge(name, level);
        }
        map
    }
}

/// A group and everything this tool manages about it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group {
    fullpath: String,
    members: LevelMap,
    shared_groups: LevelMap,
    variables: BTreeMap<String, String>,
    has_subquery: bool,
}

impl Group {
    pub fn new(fullpath: impl Into<String>) -> Self {
        Self {
            fullpath: fullpath.into(),
            ..Self::default()
        }
    }

    pub fn fullpath(&self) -> &str {
        &self.fullpath
    }

    pub fn members(&self) -> &LevelMap {
        &self.members
    }

    pub fn members_mut(&mut self) -> &mut LevelMap {
        &mut self.members
    }

    /// Groups this group is shared with, as reported by GitLab.
    pub fn shared_groups(&self) -> &LevelMap {
        &self.shared_groups
    }

    pub fn shared_groups_mut(&mut self) -> &mut LevelMap {
        &mut self.shared_groups
    }

    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    pub fn set_variable(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    /// True when at least one member entry came from a query.
    pub fn has_subquery(&self) -> bool {
        self.has_subquery
    }

    pub fn mark_subquery(&mut self) {
        self.has_subquery = true;
    }
}

/// A project and everything this tool manages about it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Project {
    fullpath: String,
    members: LevelMap,
    shared_groups: LevelMap,
    variables: BTreeMap<String, String>,
}

impl Project {
    pub fn new(fullpath: impl Into<String>) -> Self {
        Self {
            fullpath: fullpath.into(),
            ..Self::default()
        }
    }

    pub fn fullpath(&self) -> &str {
        &self.fullpath
    }

    pub fn members(&self) -> &LevelMap {
        &self.members
    }

    pub fn members_mut(&mut self) -> &mut LevelMap {
        &mut self.members
    }

    /// Groups given access to this project.
    pub fn shared_groups(&self) -> &LevelMap {
        &self.shared_groups
    }

    pub fn shared_groups_mut(&mut self) -> &mut LevelMap {
        &mut self.shared_groups
    }

    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    pub fn set_variable(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }
}

/// A complete access control graph, either desired or current.
///
/// # Examples
///
/// ```rust
/// use acl_warden_core::{Group, Level, State};
///
/// let mut group = Group::new("root_group");
/// group.members_mut().merge("admin", Level::OWNER);
///
/// let mut state = State::new("admin");
/// state.insert_group(group);
///
/// assert_eq!(
///     state.group("root_group").unwrap().members().get("admin"),
///     Some(Level::OWNER)
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct State {
    current_user: String,
    groups: BTreeMap<String, Group>,
    projects: BTreeMap<String, Project>,
    admins: BTreeSet<String>,
    blocked: BTreeSet<String>,
    bots: BTreeMap<String, String>,
    unhandled_groups: Vec<String>,
}

impl State {
    pub fn new(current_user: impl Into<String>) -> Self {
        Self {
            current_user: current_user.into(),
            ..Self::default()
        }
    }

    /// The username the reconciler runs as.
    pub fn current_user(&self) -> &str {
        &self.current_user
    }

    /// Groups in full path order.
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    pub fn group(&self, fullpath: &str) -> Option<&Group> {
        self.groups.get(fullpath)
    }

    pub fn group_mut(&mut self, fullpath: &str) -> Option<&mut Group> {
        self.groups.get_mut(fullpath)
    }

    pub fn insert_group(&mut self, group: Group) {
        self.groups.insert(group.fullpath().to_string(), group);
    }

    /// Projects in full path order.
    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.projects.values()
    }

    pub fn project(&self, fullpath: &str) -> Option<&Project> {
        self.projects.get(fullpath)
    }

    pub fn project_mut(&mut self, fullpath: &str) -> Option<&mut Project> {
        self.projects.get_mut(fullpath)
    }

    pub fn insert_project(&mut self, project: Project) {
        self.projects.insert(project.fullpath().to_string(), project);
    }

    pub fn admins(&self) -> &BTreeSet<String> {
        &self.admins
    }

    pub fn is_admin(&self, username: &str) -> bool {
        self.admins.contains(username)
    }

    pub fn add_admin(&mut self, username: impl Into<String>) {
        self.admins.insert(username.into());
    }

    pub fn blocked(&self) -> &BTreeSet<String> {
        &self.blocked
    }

    pub fn is_blocked(&self, username: &str) -> bool {
        self.blocked.contains(username)
    }

    pub fn add_blocked(&mut self, username: impl Into<String>) {
        self.blocked.insert(username.into());
    }

    /// Bot usernames mapped to their email.
    pub fn bots(&self) -> &BTreeMap<String, String> {
        &self.bots
    }

    pub fn bot_email(&self, username: &str) -> Option<&str> {
        self.bots.get(username).map(String::as_str)
    }

    pub fn add_bot(&mut self, username: impl Into<String>, email: impl Into<String>) {
        self.bots.insert(username.into(), email.into());
    }

    /// Groups present on the instance but absent from the configuration, sorted.
    pub fn unhandled_groups(&self) -> &[String] {
        &self.unhandled_groups
    }

    pub fn set_unhandled_groups(&mut self, mut groups: Vec<String>) {
        groups.sort();
        groups.dedup();
        self.unhandled_groups = groups;
    }
}
