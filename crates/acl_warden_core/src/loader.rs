//! Loading the current state from a GitLab instance.
//!
//! Loading happens in two steps. [`StateLoader::load_querier`] takes a
//! snapshot of every user, group and project, which is all the desired state
//! builder needs. [`StateLoader::load_state`] then fetches members, sharing and
//! variables of every group and project on a bounded [`WorkerPool`], keeping
//! going when a single entity fails.
//!
//! Tokens without admin rights use [`StateLoader::load_lazy_querier`] and
//! [`StateLoader::load_partial_state`] instead, which only touch what the
//! configuration names.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use config_manager::{AclEntry, Config};
use gitlab_client::{models, GitLabApi, Page};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::desired::acl_lists;
use crate::{
    BestEffort, BotDetector, Error, Errors, Group, LazyQuerier, Level, LevelMap, PreloadedQuerier,
    Project, Querier, Role, State, WardenResult, WorkerPool,
};

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;

/// Default number of groups and projects loaded at once.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Items buffered between a page producer and its consumer.
const PAGE_BUFFER: usize = 100;

type Loaded<T> = Arc<Mutex<BTreeMap<String, T>>>;

/// How users are classified while taking the snapshot.
#[derive(Debug, Clone, Default)]
pub struct QuerierOptions {
    /// Account hidden from user and admin listings.
    pub ghost_user: Option<String>,
    pub bots: BotDetector,
}

/// Reads the current state through a [`GitLabApi`].
pub struct StateLoader {
    client: Arc<dyn GitLabApi>,
    concurrency: usize,
}

impl StateLoader {
    pub fn new(client: Arc<dyn GitLabApi>) -> Self {
        Self {
            client,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Takes a snapshot of users, groups and projects.
    ///
    /// # Errors
    ///
    /// Returns `Error::Remote` if the current user cannot be fetched, and
    /// `Error::Load` if any listing failed or no admin was seen, which means
    /// the token is not an admin token.
    pub async fn load_querier(&self, options: QuerierOptions) -> WardenResult<PreloadedQuerier> {
        let started = Instant::now();
        let errors = Arc::new(Errors::new());

        let current = self
            .client
            .current_user()
            .await
            .map_err(|e| Error::remote("fetch the current user", e))?;

        let mut users = {
            let client = Arc::clone(&self.client);
            stream_pages("users", Arc::clone(&errors), move |page| {
                let client = Arc::clone(&client);
                async move { client.list_users(page).await }
            })
        };
        let mut groups = self.stream_groups(&errors);
        let mut projects = self.stream_projects(&errors);

        let mut querier = PreloadedQuerier::new(current.username).with_ghost_user(options.ghost_user);

        let mut admins = 0;
        while let Some(user) = users.recv().await {
            let role = options
                .bots
                .classify(&user.username, user.is_blocked(), user.is_admin);
            if role == Role::Admin {
                admins += 1;
            }
            debug!(username = %user.username, role = ?role, "Loaded user");
            querier.add_user(user.username, user.id, role, user.email);
        }

        while let Some(group) = groups.recv().await {
            debug!(group = %group.full_path, "Loaded group");
            querier.add_group(group.full_path, group.id);
        }

        while let Some(project) = projects.recv().await {
            debug!(project = %project.path_with_namespace, "Loaded project");
            querier.add_project(project.path_with_namespace, project.id);
        }

        if admins == 0 {
            errors.append("no admin was detected, are you using an admin token?");
        }
        if let Some(aggregate) = errors.snapshot() {
            return Err(Error::Load(aggregate));
        }

        info!(
            users = querier.users().len(),
            admins = admins,
            groups = querier.groups().len(),
            projects = querier.projects().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Querier loaded"
        );
        Ok(querier)
    }

    /// Loads members, sharing and variables of every group and project.
    ///
    /// A failure on one group or project is recorded and that entity is left
    /// out of the state; everything else is still loaded.
    pub async fn load_state(&self, querier: &PreloadedQuerier) -> BestEffort<State> {
        let started = Instant::now();
        let errors = Arc::new(Errors::new());
        let loaded_groups: Loaded<Group> = Arc::default();
        let loaded_projects: Loaded<Project> = Arc::default();
        let group_paths: Arc<HashMap<u64, String>> = Arc::new(
            querier
                .groups()
                .into_iter()
                .filter_map(|path| querier.group_id(&path).map(|id| (id, path)))
                .collect(),
        );

        let mut pool = WorkerPool::new(self.concurrency);
        let mut groups = self.stream_groups(&errors);
        let mut projects = self.stream_projects(&errors);

        loop {
            tokio::select! {
                Some(group) = groups.recv() => {
                    self.spawn_group(&mut pool, group, &group_paths, &errors, &loaded_groups).await;
                }
                Some(project) = projects.recv() => {
                    self.spawn_project(&mut pool, project, &group_paths, &errors, &loaded_projects).await;
                }
                else => break,
            }
        }

        let mut state = State::new(querier.current_user());
        collect_loaded(pool, &errors, &loaded_groups, &loaded_projects, &mut state).await;
        for admin in querier.with_role(Role::Admin) {
            state.add_admin(admin);
        }
        for blocked in querier.blocked() {
            state.add_blocked(blocked);
        }
        for bot in querier.bots() {
            let email = querier.user_email(&bot).unwrap_or_default().to_string();
            state.add_bot(bot, email);
        }

        let error = errors.snapshot();
        info!(
            groups = state.groups().count(),
            projects = state.projects().count(),
            errors = error.as_ref().map_or(0, |e| e.len()),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Current state loaded"
        );
        BestEffort::new(state, error)
    }

    /// Resolves every user and group the configuration names.
    ///
    /// This is the entry point for tokens without admin rights, which cannot
    /// list the whole instance. Names that do not exist are not an error here;
    /// the desired state builder reports them.
    ///
    /// # Errors
    ///
    /// Returns `Error::Remote` if the current user cannot be fetched and
    /// `Error::Load` if any lookup failed.
    pub async fn load_lazy_querier(&self, config: &Config) -> WardenResult<LazyQuerier> {
        let started = Instant::now();
        let current = self
            .client
            .current_user()
            .await
            .map_err(|e| Error::remote("fetch the current user", e))?;
        let querier = LazyQuerier::new(Arc::clone(&self.client), current.username);
        let errors = Errors::new();

        let (usernames, groups) = referenced_names(config);
        resolve_names(&querier, &usernames, &groups, &errors).await;
        if let Some(aggregate) = errors.into_error() {
            return Err(Error::Load(aggregate));
        }

        info!(
            users = usernames.len(),
            groups = groups.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Lazy querier loaded"
        );
        Ok(querier)
    }

    /// Loads members, sharing and variables of the configured groups and projects only.
    ///
    /// Configured projects are fetched here, so `querier` knows which of them
    /// exist once this returns. Members and sharing groups found on the way are
    /// resolved as well, so that actions removing them can address them by ID.
    /// Admins, blocked users and bots are left empty.
    pub async fn load_partial_state(
        &self,
        config: &Config,
        querier: &LazyQuerier,
    ) -> BestEffort<State> {
        let started = Instant::now();
        let errors = Arc::new(Errors::new());
        let loaded_groups: Loaded<Group> = Arc::default();
        let loaded_projects: Loaded<Project> = Arc::default();
        let group_paths: Arc<HashMap<u64, String>> = Arc::new(
            querier
                .known_groups()
                .into_iter()
                .map(|(path, id)| (id, path))
                .collect(),
        );

        let mut pool = WorkerPool::new(self.concurrency);
        for fullpath in config.groups.keys() {
            let Some(id) = querier.group_id(fullpath) else {
                debug!(group = %fullpath, "Skipping group that does not exist");
                continue;
            };
            let listed = models::Group {
                id,
                full_path: fullpath.clone(),
                shared_with_groups: Vec::new(),
            };
            self.spawn_group(&mut pool, listed, &group_paths, &errors, &loaded_groups)
                .await;
        }
        for fullpath in config.projects.keys() {
            match querier.fetch_project(fullpath).await {
                Ok(Some(listed)) => {
                    self.spawn_project(&mut pool, listed, &group_paths, &errors, &loaded_projects)
                        .await;
                }
                Ok(None) => debug!(project = %fullpath, "Skipping project that does not exist"),
                Err(e) => errors.append(format!("failed to fetch project '{fullpath}': {e}")),
            }
        }

        let mut state = State::new(querier.current_user());
        collect_loaded(pool, &errors, &loaded_groups, &loaded_projects, &mut state).await;

        let (usernames, groups) = referenced_by_state(&state);
        resolve_names(querier, &usernames, &groups, &errors).await;

        let error = errors.snapshot();
        info!(
            groups = state.groups().count(),
            projects = state.projects().count(),
            errors = error.as_ref().map_or(0, |e| e.len()),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Partial state loaded"
        );
        BestEffort::new(state, error)
    }

    async fn spawn_group(
        &self,
        pool: &mut WorkerPool,
        listed: models::Group,
        group_paths: &Arc<HashMap<u64, String>>,
        errors: &Arc<Errors>,
        loaded: &Loaded<Group>,
    ) {
        let client = Arc::clone(&self.client);
        let errors = Arc::clone(errors);
        let group_paths = Arc::clone(group_paths);
        let loaded = Arc::clone(loaded);
        pool.spawn(async move {
            if let Some(group) = load_group(&*client, listed, &group_paths, &errors).await {
                lock(&loaded).insert(group.fullpath().to_string(), group);
            }
        })
        .await;
    }

    async fn spawn_project(
        &self,
        pool: &mut WorkerPool,
        listed: models::Project,
        group_paths: &Arc<HashMap<u64, String>>,
        errors: &Arc<Errors>,
        loaded: &Loaded<Project>,
    ) {
        let client = Arc::clone(&self.client);
        let errors = Arc::clone(errors);
        let group_paths = Arc::clone(group_paths);
        let loaded = Arc::clone(loaded);
        pool.spawn(async move {
            if let Some(project) = load_project(&*client, listed, &group_paths, &errors).await {
                lock(&loaded).insert(project.fullpath().to_string(), project);
            }
        })
        .await;
    }

    fn stream_groups(&self, errors: &Arc<Errors>) -> mpsc::Receiver<models::Group> {
        let client = Arc::clone(&self.client);
        stream_pages("groups", Arc::clone(errors), move |page| {
            let client = Arc::clone(&client);
            async move { client.list_groups(page).await }
        })
    }

    fn stream_projects(&self, errors: &Arc<Errors>) -> mpsc::Receiver<models::Project> {
        let client = Arc::clone(&self.client);
        stream_pages("projects", Arc::clone(errors), move |page| {
            let client = Arc::clone(&client);
            async move { client.list_projects(page).await }
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Waits for the pool and moves what it loaded into `state`.
async fn collect_loaded(
    pool: WorkerPool,
    errors: &Errors,
    groups: &Loaded<Group>,
    projects: &Loaded<Project>,
    state: &mut State,
) {
    let panicked = pool.wait().await;
    if panicked > 0 {
        errors.append(format!("{panicked} loading tasks failed unexpectedly"));
    }

    for group in std::mem::take(&mut *lock(groups)).into_values() {
        state.insert_group(group);
    }
    for project in std::mem::take(&mut *lock(projects)).into_values() {
        state.insert_project(project);
    }
}

/// Usernames and group paths a configuration refers to.
fn referenced_names(config: &Config) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut usernames = BTreeSet::new();
    let mut groups: BTreeSet<String> = config.groups.keys().cloned().collect();

    for acls in config.groups.values().chain(config.projects.values()) {
        for (_, entries) in acl_lists(acls) {
            for raw in entries {
                match AclEntry::parse(raw) {
                    AclEntry::User(username) => {
                        usernames.insert(username.to_string());
                    }
                    AclEntry::ShareWith(group) => {
                        groups.insert(group.to_string());
                    }
                    AclEntry::Query(_) => {}
                }
            }
        }
    }
    usernames.extend(config.users.admins.iter().cloned());
    usernames.extend(config.users.blocked.iter().cloned());
    usernames.extend(config.bots.iter().map(|bot| bot.username.clone()));

    (usernames, groups)
}

/// Members and project sharing groups present in a loaded state.
fn referenced_by_state(state: &State) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut usernames = BTreeSet::new();
    let mut groups = BTreeSet::new();

    for group in state.groups() {
        usernames.extend(group.members().iter().map(|(name, _)| name.to_string()));
    }
    for project in state.projects() {
        usernames.extend(project.members().iter().map(|(name, _)| name.to_string()));
        groups.extend(project.shared_groups().iter().map(|(name, _)| name.to_string()));
    }

    (usernames, groups)
}

async fn resolve_names(
    querier: &LazyQuerier,
    usernames: &BTreeSet<String>,
    groups: &BTreeSet<String>,
    errors: &Errors,
) {
    for username in usernames {
        if let Err(e) = querier.resolve_user(username).await {
            errors.append(format!("failed to look up user '{username}': {e}"));
        }
    }
    for group in groups {
        if let Err(e) = querier.resolve_group(group).await {
            errors.append(format!("failed to look up group '{group}': {e}"));
        }
    }
}

/// Spawns a producer sending every item of a paginated listing.
///
/// The channel closes when the last page was sent or a page failed; the
/// failure is recorded in `errors`.
fn stream_pages<T, F, Fut>(what: &'static str, errors: Arc<Errors>, fetch: F) -> mpsc::Receiver<T>
where
    T: Send + 'static,
    F: Fn(u32) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Page<T>, gitlab_client::Error>> + Send,
{
    let (tx, rx) = mpsc::channel(PAGE_BUFFER);
    tokio::spawn(async move {
        let mut page = 1;
        loop {
            match fetch(page).await {
                Ok(batch) => {
                    let last = batch.is_last();
                    for item in batch.items {
                        if tx.send(item).await.is_err() {
                            return;
                        }
                    }
                    if last {
                        break;
                    }
                    page += 1;
                }
                Err(e) => {
                    errors.append(format!("failed to list {what} (page {page}): {e}"));
                    break;
                }
            }
        }
        debug!(what, pages = page, "Listing complete");
    });
    rx
}

/// Follows pagination to the end, failing on the first failed page.
async fn collect_pages<T, F, Fut>(mut fetch: F) -> Result<Vec<T>, gitlab_client::Error>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Page<T>, gitlab_client::Error>>,
{
    let mut items = Vec::new();
    let mut page = 1;
    loop {
        let batch = fetch(page).await?;
        let last = batch.is_last();
        items.extend(batch.items);
        if last {
            return Ok(items);
        }
        page += 1;
    }
}

fn members_of(members: Vec<models::Member>) -> LevelMap {
    let mut map = LevelMap::new();
    for member in members {
        map.set(member.username, Level::from_access_level(member.access_level));
    }
    map
}

async fn load_group(
    client: &dyn GitLabApi,
    listed: models::Group,
    group_paths: &HashMap<u64, String>,
    errors: &Errors,
) -> Option<Group> {
    let path = listed.full_path;

    let group_path = path.as_str();
    let members = match collect_pages(move |page| client.list_group_members(group_path, page)).await {
        Ok(members) => members,
        Err(e) => {
            errors.append(format!("failed to fetch members of group '{path}': {e}"));
            return None;
        }
    };

    let mut group = Group::new(path.as_str());
    *group.members_mut() = members_of(members);

    // Listings leave out the sharing of a group, only its details carry it.
    let details = match client.get_group(listed.id).await {
        Ok(details) => details,
        Err(e) => {
            errors.append(format!("failed to fetch details of group '{path}': {e}"));
            return None;
        }
    };

    for shared in details.shared_with_groups {
        let shared_path = shared
            .group_full_path
            .or_else(|| group_paths.get(&shared.group_id).cloned());
        match shared_path {
            Some(shared_path) => group
                .shared_groups_mut()
                .set(shared_path, Level::from_access_level(shared.group_access_level)),
            None => debug!(group = %path, group_id = shared.group_id, "Skipping unknown shared group"),
        }
    }

    match client.list_group_variables(&path).await {
        Ok(variables) => {
            for variable in variables {
                group.set_variable(variable.key, variable.value);
            }
        }
        Err(gitlab_client::Error::Forbidden) => {
            warn!(group = %path, "Group variables are not readable, assuming none");
        }
        Err(e) => {
            errors.append(format!("failed to fetch variables of group '{path}': {e}"));
            return None;
        }
    }

    debug!(
        group = %path,
        members = group.members().len(),
        variables = group.variables().len(),
        "Loaded group state"
    );
    Some(group)
}

async fn load_project(
    client: &dyn GitLabApi,
    listed: models::Project,
    group_paths: &HashMap<u64, String>,
    errors: &Errors,
) -> Option<Project> {
    let path = listed.path_with_namespace;
    let mut project = Project::new(path.as_str());

    for shared in listed.shared_with_groups {
        let level = Level::from_access_level(shared.group_access_level);
        let known = shared
            .group_full_path
            .or_else(|| group_paths.get(&shared.group_id).cloned());
        let shared_path = match known {
            Some(shared_path) => shared_path,
            None => match client.get_group(shared.group_id).await {
                Ok(group) => group.full_path,
                Err(e) => {
                    errors.append(format!(
                        "failed to fetch group {} shared with project '{path}': {e}",
                        shared.group_id
                    ));
                    continue;
                }
            },
        };
        project.shared_groups_mut().set(shared_path, level);
    }

    let project_path = path.as_str();
    match collect_pages(move |page| client.list_project_members(project_path, page)).await {
        Ok(members) => *project.members_mut() = members_of(members),
        Err(e) => {
            errors.append(format!("failed to fetch members of project '{path}': {e}"));
            return None;
        }
    }

    if listed.archived {
        debug!(project = %path, "Skipping variables of archived project");
    } else if !listed.jobs_enabled {
        debug!(project = %path, "Skipping variables of project without jobs");
    } else {
        match client.list_project_variables(&path).await {
            Ok(variables) => {
                for variable in variables {
                    project.set_variable(variable.key, variable.value);
                }
            }
            Err(gitlab_client::Error::Forbidden) => {
                warn!(project = %path, "Project variables are not readable, assuming none");
            }
            Err(e) => {
                errors.append(format!("failed to fetch variables of project '{path}': {e}"));
                return None;
            }
        }
    }

    debug!(
        project = %path,
        members = project.members().len(),
        shared_groups = project.shared_groups().len(),
        "Loaded project state"
    );
    Some(project)
}
