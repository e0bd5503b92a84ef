use super::*;
use crate::test_support::{config, gitlab_user, member, variable, MockGitLab};
use regex::Regex;
use tracing_test::traced_test;

fn shared(group_id: u64, full_path: Option<&str>, level: Level) -> models::SharedGroup {
    models::SharedGroup {
        group_id,
        group_full_path: full_path.map(str::to_string),
        group_access_level: level.access_level(),
    }
}

fn listed_group(id: u64, full_path: &str, shared_with: Vec<models::SharedGroup>) -> models::Group {
    models::Group {
        id,
        full_path: full_path.to_string(),
        shared_with_groups: shared_with,
    }
}

fn listed_project(id: u64, path: &str) -> models::Project {
    models::Project {
        id,
        path_with_namespace: path.to_string(),
        archived: false,
        jobs_enabled: true,
        shared_with_groups: Vec::new(),
    }
}

fn instance() -> MockGitLab {
    let mut gitlab = MockGitLab::new("admin");
    gitlab.users = vec![
        gitlab_user(1, "admin", "active", true),
        gitlab_user(2, "root", "active", true),
        gitlab_user(3, "user1", "active", false),
        gitlab_user(4, "user2", "active", false),
        gitlab_user(5, "user3", "blocked", false),
        gitlab_user(6, "deploy-bot", "active", false),
        gitlab_user(7, "ci-bot-1", "active", false),
    ];
    gitlab.groups = vec![
        listed_group(
            10,
            "root_group",
            vec![shared(11, None, Level::REPORTER)],
        ),
        listed_group(11, "other_group", Vec::new()),
        listed_group(12, "skip_group", Vec::new()),
    ];

    let mut a_project = listed_project(20, "root_group/a_project");
    a_project.shared_with_groups = vec![
        shared(11, Some("other_group"), Level::DEVELOPER),
        shared(12, None, Level::GUEST),
    ];
    let mut archived = listed_project(21, "root_group/archived");
    archived.archived = true;
    let mut no_jobs = listed_project(22, "root_group/no_jobs");
    no_jobs.jobs_enabled = false;
    gitlab.projects = vec![a_project, archived, no_jobs];

    gitlab.members.insert(
        "root_group".to_string(),
        vec![
            member(1, "admin", Level::OWNER),
            member(3, "user1", Level::DEVELOPER),
            member(4, "user2", Level::GUEST),
        ],
    );
    gitlab.members.insert(
        "other_group".to_string(),
        vec![member(2, "root", Level::OWNER)],
    );
    gitlab.members.insert(
        "root_group/a_project".to_string(),
        vec![member(4, "user2", Level::MAINTAINER)],
    );

    gitlab
        .variables
        .insert("root_group".to_string(), vec![variable("TOKEN", "abc")]);
    gitlab
        .variables
        .insert("root_group/a_project".to_string(), vec![variable("KEY", "v")]);
    gitlab
        .variables
        .insert("root_group/archived".to_string(), vec![variable("KEY", "v")]);
    gitlab
        .variables
        .insert("root_group/no_jobs".to_string(), vec![variable("KEY", "v")]);
    gitlab
        .forbidden_variables
        .insert("other_group".to_string());
    gitlab
}

fn options() -> QuerierOptions {
    QuerierOptions {
        ghost_user: None,
        bots: BotDetector::new(
            vec!["deploy-bot".to_string()],
            Some(Regex::new("^ci-bot-").unwrap()),
        ),
    }
}

fn loader(gitlab: MockGitLab) -> StateLoader {
    StateLoader::new(Arc::new(gitlab)).with_concurrency(2)
}

#[tokio::test]
async fn test_querier_classifies_users() {
    let querier = loader(instance()).load_querier(options()).await.unwrap();

    assert_eq!(querier.current_user(), "admin");
    assert_eq!(querier.admins(), vec!["admin", "root"]);
    assert_eq!(querier.blocked(), vec!["user3"]);
    assert_eq!(querier.bots(), vec!["ci-bot-1", "deploy-bot"]);
    assert_eq!(
        querier.users(),
        vec!["ci-bot-1", "deploy-bot", "user1", "user2"]
    );
    assert_eq!(querier.user_id("user2"), Some(4));
    assert_eq!(querier.user_email("user1"), Some("user1@example.com"));
    assert_eq!(
        querier.groups(),
        vec!["other_group", "root_group", "skip_group"]
    );
    assert_eq!(querier.group_id("skip_group"), Some(12));
    assert!(querier.project_exists("root_group/no_jobs"));
}

#[tokio::test]
async fn test_querier_hides_ghost_user() {
    let options = QuerierOptions {
        ghost_user: Some("root".to_string()),
        ..options()
    };

    let querier = loader(instance()).load_querier(options).await.unwrap();

    assert_eq!(querier.admins(), vec!["admin"]);
    assert!(querier.is_admin("root"));
}

#[tokio::test]
async fn test_querier_requires_an_admin() {
    let mut gitlab = instance();
    for user in &mut gitlab.users {
        user.is_admin = false;
    }

    let err = loader(gitlab).load_querier(options()).await.unwrap_err();

    match err {
        Error::Load(aggregate) => assert_eq!(
            aggregate.messages(),
            &["no admin was detected, are you using an admin token?".to_string()]
        ),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_querier_reports_listing_failures() {
    let mut gitlab = instance();
    gitlab.failing.insert("projects:2".to_string());

    let err = loader(gitlab).load_querier(options()).await.unwrap_err();

    match err {
        Error::Load(aggregate) => {
            assert!(aggregate.contains("failed to list projects (page 2)"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_querier_fails_without_current_user() {
    let mut gitlab = instance();
    gitlab.failing.insert("current_user".to_string());

    let err = loader(gitlab).load_querier(options()).await.unwrap_err();

    assert!(matches!(err, Error::Remote { .. }));
    assert!(err.to_string().starts_with("failed to fetch the current user"));
}

#[tokio::test]
async fn test_state_is_loaded() {
    let loader = loader(instance());
    let querier = loader.load_querier(options()).await.unwrap();

    let result = loader.load_state(&querier).await;

    assert!(result.is_complete(), "{:?}", result.error);
    let state = result.value;
    assert_eq!(state.current_user(), "admin");

    let root_group = state.group("root_group").unwrap();
    assert_eq!(root_group.members().len(), 3);
    assert_eq!(root_group.members().get("user2"), Some(Level::GUEST));
    assert_eq!(
        root_group.shared_groups().get("other_group"),
        Some(Level::REPORTER)
    );
    assert_eq!(root_group.variables()["TOKEN"], "abc");

    let other_group = state.group("other_group").unwrap();
    assert!(other_group.variables().is_empty());
    assert!(state.group("skip_group").unwrap().members().is_empty());

    let project = state.project("root_group/a_project").unwrap();
    assert_eq!(project.members().get("user2"), Some(Level::MAINTAINER));
    assert_eq!(
        project.shared_groups().get("other_group"),
        Some(Level::DEVELOPER)
    );
    assert_eq!(
        project.shared_groups().get("skip_group"),
        Some(Level::GUEST)
    );
    assert_eq!(project.variables()["KEY"], "v");

    assert!(state.project("root_group/archived").unwrap().variables().is_empty());
    assert!(state.project("root_group/no_jobs").unwrap().variables().is_empty());

    assert!(state.is_admin("admin"));
    assert!(state.is_admin("root"));
    assert!(state.is_blocked("user3"));
    assert_eq!(state.bot_email("deploy-bot"), Some("deploy-bot@example.com"));
    assert_eq!(state.bots().len(), 2);
}

#[tokio::test]
async fn test_state_keeps_going_after_failures() {
    let mut gitlab = instance();
    gitlab.failing.insert("members:root_group".to_string());
    gitlab.failing.insert("variables:root_group/a_project".to_string());

    let loader = loader(gitlab);
    let querier = loader.load_querier(options()).await.unwrap();
    let result = loader.load_state(&querier).await;

    let error = result.error.unwrap();
    assert_eq!(error.len(), 2);
    assert!(error.contains("failed to fetch members of group 'root_group'"));
    assert!(error.contains("failed to fetch variables of project 'root_group/a_project'"));

    let state = result.value;
    assert!(state.group("root_group").is_none());
    assert!(state.project("root_group/a_project").is_none());
    assert!(state.group("other_group").is_some());
    assert!(state.project("root_group/archived").is_some());
}

#[tokio::test]
async fn test_unknown_shared_group_is_resolved_by_id() {
    let gitlab = instance();
    let mut project = listed_project(30, "root_group/shared");
    project.shared_with_groups = vec![
        shared(11, None, Level::REPORTER),
        shared(404, None, Level::REPORTER),
    ];
    let errors = Errors::new();

    let loaded = load_project(&gitlab, project, &HashMap::new(), &errors)
        .await
        .unwrap();

    assert_eq!(
        loaded.shared_groups().get("other_group"),
        Some(Level::REPORTER)
    );
    assert_eq!(loaded.shared_groups().len(), 1);
    let error = errors.into_error().unwrap();
    assert!(error.contains("failed to fetch group 404 shared with project 'root_group/shared'"));
}

#[tokio::test]
#[traced_test]
async fn test_forbidden_variables_are_tolerated() {
    let gitlab = instance();
    let errors = Errors::new();

    let group = load_group(
        &gitlab,
        listed_group(11, "other_group", Vec::new()),
        &HashMap::new(),
        &errors,
    )
    .await
    .unwrap();

    assert!(group.variables().is_empty());
    assert_eq!(group.members().get("root"), Some(Level::OWNER));
    assert!(errors.is_empty());
    assert!(logs_contain("Group variables are not readable"));
}

#[tokio::test]
async fn test_collect_pages_follows_every_page() {
    let gitlab = instance();

    let members = collect_pages(|page| gitlab.list_group_members("root_group", page))
        .await
        .unwrap();

    let names: Vec<&str> = members.iter().map(|m| m.username.as_str()).collect();
    assert_eq!(names, vec!["admin", "user1", "user2"]);
}

#[tokio::test]
async fn test_state_counts_ghost_user_as_admin() {
    let options = QuerierOptions {
        ghost_user: Some("root".to_string()),
        ..options()
    };
    let loader = loader(instance());
    let querier = loader.load_querier(options).await.unwrap();

    let state = loader.load_state(&querier).await.value;

    assert!(state.is_admin("admin"));
    assert!(state.is_admin("root"));
}

#[tokio::test]
async fn test_group_sharing_comes_from_details() {
    let gitlab = instance();
    let errors = Errors::new();
    let group_paths = HashMap::from([(11, "other_group".to_string())]);

    let group = load_group(
        &gitlab,
        listed_group(10, "root_group", Vec::new()),
        &group_paths,
        &errors,
    )
    .await
    .unwrap();

    assert!(errors.is_empty());
    assert_eq!(
        group.shared_groups().get("other_group"),
        Some(Level::REPORTER)
    );
}

#[tokio::test]
async fn test_group_without_details_is_left_out() {
    let mut gitlab = instance();
    gitlab.failing.insert("get_group:10".to_string());

    let loader = loader(gitlab);
    let querier = loader.load_querier(options()).await.unwrap();
    let result = loader.load_state(&querier).await;

    let error = result.error.unwrap();
    assert_eq!(error.len(), 1);
    assert!(error.contains("failed to fetch details of group 'root_group'"));
    assert!(result.value.group("root_group").is_none());
    assert!(result.value.group("other_group").is_some());
}

/// The instance as seen with the token of `user1`, which cannot list anything.
fn restricted_instance() -> MockGitLab {
    let mut gitlab = instance();
    gitlab.current_user = "user1".to_string();
    for listing in ["users:1", "groups:1", "projects:1"] {
        gitlab.failing.insert(listing.to_string());
    }
    gitlab
}

fn partial_config() -> Config {
    config(
        r#"
groups:
  root_group:
    owners: [admin]
    developers: [user1]
  missing_group:
    owners: [admin]
projects:
  root_group/a_project:
    maintainers: [user2]
    reporters: ["share_with:other_group"]
  root_group/gone:
    developers: [user1]
users:
  admins: [admin]
"#,
    )
}

#[tokio::test]
async fn test_lazy_querier_resolves_configured_names() {
    let loader = loader(restricted_instance());

    let querier = loader.load_lazy_querier(&partial_config()).await.unwrap();

    assert_eq!(querier.current_user(), "user1");
    assert!(querier.is_admin("admin"));
    assert!(querier.is_user("user2"));
    assert_eq!(querier.group_id("root_group"), Some(10));
    assert_eq!(querier.group_id("other_group"), Some(11));
    assert!(!querier.group_exists("missing_group"));
    assert!(!querier.group_exists("skip_group"));
    assert!(!querier.project_exists("root_group/a_project"));
}

#[tokio::test]
async fn test_lazy_querier_reports_lookup_failures() {
    let mut gitlab = restricted_instance();
    gitlab.failing.insert("find_user:user2".to_string());
    gitlab.failing.insert("get_group:other_group".to_string());

    let err = loader(gitlab)
        .load_lazy_querier(&partial_config())
        .await
        .unwrap_err();

    match err {
        Error::Load(aggregate) => {
            assert_eq!(aggregate.len(), 2);
            assert!(aggregate.contains("failed to look up user 'user2'"));
            assert!(aggregate.contains("failed to look up group 'other_group'"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_partial_state_only_loads_configured_entities() {
    let gitlab = Arc::new(restricted_instance());
    let loader = StateLoader::new(gitlab.clone()).with_concurrency(2);
    let config = partial_config();
    let querier = loader.load_lazy_querier(&config).await.unwrap();

    let result = loader.load_partial_state(&config, &querier).await;

    assert!(result.is_complete(), "{:?}", result.error);
    let state = result.value;
    assert_eq!(state.current_user(), "user1");
    assert_eq!(state.groups().count(), 1);
    assert_eq!(state.projects().count(), 1);

    let root_group = state.group("root_group").unwrap();
    assert_eq!(root_group.members().get("user1"), Some(Level::DEVELOPER));
    assert_eq!(
        root_group.shared_groups().get("other_group"),
        Some(Level::REPORTER)
    );
    let project = state.project("root_group/a_project").unwrap();
    assert_eq!(
        project.shared_groups().get("skip_group"),
        Some(Level::GUEST)
    );
    assert!(state.admins().is_empty());
    assert!(state.blocked().is_empty());
    assert!(state.bots().is_empty());

    assert!(querier.project_exists("root_group/a_project"));
    assert!(!querier.project_exists("root_group/gone"));
    // Members and shares that are not configured still need IDs for removal.
    assert_eq!(querier.group_id("skip_group"), Some(12));
    assert_eq!(querier.user_id("user2"), Some(4));
    let calls = gitlab.calls();
    assert!(calls.contains(&"get_group_by_path skip_group".to_string()));
}

#[tokio::test]
async fn test_partial_state_reports_project_failures() {
    let mut gitlab = restricted_instance();
    gitlab
        .failing
        .insert("get_project:root_group/a_project".to_string());
    let loader = loader(gitlab);
    let config = partial_config();
    let querier = loader.load_lazy_querier(&config).await.unwrap();

    let result = loader.load_partial_state(&config, &querier).await;

    let error = result.error.unwrap();
    assert_eq!(error.len(), 1);
    assert!(error.contains("failed to fetch project 'root_group/a_project'"));
    assert!(result.value.group("root_group").is_some());
    assert!(result.value.project("root_group/a_project").is_none());
}
