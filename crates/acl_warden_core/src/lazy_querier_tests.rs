use super::*;
use crate::test_support::{gitlab_user, MockGitLab};

fn instance() -> Arc<MockGitLab> {
    let mut gitlab = MockGitLab::new("maintainer");
    gitlab.users = vec![
        gitlab_user(3, "user1", "active", false),
        gitlab_user(5, "user3", "blocked", false),
        gitlab_user(8, "maintainer", "active", false),
    ];
    gitlab.groups = vec![models::Group {
        id: 10,
        full_path: "root_group".to_string(),
        shared_with_groups: Vec::new(),
    }];
    gitlab.projects = vec![models::Project {
        id: 20,
        path_with_namespace: "root_group/a_project".to_string(),
        archived: false,
        jobs_enabled: true,
        shared_with_groups: Vec::new(),
    }];
    Arc::new(gitlab)
}

#[tokio::test]
async fn test_users_are_fetched_once() {
    let gitlab = instance();
    let querier = LazyQuerier::new(gitlab.clone(), "maintainer");

    assert_eq!(querier.resolve_user("user1").await.unwrap(), Some(3));
    assert_eq!(querier.resolve_user("user1").await.unwrap(), Some(3));
    assert_eq!(querier.resolve_user("nobody").await.unwrap(), None);
    assert_eq!(querier.resolve_user("nobody").await.unwrap(), None);

    assert_eq!(gitlab.calls(), vec!["find_user user1", "find_user nobody"]);
    assert!(querier.is_user("user1"));
    assert_eq!(querier.user_id("user1"), Some(3));
    assert!(!querier.is_user("nobody"));
    assert_eq!(querier.user_id("nobody"), None);
}

#[tokio::test]
async fn test_unresolved_names_are_unknown() {
    let querier = LazyQuerier::new(instance(), "maintainer");

    assert!(!querier.is_user("user1"));
    assert!(!querier.group_exists("root_group"));
    assert!(!querier.project_exists("root_group/a_project"));
}

#[tokio::test]
async fn test_blocked_accounts_keep_their_role() {
    let querier = LazyQuerier::new(instance(), "maintainer");

    querier.resolve_user("user3").await.unwrap();

    assert!(querier.is_blocked("user3"));
    assert!(!querier.is_user("user3"));
    assert!(querier.blocked().is_empty());
}

#[tokio::test]
async fn test_groups_and_projects() {
    let gitlab = instance();
    let querier = LazyQuerier::new(gitlab.clone(), "maintainer");

    assert_eq!(querier.resolve_group("root_group").await.unwrap(), Some(10));
    assert_eq!(querier.resolve_group("root_group").await.unwrap(), Some(10));
    assert_eq!(querier.resolve_group("missing").await.unwrap(), None);
    let project = querier.fetch_project("root_group/a_project").await.unwrap();
    assert_eq!(project.map(|p| p.id), Some(20));
    assert!(querier.fetch_project("root_group/gone").await.unwrap().is_none());

    assert_eq!(querier.group_id("root_group"), Some(10));
    assert!(!querier.group_exists("missing"));
    assert!(querier.project_exists("root_group/a_project"));
    assert!(!querier.project_exists("root_group/gone"));
    assert_eq!(querier.groups(), vec!["root_group"]);
    assert_eq!(querier.projects(), vec!["root_group/a_project"]);
    assert_eq!(
        gitlab
            .calls()
            .iter()
            .filter(|call| call.starts_with("get_group_by_path root_group"))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_lookup_failures_are_not_cached() {
    let mut gitlab = MockGitLab::new("maintainer");
    gitlab.failing.insert("get_group:root_group".to_string());
    let querier = LazyQuerier::new(Arc::new(gitlab), "maintainer");

    assert!(querier.resolve_group("root_group").await.is_err());
    assert!(querier.groups().is_empty());
}

#[tokio::test]
async fn test_instance_wide_listings_are_empty() {
    let querier = LazyQuerier::new(instance(), "maintainer");
    querier.resolve_user("user1").await.unwrap();

    assert_eq!(querier.current_user(), "maintainer");
    assert_eq!(querier.users(), vec!["user1"]);
    assert!(querier.admins().is_empty());
    assert!(querier.bots().is_empty());
    assert!(!querier.is_bot("user1"));
    assert_eq!(querier.user_email("user1"), None);
}
