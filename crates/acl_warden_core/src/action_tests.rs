use super::*;
use crate::DryRunClient;

fn user(username: &str) -> String {
    username.to_string()
}

#[test]
fn test_priorities() {
    let cases = [
        (
            Action::UnblockUser {
                username: user("user3"),
            },
            Priority::UnblockUser,
        ),
        (
            Action::SetAdmin {
                username: user("user1"),
            },
            Priority::ManageAdminUser,
        ),
        (
            Action::CreateBot {
                username: user("deploy-bot"),
                email: "deploy@example.com".to_string(),
            },
            Priority::ManageAdminUser,
        ),
        (
            Action::RemoveGroupMembership {
                username: user("user1"),
                group: "root_group".to_string(),
            },
            Priority::ManageGroup,
        ),
        (
            Action::CreateGroupVariable {
                group: "root_group".to_string(),
                key: "K".to_string(),
                value: "v".to_string(),
            },
            Priority::ManageGroup,
        ),
        (
            Action::AddProjectSharing {
                project: "root_group/a_project".to_string(),
                group: "other_group".to_string(),
                level: Level::REPORTER,
            },
            Priority::ManageProject,
        ),
        (
            Action::BlockUser {
                username: user("user2"),
            },
            Priority::BlockUser,
        ),
    ];

    for (action, expected) in cases {
        assert_eq!(action.priority(), expected, "{action:?}");
    }
}

#[test]
fn test_priority_order() {
    let mut shuffled = vec![
        Priority::BlockUser,
        Priority::ManageGroup,
        Priority::UnblockUser,
        Priority::ManageProject,
        Priority::ManageAdminUser,
    ];
    shuffled.sort();
    assert_eq!(shuffled, Priority::ALL.to_vec());
    assert_eq!(Priority::UnblockUser.index(), 0);
    assert_eq!(Priority::BlockUser.index(), 4);
}

#[tokio::test]
async fn test_execute_dispatches_to_client() {
    let client = DryRunClient::new();
    let actions = vec![
        Action::UnblockUser {
            username: user("user3"),
        },
        Action::AddGroupMembership {
            username: user("user1"),
            group: "root_group".to_string(),
            level: Level::DEVELOPER,
        },
        Action::RemoveProjectSharing {
            project: "root_group/a_project".to_string(),
            group: "other_group".to_string(),
        },
        Action::UpdateProjectVariable {
            project: "root_group/a_project".to_string(),
            key: "KEY".to_string(),
            value: "secret".to_string(),
        },
        Action::UpdateBotEmail {
            username: user("deploy-bot"),
            email: "new@example.com".to_string(),
        },
    ];

    execute_actions(&actions, &client).await.unwrap();

    assert_eq!(
        client.calls(),
        vec![
            "unblock 'user3'",
            "add 'user1' to 'root_group' at level 'Developer'",
            "remove project sharing from 'root_group/a_project' with group 'other_group'",
            "update project variable 'KEY' in 'root_group/a_project'",
            "update bot user 'deploy-bot' email to 'new@example.com'",
        ]
    );
}

#[tokio::test]
async fn test_execute_nothing() {
    let client = DryRunClient::new();
    execute_actions(&[], &client).await.unwrap();
    assert!(client.calls().is_empty());
}
