//! # ACL Warden Core
//!
//! This crate holds the reconciliation logic of ACL Warden, a tool that keeps the
//! memberships, project sharing, CI/CD variables and user roles of a GitLab
//! instance in line with a declarative configuration.
//!
//! ## Overview
//!
//! A run goes through these steps:
//! 1. Take a snapshot of users, groups and projects ([`StateLoader::load_querier`])
//! 2. Build and validate the desired [`State`] from configuration ([`DesiredStateBuilder`])
//! 3. Load the current [`State`] ([`StateLoader::load_state`])
//! 4. Compute the [`Action`]s that turn one into the other ([`Differ`])
//! 5. Execute them against an [`ApiClient`], either for real ([`GitLabApiClient`])
//!    or as a dry run ([`DryRunClient`])
//!
//! Tokens without admin rights can run a partial reconciliation instead: a
//! [`LazyQuerier`] resolves only the names the configuration uses, and only the
//! configured groups and projects are loaded
//! ([`StateLoader::load_partial_state`]).
//!
//! ## Examples
//!
//! ```rust
//! use acl_warden_core::{
//!     DesiredStateBuilder, DiffArgs, Differ, Group, Level, PreloadedQuerier, Role, State,
//! };
//! use config_manager::{Acls, Config};
//!
//! let mut querier = PreloadedQuerier::new("admin");
//! querier.add_user("admin", 1, Role::Admin, None);
//! querier.add_user("user1", 2, Role::User, None);
//! querier.add_group("root_group", 10);
//!
//! let mut config = Config::default();
//! config.groups.insert(
//!     "root_group".to_string(),
//!     Acls {
//!         owners: vec!["admin".to_string()],
//!         developers: vec!["user1".to_string()],
//!         ..Acls::default()
//!     },
//! );
//! config.users.admins = vec!["admin".to_string()];
//! let desired = DesiredStateBuilder::new(&querier).build(&config).unwrap();
//!
//! let mut current = State::new("admin");
//! let mut group = Group::new("root_group");
//! group.members_mut().merge("admin", Level::OWNER);
//! current.insert_group(group);
//! current.add_admin("admin");
//!
//! let actions = Differ::new(&querier, DiffArgs::default())
//!     .diff(Some(&current), Some(&desired))
//!     .unwrap();
//! assert!(actions.is_complete());
//! assert_eq!(actions.value.len(), 1);
//! ```
//!
//! ## Error Handling
//!
//! Building, loading and diffing report every failure they find rather than
//! stopping at the first one; see [`Errors`], [`AggregateError`] and
//! [`BestEffort`]. Executing actions stops at the first failed call.

pub mod action;
pub mod api_client;
pub mod desired;
pub mod diff;
pub mod errors;
pub mod gitlab_api;
pub mod lazy_querier;
pub mod level;
pub mod loader;
pub mod querier;
pub mod query;
pub mod state;
pub mod worker_pool;

#[cfg(test)]
mod test_support;

pub use action::{execute_actions, Action, Priority};
pub use api_client::{ApiClient, DryRunClient};
pub use desired::DesiredStateBuilder;
pub use diff::{DiffArgs, Differ};
pub use errors::{AggregateError, BestEffort, Error, Errors, WardenResult};
pub use gitlab_api::{random_password, GitLabApiClient, BOT_PASSWORD_LENGTH};
pub use lazy_querier::LazyQuerier;
pub use level::Level;
pub use loader::{QuerierOptions, StateLoader, DEFAULT_CONCURRENCY};
pub use querier::{BotDetector, PreloadedQuerier, Querier, Role, UserRecord};
pub use query::{MemberFilter, Query, QueryError};
pub use state::{Group, LevelMap, Project, State};
pub use worker_pool::WorkerPool;
