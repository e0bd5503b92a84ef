//! Configuration management for ACL Warden.
//!
//! The desired access control state is described in one or more YAML
//! documents: group and project ACLs, instance wide admin and blocked users,
//! and bot accounts. This crate parses those documents strictly, resolves
//! included files, optionally verifies checksums, and validates bots.

pub mod errors;
pub mod loader;
pub mod types;
pub mod validator;

// Re-export for convenient access
pub use errors::{ConfigurationError, ConfigurationResult};
pub use loader::ConfigLoader;
pub use types::{AclEntry, Acls, Bot, Config, Users};
pub use validator::{compile_bot_pattern, validate_bots};
