//! Configuration document types.
//!
//! These types mirror the YAML document one to one. Unknown keys are rejected
//! so that a typo such as `owner:` instead of `owners:` fails loudly instead of
//! silently dropping a permission.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ConfigurationError, ConfigurationResult};

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;

/// Prefix of an ACL entry that derives members from a query.
pub const QUERY_PREFIX: &str = "query:";

/// Prefix of a project ACL entry that shares the project with a group.
pub const SHARE_WITH_PREFIX: &str = "share_with:";

/// The root configuration document.
///
/// # Examples
///
/// ```rust
/// use config_manager::Config;
///
/// let config: Config = serde_yaml::from_str(
///     r#"
/// groups:
///   root_group:
///     owners: [admin]
///     developers: ["query: users"]
/// "#,
/// )
/// .unwrap();
///
/// assert_eq!(config.groups["root_group"].owners, vec!["admin"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Group ACLs keyed by group full path
    #[serde(default)]
    pub groups: BTreeMap<String, Acls>,

    /// Project ACLs keyed by project full path
    #[serde(default)]
    pub projects: BTreeMap<String, Acls>,

    /// Instance wide user roles
    #[serde(default)]
    pub users: Users,

    /// Bot accounts that must exist on the instance
    #[serde(default)]
    pub bots: Vec<Bot>,

    /// Further configuration files to merge into this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

impl Config {
    /// Merges an included document into this one.
    ///
    /// Groups and projects must be unique across all files; user lists and
    /// bots are concatenated.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::DuplicateDefinition` when `other` defines a
    /// group or project this config already defines.
    pub fn merge(&mut self, other: Config, source: &str) -> ConfigurationResult<()> {
        merge_acls(&mut self.groups, other.groups, "group", source)?;
        merge_acls(&mut self.projects, other.projects, "project", source)?;

        self.users.admins.extend(other.users.admins);
        self.users.blocked.extend(other.users.blocked);
        self.bots.extend(other.bots);
        Ok(())
    }
}

fn merge_acls(
    target: &mut BTreeMap<String, Acls>,
    incoming: BTreeMap<String, Acls>,
    kind: &str,
    source: &str,
) -> ConfigurationResult<()> {
    for (name, acls) in incoming {
        if target.contains_key(&name) {
            return Err(ConfigurationError::DuplicateDefinition {
                kind: kind.to_string(),
                name,
                path: source.to_string(),
            });
        }
        target.insert(name, acls);
    }
    Ok(())
}

/// The per level ACL lists of a group or project.
///
/// Entries are plain usernames, `query:<expr>` directives or, for projects,
/// `share_with:<group>` directives. See [`AclEntry`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Acls {
    #[serde(default)]
    pub guests: Vec<String>,
    #[serde(default)]
    pub reporters: Vec<String>,
    #[serde(default)]
    pub developers: Vec<String>,
    #[serde(default)]
    pub maintainers: Vec<String>,
    #[serde(default)]
    pub owners: Vec<String>,

    /// Secret key to the name of the environment variable holding its value
    #[serde(default)]
    pub secret_variables: BTreeMap<String, String>,
}

/// Instance wide user roles.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Users {
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default)]
    pub blocked: Vec<String>,
}

/// A bot account.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Bot {
    pub username: String,
    #[serde(default)]
    pub email: String,
}

/// One parsed entry of an ACL list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclEntry<'a> {
    /// A plain username
    User(&'a str),
    /// A query expression, with the `query:` prefix stripped
    Query(&'a str),
    /// A group to share a project with, with the `share_with:` prefix stripped
    ShareWith(&'a str),
}

impl<'a> AclEntry<'a> {
    /// Classifies a raw ACL entry.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use config_manager::AclEntry;
    ///
    /// assert_eq!(AclEntry::parse("query: users"), AclEntry::Query("users"));
    /// assert_eq!(AclEntry::parse("share_with:other"), AclEntry::ShareWith("other"));
    /// assert_eq!(AclEntry::parse("user1"), AclEntry::User("user1"));
    /// ```
    pub fn parse(raw: &'a str) -> Self {
        if let Some(query) = raw.strip_prefix(QUERY_PREFIX) {
            AclEntry::Query(query.trim())
        } else if let Some(group) = raw.strip_prefix(SHARE_WITH_PREFIX) {
            AclEntry::ShareWith(group.trim())
        } else {
            AclEntry::User(raw.trim())
        }
    }
}
