//! Access levels.

use std::fmt;

#[cfg(test)]
#[path = "level_tests.rs"]
mod tests;

/// A GitLab access level.
///
/// Backed by GitLab's numeric value so that levels reported by the API which
/// this tool does not manage (e.g. `5`, minimal access) survive a round trip.
/// Ordering is numeric.
///
/// # Examples
///
/// ```rust
/// use acl_warden_core::Level;
///
/// assert!(Level::OWNER > Level::DEVELOPER);
/// assert_eq!(Level::MAINTAINER.to_string(), "Maintainer");
/// assert_eq!(Level::from_access_level(5).to_string(), "Unknown");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Level(u8);

impl Level {
    pub const GUEST: Level = Level(10);
    pub const REPORTER: Level = Level(20);
    pub const DEVELOPER: Level = Level(30);
    pub const MAINTAINER: Level = Level(40);
    pub const OWNER: Level = Level(50);

    /// Every managed level, lowest first.
    pub const ALL: [Level; 5] = [
        Level::GUEST,
        Level::REPORTER,
        Level::DEVELOPER,
        Level::MAINTAINER,
        Level::OWNER,
    ];

    pub const fn from_access_level(value: u8) -> Self {
        Level(value)
    }

    pub const fn access_level(self) -> u8 {
        self.0
    }

    /// Returns false for levels reported by GitLab that this tool does not manage.
    pub fn is_known(self) -> bool {
        Self::ALL.contains(&self)
    }

    pub fn name(self) -> &'static str {
        match self.0 {
            10 => "Guest",
            20 => "Reporter",
            30 => "Developer",
            40 => "Maintainer",
            50 => "Owner",
            _ => "Unknown",
        }
    }

    /// Parses the plural ACL list name used in configuration and queries,
    /// e.g. `Developers`. Case is ignored.
    pub fn from_acl_name(name: &str) -> Option<Level> {
        match name.to_ascii_lowercase().as_str() {
            "guests" => Some(Level::GUEST),
            "reporters" => Some(Level::REPORTER),
            "developers" => Some(Level::DEVELOPER),
            "maintainers" => Some(Level::MAINTAINER),
            "owners" => Some(Level::OWNER),
            _ => None,
        }
    }
}

impl From<u8> for Level {
    fn from(value: u8) -> Self {
        Level(value)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
