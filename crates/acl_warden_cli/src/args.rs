//! Command line arguments.
//!
//! Every setting that talks to the instance can also come from the environment,
//! so that the token never has to appear on the command line.

use std::fmt;
use std::path::PathBuf;

use acl_warden_core::{DiffArgs, DEFAULT_CONCURRENCY};
use clap::Parser;

#[cfg(test)]
#[path = "args_tests.rs"]
mod tests;

/// The only API root the client understands.
const API_SUFFIX: &str = "/api/v4/";

/// ACL Warden: keep GitLab memberships, sharing, variables and users in line with a YAML file
#[derive(Parser, Clone)]
#[command(name = "acl-warden", version)]
#[command(
    about = "Reconcile GitLab group and project ACLs, CI/CD variables, admins, blocked users and bots",
    long_about = None
)]
pub struct Cli {
    /// Admin token used for every API call
    #[arg(long, env = "GITLAB_TOKEN", hide_env_values = true)]
    pub gitlab_token: String,

    /// API root of the instance, e.g. https://gitlab.example.com/api/v4/
    #[arg(long = "gitlab-base-url", env = "GITLAB_BASEURL", value_parser = parse_base_url)]
    pub gitlab_base_url: String,

    /// Root configuration file
    #[arg(long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Print the changes instead of applying them
    #[arg(long)]
    pub dryrun: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Overwrite CI/CD variables whose current value differs from the configured one
    #[arg(long)]
    pub yolo: bool,

    /// Require a matching <file>.sha256 next to every configuration file
    #[arg(long)]
    pub checksum_check: bool,

    /// Number of groups and projects loaded at the same time
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY, value_parser = parse_positive)]
    pub concurrency: usize,

    /// Upper bound on API requests sent per second
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
    pub requests_per_second: u32,

    /// Admin account hidden from every listing (typically the token owner)
    #[arg(long)]
    pub ghost_user: Option<String>,

    /// Usernames matching this pattern are treated as bots; configured bots must match it
    #[arg(long)]
    pub bot_regex: Option<String>,

    /// Do not reconcile group memberships
    #[arg(long)]
    pub skip_groups: bool,

    /// Do not reconcile project memberships, sharing and variables
    #[arg(long)]
    pub skip_projects: bool,

    /// Do not reconcile admins and blocked users
    #[arg(long)]
    pub skip_users: bool,

    /// Do not create or update bot accounts
    #[arg(long)]
    pub skip_bots: bool,

    /// Load only the configured groups and projects, which works with a
    /// non-admin token; users and bots are not reconciled
    #[arg(long)]
    pub partial: bool,
}

impl Cli {
    /// What the differ should compare.
    pub fn diff_args(&self) -> DiffArgs {
        DiffArgs {
            groups: !self.skip_groups,
            projects: !self.skip_projects,
            users: !self.skip_users && !self.partial,
            bots: !self.skip_bots && !self.partial,
            yolo: self.yolo,
        }
    }

    /// The log filter used when `ACL_WARDEN_LOG` is not set.
    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}

impl fmt::Debug for Cli {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cli")
            .field("gitlab_token", &"[REDACTED]")
            .field("gitlab_base_url", &self.gitlab_base_url)
            .field("config", &self.config)
            .field("dryrun", &self.dryrun)
            .field("debug", &self.debug)
            .field("yolo", &self.yolo)
            .field("checksum_check", &self.checksum_check)
            .field("concurrency", &self.concurrency)
            .field("requests_per_second", &self.requests_per_second)
            .field("ghost_user", &self.ghost_user)
            .field("bot_regex", &self.bot_regex)
            .field("skip_groups", &self.skip_groups)
            .field("skip_projects", &self.skip_projects)
            .field("skip_users", &self.skip_users)
            .field("skip_bots", &self.skip_bots)
            .field("partial", &self.partial)
            .finish()
    }
}

/// Checks that `value` is an https API v4 root.
pub fn parse_base_url(value: &str) -> Result<String, String> {
    if !value.starts_with("https://") {
        return Err("base_url should use https:// scheme".to_string());
    }
    if !value.ends_with(API_SUFFIX) {
        return Err(format!("base_url should end with '{API_SUFFIX}'"));
    }
    Ok(value.to_string())
}

fn parse_positive(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}
