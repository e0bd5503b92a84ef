//! One reconciliation run, from configuration file to applied changes.

use std::fmt::Write;
use std::sync::Arc;
use std::time::Instant;

use acl_warden_core::{
    execute_actions, BotDetector, DesiredStateBuilder, Differ, DryRunClient, GitLabApiClient,
    Querier, QuerierOptions, State, StateLoader,
};
use colored::Colorize;
use config_manager::{compile_bot_pattern, Config, ConfigLoader};
use gitlab_client::{ClientConfig, GitLabApi, GitLabClient};
use regex::Regex;
use secrecy::SecretString;
use tracing::{debug, info};

use crate::args::Cli;
use crate::errors::Error;

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;

/// What a run did, ready to be reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Number of actions executed against the instance
    pub applied: usize,
    /// The recorded calls when running dry
    pub dry_run: Option<Vec<String>>,
    /// Groups on the instance that the configuration does not mention
    pub unhandled_groups: Vec<String>,
}

/// Rejects argument combinations that leave nothing to do.
pub fn check_args(cli: &Cli) -> Result<(), Error> {
    if cli.skip_groups && cli.skip_projects && cli.skip_users && cli.skip_bots {
        return Err(Error::InvalidArguments(
            "--skip-groups, --skip-projects, --skip-users and --skip-bots together leave nothing to reconcile"
                .to_string(),
        ));
    }
    if cli.partial && cli.skip_groups && cli.skip_projects {
        return Err(Error::InvalidArguments(
            "--partial only reconciles groups and projects, which are both skipped".to_string(),
        ));
    }
    Ok(())
}

/// Loads the configuration, connects to the instance, reconciles and prints the report.
pub async fn run(cli: &Cli) -> Result<(), Error> {
    check_args(cli)?;

    let config = ConfigLoader::new()
        .with_checksum_verification(cli.checksum_check)
        .load(&cli.config)?;

    let mut client_config = ClientConfig::new(
        cli.gitlab_base_url.clone(),
        SecretString::from(cli.gitlab_token.clone()),
    );
    client_config.requests_per_second = cli.requests_per_second;
    let client = Arc::new(GitLabClient::new(client_config)?);

    let outcome = reconcile(cli, &config, client).await?;
    print!("{}", render_report(&outcome));
    Ok(())
}

/// Brings the instance behind `client` in line with `config`.
///
/// Any failure while loading the current state or building the desired one
/// aborts the run before a single change is made.
pub async fn reconcile(
    cli: &Cli,
    config: &Config,
    client: Arc<dyn GitLabApi>,
) -> Result<Outcome, Error> {
    let bot_pattern = cli
        .bot_regex
        .as_deref()
        .map(compile_bot_pattern)
        .transpose()?;

    let started = Instant::now();
    let loader = StateLoader::new(client.clone()).with_concurrency(cli.concurrency);
    if cli.partial {
        let querier = loader.load_lazy_querier(config).await?;
        let current = loader
            .load_partial_state(config, &querier)
            .await
            .into_result(acl_warden_core::Error::Load)?;
        info!(elapsed = ?started.elapsed(), "Partial state loaded");
        return apply(cli, config, client, &querier, &current, bot_pattern.as_ref()).await;
    }

    let querier = loader
        .load_querier(QuerierOptions {
            ghost_user: cli.ghost_user.clone(),
            bots: BotDetector::new(
                config.bots.iter().map(|bot| bot.username.clone()),
                bot_pattern.clone(),
            ),
        })
        .await?;
    let current = loader
        .load_state(&querier)
        .await
        .into_result(acl_warden_core::Error::Load)?;
    info!(elapsed = ?started.elapsed(), "Current state loaded");

    apply(cli, config, client, &querier, &current, bot_pattern.as_ref()).await
}

/// Builds the desired state, diffs it against `current` and executes the actions.
async fn apply(
    cli: &Cli,
    config: &Config,
    client: Arc<dyn GitLabApi>,
    querier: &dyn Querier,
    current: &State,
    bot_pattern: Option<&Regex>,
) -> Result<Outcome, Error> {
    let desired = DesiredStateBuilder::new(querier)
        .with_bot_pattern(bot_pattern)
        .build(config)?;

    let actions = Differ::new(querier, cli.diff_args())
        .diff(Some(current), Some(&desired))?
        .into_result(acl_warden_core::Error::Reconciliation)?;
    debug!(actions = actions.len(), dry_run = cli.dryrun, "Diff computed");

    let unhandled_groups = desired.unhandled_groups().to_vec();
    if cli.dryrun {
        let recorder = DryRunClient::new();
        execute_actions(&actions, &recorder).await?;
        return Ok(Outcome {
            applied: 0,
            dry_run: Some(recorder.calls()),
            unhandled_groups,
        });
    }

    let api = GitLabApiClient::new(client, querier);
    execute_actions(&actions, &api).await?;
    Ok(Outcome {
        applied: actions.len(),
        dry_run: None,
        unhandled_groups,
    })
}

/// Formats the outcome for the terminal.
pub fn render_report(outcome: &Outcome) -> String {
    let mut output = String::new();

    match &outcome.dry_run {
        Some(calls) if !calls.is_empty() => {
            for call in calls {
                let _ = writeln!(output, "{call}");
            }
        }
        None if outcome.applied > 0 => {
            let _ = writeln!(
                output,
                "{} {} change(s) applied",
                "✓".green(),
                outcome.applied
            );
        }
        _ => output.push_str("No changes\n"),
    }

    if !outcome.unhandled_groups.is_empty() {
        let _ = writeln!(output, "\n{}", "Unhandled groups".yellow().bold());
        for group in &outcome.unhandled_groups {
            let _ = writeln!(output, "  {} {}", "⚠".yellow(), group);
        }
    }

    output
}
