use anyhow::{Context, Result};
use clap::Subcommand;
use issuetracker_api::IssueTrackerClient;
use issuetracker_output::OutputRenderer;

/// Read-only lookups of the names the tracker accepts.
#[derive(Subcommand, Debug, Clone)]
pub enum MetaCommand {
    /// List issue types
    Types,
    /// List priorities
    Priorities,
    /// List workflow statuses
    Statuses,
}

pub async fn execute(
    command: MetaCommand,
    client: &IssueTrackerClient,
    renderer: &OutputRenderer,
) -> Result<()> {
    let entries = match command {
        MetaCommand::Types => client.issue_types().await.context("Failed to list issue types")?,
        MetaCommand::Priorities => client.priorities().await.context("Failed to list priorities")?,
        MetaCommand::Statuses => client.statuses().await.context("Failed to list statuses")?,
    };
    renderer.render(&entries)
}
