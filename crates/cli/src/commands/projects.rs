use anyhow::{Context, Result};
use clap::Subcommand;
use issuetracker_api::IssueTrackerClient;
use issuetracker_output::OutputRenderer;

#[derive(Subcommand, Debug, Clone)]
pub enum ProjectCommand {
    /// List projects visible to the current user
    List,
    /// Show a single project
    Get {
        /// Project key (e.g. PROJ)
        key: String,
    },
}

pub async fn execute(
    command: ProjectCommand,
    client: &IssueTrackerClient,
    renderer: &OutputRenderer,
) -> Result<()> {
    match command {
        ProjectCommand::List => {
            let projects = client.projects().await.context("Failed to list projects")?;
            renderer.render(&projects)
        }
        ProjectCommand::Get { key } => {
            let project = client
                .get_project(&key)
                .await
                .with_context(|| format!("Failed to fetch project {key}"))?;
            renderer.render(&project)
        }
    }
}
