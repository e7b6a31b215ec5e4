mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use issuetracker_api::{ApiError, ApiVersion, ClientConfig, Credentials, IssueTrackerClient};
use issuetracker_auth::{token_key, CredentialStore};
use issuetracker_config::{Config, Profile};
use issuetracker_output::{OutputFormat, OutputRenderer};
use tracing_subscriber::{fmt, EnvFilter};

use commands::auth::AuthCommand;
use commands::issues::IssueCommand;
use commands::meta::MetaCommand;
use commands::projects::ProjectCommand;

#[derive(Parser, Debug)]
#[command(name = "issuetracker", version, about = "Jira-style issue tracker CLI", long_about = None)]
struct Cli {
    /// Profile to use from config file
    #[arg(short, long, global = true)]
    profile: Option<String>,

    /// Path to config file (defaults to ~/.issuetracker/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format for command results
    #[arg(long, value_enum, default_value_t = OutputFormat::Table, global = true)]
    output: OutputFormat,

    /// Enable verbose logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: TrackerCommand,
}

#[derive(Subcommand, Debug, Clone)]
enum TrackerCommand {
    /// Issue commands
    #[command(subcommand)]
    Issue(IssueCommand),
    /// Project commands
    #[command(subcommand)]
    Project(ProjectCommand),
    /// Issue types, priorities and statuses known to the tracker
    #[command(subcommand)]
    Meta(MetaCommand),
    /// Authentication commands
    #[command(subcommand)]
    Auth(AuthCommand),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = init_tracing(cli.debug) {
        eprintln!("{err}");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            if let Some(hint) = err
                .chain()
                .find_map(|cause| cause.downcast_ref::<ApiError>())
                .and_then(ApiError::suggestion)
            {
                eprintln!("Hint: {hint}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone();
    let mut config = Config::load(config_path.as_ref())?;
    let renderer = OutputRenderer::new(cli.output);

    match cli.command {
        TrackerCommand::Issue(command) => {
            let active = ActiveProfile::resolve(&config, cli.profile.as_deref(), default_store)?;
            let client = active.client()?;
            commands::issues::execute(command, &client, &renderer).await
        }
        TrackerCommand::Project(command) => {
            let active = ActiveProfile::resolve(&config, cli.profile.as_deref(), default_store)?;
            let client = active.client()?;
            commands::projects::execute(command, &client, &renderer).await
        }
        TrackerCommand::Meta(command) => {
            let active = ActiveProfile::resolve(&config, cli.profile.as_deref(), default_store)?;
            let client = active.client()?;
            commands::meta::execute(command, &client, &renderer).await
        }
        TrackerCommand::Auth(command) => {
            let store = default_store()?;
            commands::auth::handle(
                command,
                commands::auth::AuthContext {
                    config: &mut config,
                    config_path: config_path.as_deref(),
                    store: &store,
                    renderer: &renderer,
                    requested_profile: cli.profile.as_deref(),
                },
            )
            .await
        }
    }
}

fn default_store() -> Result<CredentialStore> {
    CredentialStore::new("issuetracker")
}

fn init_tracing(debug: bool) -> Result<()> {
    let default = if debug {
        "info,issuetracker=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!("failed to initialize logger: {err}"))
}

/// A profile with every setting needed to talk to the tracker.
pub(crate) struct ActiveProfile {
    pub name: String,
    pub base_url: String,
    pub username: String,
    pub token: String,
    pub api_version: ApiVersion,
    pub timeout: std::time::Duration,
}

impl ActiveProfile {
    /// `store` is only opened when no other token source applies.
    pub fn resolve<S>(config: &Config, requested: Option<&str>, store: S) -> Result<Self>
    where
        S: FnOnce() -> Result<CredentialStore>,
    {
        let (name, profile) = match requested {
            Some(name) => config
                .resolve_profile(Some(name))
                .ok_or_else(|| anyhow!("Profile '{name}' does not exist"))?,
            None => config.resolve_profile(None).ok_or_else(|| {
                anyhow!("No profile configured. Run `issuetracker auth login` first.")
            })?,
        };

        let token = resolve_token(name, profile, store, |var| std::env::var(var).ok())?;
        Self::from_profile(name, profile, token)
    }

    fn from_profile(name: &str, profile: &Profile, token: String) -> Result<Self> {
        let base_url = profile
            .base_url
            .clone()
            .ok_or_else(|| anyhow!("Profile '{name}' is missing a base_url."))?;
        let username = profile
            .username
            .clone()
            .ok_or_else(|| anyhow!("Profile '{name}' is missing a username."))?;
        let api_version = match profile.api_version {
            Some(3) => ApiVersion::V3,
            _ => ApiVersion::V2,
        };

        Ok(Self {
            name: name.to_string(),
            base_url,
            username,
            token,
            api_version,
            timeout: profile.timeout(),
        })
    }

    pub fn client(&self) -> Result<IssueTrackerClient> {
        let credentials = Credentials::new(&self.base_url, &self.username, &self.token)
            .with_context(|| format!("Invalid credentials in profile '{}'", self.name))?;
        let config = ClientConfig::new(credentials)
            .with_api_version(self.api_version)
            .with_timeout(self.timeout);
        Ok(IssueTrackerClient::new(config)?)
    }
}

/// Environment variable holding the token for one profile.
fn profile_token_var(name: &str) -> String {
    let suffix: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("ISSUETRACKER_TOKEN_{suffix}")
}

/// Profile env var, then the generic env var, then the profile itself, then
/// the credential store.
fn resolve_token<S, F>(name: &str, profile: &Profile, store: S, env: F) -> Result<String>
where
    S: FnOnce() -> Result<CredentialStore>,
    F: Fn(&str) -> Option<String>,
{
    let non_blank = |value: Option<String>| value.filter(|t| !t.trim().is_empty());

    if let Some(token) = non_blank(env(&profile_token_var(name))) {
        return Ok(token);
    }
    if let Some(token) = non_blank(env("ISSUETRACKER_API_TOKEN")) {
        return Ok(token);
    }
    if let Some(token) = non_blank(profile.api_token.clone()) {
        return Ok(token);
    }
    if let Some(token) = non_blank(store()?.get_secret(&token_key(name))?) {
        return Ok(token);
    }

    Err(anyhow!(
        "No token found for profile '{name}'. Set {} or run `issuetracker auth login --profile {name}`",
        profile_token_var(name)
    ))
}
