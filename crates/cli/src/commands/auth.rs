use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Subcommand};
use issuetracker_api::Credentials;
use issuetracker_auth::{token_key, CredentialStore};
use issuetracker_config::{Config, Profile};
use issuetracker_output::OutputRenderer;
use serde::Serialize;

use crate::ActiveProfile;

const DEFAULT_PROFILE: &str = "default";

#[derive(Subcommand, Debug, Clone)]
pub enum AuthCommand {
    /// Add or update a profile and store its token
    Login(LoginArgs),
    /// Remove the stored token (and optionally the profile)
    Logout(LogoutArgs),
    /// Check the active profile against the tracker
    Status,
}

#[derive(Args, Debug, Clone)]
pub struct LoginArgs {
    /// Tracker base URL (e.g. https://example.atlassian.net)
    #[arg(long)]
    pub base_url: String,
    /// Account name or email the token belongs to
    #[arg(long)]
    pub username: String,
    /// API token (falls back to ISSUETRACKER_API_TOKEN or a prompt)
    #[arg(long, env = "ISSUETRACKER_API_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
    /// REST API generation
    #[arg(long, value_parser = clap::value_parser!(u8).range(2..=3))]
    pub api_version: Option<u8>,
    /// Request timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
    /// Mark this profile as the default one
    #[arg(long)]
    pub default: bool,
}

#[derive(Args, Debug, Clone)]
pub struct LogoutArgs {
    /// Remove the profile from config entirely (not just the stored token)
    #[arg(long)]
    pub remove_profile: bool,
}

pub struct AuthContext<'a> {
    pub config: &'a mut Config,
    pub config_path: Option<&'a Path>,
    pub store: &'a CredentialStore,
    pub renderer: &'a OutputRenderer,
    pub requested_profile: Option<&'a str>,
}

pub async fn handle(command: AuthCommand, ctx: AuthContext<'_>) -> Result<()> {
    match command {
        AuthCommand::Login(args) => {
            let name = ctx.requested_profile.unwrap_or(DEFAULT_PROFILE);
            let token = match &args.token {
                Some(token) if !token.trim().is_empty() => token.trim().to_owned(),
                _ => read_token_from_stdin().context("Failed to read token from prompt")?,
            };
            login(ctx.config, ctx.config_path, ctx.store, name, &args, &token)?;
            ctx.renderer
                .success(&format!("Profile '{name}' saved and token stored"));
            Ok(())
        }
        AuthCommand::Logout(args) => {
            let name = ctx.requested_profile.unwrap_or(DEFAULT_PROFILE);
            logout(ctx.config, ctx.config_path, ctx.store, name, &args)?;
            ctx.renderer.success(&format!("Logged out of '{name}'"));
            Ok(())
        }
        AuthCommand::Status => {
            status(ctx.config, ctx.store, ctx.renderer, ctx.requested_profile).await
        }
    }
}

fn login(
    config: &mut Config,
    config_path: Option<&Path>,
    store: &CredentialStore,
    name: &str,
    args: &LoginArgs,
    token: &str,
) -> Result<()> {
    if name.trim().is_empty() {
        bail!("Profile name cannot be empty");
    }
    if token.is_empty() {
        bail!("API token cannot be empty");
    }

    // Same checks the client applies, before anything is written.
    let credentials = Credentials::new(&args.base_url, &args.username, token)
        .with_context(|| format!("Invalid settings for profile '{name}'"))?;

    let profile = Profile {
        base_url: Some(credentials.base_url().to_string()),
        username: Some(credentials.username().to_string()),
        api_token: None,
        api_version: args.api_version,
        timeout_secs: args.timeout_secs,
    };
    profile.validate()?;

    config.upsert_profile(name, profile);
    if args.default {
        config.default_profile = Some(name.to_string());
    }

    store
        .set_secret(&token_key(name), token)
        .context("Failed to store token")?;
    config
        .save(config_path)
        .context("Unable to persist configuration file")?;

    tracing::info!(profile = %name, base_url = %credentials.base_url(), "Profile saved");
    Ok(())
}

fn logout(
    config: &mut Config,
    config_path: Option<&Path>,
    store: &CredentialStore,
    name: &str,
    args: &LogoutArgs,
) -> Result<()> {
    if config.profile(name).is_none() {
        return Err(anyhow!("Profile '{name}' does not exist"));
    }

    let removed = store
        .delete_secret(&token_key(name))
        .context("Failed to remove stored token")?;
    if !removed {
        tracing::warn!(profile = %name, "No stored token to remove");
    }

    if args.remove_profile {
        config.remove_profile(name);
        config
            .save(config_path)
            .context("Unable to persist configuration file")?;
        tracing::info!(profile = %name, "Profile removed");
    }

    Ok(())
}

#[derive(Serialize)]
struct StatusView {
    profile: String,
    base_url: String,
    username: String,
    display_name: String,
    account_id: Option<String>,
}

async fn status(
    config: &Config,
    store: &CredentialStore,
    renderer: &OutputRenderer,
    requested: Option<&str>,
) -> Result<()> {
    let active = ActiveProfile::resolve(config, requested, || Ok(store.clone()))?;
    let user = active
        .client()?
        .myself()
        .await
        .with_context(|| format!("Authentication check failed for '{}'", active.name))?;

    renderer.render(&StatusView {
        profile: active.name.clone(),
        base_url: active.base_url.clone(),
        username: active.username.clone(),
        display_name: user.display_name,
        account_id: user.account_id,
    })
}

fn read_token_from_stdin() -> Result<String> {
    use std::io::{self, Write};

    eprint!("Enter API token: ");
    io::stderr().flush().context("Failed to flush stderr")?;

    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;

    Ok(line.trim().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        config_path: std::path::PathBuf,
        store: CredentialStore,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        Fixture {
            config_path: dir.path().join("config.yaml"),
            store: CredentialStore::at(dir.path().join("credentials")),
            _dir: dir,
        }
    }

    fn login_args(base_url: &str) -> LoginArgs {
        LoginArgs {
            base_url: base_url.to_string(),
            username: "me@example.com".to_string(),
            token: None,
            api_version: Some(3),
            timeout_secs: None,
            default: false,
        }
    }

    #[test]
    fn test_login_saves_profile_and_token() {
        let fx = fixture();
        let mut config = Config::default();

        login(
            &mut config,
            Some(&fx.config_path),
            &fx.store,
            "work",
            &login_args("https://work.example.com"),
            "tok-1",
        )
        .unwrap();

        let saved = Config::load(Some(&fx.config_path)).unwrap();
        assert_eq!(saved.default_profile.as_deref(), Some("work"));
        let profile = saved.profile("work").unwrap();
        assert_eq!(profile.api_version, Some(3));
        assert!(profile.api_token.is_none());
        assert_eq!(
            fx.store.get_secret(&token_key("work")).unwrap().as_deref(),
            Some("tok-1")
        );
    }

    #[test]
    fn test_login_rejects_bad_url_without_writing() {
        let fx = fixture();
        let mut config = Config::default();

        let err = login(
            &mut config,
            Some(&fx.config_path),
            &fx.store,
            "work",
            &login_args("not a url"),
            "tok-1",
        )
        .unwrap_err();

        assert!(err.to_string().contains("Invalid settings"));
        assert!(config.profiles.is_empty());
        assert!(!fx.config_path.exists());
        assert!(!fx.store.path().exists());
    }

    #[test]
    fn test_login_default_flag_moves_default() {
        let fx = fixture();
        let mut config = Config::default();
        let path = Some(fx.config_path.as_path());

        login(&mut config, path, &fx.store, "home", &login_args("https://home.example.com"), "a")
            .unwrap();
        let args = LoginArgs {
            default: true,
            ..login_args("https://work.example.com")
        };
        login(&mut config, path, &fx.store, "work", &args, "b").unwrap();

        assert_eq!(config.default_profile.as_deref(), Some("work"));
    }

    #[test]
    fn test_logout_removes_token_and_optionally_profile() {
        let fx = fixture();
        let mut config = Config::default();
        let path = Some(fx.config_path.as_path());
        login(&mut config, path, &fx.store, "work", &login_args("https://work.example.com"), "t")
            .unwrap();

        logout(
            &mut config,
            path,
            &fx.store,
            "work",
            &LogoutArgs {
                remove_profile: false,
            },
        )
        .unwrap();
        assert_eq!(fx.store.get_secret(&token_key("work")).unwrap(), None);
        assert!(config.profile("work").is_some());

        logout(
            &mut config,
            path,
            &fx.store,
            "work",
            &LogoutArgs {
                remove_profile: true,
            },
        )
        .unwrap();
        assert!(Config::load(path).unwrap().profile("work").is_none());

        let err = logout(
            &mut config,
            path,
            &fx.store,
            "work",
            &LogoutArgs {
                remove_profile: false,
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
