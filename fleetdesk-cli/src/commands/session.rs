use std::{
    env, fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail};
use clap::Subcommand;
use client::{BackendError, BearerToken, RestBackend, Session};
use directories::BaseDirs;
use rpassword::prompt_password;
use shared::config::Config;

use crate::render;

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    /// Sign in and store the session token
    Login {
        /// Account email; prompted for when omitted
        #[arg(long)]
        email: Option<String>,
    },
    /// Show the signed-in user
    Me,
    /// Sign out and remove the stored token
    Logout,
}

pub async fn run(command: SessionCommand, config: &Config) -> Result<()> {
    match command {
        SessionCommand::Login { email } => login(email, config).await,
        SessionCommand::Me => me(config).await,
        SessionCommand::Logout => logout(config).await,
    }
}

async fn login(email: Option<String>, config: &Config) -> Result<()> {
    let email = match email {
        Some(email) => email,
        None => prompt("Email: ")?,
    };
    let password = prompt_password("Password: ")?;
    if password.trim().is_empty() {
        bail!("password must not be empty");
    }

    let backend = RestBackend::new(config.api.base_url.clone());
    let token = backend
        .login(&email, &password)
        .await
        .map_err(|err| match err {
            BackendError::Unauthorized => anyhow!("login failed: invalid email or password"),
            other => anyhow!("login failed: {other}"),
        })?;

    let backend = backend.with_token(token.clone());
    let session = Session::bootstrap(&backend, token.clone())
        .await
        .context("signed in, but the profile could not be loaded")?;

    let path = session_path();
    persist_token(&token, &path)?;
    print!("{}", render::profile_summary(session.profile()));
    println!("token stored at {}", path.display());
    Ok(())
}

async fn me(config: &Config) -> Result<()> {
    let (_, session) = authenticated(config).await?;
    print!("{}", render::profile_summary(session.profile()));
    Ok(())
}

async fn logout(config: &Config) -> Result<()> {
    let path = session_path();
    match load_token(&path) {
        Ok(token) => {
            let backend = RestBackend::new(config.api.base_url.clone()).with_token(token);
            if let Err(err) = backend.logout().await {
                eprintln!("warning: logout request failed: {err}");
            }
        }
        Err(err) => eprintln!("warning: {err}"),
    }

    if path.exists() {
        fs::remove_file(&path)
            .with_context(|| format!("failed to remove session token {}", path.display()))?;
        println!("Removed session token at {}", path.display());
    } else {
        println!("No session token found at {}", path.display());
    }
    Ok(())
}

/// Location of the stored token; `FLEETDESK_SESSION_FILE` overrides it.
pub fn session_path() -> PathBuf {
    if let Ok(path) = env::var("FLEETDESK_SESSION_FILE") {
        return PathBuf::from(path);
    }
    BaseDirs::new().map_or_else(
        || PathBuf::from("./session.token"),
        |dirs| dirs.config_dir().join("fleetdesk").join("session.token"),
    )
}

pub fn load_token(path: &Path) -> Result<BearerToken> {
    let raw = fs::read_to_string(path).with_context(|| {
        format!(
            "no active session found at {}; run `fleetdesk session login` first",
            path.display()
        )
    })?;
    let token = raw.trim();
    if token.is_empty() {
        bail!(
            "session token at {} is empty; run `fleetdesk session login` again",
            path.display()
        );
    }
    Ok(BearerToken::new(token))
}

/// REST client bound to the stored token.
pub fn authenticated_backend(config: &Config) -> Result<RestBackend> {
    let token = load_token(&session_path())?;
    Ok(RestBackend::new(config.api.base_url.clone()).with_token(token))
}

/// REST client plus the resolved session of the stored token.
pub async fn authenticated(config: &Config) -> Result<(RestBackend, Session)> {
    let token = load_token(&session_path())?;
    let backend = RestBackend::new(config.api.base_url.clone()).with_token(token.clone());
    let session = Session::bootstrap(&backend, token)
        .await
        .map_err(session_error)?;
    Ok((backend, session))
}

pub fn session_error(err: BackendError) -> anyhow::Error {
    match err {
        BackendError::Unauthorized => {
            anyhow!("session expired. run `fleetdesk session login` to sign in again")
        }
        other => anyhow!(other),
    }
}

fn persist_token(token: &BearerToken, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create session directory {}", parent.display()))?;
    }
    fs::write(path, token.expose())
        .with_context(|| format!("failed to write session token at {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .context("failed to set session token permissions")?;
    }
    Ok(())
}

fn prompt(message: &str) -> Result<String> {
    print!("{message}");
    io::stdout().flush().ok();
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let trimmed = input.trim().to_string();
    if trimmed.is_empty() {
        bail!("input must not be empty");
    }
    Ok(trimmed)
}
