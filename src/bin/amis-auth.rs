use std::process::ExitCode;

use amis_auth::{AuthConfig, AuthorizationError, LoginFlow, Session, TokenVerifier};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use url::Url;

/// Les amis du sport login client.
///
/// Configuration comes from the `AMIS_*` environment variables.
#[derive(Parser)]
#[command(name = "amis-auth", version)]
struct App {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the interactive login, then optionally log out again.
    Login {
        /// Revoke the session at the provider once logged in.
        #[arg(long)]
        logout: bool,
    },
    /// Verify an access token against the realm's JWKS.
    Verify {
        /// Access token (JWT).
        token: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: {err:?}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(App::parse().run()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

impl App {
    async fn run(self) -> Result<()> {
        let config = AuthConfig::from_env().context("invalid configuration")?;
        match self.cmd {
            Cmd::Login { logout } => login(config, logout).await,
            Cmd::Verify { token } => verify(config, &token).await,
        }
    }
}

async fn login(config: AuthConfig, logout: bool) -> Result<()> {
    let flow = LoginFlow::new(config)?;
    let mut session = Session::new();

    let print_url = |url: &Url| -> Result<(), AuthorizationError> {
        eprintln!("Open this URL in a browser and sign in:\n\n  {url}\n");
        eprintln!("Then paste the URL you were redirected to:");
        Ok(())
    };
    let pending = flow.start_login(&print_url)?;

    let mut redirect = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut redirect)
        .await
        .context("failed to read redirect")?;

    let outcome = flow.complete(&redirect, &pending, &mut session).await?;
    println!(
        "logged in: subject={} admin={}",
        outcome
            .subject_id
            .as_ref()
            .map_or("<unknown>", |id| id.as_str()),
        outcome.is_admin
    );
    if let Some(expires_at) = session.expires_at() {
        println!("access token expires at {expires_at}");
    }

    if logout {
        flow.logout(&mut session).await?;
        println!("logged out");
    }
    Ok(())
}

async fn verify(config: AuthConfig, token: &str) -> Result<()> {
    let verifier = TokenVerifier::new(&config)?;
    let verified = verifier.verify(token.trim()).await?;
    println!(
        "valid: kid={} iss={} aud={}",
        verified.key_id(),
        verified.issuer(),
        verified.audience().join(",")
    );
    Ok(())
}
