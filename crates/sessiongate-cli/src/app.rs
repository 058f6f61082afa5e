//! Command execution on top of a single gateway.

use std::io::{self, Write};
use std::pin::pin;

use anyhow::{bail, Context, Result};
use futures::future::join_all;
use futures::TryStreamExt;
use serde_json::Value;
use sessiongate_core::{Gateway, GatewayConfig};
use tracing::{error, warn};

use crate::{Cli, Command};

/// Environment variable checked before prompting for a password
const PASSWORD_ENV: &str = "SESSIONGATE_PASSWORD";

pub async fn run(cli: Cli) -> Result<()> {
    let gateway = connect(cli.api_url.as_deref())?;

    if let Command::ResetPassword { ref email } = cli.command {
        gateway
            .request_password_reset(email)
            .await
            .context("Failed to request password reset")?;
        println!("Password reset email requested for {}", email);
        return Ok(());
    }

    login(&gateway, cli.email).await?;
    let result = match cli.command {
        Command::Get { paths } => get_all(&gateway, &paths).await,
        Command::List { path } => list(&gateway, &path).await,
        Command::Whoami => whoami(&gateway).await,
        Command::ResetPassword { .. } => Ok(()),
    };
    gateway.logout().await;
    result
}

fn connect(api_url: Option<&str>) -> Result<Gateway> {
    let mut config = GatewayConfig::load().context("Failed to load configuration")?;
    if let Some(url) = api_url {
        config.api_url = url.to_string();
    }

    let gateway = Gateway::http_builder(config)
        .context("Failed to create HTTP client")?
        .on_reauthenticate(|err| {
            warn!(error = %err, "Session expired, log in again to continue");
        })
        .build();
    Ok(gateway)
}

async fn login(gateway: &Gateway, email: Option<String>) -> Result<()> {
    let email = match email {
        Some(email) => email,
        None => prompt_email()?,
    };
    let password = match std::env::var(PASSWORD_ENV) {
        Ok(password) => password,
        Err(_) => rpassword::prompt_password("Password: ").context("Failed to read password")?,
    };

    if email.is_empty() || password.is_empty() {
        bail!("Email and password required");
    }

    gateway.login(&email, &password).await.context("Login failed")
}

fn prompt_email() -> Result<String> {
    print!("Email: ");
    io::stdout().flush()?;

    let mut email = String::new();
    io::stdin().read_line(&mut email)?;
    Ok(email.trim().to_string())
}

/// Fetch every path at once. Rejections caused by an expired token are
/// absorbed by a single shared renewal.
async fn get_all(gateway: &Gateway, paths: &[String]) -> Result<()> {
    let results = join_all(paths.iter().map(|path| gateway.get_json::<Value>(path))).await;

    let mut failures = 0;
    for (path, result) in paths.iter().zip(results) {
        match result {
            Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            Err(e) => {
                error!(path = %path, error = %e, "Request failed");
                eprintln!("{}: {}", path, e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} requests failed", failures, paths.len());
    }
    Ok(())
}

async fn list(gateway: &Gateway, path: &str) -> Result<()> {
    let mut pages = pin!(gateway.pages::<Value>(path));
    let mut count = 0usize;
    while let Some(page) = pages
        .try_next()
        .await
        .with_context(|| format!("Failed to fetch page of {}", path))?
    {
        for item in page.data {
            println!("{}", serde_json::to_string(&item)?);
            count += 1;
        }
    }
    eprintln!("{} items", count);
    Ok(())
}

async fn whoami(gateway: &Gateway) -> Result<()> {
    let admin = gateway
        .current_admin()
        .await
        .context("Failed to fetch current admin")?;
    println!("{} <{}> (id {})", admin.name, admin.email, admin.id);
    Ok(())
}
