//! CLI commands

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use cornucopia_client::{ApiClient, ApiRequest, AuthSession, ClientConfig, RegisterRequest, parse_jwt};
use std::io::{BufRead, Write};
use tracing::info;

#[derive(Subcommand)]
pub enum Commands {
    /// Log in and save the session
    Login {
        /// Username
        username: String,

        /// Password (prompted for when omitted)
        #[arg(long, env = "CORNUCOPIA_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// End the session on the server and locally
    Logout,

    /// Show the saved session
    Status,

    /// Create a new account
    Register {
        /// Username
        username: String,

        /// Email address
        #[arg(long)]
        email: String,

        /// Password (prompted for when omitted)
        #[arg(long, env = "CORNUCOPIA_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Send an authenticated request and print the response body
    Request {
        /// HTTP method
        #[arg(value_parser = ["GET", "POST", "PUT", "PATCH", "DELETE"], ignore_case = true)]
        method: String,

        /// Path relative to the API base URL, e.g. /cornucopia/cart
        path: String,

        /// JSON request body
        #[arg(long)]
        data: Option<String>,
    },
}

impl Commands {
    pub async fn execute(self, config: &ClientConfig) -> Result<()> {
        let client = ApiClient::from_config(config).context("Failed to create API client")?;
        let session = AuthSession::new(client);
        session.mount();

        match self {
            Self::Login { username, password } => {
                let password = password_or_prompt(password)?;
                login(&session, &username, &password).await
            }
            Self::Logout => {
                session.logout().await;
                println!("Logged out");
                Ok(())
            }
            Self::Status => {
                status(&session);
                Ok(())
            }
            Self::Register {
                username,
                email,
                password,
            } => {
                let password = password_or_prompt(password)?;
                let request = RegisterRequest {
                    username,
                    email,
                    password,
                };
                let profile = session
                    .register(&request)
                    .await
                    .map_err(|e| anyhow::anyhow!(e.login_message()))?;
                println!("Registered {} <{}>", profile.username, profile.email);
                Ok(())
            }
            Self::Request { method, path, data } => request(&session, &method, path, data).await,
        }
    }
}

async fn login(session: &AuthSession, username: &str, password: &str) -> Result<()> {
    if session.login(username, password).await.is_err() {
        let message = session
            .state()
            .error
            .clone()
            .unwrap_or_else(|| "Login failed".to_string());
        bail!(message);
    }

    let name = session.state().username.clone().unwrap_or_default();
    info!("Session saved for {name}");
    println!("Logged in as {name}");
    Ok(())
}

fn status(session: &AuthSession) {
    let snapshot = session.session();
    if !snapshot.is_logged_in {
        println!("Not logged in");
        return;
    }

    println!(
        "Logged in as {}",
        snapshot.username.as_deref().unwrap_or("unknown user")
    );
    let expiry = parse_jwt(snapshot.access_token.as_deref()).and_then(|claims| claims.exp);
    if let Some(exp) = expiry {
        println!("Access token expires at unix time {exp}");
    }
}

async fn request(
    session: &AuthSession,
    method: &str,
    path: String,
    data: Option<String>,
) -> Result<()> {
    let method = method
        .to_uppercase()
        .parse()
        .with_context(|| format!("Invalid HTTP method: {method}"))?;

    let mut request = ApiRequest::new(method, path);
    if let Some(data) = data {
        let body: serde_json::Value =
            serde_json::from_str(&data).context("--data must be valid JSON")?;
        request = request.json(&body)?;
    }

    let response = session.send(&request).await;
    if !session.state().is_logged_in() {
        if let Some(error) = &session.state().error {
            eprintln!("{error}");
        }
    }

    let body = response?.text().await.context("Failed to read response body")?;
    println!("{body}");
    Ok(())
}

fn password_or_prompt(password: Option<String>) -> Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }

    eprint!("Password: ");
    std::io::stderr().flush()?;

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password")?;

    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("Password must not be empty");
    }
    Ok(password)
}
