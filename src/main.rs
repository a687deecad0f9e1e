//! `regflow` command-line interface.
//!
//! The pending credential cache lives in process memory, so `signup` runs
//! both phases in one invocation: it registers, then waits for the emailed
//! code.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::{Input, Password};
use regflow::auth::{codes, normalize_email};
use regflow::{AuthError, Config};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Wrong codes allowed before `signup` gives up.
const MAX_CODE_ATTEMPTS: u32 = 3;

#[derive(Debug, Parser)]
#[command(name = "regflow", version, about = "Email-verified account registration")]
struct Cli {
    /// Path to config.toml (default: ~/.regflow/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Register an email and verify it with the emailed code
    Signup {
        #[arg(long)]
        email: String,
    },
    /// Log in and print a session token
    Login {
        #[arg(long)]
        email: String,
    },
    /// List committed users
    Users,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let service = regflow::build_service(&config)?;

    match cli.command {
        Command::Signup { email } => signup(&service, &normalize_email(&email)),
        Command::Login { email } => login(&service, &normalize_email(&email)),
        Command::Users => list_users(&service),
    }
}

fn signup(service: &regflow::RegistrationService, email: &str) -> Result<()> {
    let password = Password::new()
        .with_prompt("Password")
        .with_confirmation("Confirm password", "Passwords do not match")
        .interact()?;

    let token = service.register(email, &password)?;
    println!(
        "A verification code was sent to {email}. It expires at {}.",
        token.expires_at.format("%H:%M UTC")
    );

    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let code: String = Input::new()
            .with_prompt("Verification code")
            .validate_with(|input: &String| {
                if codes::looks_like_code(input.trim()) {
                    Ok(())
                } else {
                    Err("expected 5 characters, A-Z and 0-9")
                }
            })
            .interact_text()?;

        match service.verify_email_token(email, code.trim()) {
            Ok(auth) => {
                println!("Account created (user id {}).", auth.user.id);
                println!("Session token: {}", auth.session_token);
                return Ok(());
            }
            Err(AuthError::InvalidToken) if attempt < MAX_CODE_ATTEMPTS => {
                println!("That code is not valid, try again.");
            }
            Err(e) => return Err(e.into()),
        }
    }
    bail!("Too many invalid codes; run signup again")
}

fn login(service: &regflow::RegistrationService, email: &str) -> Result<()> {
    let password = Password::new().with_prompt("Password").interact()?;
    let auth = service.login(email, &password)?;
    println!("Session token: {}", auth.session_token);
    Ok(())
}

fn list_users(service: &regflow::RegistrationService) -> Result<()> {
    let users = service.list_users()?;
    if users.is_empty() {
        println!("No users.");
        return Ok(());
    }
    for user in users {
        println!(
            "{:>6}  {:<40}  {}",
            user.id,
            user.email,
            user.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}
