//! Register command implementation.

use anyhow::{Context, Result, bail};
use clap::Args;

use doccheck_core::Registration;
use doccheck_http::AuthClient;

use crate::output;

#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// First name
    #[arg(long)]
    pub first_name: String,

    /// Last name
    #[arg(long)]
    pub last_name: String,

    /// Account email
    #[arg(long)]
    pub email: String,

    /// Account password
    #[arg(long, env = "DOCCHECK_PASSWORD", hide_env_values = true)]
    pub password: String,
}

pub async fn run(client: &AuthClient, args: RegisterArgs) -> Result<()> {
    if args.first_name.trim().is_empty() || args.last_name.trim().is_empty() {
        bail!("First and last name must not be empty");
    }

    let registration = Registration::new(
        args.first_name,
        args.last_name,
        args.email,
        args.password,
    );

    output::note("Creating account...");

    let user = client
        .register(&registration)
        .await
        .context("Failed to register")?;

    output::success("Account created");
    println!();
    output::user(&user);

    Ok(())
}
