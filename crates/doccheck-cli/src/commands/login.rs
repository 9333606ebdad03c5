//! Login command implementation.

use anyhow::{Context, Result};
use clap::Args;

use doccheck_core::Credentials;
use doccheck_http::AuthClient;

use crate::output;

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Account email
    #[arg(long)]
    pub email: String,

    /// Account password
    #[arg(long, env = "DOCCHECK_PASSWORD", hide_env_values = true)]
    pub password: String,
}

pub async fn run(client: &AuthClient, args: LoginArgs) -> Result<()> {
    let credentials = Credentials::new(&args.email, &args.password);

    output::note("Logging in...");

    let user = client
        .login(&credentials)
        .await
        .context("Failed to login")?;

    output::success("Logged in successfully");
    println!();
    output::user(&user);
    output::field("API", client.api_url().as_str());

    Ok(())
}
