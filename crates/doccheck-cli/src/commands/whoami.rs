//! Whoami command implementation.

use anyhow::{Context, Result};

use doccheck_http::AuthClient;

use crate::output;

pub async fn run(client: &AuthClient) -> Result<()> {
    if !client.is_authenticated() {
        anyhow::bail!("No active session. Run 'doccheck login' first.");
    }

    let user = match client.current_user() {
        Some(user) => user,
        None => client.profile().await.context("Failed to fetch profile")?,
    };

    output::user(&user);
    output::field("API", client.api_url().as_str());

    Ok(())
}
