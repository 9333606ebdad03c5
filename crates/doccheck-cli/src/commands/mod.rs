//! Subcommand implementations.

pub mod analyses;
pub mod login;
pub mod profile;
pub mod register;
pub mod uploads;
pub mod users;
mod whoami;

use anyhow::Result;

use crate::cli::{Cli, Commands};
use crate::output;
use crate::session::CliSession;

pub async fn handle(cli: Cli) -> Result<()> {
    let mut session = CliSession::open(&cli.service)?;
    let client = &session.client;

    let result = match cli.command {
        Commands::Login(args) => login::run(client, args).await,
        Commands::Register(args) => register::run(client, args).await,
        Commands::Logout => logout(client).await,
        Commands::Whoami => whoami::run(client).await,
        Commands::Profile(cmd) => profile::handle(client, cmd).await,
        Commands::Uploads(cmd) => uploads::handle(client, cmd).await,
        Commands::Analyses(cmd) => analyses::handle(client, cmd).await,
        Commands::Users(cmd) => users::handle(client, cmd).await,
    };

    let announced = session.report_session_end();

    if let Err(err) = &result
        && !announced
        && err
            .downcast_ref::<doccheck_core::Error>()
            .is_some_and(doccheck_core::Error::requires_login)
    {
        output::warning("Not logged in. Run 'doccheck login' first.");
    }

    result
}

async fn logout(client: &doccheck_http::AuthClient) -> Result<()> {
    if !client.is_authenticated() {
        output::note("No active session.");
        return Ok(());
    }

    client.logout().await;
    output::success("Logged out");
    Ok(())
}
