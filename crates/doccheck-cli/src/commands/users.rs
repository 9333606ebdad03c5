//! User administration subcommands (admin).

use anyhow::{Context, Result};
use clap::Subcommand;

use doccheck_core::Role;
use doccheck_http::AuthClient;
use doccheck_http::api::DEFAULT_USER_LIMIT;

use crate::output;

#[derive(Subcommand, Debug)]
pub enum UsersCommand {
    /// List accounts
    List {
        #[arg(long, default_value_t = 0)]
        skip: u32,

        #[arg(long, default_value_t = DEFAULT_USER_LIMIT)]
        limit: u32,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Change an account's role
    SetRole {
        id: i64,

        /// New role (user or admin)
        role: Role,
    },

    /// Delete an account
    Delete {
        id: i64,

        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
    },
}

pub async fn handle(client: &AuthClient, cmd: UsersCommand) -> Result<()> {
    match cmd {
        UsersCommand::List {
            skip,
            limit,
            pretty,
        } => {
            let users = client
                .list_users(skip, limit)
                .await
                .context("Failed to list users")?;

            if users.is_empty() {
                output::note("No users found.");
            }
            for user in &users.items {
                output::json(user, pretty)?;
            }
        }
        UsersCommand::SetRole { id, role } => {
            client
                .update_user_role(id, &role)
                .await
                .with_context(|| format!("Failed to change role of user {}", id))?;
            output::success(&format!("User {} is now {}", id, role));
        }
        UsersCommand::Delete { id, force } => {
            if !force && !output::confirm(&format!("Delete user {}?", id))? {
                eprintln!("Aborted.");
                return Ok(());
            }

            client
                .delete_user(id)
                .await
                .with_context(|| format!("Failed to delete user {}", id))?;
            output::success(&format!("User {} deleted", id));
        }
    }

    Ok(())
}
