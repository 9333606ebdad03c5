//! Profile subcommands.

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};

use doccheck_http::AuthClient;
use doccheck_http::api::ProfileUpdate;

use crate::output;

#[derive(Subcommand, Debug)]
pub enum ProfileCommand {
    /// Fetch the profile from the service
    Show {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Change profile fields
    Update(UpdateArgs),

    /// Delete the account and end the session
    Delete {
        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
    },
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    #[arg(long)]
    pub first_name: Option<String>,

    #[arg(long)]
    pub last_name: Option<String>,

    #[arg(long)]
    pub email: Option<String>,

    /// New password
    #[arg(long)]
    pub password: Option<String>,
}

impl From<UpdateArgs> for ProfileUpdate {
    fn from(args: UpdateArgs) -> Self {
        ProfileUpdate {
            first_name: args.first_name,
            last_name: args.last_name,
            email: args.email,
            password: args.password,
        }
    }
}

pub async fn handle(client: &AuthClient, cmd: ProfileCommand) -> Result<()> {
    match cmd {
        ProfileCommand::Show { json } => {
            let user = client.profile().await.context("Failed to fetch profile")?;
            if json {
                output::json(&user, true)?;
            } else {
                output::user(&user);
            }
        }
        ProfileCommand::Update(args) => {
            let update = ProfileUpdate::from(args);
            if update.is_empty() {
                bail!("Nothing to update. Pass at least one of --first-name, --last-name, --email, --password.");
            }

            let user = client
                .update_profile(&update)
                .await
                .context("Failed to update profile")?;
            output::success("Profile updated");
            output::user(&user);
        }
        ProfileCommand::Delete { force } => {
            if !force && !output::confirm("This will permanently delete your account. Continue?")? {
                eprintln!("Aborted.");
                return Ok(());
            }

            let message = client
                .delete_profile()
                .await
                .context("Failed to delete account")?;
            output::success(message.message.as_deref().unwrap_or("Account deleted"));
        }
    }

    Ok(())
}
