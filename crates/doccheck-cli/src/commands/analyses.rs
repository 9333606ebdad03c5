//! Analysis subcommands (admin).

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use doccheck_http::AuthClient;
use doccheck_http::api::AnalysisQuery;

use super::uploads::{FilterArgs, ListFormat, print_page};

#[derive(Subcommand, Debug)]
pub enum AnalysesCommand {
    /// List analyses across all users
    List(ListArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Only this user's analyses
    #[arg(long)]
    pub user_id: Option<i64>,

    #[command(flatten)]
    pub format: ListFormat,
}

pub async fn handle(client: &AuthClient, cmd: AnalysesCommand) -> Result<()> {
    match cmd {
        AnalysesCommand::List(args) => {
            let query = AnalysisQuery {
                uploads: args.filter.into(),
                user_id: args.user_id,
            };
            let page = client
                .all_analyses(&query)
                .await
                .context("Failed to list analyses")?;
            print_page(&page, args.format)
        }
    }
}
