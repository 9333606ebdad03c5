//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::commands::{analyses, login, profile, register, uploads, users};

/// Default API base URL (a locally running service).
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/api";

/// Command-line client for the doccheck document-checking service.
#[derive(Parser, Debug)]
#[command(name = "doccheck")]
#[command(author, version = env!("DOCCHECK_VERSION"), about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(flatten)]
    pub service: ServiceArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where the service lives and where the session is kept.
#[derive(Args, Debug, Clone)]
pub struct ServiceArgs {
    /// API base URL
    #[arg(long, env = "DOCCHECK_API_URL", default_value = DEFAULT_API_URL, global = true)]
    pub api_url: String,

    /// Session file (defaults to the platform data directory)
    #[arg(long, env = "DOCCHECK_SESSION_FILE", global = true)]
    pub session_file: Option<PathBuf>,

    /// Request timeout in seconds (0 disables it)
    #[arg(long, env = "DOCCHECK_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in with email and password
    Login(login::LoginArgs),

    /// Create an account and log in
    Register(register::RegisterArgs),

    /// End the session
    Logout,

    /// Display the cached session user
    Whoami,

    /// Profile of the signed-in user
    #[command(subcommand)]
    Profile(profile::ProfileCommand),

    /// Uploaded documents
    #[command(subcommand)]
    Uploads(uploads::UploadsCommand),

    /// Analyses across all users (admin)
    #[command(subcommand)]
    Analyses(analyses::AnalysesCommand),

    /// Account administration (admin)
    #[command(subcommand)]
    Users(users::UsersCommand),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::try_parse_from([
            "doccheck",
            "uploads",
            "list",
            "--api-url",
            "http://localhost:9000/api",
            "-vv",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.service.api_url, "http://localhost:9000/api");
        assert!(matches!(cli.command, Commands::Uploads(_)));
    }
}
