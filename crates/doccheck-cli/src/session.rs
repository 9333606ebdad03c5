//! Session wiring: the persisted credential file and the client built on it.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::debug;

use doccheck_core::ApiUrl;
use doccheck_file::FileStore;
use doccheck_http::{AuthClient, ClientConfig, SessionEnded};

use crate::cli::ServiceArgs;
use crate::output;

/// Default session file path under the platform data directory.
fn default_session_path() -> Result<PathBuf> {
    let dirs =
        ProjectDirs::from("", "", "doccheck").context("Could not determine data directory")?;

    Ok(dirs.data_dir().join("session.json"))
}

/// A client bound to the persisted session, plus a listener for its end.
pub struct CliSession {
    pub client: AuthClient,
    ended: broadcast::Receiver<SessionEnded>,
}

impl CliSession {
    /// Build the client for this invocation.
    pub fn open(args: &ServiceArgs) -> Result<Self> {
        let path = match &args.session_file {
            Some(path) => path.clone(),
            None => default_session_path()?,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).context("Failed to create data directory")?;
        }
        debug!(path = %path.display(), "Using session file");

        let api = ApiUrl::new(&args.api_url).context("Invalid API URL")?;
        let mut config = ClientConfig::new(api)
            .with_user_agent(format!("doccheck-cli/{}", env!("DOCCHECK_VERSION")));
        match args.timeout {
            Some(0) => config = config.without_timeout(),
            Some(secs) => config = config.with_timeout(Duration::from_secs(secs)),
            None => {}
        }

        let client = AuthClient::new(config, Arc::new(FileStore::new(&path)))
            .context("Failed to open session")?;
        let ended = client.subscribe_session_ended();

        Ok(Self { client, ended })
    }

    /// Report any session end the command did not announce itself.
    /// Returns whether a re-login hint was printed.
    pub fn report_session_end(&mut self) -> bool {
        let mut announced = false;
        loop {
            match self.ended.try_recv() {
                Ok(SessionEnded::RefreshRejected) => {
                    output::warning("Session expired. Run 'doccheck login' to start a new one.");
                    announced = true;
                }
                Ok(reason) => debug!(%reason, "Session ended"),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty | TryRecvError::Closed) => return announced,
            }
        }
    }
}
