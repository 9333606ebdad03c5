use std::path::{Path, PathBuf};
use std::process::Output;

use serde_json::{Value, json};
use tokio::process::Command;
use wiremock::MockServer;

/// Isolated session file and mock service for one test.
pub struct TestEnv {
    pub server: MockServer,
    _dir: tempfile::TempDir,
    pub session_file: PathBuf,
}

impl TestEnv {
    pub async fn new() -> Self {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let session_file = dir.path().join("session.json");
        Self {
            server,
            _dir: dir,
            session_file,
        }
    }

    pub fn api_url(&self) -> String {
        format!("http://127.0.0.1:{}/api", self.server.address().port())
    }

    /// Write a session file as a previous login would have left it.
    pub fn seed_session(&self, access: &str, refresh: &str) {
        let contents = json!({
            "access_token": access,
            "refresh_token": refresh,
            "user": user_json().to_string(),
        });
        std::fs::write(&self.session_file, contents.to_string()).unwrap();
    }

    pub fn session(&self) -> Value {
        read_json(&self.session_file)
    }

    /// Run the CLI binary against this environment.
    pub async fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_doccheck"))
            .args(args)
            .env("DOCCHECK_API_URL", self.api_url())
            .env("DOCCHECK_SESSION_FILE", &self.session_file)
            .env("NO_COLOR", "1")
            .env_remove("DOCCHECK_PASSWORD")
            .env_remove("RUST_LOG")
            .output()
            .await
            .expect("Failed to execute CLI")
    }

    /// Run the CLI and expect success, returning stdout.
    pub async fn run_success(&self, args: &[&str]) -> String {
        let output = self.run(args).await;
        if !output.status.success() {
            panic!(
                "CLI command failed: {:?}\nstderr: {}",
                args,
                String::from_utf8_lossy(&output.stderr)
            );
        }
        String::from_utf8_lossy(&output.stdout).to_string()
    }
}

fn read_json(path: &Path) -> Value {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap(),
        Err(_) => json!({}),
    }
}

pub fn user_json() -> Value {
    json!({
        "id": 1,
        "first_name": "Alice",
        "last_name": "Liddell",
        "email": "alice@example.com",
        "role": "user"
    })
}

pub fn session_json(access: &str, refresh: &str) -> Value {
    json!({
        "access_token": access,
        "refresh_token": refresh,
        "token_type": "bearer",
        "user": user_json()
    })
}
