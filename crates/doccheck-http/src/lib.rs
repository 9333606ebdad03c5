//! doccheck-http - Authenticated client for the document-checking service.
//!
//! All remote reads and writes flow through an [`AuthClient`], which owns
//! the credential pair, attaches it to protected calls, and renews it at
//! most once per expiry no matter how many concurrent calls observe the
//! expired token.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use doccheck_core::{ApiUrl, Credentials, Endpoint, MemoryStore};
//! use doccheck_http::{AuthClient, ClientConfig, RequestOptions};
//!
//! # async fn example() -> Result<(), doccheck_core::Error> {
//! let api = ApiUrl::new("http://127.0.0.1:8000/api")?;
//! let client = AuthClient::new(ClientConfig::new(api), Arc::new(MemoryStore::new()))?;
//!
//! let user = client.login(&Credentials::new("alice@example.com", "Secret1")).await?;
//! println!("Logged in as {}", user.display_name());
//!
//! let response = client.call(&Endpoint::PROFILE, RequestOptions::get()).await?;
//! println!("{}", response.text().await?);
//! # Ok(())
//! # }
//! ```

pub mod api;
mod client;
mod config;
mod events;
mod refresh;
mod request;
mod transport;
mod wire;

pub use client::AuthClient;
pub use config::{ClientConfig, DEFAULT_TIMEOUT};
pub use events::SessionEnded;
pub use request::{FilePart, RequestBody, RequestOptions};
