//! doccheck-core - Core types and traits for the doccheck client.
//!
//! Everything shared between the HTTP client, the credential stores and the
//! command-line front-end lives here: the error taxonomy, opaque token
//! types, endpoint addressing and the [`CredentialStore`] seam.

pub mod credentials;
pub mod error;
pub mod memory;
pub mod tokens;
pub mod traits;
pub mod types;
pub mod user;

pub use credentials::{Credentials, Registration};
pub use error::Error;
pub use memory::MemoryStore;
pub use tokens::{AccessToken, RefreshToken, TokenPair};
pub use traits::{CredentialStore, StoreKey};
pub use types::{ApiUrl, Endpoint};
pub use user::{Role, SessionUser};

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;
