//! Addressing types for the document-checking API.
//!
//! These types validate at construction time so the client never builds a
//! request against a malformed base URL or path.

mod api_url;
mod endpoint;

pub use api_url::ApiUrl;
pub use endpoint::Endpoint;
