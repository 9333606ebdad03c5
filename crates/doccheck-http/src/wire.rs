//! Authentication request/response bodies.

use serde::{Deserialize, Serialize};

use doccheck_core::{AccessToken, RefreshToken, SessionUser, TokenPair};

/// Request body for `/refresh`.
#[derive(Debug, Serialize)]
pub(crate) struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// Response from `/login`, `/register` and `/refresh`.
#[derive(Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    #[allow(dead_code)]
    pub token_type: Option<String>,
    pub user: SessionUser,
}

impl TokenResponse {
    pub fn tokens(&self) -> TokenPair {
        TokenPair::new(
            AccessToken::new(self.access_token.clone()),
            RefreshToken::new(self.refresh_token.clone()),
        )
    }
}

/// Error body: `{"detail": "..."}`. Validation failures carry a list instead
/// of a string, which is kept as compact JSON.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn into_message(self) -> Option<String> {
        match self.detail? {
            serde_json::Value::String(message) => Some(message),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn token_response_parses() {
        let response: TokenResponse = serde_json::from_value(json!({
            "access_token": "T1",
            "refresh_token": "R1",
            "token_type": "bearer",
            "user": {
                "id": 1,
                "first_name": "Alice",
                "last_name": "Liddell",
                "email": "alice@example.com",
                "role": "user"
            }
        }))
        .unwrap();

        let pair = response.tokens();
        assert_eq!(pair.access.unwrap().as_str(), "T1");
        assert_eq!(pair.refresh.unwrap().as_str(), "R1");
    }

    #[test]
    fn error_detail_variants() {
        let body: ErrorBody = serde_json::from_value(json!({"detail": "Invalid password"})).unwrap();
        assert_eq!(body.into_message().as_deref(), Some("Invalid password"));

        let body: ErrorBody = serde_json::from_value(json!({})).unwrap();
        assert_eq!(body.into_message(), None);

        let body: ErrorBody =
            serde_json::from_value(json!({"detail": [{"loc": ["body", "email"]}]})).unwrap();
        assert!(body.into_message().unwrap().contains("email"));
    }
}
