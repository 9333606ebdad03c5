//! Logical API endpoints.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, InvalidInputError};

/// Paths that never carry a bearer credential.
const PUBLIC_PATHS: [&str; 3] = ["/login", "/register", "/refresh"];

/// An API path plus query parameters, relative to the [`ApiUrl`](super::ApiUrl).
///
/// Endpoints are either **public** (`/login`, `/register`, `/refresh`) or
/// **protected** (everything else). The distinction is made on the path
/// alone; query parameters never change it.
///
/// # Example
///
/// ```
/// use doccheck_core::Endpoint;
///
/// let ep = Endpoint::new("/my-uploads").unwrap().query("page", 2);
/// assert!(!ep.is_public());
/// assert_eq!(ep.to_string(), "/my-uploads?page=2");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    path: Cow<'static, str>,
    query: Vec<(String, String)>,
}

impl Endpoint {
    pub const LOGIN: Endpoint = Endpoint::fixed("/login");
    pub const REGISTER: Endpoint = Endpoint::fixed("/register");
    pub const REFRESH: Endpoint = Endpoint::fixed("/refresh");
    pub const LOGOUT: Endpoint = Endpoint::fixed("/logout");
    pub const PROFILE: Endpoint = Endpoint::fixed("/profile");
    pub const USERS: Endpoint = Endpoint::fixed("/users");
    pub const UPLOAD: Endpoint = Endpoint::fixed("/upload");
    pub const MY_UPLOADS: Endpoint = Endpoint::fixed("/my-uploads");
    pub const ALL_ANALYSES: Endpoint = Endpoint::fixed("/all-analyses");

    const fn fixed(path: &'static str) -> Self {
        Self {
            path: Cow::Borrowed(path),
            query: Vec::new(),
        }
    }

    /// Create an endpoint from a path such as `/users/3/role`.
    pub fn new(path: impl Into<String>) -> Result<Self, Error> {
        let path = path.into();
        Self::validate(&path)?;
        Ok(Self {
            path: Cow::Owned(path),
            query: Vec::new(),
        })
    }

    /// Append a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Append a query parameter only when a value is present.
    pub fn query_opt<V: ToString>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    /// Whether this endpoint is one of the unauthenticated entry points.
    pub fn is_public(&self) -> bool {
        PUBLIC_PATHS.contains(&&*self.path)
    }

    fn validate(path: &str) -> Result<(), Error> {
        let reason = if !path.starts_with('/') {
            Some("must start with '/'")
        } else if path.contains(['?', '#']) {
            Some("query parameters must be added with Endpoint::query")
        } else if path.chars().any(char::is_whitespace) {
            Some("must not contain whitespace")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(InvalidInputError::Endpoint {
                value: path.to_string(),
                reason: reason.to_string(),
            }
            .into()),
            None => Ok(()),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)?;
        if !self.query.is_empty() {
            let query: String = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(&self.query)
                .finish();
            write!(f, "?{}", query)?;
        }
        Ok(())
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    /// Parses `"/path?k=v&..."`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path, query) = match s.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (s, None),
        };

        let mut endpoint = Endpoint::new(path)?;
        if let Some(query) = query {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                endpoint = endpoint.query(key, value);
            }
        }
        Ok(endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_endpoints() {
        assert!(Endpoint::LOGIN.is_public());
        assert!(Endpoint::REGISTER.is_public());
        assert!(Endpoint::REFRESH.is_public());
        assert!(!Endpoint::LOGOUT.is_public());
        assert!(!Endpoint::PROFILE.is_public());
    }

    #[test]
    fn query_does_not_make_endpoint_public() {
        let ep: Endpoint = "/login?next=/profile".parse().unwrap();
        assert!(ep.is_public());

        let ep = Endpoint::new("/login/extra").unwrap();
        assert!(!ep.is_public());
    }

    #[test]
    fn optional_query_pairs_are_skipped() {
        let ep = Endpoint::MY_UPLOADS
            .query_opt("page", Some(1))
            .query_opt::<u32>("limit", None)
            .query_opt("search", Some("thesis draft"));
        assert_eq!(ep.to_string(), "/my-uploads?page=1&search=thesis+draft");
    }

    #[test]
    fn parses_query_string() {
        let ep: Endpoint = "/users?skip=0&limit=100".parse().unwrap();
        assert_eq!(ep.path(), "/users");
        assert_eq!(
            ep.query_pairs(),
            &[
                ("skip".to_string(), "0".to_string()),
                ("limit".to_string(), "100".to_string())
            ]
        );
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!(Endpoint::new("profile").is_err());
        assert!(Endpoint::new("/users?skip=1").is_err());
        assert!(Endpoint::new("/my uploads").is_err());
    }
}
