//! Typed resource operations.
//!
//! Thin wrappers over [`AuthClient::call`]: each builds an [`Endpoint`],
//! sends it through the authenticated pipeline and decodes the body.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use doccheck_core::error::InvalidInputError;
use doccheck_core::{Endpoint, Result, Role, SessionUser};

use crate::client::AuthClient;
use crate::events::SessionEnded;
use crate::request::{FilePart, RequestOptions};
use crate::transport::Transport;

/// Default page size for the user listing.
pub const DEFAULT_USER_LIMIT: u32 = 100;

// ============================================================================
// Types
// ============================================================================

/// Partial profile update; unset fields are left unchanged.
#[derive(Default, Clone, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ProfileUpdate {
    /// Whether no field is set.
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.password.is_none()
    }
}

// Custom Debug impl that hides the password
impl fmt::Debug for ProfileUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileUpdate")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// An uploaded document and its analysis score.
///
/// Fields the client does not model are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upload {
    pub id: i64,
    pub filename: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One page of a listing.
///
/// The service answers either with a bare array or with an object carrying
/// the items next to a total count.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: Option<u64>,
}

impl<T> Page<T> {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Page<T> {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape<T> {
            Bare(Vec<T>),
            Wrapped {
                #[serde(alias = "uploads", alias = "analyses", alias = "users")]
                items: Vec<T>,
                #[serde(default)]
                total: Option<u64>,
            },
        }

        Ok(match Shape::<T>::deserialize(deserializer)? {
            Shape::Bare(items) => Page { items, total: None },
            Shape::Wrapped { items, total } => Page { items, total },
        })
    }
}

/// Listing sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        })
    }
}

impl FromStr for SortOrder {
    type Err = InvalidInputError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(InvalidInputError::Other {
                message: format!("unknown sort order '{}', expected 'asc' or 'desc'", other),
            }),
        }
    }
}

/// Filters for [`AuthClient::my_uploads`].
#[derive(Debug, Clone, Default)]
pub struct UploadQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub min_score: Option<f64>,
    pub max_score: Option<f64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
}

impl UploadQuery {
    fn apply(&self, endpoint: Endpoint) -> Endpoint {
        endpoint
            .query_opt("page", self.page)
            .query_opt("limit", self.limit)
            .query_opt("search", self.search.as_deref())
            .query_opt("min_score", self.min_score)
            .query_opt("max_score", self.max_score)
            .query_opt("sort_by", self.sort_by.as_deref())
            .query_opt("sort_order", self.sort_order)
    }
}

/// Filters for [`AuthClient::all_analyses`].
#[derive(Debug, Clone, Default)]
pub struct AnalysisQuery {
    pub uploads: UploadQuery,
    pub user_id: Option<i64>,
}

impl AnalysisQuery {
    fn apply(&self, endpoint: Endpoint) -> Endpoint {
        self.uploads
            .apply(endpoint)
            .query_opt("user_id", self.user_id)
    }
}

/// A time-limited link to the stored document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DownloadUrl {
    pub download_url: String,
    pub filename: String,
}

/// Acknowledgement carrying a human-readable message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub message: Option<String>,
}

/// Response to a document upload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadReceipt {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Serialize)]
struct RoleUpdate<'a> {
    role: &'a Role,
}

// ============================================================================
// Operations
// ============================================================================

impl AuthClient {
    async fn fetch<R: DeserializeOwned>(
        &self,
        endpoint: &Endpoint,
        options: RequestOptions,
    ) -> Result<R> {
        let response = self.call(endpoint, options).await?;
        Transport::decode(response).await
    }

    /// Fetch the signed-in user's profile and cache it as the snapshot.
    #[instrument(skip(self))]
    pub async fn profile(&self) -> Result<SessionUser> {
        debug!("Fetching profile");
        let user: SessionUser = self
            .fetch(&Endpoint::PROFILE, RequestOptions::get())
            .await?;
        self.save_user(&user);
        Ok(user)
    }

    /// Update the signed-in user's profile and cache the result.
    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<SessionUser> {
        if update.is_empty() {
            return Err(InvalidInputError::Other {
                message: "profile update sets no fields".to_string(),
            }
            .into());
        }

        debug!("Updating profile");
        let options = RequestOptions::put().json(update)?;
        let user: SessionUser = self.fetch(&Endpoint::PROFILE, options).await?;
        self.save_user(&user);
        Ok(user)
    }

    /// Delete the signed-in account and end the session.
    #[instrument(skip(self))]
    pub async fn delete_profile(&self) -> Result<Message> {
        info!("Deleting account");
        let message = self
            .fetch(&Endpoint::PROFILE, RequestOptions::delete())
            .await?;
        self.end_session(SessionEnded::ProfileDeleted);
        Ok(message)
    }

    /// List accounts (admin only).
    #[instrument(skip(self))]
    pub async fn list_users(&self, skip: u32, limit: u32) -> Result<Page<SessionUser>> {
        let endpoint = Endpoint::USERS.query("skip", skip).query("limit", limit);
        self.fetch(&endpoint, RequestOptions::get()).await
    }

    /// Change an account's role (admin only).
    #[instrument(skip(self, role), fields(%role))]
    pub async fn update_user_role(&self, user_id: i64, role: &Role) -> Result<serde_json::Value> {
        let endpoint = Endpoint::new(format!("/users/{}/role", user_id))?;
        let options = RequestOptions::put().json(&RoleUpdate { role })?;
        self.fetch(&endpoint, options).await
    }

    /// Delete an account (admin only).
    #[instrument(skip(self))]
    pub async fn delete_user(&self, user_id: i64) -> Result<Message> {
        let endpoint = Endpoint::new(format!("/users/{}", user_id))?;
        self.fetch(&endpoint, RequestOptions::delete()).await
    }

    /// List the signed-in user's uploads.
    #[instrument(skip(self))]
    pub async fn my_uploads(&self, query: &UploadQuery) -> Result<Page<Upload>> {
        let endpoint = query.apply(Endpoint::MY_UPLOADS);
        self.fetch(&endpoint, RequestOptions::get()).await
    }

    /// List every user's analyses (admin only).
    #[instrument(skip(self))]
    pub async fn all_analyses(&self, query: &AnalysisQuery) -> Result<Page<Upload>> {
        let endpoint = query.apply(Endpoint::ALL_ANALYSES);
        self.fetch(&endpoint, RequestOptions::get()).await
    }

    /// Upload a document for analysis.
    #[instrument(skip(self, file), fields(file_name = %file.file_name(), len = file.len()))]
    pub async fn upload_document(&self, file: FilePart) -> Result<UploadReceipt> {
        if file.is_empty() {
            return Err(InvalidInputError::Other {
                message: format!("'{}' is empty", file.file_name()),
            }
            .into());
        }

        info!("Uploading document");
        self.fetch(&Endpoint::UPLOAD, RequestOptions::post().file(file))
            .await
    }

    /// Full analysis details for one upload.
    #[instrument(skip(self))]
    pub async fn upload_details(&self, upload_id: i64) -> Result<serde_json::Value> {
        let endpoint = Endpoint::new(format!("/upload/{}/details", upload_id))?;
        self.fetch(&endpoint, RequestOptions::get()).await
    }

    /// A download link for one upload.
    #[instrument(skip(self))]
    pub async fn download_url(&self, upload_id: i64) -> Result<DownloadUrl> {
        let endpoint = Endpoint::new(format!("/upload/{}/download-url", upload_id))?;
        self.fetch(&endpoint, RequestOptions::get()).await
    }

    /// Delete one upload.
    #[instrument(skip(self))]
    pub async fn delete_upload(&self, upload_id: i64) -> Result<Message> {
        let endpoint = Endpoint::new(format!("/upload/{}", upload_id))?;
        self.fetch(&endpoint, RequestOptions::delete()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn page_accepts_bare_array() {
        let page: Page<Upload> = serde_json::from_value(json!([
            {"id": 1, "filename": "a.pdf", "score": 87.5, "created_at": "2024-03-01T10:00:00"}
        ]))
        .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].score, Some(87.5));
        assert_eq!(page.total, None);
    }

    #[test]
    fn page_accepts_wrapped_object() {
        let page: Page<Upload> = serde_json::from_value(json!({
            "uploads": [{"id": 2, "filename": "b.docx", "score": 40, "pages": 3}],
            "total": 11
        }))
        .unwrap();
        assert_eq!(page.total, Some(11));
        assert_eq!(page.items[0].extra.get("pages"), Some(&json!(3)));
    }

    #[test]
    fn upload_query_omits_unset_fields() {
        let query = UploadQuery {
            page: Some(2),
            search: Some("thesis".into()),
            sort_order: Some(SortOrder::Desc),
            ..Default::default()
        };
        let endpoint = query.apply(Endpoint::MY_UPLOADS);
        assert_eq!(
            endpoint.to_string(),
            "/my-uploads?page=2&search=thesis&sort_order=desc"
        );
    }

    #[test]
    fn analysis_query_adds_user_filter() {
        let query = AnalysisQuery {
            user_id: Some(7),
            ..Default::default()
        };
        assert_eq!(
            query.apply(Endpoint::ALL_ANALYSES).to_string(),
            "/all-analyses?user_id=7"
        );
    }

    #[test]
    fn sort_order_parses_case_insensitively() {
        assert_eq!("ASC".parse::<SortOrder>().unwrap(), SortOrder::Asc);
        assert!("sideways".parse::<SortOrder>().is_err());
    }

    #[test]
    fn profile_update_skips_unset_and_redacts_password() {
        let update = ProfileUpdate {
            first_name: Some("Alicia".into()),
            password: Some("hunter22".into()),
            ..Default::default()
        };
        let body = serde_json::to_value(&update).unwrap();
        assert_eq!(body, json!({"first_name": "Alicia", "password": "hunter22"}));
        assert!(!format!("{:?}", update).contains("hunter22"));
        assert!(ProfileUpdate::default().is_empty());
    }
}
