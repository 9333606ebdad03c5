//! The authenticated request client.

use std::sync::Arc;

use reqwest::{Response, StatusCode};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use doccheck_core::error::Error;
use doccheck_core::traits::{CredentialStore, StoreKey};
use doccheck_core::{
    AccessToken, ApiUrl, Credentials, Endpoint, RefreshToken, Registration, Result, SessionUser,
    TokenPair,
};

use crate::config::ClientConfig;
use crate::events::SessionEnded;
use crate::refresh::{self, Admission, Coordinator, RefreshFailure, RefreshLease, Shared};
use crate::request::RequestOptions;
use crate::transport::Transport;
use crate::wire::{RefreshRequest, TokenResponse};

const SESSION_EVENT_CAPACITY: usize = 16;

/// Client for the document-checking API.
///
/// Owns the credential pair and performs every remote call. Protected calls
/// carry the access token; when one comes back `401`, the client renews the
/// pair once, shared by every concurrently failing call, and replays each of
/// them with the new token.
///
/// # Thread Safety
///
/// Cheap to clone (internal `Arc`) and safe to share across tasks.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use doccheck_core::{ApiUrl, MemoryStore};
/// use doccheck_http::{AuthClient, ClientConfig, SessionEnded};
///
/// # async fn example() -> Result<(), doccheck_core::Error> {
/// let api = ApiUrl::new("https://checker.example.org/api")?;
/// let client = AuthClient::new(ClientConfig::new(api), Arc::new(MemoryStore::new()))?;
///
/// let mut ended = client.subscribe_session_ended();
/// tokio::spawn(async move {
///     while let Ok(reason) = ended.recv().await {
///         eprintln!("{reason}: redirecting to login");
///     }
/// });
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AuthClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Transport,
    store: Arc<dyn CredentialStore>,
    state: Coordinator,
    session_ended: broadcast::Sender<SessionEnded>,
}

impl AuthClient {
    /// Create a client, restoring any credentials left in `store`.
    pub fn new(config: ClientConfig, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let transport = Transport::new(&config)?;
        let tokens = match load_tokens(store.as_ref()) {
            Ok(tokens) => tokens,
            Err(Error::Store(err)) => {
                warn!(error = %err, "Could not read credential store; starting signed out");
                TokenPair::default()
            }
            Err(err) => return Err(err),
        };
        if !tokens.is_empty() {
            debug!("Restored credentials from store");
        }

        let (session_ended, _) = broadcast::channel(SESSION_EVENT_CAPACITY);

        Ok(Self {
            inner: Arc::new(ClientInner {
                transport,
                store,
                state: Coordinator::new(tokens),
                session_ended,
            }),
        })
    }

    /// Perform a call, renewing credentials on an authorization failure.
    ///
    /// Returns the raw response on any 2xx status.
    ///
    /// # Errors
    ///
    /// - [`Error::Unauthenticated`] for a protected endpoint with no credentials.
    /// - [`Error::SessionExpired`] when the refresh token is rejected.
    /// - [`Error::Server`] for any other non-success status, including a
    ///   second 401 after the one permitted retry.
    /// - [`Error::Network`] when no response was received.
    #[instrument(skip(self, options), fields(method = %options.method, %endpoint))]
    pub async fn call(&self, endpoint: &Endpoint, options: RequestOptions) -> Result<Response> {
        self.resync();

        if endpoint.is_public() {
            let response = self.inner.transport.send(endpoint, &options, None).await?;
            return Transport::ensure_success(response).await;
        }

        let token = {
            let shared = self.inner.state.lock();
            if shared.tokens.is_empty() {
                return Err(Error::Unauthenticated);
            }
            shared.tokens.access.clone()
        };

        let response = self
            .inner
            .transport
            .send(endpoint, &options, token.as_ref())
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Transport::ensure_success(response).await;
        }

        debug!("Access token refused");
        let fresh = self.renew(token.as_ref()).await?;

        let response = self
            .inner
            .transport
            .send(endpoint, &options, Some(&fresh))
            .await?;
        Transport::ensure_success(response).await
    }

    /// Obtain a usable access token after a 401 on a request sent with `sent_with`.
    async fn renew(&self, sent_with: Option<&AccessToken>) -> Result<AccessToken> {
        match self.inner.state.admit(sent_with) {
            Admission::Rotated(token) => Ok(token),
            Admission::Ended => Err(Error::SessionExpired),
            Admission::Wait { ticket, rx } => Ok(refresh::wait(ticket, rx).await?),
            Admission::Lead(lease) => self.lead_refresh(lease).await,
        }
    }

    /// Run the refresh this task was elected for and settle the queue.
    async fn lead_refresh(&self, lease: RefreshLease<'_>) -> Result<AccessToken> {
        let refresh_token = lease.with_shared(|shared| shared.tokens.refresh.clone());
        debug!(leader = lease.ticket(), "Refreshing session");

        let outcome = match refresh_token {
            Some(refresh_token) => self.exchange(&refresh_token).await,
            None => {
                debug!("No refresh token held");
                Err(RefreshFailure::Rejected)
            }
        };

        let (settled, _) = match outcome {
            Ok(session) => lease.settle(|shared| {
                let access = AccessToken::new(session.access_token.clone());
                self.store_session(shared, session.tokens(), &session.user);
                Ok(access)
            }),
            Err(RefreshFailure::Rejected) => lease.settle(|shared| {
                self.clear_session(shared);
                Err(RefreshFailure::Rejected)
            }),
            Err(failure) => lease.settle(|_| Err(failure)),
        };

        match settled {
            Ok(access) => {
                info!("Session refreshed");
                Ok(access)
            }
            Err(RefreshFailure::Rejected) => {
                // Only the cycle that cleared the credentials announces it.
                warn!("Refresh token rejected; session ended");
                self.notify(SessionEnded::RefreshRejected);
                Err(Error::SessionExpired)
            }
            Err(failure) => Err(failure.into()),
        }
    }

    /// Exchange the refresh token for a new pair.
    async fn exchange(
        &self,
        refresh_token: &RefreshToken,
    ) -> std::result::Result<TokenResponse, RefreshFailure> {
        let body = RefreshRequest {
            refresh_token: refresh_token.as_str(),
        };
        let options = RequestOptions::post()
            .json(&body)
            .map_err(|_| RefreshFailure::Rejected)?;

        let response = match self
            .inner
            .transport
            .send(&Endpoint::REFRESH, &options, None)
            .await
        {
            Ok(response) => response,
            Err(Error::Network(err)) => {
                warn!(error = %err, "Refresh request failed in transit");
                return Err(RefreshFailure::Transport(err));
            }
            Err(err) => {
                warn!(error = %err, "Refresh request could not be built");
                return Err(RefreshFailure::Rejected);
            }
        };

        if !response.status().is_success() {
            let err = Transport::server_error(response).await;
            debug!(status = err.status, "Refresh rejected by server");
            return Err(RefreshFailure::Rejected);
        }

        match Transport::decode::<TokenResponse>(response).await {
            Ok(session) => Ok(session),
            Err(Error::Network(err)) => Err(RefreshFailure::Transport(err)),
            Err(_) => Err(RefreshFailure::Rejected),
        }
    }

    /// Authenticate with email and password; the account becomes the active session.
    #[instrument(skip(self, credentials), fields(email = %credentials.email()))]
    pub async fn login(&self, credentials: &Credentials) -> Result<SessionUser> {
        info!("Logging in");
        let options = RequestOptions::post().json(credentials)?;
        self.open_session(&Endpoint::LOGIN, options).await
    }

    /// Create an account and open a session for it.
    #[instrument(skip(self, registration), fields(email = %registration.email))]
    pub async fn register(&self, registration: &Registration) -> Result<SessionUser> {
        info!("Registering account");
        let options = RequestOptions::post().json(registration)?;
        self.open_session(&Endpoint::REGISTER, options).await
    }

    async fn open_session(
        &self,
        endpoint: &Endpoint,
        options: RequestOptions,
    ) -> Result<SessionUser> {
        let response = self.call(endpoint, options).await?;
        let session: TokenResponse = Transport::decode(response).await?;

        let tokens = session.tokens();
        {
            let mut shared = self.inner.state.lock();
            shared.bump_generation();
            self.store_session(&mut shared, tokens, &session.user);
        }

        debug!(user_id = session.user.id, "Session opened");
        Ok(session.user)
    }

    /// End the session.
    ///
    /// The service is told on a best-effort basis; local credentials are
    /// cleared whether or not that succeeds. Never fails, and calling it
    /// while logged out changes nothing.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        self.resync();

        let token = self.inner.state.lock().tokens.access.clone();
        if let Some(token) = token {
            match self
                .inner
                .transport
                .send(&Endpoint::LOGOUT, &RequestOptions::post(), Some(&token))
                .await
            {
                Ok(response) if response.status().is_success() => debug!("Server acknowledged logout"),
                Ok(response) => debug!(status = %response.status(), "Server refused logout; ignoring"),
                Err(err) => debug!(error = %err, "Logout request failed; ignoring"),
            }
        }

        self.end_session(SessionEnded::Logout);
    }

    /// Whether an access token is held.
    pub fn is_authenticated(&self) -> bool {
        self.resync();
        self.inner.state.lock().tokens.access.is_some()
    }

    /// The cached profile snapshot, if one is stored and readable.
    pub fn current_user(&self) -> Option<SessionUser> {
        let raw = match self.inner.store.get(StoreKey::User) {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(error = %err, "Could not read user snapshot");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(err) => {
                warn!(error = %err, "Ignoring unreadable user snapshot");
                None
            }
        }
    }

    /// Listen for the end of the session (logout, rejected refresh, deleted account).
    pub fn subscribe_session_ended(&self) -> broadcast::Receiver<SessionEnded> {
        self.inner.session_ended.subscribe()
    }

    /// Whether a token refresh is currently outstanding.
    pub fn is_refreshing(&self) -> bool {
        self.inner.state.lock().is_refreshing()
    }

    /// Export the current credential pair.
    ///
    /// # Security
    ///
    /// Handle the returned tokens securely. They grant access to the account.
    pub fn export_tokens(&self) -> TokenPair {
        self.inner.state.lock().tokens.clone()
    }

    /// Returns the configured API base URL.
    pub fn api_url(&self) -> &ApiUrl {
        self.inner.transport.api()
    }

    // ========================================================================
    // Session bookkeeping
    // ========================================================================

    /// Reload the pair from the store when memory is empty but the store is not.
    fn resync(&self) {
        let mut shared = self.inner.state.lock();
        if !shared.tokens.is_empty() || shared.is_refreshing() {
            return;
        }

        match load_tokens(self.inner.store.as_ref()) {
            Ok(tokens) if !tokens.is_empty() => {
                debug!("Resynchronized credentials from store");
                shared.tokens = tokens;
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "Could not read credential store"),
        }
    }

    /// Replace the pair and user snapshot, in memory and in the store.
    fn store_session(&self, shared: &mut Shared, tokens: TokenPair, user: &SessionUser) {
        let mut entries = Vec::with_capacity(3);
        if let (Some(access), Some(refresh)) = (&tokens.access, &tokens.refresh) {
            entries.push((StoreKey::AccessToken, access.as_str().to_string()));
            entries.push((StoreKey::RefreshToken, refresh.as_str().to_string()));
        }
        match serde_json::to_string(user) {
            Ok(json) => entries.push((StoreKey::User, json)),
            Err(err) => warn!(error = %err, "Could not serialize user snapshot"),
        }

        if let Err(err) = self.inner.store.put(&entries) {
            warn!(error = %err, "Could not persist credentials; keeping them in memory");
        }
        shared.tokens = tokens;
    }

    /// Drop the pair and snapshot. Returns whether anything was held.
    fn clear_session(&self, shared: &mut Shared) -> bool {
        let had_tokens = !shared.tokens.is_empty();
        shared.tokens = TokenPair::default();
        shared.bump_generation();

        if let Err(err) = self.inner.store.remove(&StoreKey::ALL) {
            warn!(error = %err, "Could not clear credential store");
        }
        had_tokens
    }

    /// Clear the session and, if one existed, tell observers.
    pub(crate) fn end_session(&self, reason: SessionEnded) {
        let had_tokens = {
            let mut shared = self.inner.state.lock();
            self.clear_session(&mut shared)
        };

        if had_tokens {
            info!(%reason, "Session ended");
            self.notify(reason);
        }
    }

    /// Cache a fresh profile snapshot.
    pub(crate) fn save_user(&self, user: &SessionUser) {
        let json = match serde_json::to_string(user) {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, "Could not serialize user snapshot");
                return;
            }
        };

        if let Err(err) = self.inner.store.put(&[(StoreKey::User, json)]) {
            warn!(error = %err, "Could not persist user snapshot");
        }
    }

    fn notify(&self, reason: SessionEnded) {
        // No subscribers is fine.
        let _ = self.inner.session_ended.send(reason);
    }
}

/// Read the pair from the store. Either half may be missing.
fn load_tokens(store: &dyn CredentialStore) -> Result<TokenPair> {
    Ok(TokenPair {
        access: store.get(StoreKey::AccessToken)?.map(AccessToken::new),
        refresh: store.get(StoreKey::RefreshToken)?.map(RefreshToken::new),
    })
}

// Custom Debug impl that hides sensitive data
impl std::fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClient")
            .field("api", self.inner.transport.api())
            .field("tokens", &"[REDACTED]")
            .finish()
    }
}
