//! HTTP transport: request construction and error decoding.

use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use doccheck_core::error::{Error, InvalidInputError, ServerError, TransportError};
use doccheck_core::{AccessToken, ApiUrl, Endpoint, Result};

use crate::config::ClientConfig;
use crate::request::{RequestBody, RequestOptions};
use crate::wire::ErrorBody;

/// Thin wrapper over `reqwest` that knows the API base URL.
///
/// It never retries and never inspects credentials beyond attaching the
/// token it is handed.
#[derive(Debug, Clone)]
pub(crate) struct Transport {
    client: reqwest::Client,
    api: ApiUrl,
}

impl Transport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder.build().map_err(|e| {
            Error::Network(TransportError::Http {
                message: format!("failed to build HTTP client: {}", e),
            })
        })?;

        Ok(Self {
            client,
            api: config.api_url.clone(),
        })
    }

    pub fn api(&self) -> &ApiUrl {
        &self.api
    }

    /// Issue one request. Any HTTP status is returned as `Ok`; only a missing
    /// response is an error.
    pub async fn send(
        &self,
        endpoint: &Endpoint,
        options: &RequestOptions,
        token: Option<&AccessToken>,
    ) -> Result<Response> {
        let url = self.api.join(endpoint.path());
        debug!(method = %options.method, %endpoint, authed = token.is_some(), "Sending request");

        let mut request = self
            .client
            .request(options.method.clone(), &url)
            .query(endpoint.query_pairs());

        request = Self::with_body(request, &options.body)?;

        let mut headers = options.headers.clone();
        headers.remove(AUTHORIZATION);
        if let Some(token) = token.filter(|_| !endpoint.is_public()) {
            let value = HeaderValue::from_str(&token.bearer()).map_err(|_| {
                InvalidInputError::Other {
                    message: "access token contains invalid header characters".to_string(),
                }
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        let response = request.headers(headers).send().await?;
        trace!(status = %response.status(), %endpoint, "Response received");
        Ok(response)
    }

    fn with_body(request: RequestBuilder, body: &RequestBody) -> Result<RequestBuilder> {
        Ok(match body {
            RequestBody::Empty => request,
            RequestBody::Json(value) => request.json(value),
            RequestBody::File(file) => request.multipart(file.to_form()?),
        })
    }

    /// Pass a success response through, or turn it into a [`ServerError`].
    pub async fn ensure_success(response: Response) -> Result<Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(Error::Server(Self::server_error(response).await))
        }
    }

    /// Decode the `detail` of an error response, if it has one.
    pub async fn server_error(response: Response) -> ServerError {
        let status = response.status().as_u16();

        match response.json::<ErrorBody>().await {
            Ok(body) => ServerError::new(status, body.into_message()),
            Err(_) => ServerError::new(status, None),
        }
    }

    /// Decode a JSON success body.
    pub async fn decode<R: DeserializeOwned>(response: Response) -> Result<R> {
        Ok(response.json::<R>().await?)
    }
}
