//! Application-only OAuth for the authenticated listing endpoint.
//!
//! Uses the client-credentials grant. The exchange itself is routed through
//! [`RedditApiClient`] so it shares the request gate and timeout with every
//! other Reddit call.

use crate::api::RedditApiClient;
use crate::transport::{UpstreamRequest, UpstreamResponse};
use oauth2::basic::BasicClient;
use oauth2::http::header::{HeaderName, HeaderValue};
use oauth2::http::{HeaderMap, StatusCode};
use oauth2::{
    AuthUrl, ClientId, ClientSecret, HttpRequest, HttpResponse, RequestTokenError, Scope,
    TokenResponse, TokenUrl,
};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use trending_core::RedditApiError;

const AUTHORIZE_URL: &str = "https://www.reddit.com/api/v1/authorize";

/// Margin subtracted from the declared token lifetime.
pub const TOKEN_SAFETY_MARGIN: Duration = Duration::from_secs(60);
/// Shortest lifetime we will ever assume for a fresh token.
pub const MIN_TOKEN_LIFETIME: Duration = Duration::from_secs(60);
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Replaced wholesale on renewal.
#[derive(Debug, Clone)]
pub struct OAuthToken {
    pub access_token: String,
    pub expires_at: Instant,
}

impl OAuthToken {
    pub fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Effective lifetime for a token Reddit says lasts `declared`.
pub fn effective_lifetime(declared: Option<Duration>) -> Duration {
    declared
        .unwrap_or(DEFAULT_TOKEN_LIFETIME)
        .saturating_sub(TOKEN_SAFETY_MARGIN)
        .max(MIN_TOKEN_LIFETIME)
}

pub struct TokenManager {
    api: Arc<RedditApiClient>,
    oauth_client: Option<BasicClient>,
    // Holding this lock across the exchange keeps refreshes single-flight.
    token: Mutex<Option<OAuthToken>>,
}

impl TokenManager {
    pub fn new(
        api: Arc<RedditApiClient>,
        credentials: Option<RedditCredentials>,
    ) -> Result<Self, RedditApiError> {
        let oauth_client = credentials
            .map(|credentials| build_oauth_client(&credentials, &api.hosts().token_url))
            .transpose()?;

        Ok(Self {
            api,
            oauth_client,
            token: Mutex::new(None),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.oauth_client.is_some()
    }

    pub async fn get_token(&self) -> Result<String, RedditApiError> {
        let oauth_client = self
            .oauth_client
            .as_ref()
            .ok_or(RedditApiError::CredentialsMissing)?;

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_valid()) {
            return Ok(token.access_token.clone());
        }

        debug!("Requesting application OAuth token");
        let response = oauth_client
            .exchange_client_credentials()
            .add_scope(Scope::new("read".to_string()))
            .request_async(|request| self.send_token_request(request))
            .await
            .map_err(|e| match e {
                RequestTokenError::Request(inner) => inner,
                RequestTokenError::ServerResponse(response) => {
                    RedditApiError::AuthenticationFailed {
                        reason: response.to_string(),
                    }
                }
                other => RedditApiError::AuthenticationFailed {
                    reason: other.to_string(),
                },
            })?;

        let lifetime = effective_lifetime(response.expires_in());
        let token = OAuthToken {
            access_token: response.access_token().secret().clone(),
            expires_at: Instant::now() + lifetime,
        };
        info!("Obtained application OAuth token valid for {:?}", lifetime);

        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    async fn send_token_request(
        &self,
        request: HttpRequest,
    ) -> Result<HttpResponse, RedditApiError> {
        let method = Method::from_bytes(request.method.as_str().as_bytes()).map_err(|e| {
            RedditApiError::Transport {
                message: e.to_string(),
            }
        })?;
        let headers = request
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let upstream = UpstreamRequest {
            method,
            url: request.url.to_string(),
            headers,
            body: Some(request.body),
        };

        let response = self.api.send("oauth.token", upstream).await?;
        if !response.is_success() {
            warn!("Token endpoint answered {}", response.status);
        }
        into_oauth_response(response)
    }
}

fn build_oauth_client(
    credentials: &RedditCredentials,
    token_url: &str,
) -> Result<BasicClient, RedditApiError> {
    let invalid = |e: url::ParseError| RedditApiError::AuthenticationFailed {
        reason: format!("invalid OAuth endpoint: {}", e),
    };
    Ok(BasicClient::new(
        ClientId::new(credentials.client_id.clone()),
        Some(ClientSecret::new(credentials.client_secret.clone())),
        AuthUrl::new(AUTHORIZE_URL.to_string()).map_err(invalid)?,
        Some(TokenUrl::new(token_url.to_string()).map_err(invalid)?),
    ))
}

fn into_oauth_response(response: UpstreamResponse) -> Result<HttpResponse, RedditApiError> {
    let status_code =
        StatusCode::from_u16(response.status).map_err(|e| RedditApiError::InvalidResponse {
            details: e.to_string(),
        })?;

    let mut headers = HeaderMap::new();
    for (name, value) in &response.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }

    Ok(HttpResponse {
        status_code,
        headers,
        body: response.body,
    })
}
