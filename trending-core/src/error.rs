use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Reddit API error: {0}")]
    RedditApi(#[from] RedditApiError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Failures observed while talking to Reddit.
///
/// Cloneable so that a single settled fetch can be handed to every caller
/// waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RedditApiError {
    #[error("Subreddit not found: {subreddit}")]
    SubredditNotFound { subreddit: String },

    #[error("Rate limit exceeded. Retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Request timeout")]
    RequestTimeout,

    #[error("No retrieval path produced posts for r/{subreddit}")]
    Unavailable { subreddit: String },

    #[error("OAuth credentials are not configured")]
    CredentialsMissing,

    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Forbidden access to resource: {resource}")]
    Forbidden { resource: String },

    #[error("Invalid API response: {details}")]
    InvalidResponse { details: String },

    #[error("Server error: {status_code}")]
    ServerError { status_code: u16 },

    #[error("Transport error: {message}")]
    Transport { message: String },
}

impl RedditApiError {
    /// Rate limits and timeouts are upstream-wide conditions: they stop the
    /// fallback chain instead of advancing it.
    pub fn aborts_chain(&self) -> bool {
        matches!(
            self,
            RedditApiError::RateLimitExceeded { .. } | RedditApiError::RequestTimeout
        )
    }

    /// Maps a non-success status that is not a rate limit to a stage failure.
    pub fn from_status(status_code: u16, resource: &str) -> Self {
        match status_code {
            401 => RedditApiError::AuthenticationFailed {
                reason: format!("unauthorized for {}", resource),
            },
            403 => RedditApiError::Forbidden {
                resource: resource.to_string(),
            },
            404 => RedditApiError::InvalidResponse {
                details: format!("{} not found", resource),
            },
            code => RedditApiError::ServerError { status_code: code },
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}
