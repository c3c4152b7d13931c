use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Which retrieval stage produced a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    OauthJson,
    Json,
    Rss,
    Html,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::OauthJson => "oauth_json",
            Provenance::Json => "json",
            Provenance::Rss => "rss",
            Provenance::Html => "html",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A top post, normalized across every retrieval stage.
///
/// Feed and page stages cannot populate score, author or comment counts, so
/// those stay `None`. `title` is always present and at least one of `url` or
/// `permalink` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub title: String,
    pub url: Option<String>,
    pub permalink: Option<String>,
    pub score: Option<i64>,
    pub author: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub num_comments: Option<u64>,
    pub provenance: Provenance,
}

impl Post {
    /// Builds a post only when the title is non-empty and a link exists.
    pub fn new(
        title: impl Into<String>,
        url: Option<String>,
        permalink: Option<String>,
        provenance: Provenance,
    ) -> Option<Self> {
        let title = title.into().trim().to_string();
        let url = url.filter(|u| !u.is_empty());
        let permalink = permalink.filter(|p| !p.is_empty());
        if title.is_empty() || (url.is_none() && permalink.is_none()) {
            return None;
        }
        Some(Self {
            title,
            url,
            permalink,
            score: None,
            author: None,
            created_at: None,
            num_comments: None,
            provenance,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Accessibility {
    Public,
    GatedMaybe,
    Unknown,
    NotFound,
}

impl Accessibility {
    /// Classifies Reddit's `subreddit_type` field.
    pub fn from_subreddit_type(subreddit_type: Option<&str>) -> Self {
        match subreddit_type {
            Some("public") | Some("restricted") | Some("archived") | Some("user") => {
                Accessibility::Public
            }
            Some("private") | Some("gold_restricted") | Some("employees_only") => {
                Accessibility::GatedMaybe
            }
            _ => Accessibility::Unknown,
        }
    }
}

/// The probe that settled a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceProbe {
    #[serde(rename = "api.about")]
    ApiAbout,
    #[serde(rename = "www.about")]
    WwwAbout,
    #[serde(rename = "html")]
    Html,
    /// The name was rejected before any request was made.
    #[serde(rename = "input")]
    Input,
}

impl SourceProbe {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceProbe::ApiAbout => "api.about",
            SourceProbe::WwwAbout => "www.about",
            SourceProbe::Html => "html",
            SourceProbe::Input => "input",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub exists: bool,
    pub canonical: String,
    pub accessibility: Accessibility,
    pub source_probe: SourceProbe,
}

impl ResolutionResult {
    pub fn not_found(name: &str, source_probe: SourceProbe) -> Self {
        Self {
            exists: false,
            canonical: name.to_string(),
            accessibility: Accessibility::NotFound,
            source_probe,
        }
    }
}

/// Strips whitespace and a leading `r/` (or `/r/`) from user input.
pub fn normalize_subreddit(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_slash = trimmed.strip_prefix('/').unwrap_or(trimmed);
    let has_prefix = without_slash
        .get(..2)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("r/"));
    let stripped = if has_prefix {
        &without_slash[2..]
    } else {
        without_slash
    };
    stripped.trim_end_matches('/').trim().to_string()
}

/// Window over which "top" posts are ranked.
///
/// Values Reddit does not define are passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Timeframe {
    Hour,
    #[default]
    Day,
    Week,
    Month,
    Year,
    All,
    Other(String),
}

impl Timeframe {
    pub const DAY_TTL: Duration = Duration::from_secs(5 * 60);
    pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

    pub fn as_str(&self) -> &str {
        match self {
            Timeframe::Hour => "hour",
            Timeframe::Day => "day",
            Timeframe::Week => "week",
            Timeframe::Month => "month",
            Timeframe::Year => "year",
            Timeframe::All => "all",
            Timeframe::Other(value) => value,
        }
    }

    /// How long a successful fetch for this timeframe may be served.
    pub fn cache_ttl(&self) -> Duration {
        match self {
            Timeframe::Day => Self::DAY_TTL,
            _ => Self::DEFAULT_TTL,
        }
    }
}

impl From<&str> for Timeframe {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "hour" => Timeframe::Hour,
            "day" => Timeframe::Day,
            "week" => Timeframe::Week,
            "month" => Timeframe::Month,
            "year" => Timeframe::Year,
            "all" => Timeframe::All,
            _ => Timeframe::Other(value.to_string()),
        }
    }
}

impl From<String> for Timeframe {
    fn from(value: String) -> Self {
        Timeframe::from(value.as_str())
    }
}

impl From<Timeframe> for String {
    fn from(value: Timeframe) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
