//! Subreddit resolution: existence, canonical casing and an advisory
//! accessibility classification.

use crate::api::RedditApiClient;
use crate::parsers::{detect_gating, extract_canonical_name, parse_about};
use std::sync::Arc;
use tracing::{debug, info, warn};
use trending_core::{
    normalize_subreddit, Accessibility, RedditApiError, ResolutionResult, SourceProbe,
};

pub struct Resolver {
    api: Arc<RedditApiClient>,
}

/// Result of one HTML mirror probe.
enum PageProbe {
    Body(String),
    NotFound,
    Failed,
}

impl Resolver {
    pub fn new(api: Arc<RedditApiClient>) -> Self {
        Self { api }
    }

    /// Probes, in order: the API host's about endpoint, the web host's about
    /// endpoint (skipped after a 403), then both HTML mirrors.
    ///
    /// Only rate limits and timeouts are errors; a gating marker merely
    /// downgrades the accessibility to `GatedMaybe`.
    pub async fn resolve(&self, raw_name: &str) -> Result<ResolutionResult, RedditApiError> {
        let name = normalize_subreddit(raw_name);
        if name.is_empty() {
            debug!("Rejecting empty subreddit name {:?}", raw_name);
            return Ok(ResolutionResult::not_found(&name, SourceProbe::Input));
        }

        let hosts = self.api.hosts();
        let api_url = format!("{}/r/{}/about.json", hosts.api, name);
        let api_status = match self.probe_about(SourceProbe::ApiAbout, &api_url).await? {
            AboutProbe::Resolved(result) => return Ok(result),
            AboutProbe::Status(status) => status,
        };

        if api_status != 403 {
            let www_url = format!("{}/r/{}/about.json", hosts.www, name);
            if let AboutProbe::Resolved(result) =
                self.probe_about(SourceProbe::WwwAbout, &www_url).await?
            {
                return Ok(result);
            }
        } else {
            debug!("api.about forbidden for r/{}, skipping www.about", name);
        }

        let www_page = self
            .probe_page("www.page", &format!("{}/r/{}/", hosts.www, name))
            .await?;
        let old_page = self
            .probe_page("old.page", &format!("{}/r/{}/", hosts.old, name))
            .await?;

        if matches!(
            (&www_page, &old_page),
            (PageProbe::NotFound, PageProbe::NotFound)
        ) {
            info!("r/{} does not exist (both mirrors answered 404)", name);
            return Ok(ResolutionResult::not_found(&name, SourceProbe::Html));
        }

        let combined: String = [www_page, old_page]
            .into_iter()
            .map(|probe| match probe {
                PageProbe::Body(body) => body,
                PageProbe::NotFound | PageProbe::Failed => String::new(),
            })
            .collect();

        let canonical = extract_canonical_name(&combined).unwrap_or_else(|| {
            debug!("No canonical marker in pages for r/{}, keeping input", name);
            name.clone()
        });
        let accessibility = if detect_gating(&combined) {
            warn!("r/{} shows a gating marker", canonical);
            Accessibility::GatedMaybe
        } else {
            Accessibility::Unknown
        };

        info!(
            "Resolved r/{} to r/{} from html ({:?})",
            name, canonical, accessibility
        );
        Ok(ResolutionResult {
            exists: true,
            canonical,
            accessibility,
            source_probe: SourceProbe::Html,
        })
    }

    async fn probe_about(
        &self,
        probe: SourceProbe,
        url: &str,
    ) -> Result<AboutProbe, RedditApiError> {
        let response = match self.api.get(probe.as_str(), url).await {
            Ok(response) => response,
            Err(e) if e.aborts_chain() => return Err(e),
            Err(e) => {
                debug!("{} probe failed: {}", probe.as_str(), e);
                return Ok(AboutProbe::Status(0));
            }
        };

        if response.status != 200 {
            return Ok(AboutProbe::Status(response.status));
        }

        match parse_about(&response.body) {
            Some(about) => {
                let accessibility =
                    Accessibility::from_subreddit_type(about.subreddit_type.as_deref());
                info!(
                    "Resolved r/{} via {} ({:?})",
                    about.display_name,
                    probe.as_str(),
                    accessibility
                );
                Ok(AboutProbe::Resolved(ResolutionResult {
                    exists: true,
                    canonical: about.display_name,
                    accessibility,
                    source_probe: probe,
                }))
            }
            None => {
                debug!("{} returned 200 without a subreddit payload", probe.as_str());
                Ok(AboutProbe::Status(200))
            }
        }
    }

    async fn probe_page(&self, endpoint: &str, url: &str) -> Result<PageProbe, RedditApiError> {
        match self.api.get(endpoint, url).await {
            Ok(response) if response.status == 404 => Ok(PageProbe::NotFound),
            Ok(response) if response.is_success() => Ok(PageProbe::Body(response.text())),
            Ok(response) => {
                // gated pages often answer 403 with the explanatory markup
                debug!("{} answered {}", endpoint, response.status);
                Ok(PageProbe::Body(response.text()))
            }
            Err(e) if e.aborts_chain() => Err(e),
            Err(e) => {
                debug!("{} probe failed: {}", endpoint, e);
                Ok(PageProbe::Failed)
            }
        }
    }
}

enum AboutProbe {
    Resolved(ResolutionResult),
    /// The probe did not settle; carries the HTTP status (0 for transport failure).
    Status(u16),
}
