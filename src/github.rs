use reqwest::header::{ACCEPT, LINK};
use reqwest::Url;
use std::fmt;
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::repository::{Owner, Repository};

/// Public GitHub API root
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Repositories requested per listing page
pub const PER_PAGE: u32 = 100;

const REPO_LIST_MEDIA_TYPE: &str = "application/vnd.github.v3+json";

/// Client for the repository listing endpoints
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubClient")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"<redacted>")
            .finish()
    }
}

impl GitHubClient {
    /// Create a client for the API rooted at `api_base_url`
    pub fn new(api_base_url: &str, token: &str) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(Error::AuthMissing(
                "the access token is empty".to_string(),
            ));
        }

        let base_url = Url::parse(api_base_url).map_err(|e| {
            Error::InvalidInput(format!("invalid API base URL {}: {}", api_base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(Error::InvalidInput(format!(
                "API base URL cannot carry a path: {}",
                api_base_url
            )));
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("repos/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::InvalidInput(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            token: token.trim().to_string(),
        })
    }

    /// Listing endpoint for `owner`, e.g. `{base}/orgs/acme/repos`
    pub fn listing_url(&self, owner: &Owner) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                Error::InvalidInput(format!("API base URL cannot carry a path: {}", self.base_url))
            })?;
            segments
                .pop_if_empty()
                .extend([owner.api_segment(), owner.name(), "repos"]);
        }
        Ok(url)
    }

    /// List every repository of `owner`, following pagination until the host
    /// returns an empty page or stops advertising a next page.
    ///
    /// The first failing page aborts the whole listing.
    pub async fn list_repositories(&self, owner: &Owner) -> Result<Vec<Repository>> {
        let url = self.listing_url(owner)?;
        debug!("Fetching repositories for {} from {}", owner, url);

        let mut repositories = Vec::new();
        let mut page = 1u32;

        loop {
            let (items, has_next) = self.fetch_page(&url, page).await?;
            if items.is_empty() {
                break;
            }

            repositories.extend(items);

            if !has_next {
                break;
            }
            page += 1;
        }

        info!("Found {} repositories for {}", repositories.len(), owner);
        Ok(repositories)
    }

    async fn fetch_page(&self, url: &Url, page: u32) -> Result<(Vec<Repository>, bool)> {
        let transport = |source: reqwest::Error| Error::Transport {
            url: url.to_string(),
            page,
            source,
        };

        let response = self
            .http
            .get(url.clone())
            .bearer_auth(&self.token)
            .header(ACCEPT, REPO_LIST_MEDIA_TYPE)
            .query(&[
                ("type", "all".to_string()),
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
            ])
            .send()
            .await
            .map_err(transport)?
            .error_for_status()
            .map_err(transport)?;

        let has_next = response
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .map(has_next_page)
            .unwrap_or(false);

        // Read the whole body so the connection goes back to the pool.
        let body = response.bytes().await.map_err(transport)?;
        let items: Vec<Repository> =
            serde_json::from_slice(&body).map_err(|source| Error::Decode {
                url: url.to_string(),
                page,
                source,
            })?;

        debug!(
            "Page {}: {} repositories (next page: {})",
            page,
            items.len(),
            has_next
        );
        Ok((items, has_next))
    }
}

/// Whether a `Link` header advertises a `rel="next"` relation
pub fn has_next_page(link_header: &str) -> bool {
    static LINK_RELATION: OnceLock<regex::Regex> = OnceLock::new();
    let relation = LINK_RELATION.get_or_init(|| {
        regex::Regex::new(r#"<[^>]*>\s*;[^,]*?\b(?i:rel)\s*=\s*"?([^",;]+)"?"#)
            .expect("link relation pattern is valid")
    });

    relation.captures_iter(link_header).any(|caps| {
        caps[1]
            .split_whitespace()
            .any(|rel| rel.eq_ignore_ascii_case("next"))
    })
}

/// Access token resolution for non-interactive runs
pub mod auth {
    use std::env;
    use std::process::Command;
    use tracing::{debug, warn};

    use crate::error::{Error, Result};

    /// Where the access token came from
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum AuthStrategy {
        /// `GITHUB_TOKEN` environment variable
        EnvironmentToken,
        /// `gh auth token`
        GitHubCLI,
    }

    /// Resolve a token according to `auth_method` (`auto`, `token` or `gh_cli`)
    pub fn resolve_token(auth_method: &str) -> Result<(AuthStrategy, String)> {
        match auth_method {
            "auto" => {
                if let Some(token) = environment_token() {
                    Ok((AuthStrategy::EnvironmentToken, token))
                } else if let Some(token) = github_cli_token() {
                    Ok((AuthStrategy::GitHubCLI, token))
                } else {
                    Err(Error::AuthMissing(
                        "set GITHUB_TOKEN or authenticate the GitHub CLI with `gh auth login`"
                            .to_string(),
                    ))
                }
            }
            "token" => environment_token()
                .map(|token| (AuthStrategy::EnvironmentToken, token))
                .ok_or_else(|| {
                    Error::AuthMissing("GITHUB_TOKEN environment variable is not set".to_string())
                }),
            "gh_cli" => github_cli_token()
                .map(|token| (AuthStrategy::GitHubCLI, token))
                .ok_or_else(|| {
                    Error::AuthMissing("GitHub CLI returned no token. Run: gh auth login".to_string())
                }),
            other => Err(Error::InvalidInput(format!("unknown auth method: {}", other))),
        }
    }

    /// Token from `GITHUB_TOKEN`, if set and non-blank
    pub fn environment_token() -> Option<String> {
        let token = env::var("GITHUB_TOKEN").ok()?.trim().to_string();
        if token.is_empty() {
            return None;
        }

        const KNOWN_PREFIXES: [&str; 4] = ["ghp_", "gho_", "ghs_", "github_pat_"];
        if !KNOWN_PREFIXES.iter().any(|prefix| token.starts_with(prefix)) {
            warn!("GITHUB_TOKEN doesn't look like a GitHub token");
        }

        debug!("Using GITHUB_TOKEN environment variable");
        Some(token)
    }

    /// Token from the GitHub CLI, if installed and logged in
    pub fn github_cli_token() -> Option<String> {
        let output = match Command::new("gh").args(["auth", "token"]).output() {
            Ok(output) => output,
            Err(e) => {
                debug!("GitHub CLI not available: {}", e);
                return None;
            }
        };

        if !output.status.success() {
            debug!(
                "gh auth token failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return None;
        }

        let token = String::from_utf8(output.stdout).ok()?.trim().to_string();
        if token.is_empty() {
            None
        } else {
            debug!("Using token from GitHub CLI");
            Some(token)
        }
    }

}
