//! GitHub repository file fetcher.
//!
//! Resolves a repository URL to owner/repo/branch, lists the tree through the
//! REST API, and downloads text-like blobs from the raw content host.

use std::time::{Duration, Instant};

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use ecospray_shared::{GitHubConfig, NormalizedFile, Result, SiteError, is_text_path};

/// User-Agent string for GitHub requests (the API rejects requests without one).
const USER_AGENT: &str = concat!("EcoSprayImporter/", env!("CARGO_PKG_VERSION"));

/// A parsed `https://github.com/{owner}/{repo}` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
    /// Explicit branch from a `/tree/{branch}` URL.
    pub branch: Option<String>,
}

/// Parse a GitHub repository URL.
///
/// Accepts an optional `.git` suffix and an optional `/tree/{branch}` path.
pub fn parse_repo_url(input: &str) -> Result<RepoRef> {
    let invalid = || SiteError::validation(format!("not a GitHub repository URL: {input}"));

    let url = Url::parse(input.trim()).map_err(|_| invalid())?;
    match url.host_str() {
        Some("github.com") | Some("www.github.com") => {}
        _ => return Err(invalid()),
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let (owner, repo) = match segments.as_slice() {
        [owner, repo, ..] => (*owner, repo.trim_end_matches(".git")),
        _ => return Err(invalid()),
    };
    if owner.is_empty() || repo.is_empty() {
        return Err(invalid());
    }

    let branch = match segments.get(2..) {
        Some(["tree", rest @ ..]) if !rest.is_empty() => Some(rest.join("/")),
        _ => None,
    };

    Ok(RepoRef {
        owner: owner.to_string(),
        repo: repo.to_string(),
        branch,
    })
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message: String,
}

/// Fetches the text-like files of a public (or token-accessible) repository.
pub struct GitHubFetcher {
    client: Client,
    api_base: String,
    raw_base: String,
    token: Option<String>,
    max_files: usize,
    max_file_bytes: u64,
}

impl GitHubFetcher {
    pub fn new(config: &GitHubConfig, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SiteError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            raw_base: config.raw_base.trim_end_matches('/').to_string(),
            token,
            max_files: config.max_files,
            max_file_bytes: config.max_file_bytes,
        })
    }

    /// Fetch every qualifying file of the repository at `url`.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn fetch_repo(&self, url: &str) -> Result<Vec<NormalizedFile>> {
        let start_time = Instant::now();
        let repo = parse_repo_url(url)?;

        let branch = match &repo.branch {
            Some(branch) => branch.clone(),
            None => self.default_branch(&repo).await?,
        };

        let tree_url = format!(
            "{}/repos/{}/{}/git/trees/{}?recursive=1",
            self.api_base, repo.owner, repo.repo, branch
        );
        let tree: TreeResponse = self.get_json(&tree_url).await?;
        if tree.truncated {
            warn!(owner = %repo.owner, repo = %repo.repo, "repository tree listing was truncated");
        }

        let candidates: Vec<TreeEntry> = tree
            .tree
            .into_iter()
            .filter(|e| e.kind == "blob" && is_text_path(&e.path))
            .filter(|e| e.size.is_none_or(|s| s <= self.max_file_bytes))
            .take(self.max_files)
            .collect();

        let mut files = Vec::with_capacity(candidates.len());
        for entry in candidates {
            let raw_url = format!(
                "{}/{}/{}/{}/{}",
                self.raw_base, repo.owner, repo.repo, branch, entry.path
            );
            match self.get_text(&raw_url).await {
                Ok(content) => files.push(NormalizedFile {
                    path: entry.path,
                    content,
                }),
                Err(e) => warn!(path = %entry.path, error = %e, "file skipped"),
            }
        }

        if files.is_empty() {
            return Err(SiteError::validation(format!(
                "no importable files (html, md, json, txt) found in {}/{}",
                repo.owner, repo.repo
            )));
        }

        info!(
            owner = %repo.owner,
            repo = %repo.repo,
            %branch,
            files = files.len(),
            duration_ms = start_time.elapsed().as_millis(),
            "repository fetched"
        );

        Ok(files)
    }

    async fn default_branch(&self, repo: &RepoRef) -> Result<String> {
        let info_url = format!("{}/repos/{}/{}", self.api_base, repo.owner, repo.repo);
        let info: RepoInfo = self.get_json(&info_url).await?;
        debug!(branch = %info.default_branch, "resolved default branch");
        Ok(info.default_branch)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!(%url, "GitHub API request");
        let response = self
            .authorized(self.client.get(url))
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| SiteError::request("GitHub API", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(upstream_error(status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| SiteError::parse(format!("unexpected GitHub API response: {e}")))
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(|e| SiteError::request(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SiteError::upstream(
                Some(status.as_u16()),
                format!("{url}: HTTP {status}"),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| SiteError::request(format!("{url}: body read failed"), e))
    }
}

/// Map a failed GitHub API call, keeping GitHub's own message.
fn upstream_error(status: StatusCode, body: &str) -> SiteError {
    let message = serde_json::from_str::<ApiMessage>(body)
        .map(|m| m.message)
        .unwrap_or_else(|_| format!("GitHub API returned HTTP {status}"));

    let message = match status {
        StatusCode::NOT_FOUND => format!("repository not found: {message}"),
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            format!("GitHub API rate limit or access denied: {message}")
        }
        _ => message,
    };
    SiteError::upstream(Some(status.as_u16()), message)
}
