//! Bounded, same-origin web crawler engine.
//!
//! The crawler starts from a seed URL, performs BFS traversal within the seed's
//! origin, and stops at a page-count or depth bound. Pages are fetched in small
//! batches bounded by the configured concurrency.

use std::collections::{HashSet, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use url::Url;

use ecospray_shared::{CrawlConfig, CrawlResult, CrawledPage, PageError, Result, SiteError};

use crate::contacts::ContactSet;
use crate::page::{ParsedPage, parse_page};

/// User-Agent string for crawl requests.
const USER_AGENT: &str = concat!("EcoSprayImporter/", env!("CARGO_PKG_VERSION"));

/// A fetched and parsed page, before it is folded into the [`CrawlResult`].
#[derive(Debug)]
struct FetchedPage {
    /// Normalized URL that was requested.
    url: String,
    /// URL after redirects.
    final_url: Url,
    parsed: ParsedPage,
    contacts: ContactSet,
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for crawl operations.
pub trait CrawlProgress: Send + Sync {
    /// Called after each page is fetched.
    fn page_fetched(&self, url: &str, current: usize, max_pages: usize);
}

/// No-op progress for headless/server usage.
pub struct SilentProgress;

impl CrawlProgress for SilentProgress {
    fn page_fetched(&self, _url: &str, _current: usize, _max_pages: usize) {}
}

// ---------------------------------------------------------------------------
// Crawler
// ---------------------------------------------------------------------------

/// Bounded same-origin crawler.
pub struct Crawler {
    config: CrawlConfig,
    client: Client,
    /// Allow localhost/private IPs (for mock servers and local previews).
    allow_localhost: bool,
}

impl Crawler {
    /// Create a new crawler with the given configuration.
    pub fn new(config: CrawlConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirect_policy())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SiteError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            allow_localhost: false,
        })
    }

    /// Allow crawling localhost/private IPs.
    pub fn allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }

    /// Crawl starting from `seed`.
    ///
    /// A failure to fetch the seed is returned as an error. Failures on any
    /// later page are recorded in [`CrawlResult::errors`] and skipped.
    #[instrument(skip_all, fields(seed = %seed))]
    pub async fn crawl(&self, seed: &Url, progress: &dyn CrawlProgress) -> Result<CrawlResult> {
        let start_time = Instant::now();

        if seed.scheme() != "http" && seed.scheme() != "https" {
            return Err(SiteError::validation(format!(
                "url must be http or https (got {seed})"
            )));
        }
        if !self.allow_localhost && is_ssrf_target(seed) {
            return Err(SiteError::validation(format!(
                "refusing to crawl private or local address {seed}"
            )));
        }

        let max_pages = self.config.max_pages.max(1);
        let concurrency = self.config.concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));

        let mut scope = CrawlScope::new(seed);
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<(Url, u32)> = VecDeque::from([(seed.clone(), 0)]);
        let mut attempted: usize = 0;

        let mut result = CrawlResult::default();
        let mut seen_images: HashSet<String> = HashSet::new();
        let mut contacts = ContactSet::new();

        info!(
            max_pages,
            max_depth = self.config.max_depth,
            concurrency,
            "starting crawl"
        );

        while !queue.is_empty() && attempted < max_pages {
            // Take a batch from the queue (up to concurrency and the page budget)
            let mut batch: Vec<(Url, u32)> = Vec::new();
            while batch.len() < concurrency && attempted < max_pages {
                let Some((url, depth)) = queue.pop_front() else {
                    break;
                };

                if !visited.insert(normalize_url(&url)) {
                    continue;
                }
                if !scope.in_scope(&url) {
                    debug!(%url, "out of scope, skipping");
                    continue;
                }
                if !self.allow_localhost && is_ssrf_target(&url) {
                    warn!(%url, "SSRF protection: blocked");
                    continue;
                }

                attempted += 1;
                batch.push((url, depth));
            }

            let mut handles = Vec::new();
            for (url, depth) in batch {
                let client = self.client.clone();
                let sem = semaphore.clone();
                let rate_limit = self.config.rate_limit_ms;
                let max_chars = self.config.max_page_chars;
                let task_url = url.clone();

                let handle = tokio::spawn(async move {
                    let _permit = sem
                        .acquire_owned()
                        .await
                        .map_err(|e| SiteError::Network(format!("fetch slot closed: {e}")))?;

                    if rate_limit > 0 {
                        tokio::time::sleep(Duration::from_millis(rate_limit)).await;
                    }

                    fetch_page(&client, &task_url, max_chars).await
                });
                handles.push((url, depth, handle));
            }

            for (url, depth, handle) in handles {
                let outcome = match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => Err(SiteError::Network(format!("{url}: fetch task failed: {e}"))),
                };

                match outcome {
                    Ok(page) => {
                        if depth == 0 {
                            // A redirected seed defines the origin for the rest of the crawl.
                            scope = CrawlScope::new(&page.final_url);
                        } else if !scope.in_scope(&page.final_url) {
                            warn!(%url, final_url = %page.final_url, "redirected off-origin, skipping");
                            result.errors.push(PageError {
                                url: url.to_string(),
                                error: format!("redirected off-origin to {}", page.final_url),
                            });
                            continue;
                        }
                        visited.insert(normalize_url(&page.final_url));

                        if depth < self.config.max_depth {
                            for link in &page.parsed.links {
                                if !visited.contains(&normalize_url(link)) {
                                    queue.push_back((link.clone(), depth + 1));
                                }
                            }
                        }

                        for image in page.parsed.images {
                            if seen_images.insert(image.clone()) {
                                result.images.push(image);
                            }
                        }
                        contacts.merge(page.contacts);

                        result.pages.push(CrawledPage {
                            url: page.url,
                            title: page.parsed.title,
                            text: page.parsed.text,
                        });
                        progress.page_fetched(
                            url.as_str(),
                            result.pages.len(),
                            max_pages,
                        );
                    }
                    Err(e) if depth == 0 => {
                        warn!(%url, error = %e, "seed page could not be fetched");
                        return Err(e);
                    }
                    Err(e) => {
                        warn!(%url, error = %e, "page skipped");
                        result.errors.push(PageError {
                            url: url.to_string(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        let (emails, phones) = contacts.into_parts();
        result.emails = emails;
        result.phones = phones;

        info!(
            pages = result.pages.len(),
            images = result.images.len(),
            emails = result.emails.len(),
            phones = result.phones.len(),
            errors = result.errors.len(),
            duration_ms = start_time.elapsed().as_millis(),
            "crawl completed"
        );

        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Scope checking
// ---------------------------------------------------------------------------

/// Same-origin scope: scheme, host and port must match the seed.
struct CrawlScope {
    scheme: String,
    host: String,
    port: Option<u16>,
}

impl CrawlScope {
    fn new(seed: &Url) -> Self {
        Self {
            scheme: seed.scheme().to_string(),
            host: seed.host_str().unwrap_or("").to_string(),
            port: seed.port_or_known_default(),
        }
    }

    fn in_scope(&self, url: &Url) -> bool {
        url.scheme() == self.scheme
            && url.host_str().unwrap_or("") == self.host
            && url.port_or_known_default() == self.port
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Redirect policy: at most 5 hops, and never from a public address into a
/// private or local one.
fn redirect_policy() -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(|attempt| {
        if attempt.previous().len() >= 5 {
            return attempt.error("too many redirects");
        }
        let from_public = attempt
            .previous()
            .first()
            .is_some_and(|origin| !is_ssrf_target(origin));
        if from_public && is_ssrf_target(attempt.url()) {
            warn!(location = %attempt.url(), "SSRF protection: redirect blocked");
            return attempt.stop();
        }
        attempt.follow()
    })
}

/// Check if a URL targets a potentially dangerous resource.
pub fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

// ---------------------------------------------------------------------------
// Page fetching
// ---------------------------------------------------------------------------

/// Fetch a single page, scan its raw text for contacts, and parse it.
async fn fetch_page(client: &Client, url: &Url, max_chars: usize) -> Result<FetchedPage> {
    debug!(%url, "fetching page");

    let response = client
        .get(url.as_str())
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

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();
    if !content_type.is_empty() && !content_type.contains("html") {
        return Err(SiteError::parse(format!(
            "{url}: not an HTML page ({content_type})"
        )));
    }

    let final_url = response.url().clone();
    let body = response
        .text()
        .await
        .map_err(|e| SiteError::request(format!("{url}: body read failed"), e))?;

    let mut contacts = ContactSet::new();
    contacts.scan(&body);

    Ok(FetchedPage {
        url: normalize_url(url),
        parsed: parse_page(&body, &final_url, max_chars),
        final_url,
        contacts,
    })
}

/// Normalize a URL for deduplication (strip fragment and trailing slash).
pub fn normalize_url(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    let mut s = normalized.to_string();
    // Remove trailing slash for consistency (except root path)
    if normalized.query().is_none() && s.ends_with('/') && normalized.path() != "/" {
        s.pop();
    }
    s
}
