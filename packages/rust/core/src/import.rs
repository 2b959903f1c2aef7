//! Site-import stages: source, analyze, write.
//!
//! Each stage is independently invokable. The service holds configuration and
//! clients only; intermediate results belong to the caller.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument, warn};
use url::Url;

use ecospray_crawler::{CrawlProgress, Crawler};
use ecospray_shared::{
    AppConfig, CrawlConfig, CrawlResult, ExtractedContent, NormalizedFile, Result, SiteError,
    SourceType, StoreConfig, secret_from_env,
};
use ecospray_sources::{GitHubFetcher, extract_zip_contents};
use ecospray_storage::{SheetsStore, TabularStore};

use crate::extraction::{ContentExtractor, SourceData};
use crate::gemini::GeminiClient;
use crate::writer::{WriteReport, append_event, write_imported_content};

/// Where a `write` stage sends its rows.
#[derive(Debug, Clone, Default)]
pub struct Destination {
    /// Caller-supplied Sheets access token.
    pub key: Option<String>,
    /// Spreadsheet to write to; a new one is created when absent.
    pub id: Option<String>,
}

/// Result of a `write` stage.
#[derive(Debug, Clone, Serialize)]
pub struct WriteOutcome {
    #[serde(flatten)]
    pub report: WriteReport,
    /// Set when the write went to a caller-supplied spreadsheet.
    #[serde(rename = "spreadsheetId", skip_serializing_if = "Option::is_none")]
    pub spreadsheet_id: Option<String>,
}

/// Runs the import stages against configured collaborators.
pub struct ImportService {
    crawl: CrawlConfig,
    allow_localhost: bool,
    github: GitHubFetcher,
    gemini: GeminiClient,
    extractor: ContentExtractor,
    store_config: StoreConfig,
    default_store: Arc<dyn TabularStore>,
    site_name: String,
}

impl ImportService {
    pub fn new(config: &AppConfig, default_store: Arc<dyn TabularStore>) -> Result<Self> {
        let github = GitHubFetcher::new(&config.github, secret_from_env(&config.github.token_env))?;
        let gemini = GeminiClient::new(&config.gemini, secret_from_env(&config.gemini.api_key_env))?;
        let extractor = ContentExtractor::new(
            gemini.clone(),
            config.site.name.clone(),
            config.gemini.max_prompt_chars,
        );

        Ok(Self {
            crawl: config.crawl.clone(),
            allow_localhost: false,
            github,
            gemini,
            extractor,
            store_config: config.store.clone(),
            default_store,
            site_name: config.site.name.clone(),
        })
    }

    /// Allow crawling localhost/private IPs (local previews and tests).
    pub fn allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }

    pub fn gemini(&self) -> &GeminiClient {
        &self.gemini
    }

    pub fn site_name(&self) -> &str {
        &self.site_name
    }

    pub fn default_store(&self) -> &Arc<dyn TabularStore> {
        &self.default_store
    }

    /// `crawl` stage.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn crawl(&self, url: &str, progress: &dyn CrawlProgress) -> Result<CrawlResult> {
        let url = url.trim();
        if url.is_empty() {
            return Err(SiteError::validation("url is required"));
        }
        let seed = Url::parse(url)
            .map_err(|e| SiteError::validation(format!("invalid url '{url}': {e}")))?;

        let mut crawler = Crawler::new(self.crawl.clone())?;
        if self.allow_localhost {
            crawler = crawler.allow_localhost();
        }
        crawler.crawl(&seed, progress).await
    }

    /// `github` stage.
    pub async fn github(&self, url: &str) -> Result<Vec<NormalizedFile>> {
        if url.trim().is_empty() {
            return Err(SiteError::validation("url is required"));
        }
        self.github.fetch_repo(url).await
    }

    /// `zip` stage. An archive without importable files is an error.
    pub fn zip(&self, bytes: &[u8]) -> Result<Vec<NormalizedFile>> {
        let files = extract_zip_contents(bytes)?;
        if files.is_empty() {
            return Err(SiteError::validation(
                "archive contains no importable files (html, htm, md, json, txt)",
            ));
        }
        Ok(files)
    }

    /// `analyze` stage.
    pub async fn analyze(
        &self,
        source: &SourceData,
        source_type: SourceType,
        caller_key: Option<&str>,
    ) -> Result<ExtractedContent> {
        self.extractor.extract(source, source_type, caller_key).await
    }

    /// `write` stage.
    ///
    /// With a destination key the rows go to that caller's spreadsheet (a new
    /// one when no id is given); otherwise to the server's own store.
    #[instrument(skip_all, fields(remote = destination.key.is_some()))]
    pub async fn write(
        &self,
        content: &ExtractedContent,
        destination: &Destination,
    ) -> Result<WriteOutcome> {
        let start_time = Instant::now();
        if content.is_empty() {
            return Err(SiteError::validation("content has no categories to write"));
        }

        let key = destination.key.as_deref().map(str::trim).filter(|k| !k.is_empty());
        let id = destination.id.as_deref().map(str::trim).filter(|i| !i.is_empty());

        let (store, spreadsheet_id): (Arc<dyn TabularStore>, Option<String>) = match (key, id) {
            (Some(key), Some(id)) => {
                let sheets = SheetsStore::new(&self.store_config, id, key)?;
                sheets.ensure_headers().await?;
                (Arc::new(sheets), Some(id.to_string()))
            }
            (Some(key), None) => {
                let title = format!("{} Website", self.site_name);
                let sheets = SheetsStore::create_spreadsheet(&self.store_config, key, &title).await?;
                let id = sheets.spreadsheet_id().to_string();
                (Arc::new(sheets), Some(id))
            }
            (None, _) => (self.default_store.clone(), None),
        };

        let report = write_imported_content(store.as_ref(), content).await;

        let payload = json!({ "counts": report.counts, "failures": report.failures.len() });
        if let Err(e) = append_event(store.as_ref(), "content.imported", "site-import", &payload).await {
            warn!(error = %e, "import event not recorded");
        }

        info!(
            complete = report.is_complete(),
            duration_ms = start_time.elapsed().as_millis(),
            "write stage finished"
        );
        Ok(WriteOutcome {
            report,
            spreadsheet_id,
        })
    }
}
