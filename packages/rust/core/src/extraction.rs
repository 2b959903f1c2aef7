//! Structured content extraction through one generative-text call.
//!
//! The prompt does the unstructured-to-structured work; this module bounds what
//! goes into the prompt and validates what comes back.

use std::fmt::Write as _;
use std::time::Instant;

use serde_json::Value;
use tracing::{info, instrument, warn};

use ecospray_crawler::page::truncate_chars;
use ecospray_shared::{
    CrawlResult, ExtractedContent, NormalizedFile, Record, Result, SiteError, SourceType,
};
use ecospray_storage::Table;

use crate::gemini::{GeminiClient, ResponseMode};

/// Characters of one crawled page embedded in the prompt.
const MAX_PAGE_CHARS: usize = 4_000;

/// Characters of one repository or archive file embedded in the prompt.
const MAX_FILE_CHARS: usize = 6_000;

/// Source material handed to the extractor.
#[derive(Debug, Clone)]
pub enum SourceData {
    Crawl(CrawlResult),
    Files(Vec<NormalizedFile>),
}

impl SourceData {
    fn is_empty(&self) -> bool {
        match self {
            SourceData::Crawl(crawl) => crawl.pages.is_empty(),
            SourceData::Files(files) => files.is_empty(),
        }
    }
}

/// Turns crawled or fetched text into [`ExtractedContent`].
pub struct ContentExtractor {
    gemini: GeminiClient,
    site_name: String,
    max_prompt_chars: usize,
}

impl ContentExtractor {
    pub fn new(gemini: GeminiClient, site_name: impl Into<String>, max_prompt_chars: usize) -> Self {
        Self {
            gemini,
            site_name: site_name.into(),
            max_prompt_chars,
        }
    }

    /// Extract structured content with a single model call.
    #[instrument(skip_all, fields(source_type = source_type.as_str()))]
    pub async fn extract(
        &self,
        source: &SourceData,
        source_type: SourceType,
        caller_key: Option<&str>,
    ) -> Result<ExtractedContent> {
        let start_time = Instant::now();
        if source.is_empty() {
            return Err(SiteError::validation("source data is empty"));
        }
        // Fail on a missing key before building a large prompt.
        self.gemini.resolve_key(caller_key)?;

        let prompt = build_prompt(&self.site_name, source, source_type, self.max_prompt_chars);
        let raw = self
            .gemini
            .generate(caller_key, &prompt, ResponseMode::Json)
            .await?;
        let content = parse_extracted(&raw)?;

        info!(
            categories = content.record_categories().len(),
            site_config = content.site_config.is_some(),
            prompt_chars = prompt.chars().count(),
            duration_ms = start_time.elapsed().as_millis(),
            "content extracted"
        );
        Ok(content)
    }
}

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

/// Build the extraction prompt. Source text is capped per page or file and in
/// total at `max_chars` characters.
pub fn build_prompt(
    site_name: &str,
    source: &SourceData,
    source_type: SourceType,
    max_chars: usize,
) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "You are migrating the existing website of {site_name}, a spray-foam insulation \
         contractor, into a content management system."
    );
    let _ = writeln!(
        prompt,
        "Read the source material below and return ONE JSON object. Use only these keys; \
         each holds an array of objects with the listed fields (all values strings):"
    );
    for table in [
        Table::Pages,
        Table::Services,
        Table::Testimonials,
        Table::BlogPosts,
        Table::Stats,
        Table::Navigation,
    ] {
        let _ = writeln!(prompt, "- {}: {}", table.name(), table.columns().join(", "));
    }
    let _ = writeln!(
        prompt,
        "- site_config: a single object of setting name to string value \
         (business_name, phone, email, address, tagline, service_area)."
    );
    let _ = writeln!(
        prompt,
        "Omit a key entirely when the source has nothing for it. Never invent testimonials \
         or statistics. Use kebab-case slugs and status \"published\"."
    );
    let _ = writeln!(prompt, "\nSOURCE ({}):", source_type.as_str());

    let body = source_text(source);
    prompt.push_str(&truncate_chars(&body, max_chars));
    prompt
}

fn source_text(source: &SourceData) -> String {
    let mut out = String::new();
    match source {
        SourceData::Crawl(crawl) => {
            if !crawl.emails.is_empty() {
                let _ = writeln!(out, "Emails found: {}", crawl.emails.join(", "));
            }
            if !crawl.phones.is_empty() {
                let _ = writeln!(out, "Phones found: {}", crawl.phones.join(", "));
            }
            for page in &crawl.pages {
                let _ = writeln!(
                    out,
                    "\n=== PAGE {} | {} ===\n{}",
                    page.url,
                    page.title,
                    truncate_chars(&page.text, MAX_PAGE_CHARS)
                );
            }
        }
        SourceData::Files(files) => {
            for file in files {
                let _ = writeln!(
                    out,
                    "\n=== FILE {} ===\n{}",
                    file.path,
                    truncate_chars(&file.content, MAX_FILE_CHARS)
                );
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Remove a surrounding Markdown code fence, if any.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`) on the opening line, newline or not.
    let info_len = rest
        .find(|c: char| !c.is_ascii_alphanumeric() && c != '-' && c != '_')
        .unwrap_or(rest.len());
    let rest = &rest[info_len..];
    let rest = rest.trim_end();
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse and shape-check the model's reply.
pub fn parse_extracted(raw: &str) -> Result<ExtractedContent> {
    let text = strip_code_fence(raw);
    let value: Value = serde_json::from_str(text)
        .map_err(|e| SiteError::malformed(format!("response is not valid JSON: {e}")))?;

    let Value::Object(mut object) = value else {
        return Err(SiteError::malformed("response is not a JSON object"));
    };

    let mut take = |key: &str| -> Result<Option<Vec<Record>>> {
        match object.remove(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(record) => Ok(record),
                    _ => Err(SiteError::malformed(format!(
                        "'{key}' must be an array of objects"
                    ))),
                })
                .collect::<Result<Vec<_>>>()
                .map(Some),
            Some(_) => Err(SiteError::malformed(format!("'{key}' must be an array"))),
        }
    };

    let mut content = ExtractedContent {
        pages: take("pages")?,
        services: take("services")?,
        testimonials: take("testimonials")?,
        blog_posts: take("blog_posts")?,
        stats: take("stats")?,
        navigation: take("navigation")?,
        site_config: None,
    };

    content.site_config = match object.remove("site_config") {
        None | Some(Value::Null) => None,
        Some(Value::Object(config)) => Some(config),
        Some(_) => return Err(SiteError::malformed("'site_config' must be an object")),
    };

    if !object.is_empty() {
        let ignored: Vec<&String> = object.keys().collect();
        warn!(?ignored, "unknown top-level keys in AI response ignored");
    }

    Ok(content)
}
