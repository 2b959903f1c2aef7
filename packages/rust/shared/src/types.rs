//! Core domain types for the site-import pipeline.

use serde::{Deserialize, Serialize};

/// File extensions treated as importable text.
pub const TEXT_EXTENSIONS: &[&str] = &["html", "htm", "md", "json", "txt"];

/// Whether a path has one of the [`TEXT_EXTENSIONS`] (case-insensitive).
pub fn is_text_path(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => TEXT_EXTENSIONS
            .iter()
            .any(|allowed| ext.eq_ignore_ascii_case(allowed)),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Source data
// ---------------------------------------------------------------------------

/// One unit of decoded source text: a repository file or an archive entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedFile {
    pub path: String,
    pub content: String,
}

/// Bundle of normalized files, as echoed back by the import wizard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileBundle {
    pub files: Vec<NormalizedFile>,
}

/// A crawled page reduced to its title and visible text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawledPage {
    pub url: String,
    pub title: String,
    pub text: String,
}

/// A page that was discovered but could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageError {
    pub url: String,
    pub error: String,
}

/// Aggregate of a bounded same-origin crawl.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlResult {
    pub pages: Vec<CrawledPage>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub phones: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<PageError>,
}

/// Which extractor produced the source data handed to the AI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Url,
    Git,
    Zip,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Url => "url",
            Self::Git => "git",
            Self::Zip => "zip",
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = crate::SiteError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "url" => Ok(Self::Url),
            "git" | "github" => Ok(Self::Git),
            "zip" => Ok(Self::Zip),
            other => Err(crate::SiteError::validation(format!(
                "sourceType must be one of url, git, zip (got '{other}')"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// ExtractedContent
// ---------------------------------------------------------------------------

/// One content object as returned by the AI, keyed by column name.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Structured site content, shaped after the content tables.
///
/// `None` means the category was absent and is not written. `Some(vec![])`
/// is written as zero rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<Vec<Record>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<Record>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub testimonials: Option<Vec<Record>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blog_posts: Option<Vec<Record>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Vec<Record>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation: Option<Vec<Record>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_config: Option<Record>,
}

impl ExtractedContent {
    /// Names of the array-valued categories, in write order.
    pub const RECORD_CATEGORIES: [&'static str; 6] = [
        "pages",
        "services",
        "testimonials",
        "blog_posts",
        "stats",
        "navigation",
    ];

    /// The array-valued categories that are present, in write order.
    pub fn record_categories(&self) -> Vec<(&'static str, &[Record])> {
        let fields = [
            &self.pages,
            &self.services,
            &self.testimonials,
            &self.blog_posts,
            &self.stats,
            &self.navigation,
        ];
        Self::RECORD_CATEGORIES
            .into_iter()
            .zip(fields)
            .filter_map(|(name, records)| records.as_deref().map(|r| (name, r)))
            .collect()
    }

    /// Whether no category at all is present.
    pub fn is_empty(&self) -> bool {
        self.record_categories().is_empty() && self.site_config.is_none()
    }
}
