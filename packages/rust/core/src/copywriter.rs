//! Marketing copy drafts for the admin editor.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use ecospray_shared::{Result, SiteError};

use crate::gemini::{GeminiClient, ResponseMode};

/// What the admin is drafting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyKind {
    Page,
    Service,
    BlogPost,
    Tagline,
}

impl CopyKind {
    fn instructions(&self) -> &'static str {
        match self {
            CopyKind::Page => {
                "Write website page copy: a short hero heading, a one-sentence subheading, \
                 then two to four short paragraphs."
            }
            CopyKind::Service => {
                "Write a service description: one summary sentence, then a paragraph on \
                 benefits and a short bulleted list of features."
            }
            CopyKind::BlogPost => {
                "Write a blog post of roughly 500 words with a title line and Markdown \
                 subheadings."
            }
            CopyKind::Tagline => "Write one tagline of at most ten words. Return only the tagline.",
        }
    }
}

/// Ask the model for plain marketing copy and return the trimmed text.
#[instrument(skip_all, fields(kind = ?kind))]
pub async fn draft_copy(
    gemini: &GeminiClient,
    site_name: &str,
    brief: &str,
    kind: CopyKind,
    caller_key: Option<&str>,
) -> Result<String> {
    let brief = brief.trim();
    if brief.is_empty() {
        return Err(SiteError::validation("prompt is required"));
    }

    let prompt = format!(
        "You write marketing copy for {site_name}, a spray-foam insulation contractor. \
         Tone: friendly, confident, plain language, no exaggerated claims.\n{}\n\nBrief: {brief}",
        kind.instructions()
    );

    let text = gemini
        .generate(caller_key, &prompt, ResponseMode::Text)
        .await?;
    Ok(text.trim().to_string())
}
