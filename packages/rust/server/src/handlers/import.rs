//! The site-import endpoint.
//!
//! Every stage is its own request. Source stages return their full payload in
//! `_crawlData` / `_fileData`; the caller echoes it back to `analyze`, then
//! sends the resulting `content` to `write`. Nothing is kept between calls.

use axum::Json;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{info, instrument};

use ecospray_core::{Destination, SourceData};
use ecospray_crawler::SilentProgress;
use ecospray_shared::{
    CrawlResult, ExtractedContent, FileBundle, NormalizedFile, SiteError, SourceType,
};

use crate::AppState;
use crate::error::ApiError;

/// JSON body of a stage call.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    action: Option<String>,
    url: Option<String>,
    #[serde(alias = "_crawlData")]
    crawl_data: Option<CrawlResult>,
    #[serde(alias = "_fileData")]
    file_data: Option<FileBundle>,
    source_type: Option<String>,
    gemini_key: Option<String>,
    content: Option<ExtractedContent>,
    destination_key: Option<String>,
    destination_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Crawl,
    Github,
    Zip,
    Analyze,
    Write,
}

impl std::str::FromStr for Action {
    type Err = SiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "crawl" => Ok(Self::Crawl),
            "github" => Ok(Self::Github),
            "zip" => Ok(Self::Zip),
            "analyze" => Ok(Self::Analyze),
            "write" => Ok(Self::Write),
            other => Err(SiteError::validation(format!(
                "unknown action '{other}' (expected crawl, github, zip, analyze or write)"
            ))),
        }
    }
}

/// `POST /api/import`: JSON stage calls, or a multipart ZIP upload.
pub async fn import(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<Value>, ApiError> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    if is_multipart {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|rejection| SiteError::validation(rejection.body_text()))?;
        return zip_upload(&state, multipart).await;
    }

    let Json(body) = Json::<ImportRequest>::from_request(request, &state)
        .await
        .map_err(|rejection| SiteError::validation(rejection.body_text()))?;
    run_stage(&state, body).await.map(Json)
}

async fn run_stage(state: &AppState, body: ImportRequest) -> Result<Value, ApiError> {
    let action: Action = body
        .action
        .as_deref()
        .ok_or_else(|| SiteError::validation("action is required"))?
        .parse()?;

    match action {
        Action::Crawl => {
            let url = body.url.unwrap_or_default();
            let result = state.import.crawl(&url, &SilentProgress).await?;
            Ok(crawl_summary(result))
        }
        Action::Github => {
            let url = body.url.unwrap_or_default();
            let files = state.import.github(&url).await?;
            Ok(files_summary("github", files))
        }
        Action::Zip => Err(SiteError::validation(
            "zip archives must be uploaded as multipart/form-data with a 'file' field",
        )
        .into()),
        Action::Analyze => analyze(state, body).await,
        Action::Write => write(state, body).await,
    }
}

#[instrument(skip_all)]
async fn analyze(state: &AppState, body: ImportRequest) -> Result<Value, ApiError> {
    let (source, inferred) = match (body.crawl_data, body.file_data) {
        (Some(crawl), _) => (SourceData::Crawl(crawl), Some(SourceType::Url)),
        (None, Some(bundle)) => (SourceData::Files(bundle.files), None),
        (None, None) => {
            return Err(SiteError::validation("crawlData or fileData is required").into());
        }
    };
    let source_type = match body.source_type.as_deref() {
        Some(raw) => raw.parse::<SourceType>()?,
        None => inferred.ok_or_else(|| SiteError::validation("sourceType is required"))?,
    };

    let content = state
        .import
        .analyze(&source, source_type, body.gemini_key.as_deref())
        .await?;
    Ok(json!({ "content": content }))
}

async fn write(state: &AppState, body: ImportRequest) -> Result<Value, ApiError> {
    let content = body
        .content
        .ok_or_else(|| SiteError::validation("content is required"))?;
    let destination = Destination {
        key: body.destination_key,
        id: body.destination_id,
    };

    let outcome = state.import.write(&content, &destination).await?;
    if !outcome.report.is_complete() {
        return Err(outcome.into());
    }

    let mut response = Map::new();
    response.insert("written".into(), Value::Bool(true));
    response.insert("counts".into(), json!(outcome.report.counts));
    if let Some(id) = outcome.spreadsheet_id {
        response.insert("spreadsheetId".into(), Value::String(id));
    }
    Ok(Value::Object(response))
}

/// Multipart upload: `file` is the archive, `geminiKey` optionally runs
/// `analyze` in the same request.
#[instrument(skip_all)]
async fn zip_upload(state: &AppState, mut multipart: Multipart) -> Result<Json<Value>, ApiError> {
    let mut archive = None;
    let mut gemini_key = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| SiteError::validation(e.body_text()))?
    {
        match field.name() {
            Some("file") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| SiteError::validation(e.body_text()))?;
                archive = Some(bytes);
            }
            Some("geminiKey") => {
                let key = field
                    .text()
                    .await
                    .map_err(|e| SiteError::validation(e.body_text()))?;
                gemini_key = Some(key.trim().to_string()).filter(|k| !k.is_empty());
            }
            _ => {}
        }
    }

    let archive = archive.ok_or_else(|| SiteError::validation("file is required"))?;
    let files = state.import.zip(&archive)?;
    info!(bytes = archive.len(), files = files.len(), "archive accepted");

    let content = match gemini_key.as_deref() {
        Some(key) => Some(
            state
                .import
                .analyze(&SourceData::Files(files.clone()), SourceType::Zip, Some(key))
                .await?,
        ),
        None => None,
    };

    let mut response = files_summary("zip", files);
    if let (Some(content), Value::Object(map)) = (content, &mut response) {
        map.insert("content".into(), json!(content));
    }
    Ok(Json(response))
}

fn crawl_summary(result: CrawlResult) -> Value {
    let pages: Vec<Value> = result
        .pages
        .iter()
        .map(|page| {
            json!({
                "url": page.url,
                "title": page.title,
                "chars": page.text.chars().count(),
            })
        })
        .collect();

    json!({
        "source": "url",
        "pageCount": result.pages.len(),
        "imageCount": result.images.len(),
        "emails": result.emails,
        "phones": result.phones,
        "pages": pages,
        "errors": result.errors,
        "_crawlData": result,
    })
}

fn files_summary(source: &str, files: Vec<NormalizedFile>) -> Value {
    let summaries: Vec<Value> = files
        .iter()
        .map(|file| json!({ "path": file.path, "chars": file.content.chars().count() }))
        .collect();

    json!({
        "source": source,
        "fileCount": files.len(),
        "files": summaries,
        "_fileData": FileBundle { files },
    })
}
