//! Application configuration for the EcoSpray backend.
//!
//! Config lives at `~/.ecospray/ecospray.toml`. CLI flags override config
//! file values, which override defaults. Secrets never live in the file: each
//! section names the environment variable that holds its secret.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SiteError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "ecospray.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".ecospray";

// ---------------------------------------------------------------------------
// Config structs (matching ecospray.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub crawl: CrawlConfig,

    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub gemini: GeminiConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub crm: CrmConfig,

    #[serde(default)]
    pub site: SiteConfig,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Name of the env var holding the admin bearer token.
    #[serde(default = "default_admin_key_env")]
    pub admin_key_env: String,

    /// Reject every admin request when no admin key is configured.
    /// Off by default, which leaves admin routes open without a key.
    #[serde(default)]
    pub require_admin_key: bool,

    /// Maximum accepted upload size for ZIP imports, in megabytes.
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            admin_key_env: default_admin_key_env(),
            require_admin_key: false,
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8080
}
fn default_admin_key_env() -> String {
    "ADMIN_KEY".into()
}
fn default_max_upload_mb() -> usize {
    25
}

/// `[crawl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Maximum number of pages fetched per crawl.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Maximum link depth from the seed URL.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Maximum concurrent page fetches.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-request timeout in seconds.
    #[serde(default = "default_crawl_timeout")]
    pub timeout_secs: u64,

    /// Delay in ms before each request.
    #[serde(default)]
    pub rate_limit_ms: u64,

    /// Visible text kept per page, in characters.
    #[serde(default = "default_max_page_chars")]
    pub max_page_chars: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            max_depth: default_max_depth(),
            concurrency: default_concurrency(),
            timeout_secs: default_crawl_timeout(),
            rate_limit_ms: 0,
            max_page_chars: default_max_page_chars(),
        }
    }
}

fn default_max_pages() -> usize {
    20
}
fn default_max_depth() -> u32 {
    2
}
fn default_concurrency() -> usize {
    4
}
fn default_crawl_timeout() -> u64 {
    15
}
fn default_max_page_chars() -> usize {
    20_000
}

/// `[github]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default = "default_github_api")]
    pub api_base: String,

    #[serde(default = "default_github_raw")]
    pub raw_base: String,

    /// Name of the env var holding an optional GitHub token.
    #[serde(default = "default_github_token_env")]
    pub token_env: String,

    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Files larger than this are not fetched.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    #[serde(default = "default_github_timeout")]
    pub timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: default_github_api(),
            raw_base: default_github_raw(),
            token_env: default_github_token_env(),
            max_files: default_max_files(),
            max_file_bytes: default_max_file_bytes(),
            timeout_secs: default_github_timeout(),
        }
    }
}

fn default_github_api() -> String {
    "https://api.github.com".into()
}
fn default_github_raw() -> String {
    "https://raw.githubusercontent.com".into()
}
fn default_github_token_env() -> String {
    "GITHUB_TOKEN".into()
}
fn default_max_files() -> usize {
    50
}
fn default_max_file_bytes() -> u64 {
    200_000
}
fn default_github_timeout() -> u64 {
    20
}

/// `[gemini]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Name of the env var holding the fallback API key.
    #[serde(default = "default_gemini_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_gemini_model")]
    pub model: String,

    #[serde(default = "default_gemini_base")]
    pub base_url: String,

    #[serde(default = "default_gemini_timeout")]
    pub timeout_secs: u64,

    /// Upper bound on source text embedded in one extraction prompt.
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_gemini_key_env(),
            model: default_gemini_model(),
            base_url: default_gemini_base(),
            timeout_secs: default_gemini_timeout(),
            max_prompt_chars: default_max_prompt_chars(),
        }
    }
}

fn default_gemini_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_gemini_model() -> String {
    "gemini-2.0-flash".into()
}
fn default_gemini_base() -> String {
    "https://generativelanguage.googleapis.com".into()
}
fn default_gemini_timeout() -> u64 {
    60
}
fn default_max_prompt_chars() -> usize {
    30_000
}

/// Which tabular store backend the server writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// libSQL file on local disk.
    #[default]
    Local,
    /// Google Sheets spreadsheet.
    Sheets,
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Database path for the local backend.
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Spreadsheet ID for the sheets backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spreadsheet_id: Option<String>,

    /// Name of the env var holding the Sheets OAuth access token.
    #[serde(default = "default_sheets_token_env")]
    pub access_token_env: String,

    #[serde(default = "default_sheets_base")]
    pub sheets_base_url: String,

    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            local_path: default_local_path(),
            spreadsheet_id: None,
            access_token_env: default_sheets_token_env(),
            sheets_base_url: default_sheets_base(),
            timeout_secs: default_store_timeout(),
        }
    }
}

fn default_local_path() -> String {
    "var/ecospray.db".into()
}
fn default_sheets_token_env() -> String {
    "SHEETS_ACCESS_TOKEN".into()
}
fn default_sheets_base() -> String {
    "https://sheets.googleapis.com".into()
}
fn default_store_timeout() -> u64 {
    30
}

/// `[crm]` section. The CRM is unconfigured while `base_url` is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_crm_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_crm_timeout")]
    pub timeout_secs: u64,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key_env: default_crm_key_env(),
            timeout_secs: default_crm_timeout(),
        }
    }
}

fn default_crm_key_env() -> String {
    "CRM_API_KEY".into()
}
fn default_crm_timeout() -> u64 {
    10
}

/// `[site]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_site_name")]
    pub name: String,

    /// Tag stamped on every lead captured by the website.
    #[serde(default = "default_source_tag")]
    pub source_tag: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: default_site_name(),
            source_tag: default_source_tag(),
        }
    }
}

fn default_site_name() -> String {
    "EcoSpray Insulation".into()
}
fn default_source_tag() -> String {
    "ecospray-website".into()
}

// ---------------------------------------------------------------------------
// Secret lookup
// ---------------------------------------------------------------------------

/// Read a non-empty secret from the named environment variable.
pub fn secret_from_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Some(val.trim().to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.ecospray/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| SiteError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.ecospray/ecospray.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SiteError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| SiteError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SiteError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SiteError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SiteError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("max_pages"));
        assert!(toml_str.contains("GEMINI_API_KEY"));
        assert!(!toml_str.contains("spreadsheet_id"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.crawl.max_depth, 2);
        assert_eq!(parsed.store.backend, StoreBackend::Local);
        assert_eq!(parsed.site.source_tag, "ecospray-website");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[store]
backend = "sheets"
spreadsheet_id = "abc123"

[crm]
base_url = "https://crm.example.com"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.store.backend, StoreBackend::Sheets);
        assert_eq!(config.store.spreadsheet_id.as_deref(), Some("abc123"));
        assert_eq!(config.store.access_token_env, "SHEETS_ACCESS_TOKEN");
        assert_eq!(config.crm.base_url.as_deref(), Some("https://crm.example.com"));
        assert_eq!(config.server.port, 8080);
        assert!(!config.server.require_admin_key);
    }

    #[test]
    fn missing_secret_is_none() {
        assert!(secret_from_env("ECOSPRAY_TEST_NONEXISTENT_KEY_12345").is_none());
    }
}
