//! Non-crawl source readers for the site importer.
//!
//! Both readers normalize their source into [`NormalizedFile`]s holding only
//! decoded text from html, md, json and txt files.
//!
//! [`NormalizedFile`]: ecospray_shared::NormalizedFile

pub mod archive;
pub mod github;

pub use archive::extract_zip_contents;
pub use github::{GitHubFetcher, RepoRef, parse_repo_url};
