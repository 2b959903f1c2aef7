//! ZIP archive unpacking for uploaded site exports.

use std::io::{Cursor, Read};

use tracing::{debug, info, instrument};
use zip::ZipArchive;

use ecospray_shared::{NormalizedFile, Result, SiteError, is_text_path};

/// Decode the text-like entries of a ZIP archive held in memory.
///
/// Directories, `__MACOSX` metadata, hidden files and entries that are not
/// valid UTF-8 are skipped. A binary-only archive yields an empty list.
#[instrument(skip_all, fields(bytes = bytes.len()))]
pub fn extract_zip_contents(bytes: &[u8]) -> Result<Vec<NormalizedFile>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| SiteError::validation(format!("not a readable ZIP archive: {e}")))?;

    let mut files = Vec::new();
    for i in 0..archive.len() {
        let mut entry = match archive.by_index(i) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(index = i, error = %e, "unreadable archive entry skipped");
                continue;
            }
        };

        let path = entry.name().to_string();
        if entry.is_dir() || path.starts_with("__MACOSX") {
            continue;
        }
        let filename = path.rsplit('/').next().unwrap_or(&path);
        if filename.starts_with('.') || !is_text_path(&path) {
            continue;
        }

        let mut raw = Vec::with_capacity(entry.size() as usize);
        if let Err(e) = entry.read_to_end(&mut raw) {
            debug!(%path, error = %e, "archive entry could not be read");
            continue;
        }
        match String::from_utf8(raw) {
            Ok(content) => files.push(NormalizedFile { path, content }),
            Err(_) => debug!(%path, "archive entry is not UTF-8, skipped"),
        }
    }

    info!(entries = archive.len(), files = files.len(), "archive unpacked");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, data) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, options).unwrap();
            } else {
                writer.start_file(*name, options).unwrap();
                writer.write_all(data).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn keeps_only_text_entries() {
        let bytes = build_zip(&[
            ("site/", b""),
            ("site/index.html", b"<h1>EcoSpray</h1>"),
            ("site/about.md", b"# About us"),
            ("site/logo.png", &[0x89, 0x50, 0x4e, 0x47]),
            ("__MACOSX/site/._index.html", b"junk"),
            ("site/.hidden.txt", b"secret"),
            ("site/broken.txt", &[0xff, 0xfe, 0x00]),
        ]);

        let files = extract_zip_contents(&bytes).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["site/index.html", "site/about.md"]);
        assert_eq!(files[0].content, "<h1>EcoSpray</h1>");
    }

    #[test]
    fn binary_only_archive_yields_nothing() {
        let bytes = build_zip(&[("a.png", &[1, 2, 3]), ("b.pdf", b"%PDF-1.4")]);
        let files = extract_zip_contents(&bytes).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn corrupt_archive_is_validation_error() {
        let err = extract_zip_contents(b"definitely not a zip").unwrap_err();
        assert!(matches!(err, SiteError::Validation { .. }));
    }
}
