//! E-mail and phone scanning across crawled pages.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b").expect("valid regex")
});

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+?1[-.\s]?)?(?:\(\d{3}\)|\b\d{3})[-.\s]?\d{3}[-.\s]?\d{4}\b")
        .expect("valid regex")
});

/// Asset names such as `logo@2x.png` look like addresses.
const ASSET_SUFFIXES: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".webp", ".svg"];

/// Order-preserving, deduplicated contact details found across a crawl.
#[derive(Debug, Default)]
pub struct ContactSet {
    emails: Vec<String>,
    phones: Vec<String>,
    seen_emails: HashSet<String>,
    seen_phones: HashSet<String>,
}

impl ContactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan raw page text and record any new matches.
    pub fn scan(&mut self, raw: &str) {
        for m in EMAIL_RE.find_iter(raw) {
            let email = m.as_str().to_ascii_lowercase();
            if ASSET_SUFFIXES.iter().any(|s| email.ends_with(s)) {
                continue;
            }
            if self.seen_emails.insert(email.clone()) {
                self.emails.push(email);
            }
        }

        for m in PHONE_RE.find_iter(raw) {
            let phone = m.as_str().trim().to_string();
            if self.seen_phones.insert(phone_key(&phone)) {
                self.phones.push(phone);
            }
        }
    }

    /// Fold another set into this one, keeping first-seen order.
    pub fn merge(&mut self, other: ContactSet) {
        for email in other.emails {
            if self.seen_emails.insert(email.clone()) {
                self.emails.push(email);
            }
        }
        for phone in other.phones {
            if self.seen_phones.insert(phone_key(&phone)) {
                self.phones.push(phone);
            }
        }
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<String>) {
        (self.emails, self.phones)
    }
}

/// Same number written two ways counts once.
fn phone_key(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    digits
        .strip_prefix('1')
        .filter(|rest| rest.len() == 10)
        .unwrap_or(&digits)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_first_seen_order() {
        let mut first = ContactSet::new();
        first.scan("info@ecospray.example.com (555) 123-4567");
        let mut second = ContactSet::new();
        second.scan("sales@ecospray.example.com 555-123-4567 INFO@ecospray.example.com");
        first.merge(second);
        let (emails, phones) = first.into_parts();
        assert_eq!(
            emails,
            vec!["info@ecospray.example.com", "sales@ecospray.example.com"]
        );
        assert_eq!(phones, vec!["(555) 123-4567"]);
    }

    #[test]
    fn finds_and_dedupes_emails() {
        let mut set = ContactSet::new();
        set.scan(r#"<a href="mailto:Info@EcoSpray.example.com">Info@EcoSpray.example.com</a>"#);
        set.scan("Questions? sales@ecospray.example.com or info@ecospray.example.com");
        let (emails, _) = set.into_parts();
        assert_eq!(
            emails,
            vec!["info@ecospray.example.com", "sales@ecospray.example.com"]
        );
    }

    #[test]
    fn skips_retina_asset_names() {
        let mut set = ContactSet::new();
        set.scan(r#"<img src="/img/logo@2x.png">"#);
        let (emails, _) = set.into_parts();
        assert!(emails.is_empty());
    }

    #[test]
    fn finds_and_dedupes_phones() {
        let mut set = ContactSet::new();
        set.scan("Call (555) 123-4567 today!");
        set.scan("Office: 555-123-4567, Fax: 555.987.6543");
        set.scan("Toll free +1 555 123 4567");
        let (_, phones) = set.into_parts();
        assert_eq!(phones, vec!["(555) 123-4567", "555.987.6543"]);
    }
}
