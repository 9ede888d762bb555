//! Article identity (§3, §4.2). Two articles with the same
//! fingerprint are the same article for dedup purposes; nothing else
//! observes URL equality directly.
use sha2::{Digest, Sha256};

use crate::types::RawArticle;

/// Strip scheme, `www.`, trailing slash, and query/fragment so that
/// trivially-equivalent URLs canonicalize to the same identity.
fn normalize_url(url: &str) -> String {
    let without_scheme = url.trim_start_matches("https://").trim_start_matches("http://");
    let without_www = without_scheme.strip_prefix("www.").unwrap_or(without_scheme);
    let without_fragment = without_www.split('#').next().unwrap_or(without_www);
    let without_query = without_fragment.split('?').next().unwrap_or(without_fragment);
    without_query.trim_end_matches('/').to_lowercase()
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compute the fingerprint for a freshly-fetched article. Prefers the
/// normalized URL; falls back to `title+source+published_date` when the URL
/// is missing or empty so that adapters without stable links still dedup
/// (§4.2 edge case).
pub fn compute(raw: &RawArticle) -> String {
    if raw.url.trim().is_empty() {
        let date = raw.published_at.format("%Y-%m-%d").to_string();
        let basis = format!("title:{}|source:{}|date:{date}", raw.title.trim().to_lowercase(), raw.source.trim().to_lowercase());
        return sha256_hex(&basis);
    }
    sha256_hex(&normalize_url(&raw.url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn raw(url: &str) -> RawArticle {
        RawArticle {
            title: "Example Headline".into(),
            summary: "s".into(),
            full_text: None,
            url: url.into(),
            source: "Example Wire".into(),
            author: None,
            published_at: Utc::now(),
            language: None,
            categories: vec![],
            keywords: vec![],
            query: "q".into(),
        }
    }

    #[test]
    fn scheme_and_www_and_trailing_slash_are_equivalent() {
        let a = compute(&raw("https://www.example.com/story/1/"));
        let b = compute(&raw("http://example.com/story/1"));
        assert_eq!(a, b);
    }

    #[test]
    fn query_and_fragment_are_ignored() {
        let a = compute(&raw("https://example.com/story/1?utm_source=x"));
        let b = compute(&raw("https://example.com/story/1#section"));
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_paths_diverge() {
        let a = compute(&raw("https://example.com/story/1"));
        let b = compute(&raw("https://example.com/story/2"));
        assert_ne!(a, b);
    }

    #[test]
    fn missing_url_falls_back_to_title_source_date() {
        let mut r = raw("");
        let fp1 = compute(&r);
        r.title = "Different Headline".into();
        let fp2 = compute(&r);
        assert_ne!(fp1, fp2);
    }
}
