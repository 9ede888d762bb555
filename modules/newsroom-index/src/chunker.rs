//! Splits an article into embeddable fragments (§4.3). No tokenizer crate
//! sits in the dependency stack, so token counts are approximated by
//! whitespace word count — close enough for the bounding rules, which only
//! need an order-of-magnitude token budget.
use newsroom_common::types::{Article, ChunkSource};

const TITLE_SUMMARY_BOUND_TOKENS: usize = 512;
const BODY_WINDOW_TOKENS: usize = 400;
const BODY_OVERLAP_TOKENS: usize = 40;
const MIN_CHUNK_TOKENS: usize = 40;

pub fn estimate_tokens(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDraft {
    pub ordinal: u32,
    pub text: String,
    pub token_count: u32,
    pub source: ChunkSource,
}

fn take_words(words: &[&str], limit: usize) -> String {
    words.iter().take(limit).copied().collect::<Vec<_>>().join(" ")
}

fn window_paragraph_words(words: &[&str]) -> Vec<Vec<&str>> {
    if words.len() <= BODY_WINDOW_TOKENS {
        return vec![words.to_vec()];
    }
    let mut windows = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + BODY_WINDOW_TOKENS).min(words.len());
        windows.push(words[start..end].to_vec());
        if end == words.len() {
            break;
        }
        start = end - BODY_OVERLAP_TOKENS;
    }
    windows
}

/// Build the body chunks from paragraph-delimited full text (§4.3): windowed
/// at ≤400 tokens with 40-token overlap, never splitting a paragraph unless
/// it alone exceeds the window.
fn chunk_body(full_text: &str) -> Vec<String> {
    let paragraphs: Vec<&str> = full_text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()).collect();

    let mut chunks: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for paragraph in paragraphs {
        let para_words: Vec<&str> = paragraph.split_whitespace().collect();

        if para_words.len() > BODY_WINDOW_TOKENS {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            chunks.extend(window_paragraph_words(&para_words));
            continue;
        }

        if current.len() + para_words.len() > BODY_WINDOW_TOKENS {
            let overlap_start = current.len().saturating_sub(BODY_OVERLAP_TOKENS);
            let carry: Vec<&str> = current[overlap_start..].to_vec();
            chunks.push(std::mem::take(&mut current));
            current = carry;
        }
        current.extend(para_words);
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    chunks.into_iter().map(|words| words.join(" ")).collect()
}

/// Produce the ordered chunk drafts for an article. Chunk 0 is always
/// title+summary; subsequent chunks come from `full_text` when present.
/// Chunks below the 40-token floor are dropped.
pub fn chunk_article(article: &Article) -> Vec<ChunkDraft> {
    let mut drafts = Vec::new();

    let head_words: Vec<&str> = format!("{} {}", article.title, article.summary).split_whitespace().collect::<Vec<_>>();
    let head_text = if head_words.is_empty() { String::new() } else { take_words(&head_words, TITLE_SUMMARY_BOUND_TOKENS) };
    if estimate_tokens(&head_text) as usize >= MIN_CHUNK_TOKENS || !head_text.is_empty() {
        drafts.push(ChunkDraft { ordinal: 0, token_count: estimate_tokens(&head_text), text: head_text, source: ChunkSource::Title });
    }

    if let Some(full_text) = &article.full_text {
        let mut ordinal = drafts.len() as u32;
        for body_chunk in chunk_body(full_text) {
            let token_count = estimate_tokens(&body_chunk);
            if (token_count as usize) < MIN_CHUNK_TOKENS {
                continue;
            }
            drafts.push(ChunkDraft { ordinal, text: body_chunk, token_count, source: ChunkSource::Body });
            ordinal += 1;
        }
    }

    drafts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn article_with_body(full_text: Option<String>) -> Article {
        Article {
            fingerprint: "fp".into(),
            title: "Headline words here".into(),
            summary: "A short summary of the story.".into(),
            full_text,
            url: "https://example.com/a".into(),
            source: "example".into(),
            author: None,
            published_at: Utc::now(),
            language: None,
            categories: vec![],
            keywords: vec![],
            query: "q".into(),
            discovered_at: Utc::now(),
            last_seen_at: Utc::now(),
            partially_indexed: false,
        }
    }

    #[test]
    fn title_and_summary_always_form_chunk_zero() {
        let article = article_with_body(None);
        let chunks = chunk_article(&article);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].ordinal, 0);
        assert_eq!(chunks[0].source, ChunkSource::Title);
        assert!(chunks[0].text.contains("Headline"));
    }

    #[test]
    fn long_body_is_windowed_with_overlap() {
        let long_body = (0..1000).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ");
        let article = article_with_body(Some(long_body));
        let chunks = chunk_article(&article);
        assert!(chunks.len() > 2);
        for c in &chunks[1..] {
            assert!(c.token_count <= 400);
        }
    }

    #[test]
    fn short_trailing_fragment_below_floor_is_dropped() {
        let body = format!("{} tiny", (0..450).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" "));
        let article = article_with_body(Some(body));
        let chunks = chunk_article(&article);
        for c in &chunks {
            assert!(c.token_count >= MIN_CHUNK_TOKENS as u32);
        }
    }
}
