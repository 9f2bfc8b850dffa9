//! Keyword Extraction
//!
//! Token-level only: runs of CJK characters or ASCII alphanumerics, length
//! two or more, stopword-filtered, top-K by frequency. No embeddings, no
//! stemming; the inverted index is a lookup structure, not a ranker.

use std::collections::HashMap;

use crate::constants::{INDEX_KEYWORDS_PER_RECORD_COUNT_MAX, INDEX_TOKEN_CHARS_MIN};

/// Tokens never admitted to the index.
const STOPWORDS: &[&str] = &[
    // English
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "in",
    "is", "it", "its", "not", "of", "on", "or", "that", "the", "this", "to", "was", "were",
    "will", "with",
    // Chinese
    "的", "了", "是", "在", "有", "和", "就", "不", "人", "我", "到", "也", "这", "那", "你",
    "他", "她", "它", "们", "个",
];

fn is_cjk(c: char) -> bool {
    ('\u{4E00}'..='\u{9FFF}').contains(&c)
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || is_cjk(c)
}

/// Split text into candidate tokens.
///
/// A token boundary falls wherever the character class changes between ASCII
/// and CJK, so "缓存cache" yields two tokens.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut current_cjk = false;

    for c in text.chars() {
        if is_token_char(c) {
            let cjk = is_cjk(c);
            if !current.is_empty() && cjk != current_cjk {
                tokens.push(std::mem::take(&mut current));
            }
            current_cjk = cjk;
            current.extend(c.to_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
        .into_iter()
        .filter(|t| t.chars().count() >= INDEX_TOKEN_CHARS_MIN)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Extract the top-K keywords from content by frequency.
///
/// Ties break alphabetically so extraction is deterministic.
#[must_use]
pub fn extract_keywords(content: &str, top_k: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for token in tokenize(content) {
        *counts.entry(token).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(top_k);
    ranked.into_iter().map(|(token, _)| token).collect()
}

/// Extract keywords with the default per-record cap.
#[must_use]
pub fn extract_record_keywords(content: &str) -> Vec<String> {
    extract_keywords(content, INDEX_KEYWORDS_PER_RECORD_COUNT_MAX)
}
