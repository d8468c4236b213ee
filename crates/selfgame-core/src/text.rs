//! Token-level text helpers shared by routing, dispatch and novelty checks.
//!
//! Tokenization is language-agnostic: runs of alphanumerics are split into
//! Latin words and CJK segments; CJK segments become character bigrams so
//! that similarity works without a segmenter.

use std::collections::BTreeSet;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "into", "that", "this", "are", "was", "will", "its",
    "our", "you", "your", "all", "any", "can", "per",
];

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{3040}'..='\u{30ff}'
        | '\u{3400}'..='\u{4dbf}'
        | '\u{4e00}'..='\u{9fff}'
        | '\u{ac00}'..='\u{d7af}'
        | '\u{f900}'..='\u{faff}')
}

/// Normalized similarity tokens of `text`.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    let lower = text.to_lowercase();
    let mut tokens = BTreeSet::new();
    let mut latin = String::new();
    let mut cjk: Vec<char> = Vec::new();

    let flush_latin = |latin: &mut String, tokens: &mut BTreeSet<String>| {
        if latin.chars().count() >= 2 && !STOP_WORDS.contains(&latin.as_str()) {
            tokens.insert(std::mem::take(latin));
        } else {
            latin.clear();
        }
    };
    let flush_cjk = |cjk: &mut Vec<char>, tokens: &mut BTreeSet<String>| {
        match cjk.len() {
            0 => {}
            1 => {
                tokens.insert(cjk[0].to_string());
            }
            _ => {
                for pair in cjk.windows(2) {
                    tokens.insert(pair.iter().collect());
                }
            }
        }
        cjk.clear();
    };

    for c in lower.chars() {
        if is_cjk(c) {
            flush_latin(&mut latin, &mut tokens);
            cjk.push(c);
        } else if c.is_alphanumeric() {
            flush_cjk(&mut cjk, &mut tokens);
            latin.push(c);
        } else {
            flush_latin(&mut latin, &mut tokens);
            flush_cjk(&mut cjk, &mut tokens);
        }
    }
    flush_latin(&mut latin, &mut tokens);
    flush_cjk(&mut cjk, &mut tokens);
    tokens
}

/// Sequence tokens for chunking: whitespace-separated words, with each CJK
/// character counted as its own token.
pub fn split_tokens(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for word in text.split_whitespace() {
        let mut current = String::new();
        for c in word.chars() {
            if is_cjk(c) {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
                out.push(c.to_string());
            } else {
                current.push(c);
            }
        }
        if !current.is_empty() {
            out.push(current);
        }
    }
    out
}

/// Jaccard similarity; `0.0` when both sets are empty.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Lowercased words of `text` for keyword matching. Unlike [`tokenize`]
/// nothing is dropped, so short keywords like "qa" still match.
fn keyword_words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() || is_cjk(c))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether `keyword` occurs in `haystack` (case-insensitive).
///
/// Keywords containing CJK characters match as substrings. Latin keywords
/// match whole words, and multi-word keywords match consecutive words. A
/// trailing `*` turns the last word into a prefix, so `evaluat*` matches
/// "evaluation" while `blocked` does not match "unblocked".
pub fn keyword_matches(haystack: &str, keyword: &str) -> bool {
    let keyword = keyword.trim().to_lowercase();
    if keyword.is_empty() {
        return false;
    }
    if keyword.chars().any(is_cjk) {
        return haystack.to_lowercase().contains(&keyword);
    }

    let (stem, prefix) = match keyword.strip_suffix('*') {
        Some(stem) => (stem, true),
        None => (keyword.as_str(), false),
    };
    let needle = keyword_words(stem);
    let Some((last, init)) = needle.split_last() else {
        return false;
    };
    let words = keyword_words(haystack);
    words.windows(needle.len()).any(|window| {
        let (tail, head) = (&window[needle.len() - 1], &window[..needle.len() - 1]);
        head == init && if prefix { tail.starts_with(last.as_str()) } else { tail == last }
    })
}

/// First keyword that occurs in `haystack`; see [`keyword_matches`].
pub fn find_keyword<'k>(haystack: &str, keywords: &'k [String]) -> Option<&'k str> {
    keywords
        .iter()
        .map(String::as_str)
        .find(|k| keyword_matches(haystack, k))
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
