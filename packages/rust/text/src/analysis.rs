//! Word-level helpers used to score and classify articles.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

static NON_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bhttps?://[^\s)\]>]+").expect("valid regex"));

const STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "but", "by", "can", "could", "do", "does", "for", "from", "had", "has", "have", "how", "if",
    "in", "into", "is", "it", "its", "just", "more", "most", "not", "of", "on", "one", "or",
    "our", "out", "over", "so", "some", "than", "that", "the", "their", "them", "then", "there",
    "these", "they", "this", "to", "up", "use", "using", "was", "we", "what", "when", "which",
    "while", "who", "why", "will", "with", "you", "your",
];

/// Number of whitespace-delimited tokens.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Lowercase, strip punctuation, and collapse whitespace.
pub fn clean_text(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = NON_WORD_RE.replace_all(&lowered, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The `max` most frequent non-stopword terms of at least three letters.
///
/// Ties are broken by first appearance so the result is deterministic.
pub fn extract_keywords(text: &str, max: usize) -> Vec<String> {
    let cleaned = clean_text(text);

    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, word) in cleaned.split(' ').enumerate() {
        if word.chars().count() < 3 || STOPWORDS.contains(&word) {
            continue;
        }
        if word.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        counts.entry(word).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(&str, usize, usize)> = counts
        .into_iter()
        .map(|(word, (count, first))| (word, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    ranked
        .into_iter()
        .take(max)
        .map(|(word, _, _)| word.to_string())
        .collect()
}

/// Share of `keywords` that occur as words in `text`, in `[0, 1]`.
///
/// Multi-word keywords match as phrases. An empty keyword list scores 1.0.
pub fn calculate_relevance(text: &str, keywords: &[String]) -> f64 {
    let wanted: Vec<String> = keywords
        .iter()
        .map(|k| clean_text(k))
        .filter(|k| !k.is_empty())
        .collect();
    if wanted.is_empty() {
        return 1.0;
    }

    let haystack = format!(" {} ", clean_text(text));
    let hits = wanted
        .iter()
        .filter(|k| haystack.contains(&format!(" {k} ")))
        .count();

    hits as f64 / wanted.len() as f64
}

/// Number of http(s) URLs in `text`.
pub fn count_urls(text: &str) -> usize {
    URL_RE.find_iter(text).count()
}

/// URLs per word. Empty text has density 0.
pub fn link_density(text: &str) -> f64 {
    let words = word_count(text);
    if words == 0 {
        return 0.0;
    }
    count_urls(text) as f64 / words as f64
}

/// Share of alphabetic words longer than three letters written in capitals.
pub fn shouting_ratio(text: &str) -> f64 {
    let words: Vec<&str> = text
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphabetic()))
        .filter(|w| w.chars().count() > 3 && w.chars().all(char::is_alphabetic))
        .collect();
    if words.is_empty() {
        return 0.0;
    }

    let caps = words
        .iter()
        .filter(|w| w.chars().all(char::is_uppercase))
        .count();
    caps as f64 / words.len() as f64
}

/// Word `size`-grams of the cleaned text.
fn shingles(text: &str, size: usize) -> HashSet<String> {
    let cleaned = clean_text(text);
    let words: Vec<&str> = cleaned.split_whitespace().collect();
    if size == 0 || words.len() < size {
        return HashSet::new();
    }
    words.windows(size).map(|w| w.join(" ")).collect()
}

/// Share of `candidate`'s word `size`-grams that also occur in any of
/// `sources`, in [0, 1].
///
/// 1.0 means every run of `size` words in the candidate was copied from a
/// source. A candidate shorter than `size` words scores 0.0.
pub fn shingle_overlap(candidate: &str, sources: &[&str], size: usize) -> f64 {
    let own = shingles(candidate, size);
    if own.is_empty() {
        return 0.0;
    }

    let reference: HashSet<String> = sources.iter().flat_map(|s| shingles(s, size)).collect();
    let shared = own.iter().filter(|s| reference.contains(*s)).count();
    shared as f64 / own.len() as f64
}
