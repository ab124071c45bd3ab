//! URL extraction from pasted text and playlist detection.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s"'<>\[\]{}|\\^`]+"#).expect("valid regex"));

/// Characters that commonly follow a URL in prose and are never part of it.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', '\''];

/// Extracts http(s) URLs from raw input text.
///
/// URLs are returned in order of first appearance, without duplicates.
/// Trailing sentence punctuation is stripped; a closing parenthesis is kept
/// when the URL itself opened one.
///
/// # Panics
///
/// Panics if the internal URL regex fails to compile (this is a compile-time
/// constant and will not happen in practice).
#[must_use]
pub fn extract_urls(input: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut result = Vec::new();

    for m in URL_RE.find_iter(input) {
        let url = trim_trailing(m.as_str());
        if url.len() <= "https://".len() {
            continue;
        }
        if seen.insert(url.to_string()) {
            result.push(url.to_string());
        }
    }

    result
}

fn trim_trailing(mut url: &str) -> &str {
    while let Some(last) = url.chars().last() {
        if !TRAILING_PUNCTUATION.contains(&last) {
            break;
        }
        if last == ')' && url.matches('(').count() >= url.matches(')').count() {
            break;
        }
        url = &url[..url.len() - last.len_utf8()];
    }
    url
}

/// Returns `true` if `url` looks like it points at a playlist or album.
///
/// Recognises a `list=` query parameter, a `/playlist` path, `SoundCloud`
/// sets and `/album/` paths.
#[must_use]
pub fn looks_like_playlist(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    let (path, query) = lower.split_once('?').unwrap_or((lower.as_str(), ""));

    query.split('&').any(|pair| pair.starts_with("list="))
        || path.contains("/playlist")
        || (path.contains("soundcloud.com") && path.contains("/sets/"))
        || path.contains("/album/")
}
