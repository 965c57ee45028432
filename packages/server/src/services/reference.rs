//! Extraction and rewriting of resource references embedded in memory content.
//!
//! A reference is the target of a Markdown media embed, `![alt](token)` or
//! `![alt](token "title")`, whose token is a backend-relative resource path.
//! Embeds pointing at URLs, `data:` URIs or absolute paths are not references.

use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::utils::filename::validate_virtual_path;

static EMBED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"!\[([^\]]*)\]\(([^()\s]+)(\s+"[^"]*")?\)"#).expect("embed pattern is valid")
});

fn as_reference(token: &str) -> Option<&str> {
    validate_virtual_path(token).ok().map(|_| token)
}

/// The distinct resource paths embedded in `content`.
pub fn extract_references(content: &str) -> BTreeSet<String> {
    EMBED_RE
        .captures_iter(content)
        .filter_map(|caps| caps.get(2))
        .filter_map(|token| as_reference(token.as_str()))
        .map(str::to_string)
        .collect()
}

/// Replace every embedded reference that has an entry in `urls` with its URL.
///
/// Embeds without a resolution keep their original token.
pub fn rewrite_references(content: &str, urls: &HashMap<String, String>) -> String {
    EMBED_RE
        .replace_all(content, |caps: &Captures<'_>| {
            let token = &caps[2];
            match urls.get(token) {
                Some(url) if as_reference(token).is_some() => {
                    let title = caps.get(3).map_or("", |m| m.as_str());
                    format!("![{}]({url}{title})", &caps[1])
                }
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}
