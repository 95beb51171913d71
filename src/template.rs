//! Template rendering: `{name}` substitution and Markdown-style links.
//!
//! Templates are markup written by the user; substituted values come from pages and
//! are escaped before they enter the HTML rendering. Plain text is derived from that
//! HTML, rendering a link as `text (url)` so neither part is lost.

use crate::protocol::PageInfo;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

pub const CURRENT_PAGE_URL: &str = "CURRENT_PAGE_URL";
pub const CURRENT_PAGE_TITLE: &str = "CURRENT_PAGE_TITLE";

/// Variables every template can use without binding them
pub const BUILT_IN_VARIABLES: [&str; 2] = [CURRENT_PAGE_URL, CURRENT_PAGE_TITLE];

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]+)\}").expect("placeholder pattern is valid"));

static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("link pattern is valid"));

static ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*"([^"]*)"[^>]*>(.*?)</a\s*>"#).expect("anchor pattern is valid")
});

static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("line break pattern is valid"));

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[A-Za-z!][^>]*>").expect("tag pattern is valid"));

static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[A-Za-z]+);").expect("entity pattern is valid")
});

/// A template rendered for the clipboard
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderedCopy {
    pub html: String,
    pub plain: String,
}

/// Distinct placeholder names in order of first appearance
pub fn extract_variable_names(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(template) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Replace every `{name}` that has a value; unknown placeholders are left as written
pub fn substitute(template: &str, values: &HashMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match values.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Rich rendering: links become anchors and newlines become `<br>`
pub fn render_html(text: &str) -> String {
    LINK.replace_all(text, r#"<a href="$2">$1</a>"#).replace('\n', "<br>")
}

/// Plain rendering of HTML: anchors become `text (url)`, `<br>` a newline, other
/// tags are dropped and entities decoded
pub fn render_plain(html: &str) -> String {
    let text = ANCHOR.replace_all(html, |caps: &Captures| {
        format!("{} ({})", TAG.replace_all(&caps[2], ""), &caps[1])
    });
    let text = LINE_BREAK.replace_all(&text, "\n");
    let text = TAG.replace_all(&text, "");
    decode_entities(&text)
}

/// Escape text for inclusion in HTML
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Decode character references; unknown named entities are kept as written
pub fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &Captures| {
            let entity = &caps[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .map(|hex| u32::from_str_radix(hex, 16))
                    .or_else(|| entity.strip_prefix('#').map(str::parse::<u32>))
                    .and_then(|code| code.ok())
                    .and_then(char::from_u32),
            };
            match decoded {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Substitute variable values and the page built-ins, then render both forms.
///
/// Built-ins take precedence over a bound variable of the same name. Every value
/// is HTML-escaped before substitution.
pub fn render(template: &str, values: &HashMap<String, String>, page: &PageInfo) -> RenderedCopy {
    let mut all: HashMap<String, String> = values.iter().map(|(k, v)| (k.clone(), escape_html(v))).collect();
    all.insert(CURRENT_PAGE_URL.to_string(), escape_html(&page.url));
    all.insert(CURRENT_PAGE_TITLE.to_string(), escape_html(&page.title));

    let html = render_html(&substitute(template, &all));
    let plain = render_plain(&html);
    RenderedCopy { html, plain }
}

/// Variable names matching a partially typed placeholder, built-ins first.
///
/// Matching is a case-insensitive substring test.
pub fn suggest_variables<'a>(partial: &str, bound: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let needle = partial.to_lowercase();
    let mut candidates: Vec<&str> = BUILT_IN_VARIABLES.to_vec();
    candidates.extend(bound);

    let mut suggestions: Vec<String> = Vec::new();
    for name in candidates {
        if name.to_lowercase().contains(&needle) && !suggestions.iter().any(|s| s == name) {
            suggestions.push(name.to_string());
        }
    }
    suggestions
}

/// The partial placeholder being typed at `cursor` (a byte offset), if any
pub fn placeholder_at(text: &str, cursor: usize) -> Option<&str> {
    let before = text.get(..cursor)?;
    let start = before.rfind(['{', '}', '\n'])?;
    if before[start..].starts_with('{') {
        Some(&before[start + 1..])
    } else {
        None
    }
}
