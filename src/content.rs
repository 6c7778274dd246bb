//! Rich post content.
//!
//! Posts are authored in a TipTap/ProseMirror editor and stored as its JSON
//! document (`{"type": "doc", "content": [...]}`). Posts written before the
//! editor existed store a plain HTML string instead; every function here
//! accepts both shapes.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

static IMG_SRC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<img\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).expect("static regex")
});
static BLOCK_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</(p|h[1-6]|li|blockquote|pre|div)>|<br\s*/?>").expect("static regex")
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("static regex"));

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ContentError {
    #[error("content must be an editor document or an HTML string")]
    NotADocument,
    #[error("document root must have type \"doc\", found {0:?}")]
    WrongRoot(String),
    #[error("document content must be an array")]
    ContentNotArray,
}

/// Accepts an editor document (root `type == "doc"`) or a legacy HTML string.
pub fn validate_document(value: &Value) -> Result<(), ContentError> {
    match value {
        Value::String(_) => Ok(()),
        Value::Object(map) => {
            let kind = map.get("type").and_then(Value::as_str).unwrap_or_default();
            if kind != "doc" {
                return Err(ContentError::WrongRoot(kind.to_string()));
            }
            match map.get("content") {
                None | Some(Value::Array(_)) => Ok(()),
                Some(_) => Err(ContentError::ContentNotArray),
            }
        }
        _ => Err(ContentError::NotADocument),
    }
}

fn node_type(map: &serde_json::Map<String, Value>) -> &str {
    map.get("type").and_then(Value::as_str).unwrap_or_default()
}

fn attr<'a>(map: &'a serde_json::Map<String, Value>, name: &str) -> Option<&'a Value> {
    map.get("attrs").and_then(|attrs| attrs.get(name))
}

fn push_unique(out: &mut Vec<String>, src: &str) {
    let src = src.trim();
    if !src.is_empty() && !out.iter().any(|seen| seen == src) {
        out.push(src.to_string());
    }
}

fn html_image_sources(html: &str, out: &mut Vec<String>) {
    for caps in IMG_SRC.captures_iter(html) {
        push_unique(out, &caps[1]);
    }
}

/// image_sources
///
/// Every image URL the content references, in document order, without duplicates.
pub fn image_sources(value: &Value) -> Vec<String> {
    fn walk(node: &Value, out: &mut Vec<String>) {
        match node {
            Value::String(html) => html_image_sources(html, out),
            Value::Array(items) => items.iter().for_each(|item| walk(item, out)),
            Value::Object(map) => {
                match node_type(map) {
                    "image" => {
                        if let Some(src) = attr(map, "src").and_then(Value::as_str) {
                            push_unique(out, src);
                        }
                    }
                    "html" => {
                        if let Some(html) = attr(map, "html").and_then(Value::as_str) {
                            html_image_sources(html, out);
                        }
                    }
                    _ => {}
                }
                if let Some(children) = map.get("content") {
                    walk(children, out);
                }
            }
            _ => {}
        }
    }

    let mut out = Vec::new();
    walk(value, &mut out);
    out
}

fn is_block(kind: &str) -> bool {
    matches!(
        kind,
        "paragraph" | "heading" | "blockquote" | "listItem" | "codeBlock" | "horizontalRule"
    )
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn normalize_lines(raw: &str) -> String {
    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// plain_text
///
/// Searchable text of the content: one line per block, whitespace collapsed.
pub fn plain_text(value: &Value) -> String {
    fn walk(node: &Value, out: &mut String) {
        match node {
            Value::Array(items) => items.iter().for_each(|item| walk(item, out)),
            Value::Object(map) => {
                let kind = node_type(map);
                match kind {
                    "text" => {
                        if let Some(text) = map.get("text").and_then(Value::as_str) {
                            out.push_str(text);
                        }
                    }
                    "hardBreak" => out.push('\n'),
                    _ => {}
                }
                if let Some(children) = map.get("content") {
                    walk(children, out);
                }
                if is_block(kind) && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }

    match value {
        Value::String(html) => {
            let with_breaks = BLOCK_END.replace_all(html, "\n");
            let stripped = TAG.replace_all(&with_breaks, "");
            normalize_lines(&decode_entities(&stripped))
        }
        other => {
            let mut raw = String::new();
            walk(other, &mut raw);
            normalize_lines(&raw)
        }
    }
}

/// excerpt
///
/// Cuts `text` to at most `max_chars` characters on a word boundary and marks the cut with `…`.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }

    let cut: String = flat.chars().take(max_chars).collect();
    // A cut right before a space already ends on a whole word.
    let on_boundary = flat.chars().nth(max_chars) == Some(' ');
    let trimmed = match cut.rfind(' ') {
        Some(idx) if idx > 0 && !on_boundary => &cut[..idx],
        _ => cut.as_str(),
    };
    format!(
        "{}…",
        trimmed.trim_end_matches(|c: char| c.is_ascii_punctuation() || c == ' ')
    )
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Rejects script-bearing URL schemes in links and image sources.
fn safe_url(url: &str) -> Option<&str> {
    let lowered = url.trim_start().to_ascii_lowercase();
    if lowered.starts_with("javascript:") || lowered.starts_with("vbscript:") {
        None
    } else {
        Some(url)
    }
}

fn render_text(map: &serde_json::Map<String, Value>, out: &mut String) {
    let text = map.get("text").and_then(Value::as_str).unwrap_or_default();
    let marks = map
        .get("marks")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut closers: Vec<&'static str> = Vec::new();
    for mark in marks {
        let Some(mark) = mark.as_object() else { continue };
        let (open, close) = match node_type(mark) {
            "bold" => ("<strong>".to_string(), "</strong>"),
            "italic" => ("<em>".to_string(), "</em>"),
            "strike" => ("<s>".to_string(), "</s>"),
            "underline" => ("<u>".to_string(), "</u>"),
            "code" => ("<code>".to_string(), "</code>"),
            "link" => {
                let Some(href) = attr(mark, "href").and_then(Value::as_str).and_then(safe_url)
                else {
                    continue;
                };
                (
                    format!(
                        "<a href=\"{}\" rel=\"noopener noreferrer\">",
                        escape_html(href)
                    ),
                    "</a>",
                )
            }
            _ => continue,
        };
        out.push_str(&open);
        closers.push(close);
    }

    out.push_str(&escape_html(text));
    for close in closers.into_iter().rev() {
        out.push_str(close);
    }
}

fn render_children(map: &serde_json::Map<String, Value>, out: &mut String) {
    if let Some(children) = map.get("content").and_then(Value::as_array) {
        for child in children {
            render_node(child, out);
        }
    }
}

fn wrap(tag: &str, map: &serde_json::Map<String, Value>, out: &mut String) {
    out.push('<');
    out.push_str(tag);
    out.push('>');
    render_children(map, out);
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

fn render_node(node: &Value, out: &mut String) {
    let Some(map) = node.as_object() else { return };

    match node_type(map) {
        "text" => render_text(map, out),
        "paragraph" => wrap("p", map, out),
        "heading" => {
            let level = attr(map, "level")
                .and_then(Value::as_u64)
                .unwrap_or(2)
                .clamp(1, 6);
            wrap(&format!("h{level}"), map, out);
        }
        "bulletList" => wrap("ul", map, out),
        "orderedList" => match attr(map, "start").and_then(Value::as_u64) {
            Some(start) if start != 1 => {
                out.push_str(&format!("<ol start=\"{start}\">"));
                render_children(map, out);
                out.push_str("</ol>");
            }
            _ => wrap("ol", map, out),
        },
        "listItem" => wrap("li", map, out),
        "blockquote" => wrap("blockquote", map, out),
        "codeBlock" => {
            match attr(map, "language").and_then(Value::as_str) {
                Some(lang) if !lang.is_empty() => out.push_str(&format!(
                    "<pre><code class=\"language-{}\">",
                    escape_html(lang)
                )),
                _ => out.push_str("<pre><code>"),
            }
            out.push_str(&escape_html(&plain_text_inline(map)));
            out.push_str("</code></pre>");
        }
        "hardBreak" => out.push_str("<br>"),
        "horizontalRule" => out.push_str("<hr>"),
        "image" => {
            let Some(src) = attr(map, "src").and_then(Value::as_str).and_then(safe_url) else {
                return;
            };
            out.push_str(&format!("<img src=\"{}\"", escape_html(src)));
            for name in ["alt", "title"] {
                if let Some(value) = attr(map, name).and_then(Value::as_str) {
                    out.push_str(&format!(" {name}=\"{}\"", escape_html(value)));
                }
            }
            out.push('>');
        }
        // Raw HTML blocks come from the admin-only editor and are emitted verbatim.
        "html" => {
            if let Some(html) = attr(map, "html").and_then(Value::as_str) {
                out.push_str(html);
            }
        }
        _ => render_children(map, out),
    }
}

/// Concatenated text of a node's children, keeping line breaks (for code blocks).
fn plain_text_inline(map: &serde_json::Map<String, Value>) -> String {
    map.get("content")
        .and_then(Value::as_array)
        .map(|children| {
            children
                .iter()
                .filter_map(|child| child.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// render_html
///
/// HTML for the public site. Legacy HTML content is returned unchanged.
pub fn render_html(value: &Value) -> String {
    match value {
        Value::String(html) => html.clone(),
        other => {
            let mut out = String::new();
            render_node(other, &mut out);
            out
        }
    }
}
