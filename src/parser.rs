use crate::classifier;
use crate::dates;
use crate::links;
use crate::models::ExtractionResult;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

// Wide enough that html2text never wraps a URL or a date across lines.
const TEXT_WIDTH: usize = 1_000;

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"));

/// Extracts category, raw date span and first link from a message.
///
/// Date and category are looked for in the subject and body together; the
/// link only in the body.
pub fn parse_email(subject: &str, body_html: &str) -> ExtractionResult {
    let plain = html_to_text(body_html);
    let content = format!("{subject} {plain}");

    ExtractionResult {
        category: Some(classifier::classify(&content)),
        date: dates::find_date_span(&content).map(str::to_string),
        link: links::find_first_link(&plain),
    }
}

/// Renders markup as plain text, falling back to stripping tags when the
/// renderer gives up. Attribute values such as `href` never reach the text.
pub fn html_to_text(body_html: &str) -> String {
    let rendered = html2text::config::plain()
        .link_footnotes(false)
        .string_from_read(body_html.as_bytes(), TEXT_WIDTH);
    match rendered {
        Ok(text) => text,
        Err(e) => {
            debug!(error = %e, "html rendering failed, stripping tags instead");
            strip_markup(body_html)
        }
    }
}

fn strip_markup(body_html: &str) -> String {
    TAG.replace_all(body_html, " ")
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
