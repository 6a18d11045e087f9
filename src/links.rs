use regex::Regex;
use std::sync::LazyLock;

static LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)https?://(?:www\.)?[-a-z0-9@:%._+~#=]{1,256}\.[a-z0-9()]{1,6}\b[-a-z0-9()@:%_+.~#?&/=]*",
    )
    .expect("link pattern is valid")
});

/// First http(s) URL in the body, verbatim. No attempt is made to tell a
/// join link from an unsubscribe link.
pub fn find_first_link(body_text: &str) -> Option<String> {
    LINK_PATTERN
        .find(body_text)
        .map(|m| m.as_str().to_string())
}
