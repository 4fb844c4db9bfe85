//! Cleanup of model output before it reaches the chat.

use std::sync::LazyLock;

use regex::Regex;

static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").unwrap());
static THINK_UNTERMINATED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*$").unwrap());
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

/// Strip reasoning blocks and markup tags from generated text.
///
/// Removes the first `<think>...</think>` block, then an unterminated
/// `<think>` through the end of the text, then every remaining `<...>` tag.
/// The result is trimmed and may be empty.
pub fn sanitize(raw: &str) -> String {
    let text = THINK_BLOCK.replace(raw, "");
    let text = THINK_UNTERMINATED.replace(&text, "");
    let text = TAG.replace_all(&text, "");
    text.trim().to_string()
}
