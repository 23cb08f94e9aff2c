//! HTML string helpers.
//!
//! - `escape_attr()` - attribute value escaping
//! - `inject_before_body_end()` / `inject_into_head()` - script injection

use std::borrow::Cow;

/// Escape HTML special characters for use inside a quoted attribute.
///
/// Uses `Cow` to avoid allocation when no escaping is needed.
pub fn escape_attr(s: &str) -> Cow<'_, str> {
    const SPECIAL: [char; 5] = ['<', '>', '&', '"', '\''];
    if !s.contains(SPECIAL) {
        return Cow::Borrowed(s);
    }

    let mut result = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '&' => result.push_str("&amp;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#39;"),
            _ => result.push(c),
        }
    }
    Cow::Owned(result)
}

/// Insert `snippet` before the last `</body>`, or append it when absent
/// (browsers handle this gracefully).
pub fn inject_before_body_end(content: &str, snippet: &str) -> String {
    match find_tag(content, b"</body>", true) {
        Some(pos) => splice(content, pos, snippet),
        None => format!("{content}{snippet}"),
    }
}

/// Insert `snippet` before the first `</head>`, or prepend it when absent.
pub fn inject_into_head(content: &str, snippet: &str) -> String {
    match find_tag(content, b"</head>", false) {
        Some(pos) => splice(content, pos, snippet),
        None => format!("{snippet}{content}"),
    }
}

/// Byte offset of a case-insensitive ASCII tag.
fn find_tag(content: &str, tag: &[u8], last: bool) -> Option<usize> {
    let mut windows = content.as_bytes().windows(tag.len());
    if last {
        windows.rposition(|w| w.eq_ignore_ascii_case(tag))
    } else {
        windows.position(|w| w.eq_ignore_ascii_case(tag))
    }
}

/// `pos` is the start of an ASCII `<`, so it is a char boundary.
fn splice(content: &str, pos: usize, snippet: &str) -> String {
    let mut result = String::with_capacity(content.len() + snippet.len());
    result.push_str(&content[..pos]);
    result.push_str(snippet);
    result.push_str(&content[pos..]);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_attr() {
        assert_eq!(escape_attr("app"), "app");
        assert!(matches!(escape_attr("app"), Cow::Borrowed(_)));
        assert_eq!(escape_attr("a\"b<c>"), "a&quot;b&lt;c&gt;");
    }

    #[test]
    fn test_body_injection() {
        assert_eq!(
            inject_before_body_end("<body><p>hi</p></body>", "<s></s>"),
            "<body><p>hi</p><s></s></body>"
        );
        // Uppercase tag, last occurrence
        assert_eq!(
            inject_before_body_end("<p>\"</body>\"</p></BODY>", "X"),
            "<p>\"</body>\"</p>X</BODY>"
        );
        assert_eq!(inject_before_body_end("<p>hi</p>", "X"), "<p>hi</p>X");
    }

    #[test]
    fn test_head_injection() {
        assert_eq!(
            inject_into_head("<head><title>t</title></head><body></body>", "X"),
            "<head><title>t</title>X</head><body></body>"
        );
        assert_eq!(inject_into_head("<p>hi</p>", "X"), "X<p>hi</p>");
    }

    #[test]
    fn test_injection_keeps_multibyte_text() {
        assert_eq!(
            inject_before_body_end("<body>héllo wörld</body>", "X"),
            "<body>héllo wörldX</body>"
        );
    }
}
