//! HTML escaping for attribute values and text nodes.

use html_escape::{encode_double_quoted_attribute, encode_text};

/// Escape a value placed inside a double-quoted attribute.
pub fn attr(s: &str) -> String {
    encode_double_quoted_attribute(s).into_owned()
}

/// Escape a value placed between tags.
pub fn text(s: &str) -> String {
    encode_text(s).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_escapes_quotes() {
        let out = attr("x\" onclick=\"alert(1)");
        assert!(!out.contains('"'));
        assert!(out.starts_with("x&quot;"));
        assert_eq!(attr("a & b"), "a &amp; b");
    }

    #[test]
    fn test_text_escapes_markup() {
        assert_eq!(text("<b>&</b>"), "&lt;b&gt;&amp;&lt;/b&gt;");
        assert_eq!(text("plain"), "plain");
    }
}
