//! Text decoding for style sheets, scripts and XSL sheets.
//!
//! Encoding is picked from, in order: a byte order mark, the response's
//! `charset` parameter, a leading `@charset "...";` rule (style sheets only),
//! the request's charset hint, and finally UTF-8. Malformed sequences are
//! replaced rather than rejected.

use encoding_rs::{Encoding, UTF_8};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    StyleSheet,
    Script,
    Xml,
}

pub fn decode_text(
    bytes: &[u8],
    kind: TextKind,
    response_charset: Option<&str>,
    hint: Option<&str>,
) -> String {
    if bytes.is_empty() {
        return String::new();
    }

    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return text.into_owned();
    }

    let encoding = response_charset
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .or_else(|| match kind {
            TextKind::StyleSheet => charset_rule(bytes),
            _ => None,
        })
        .or_else(|| hint.and_then(|label| Encoding::for_label(label.as_bytes())))
        .unwrap_or(UTF_8);

    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

/// `@charset "label";` at the very start of a style sheet.
fn charset_rule(bytes: &[u8]) -> Option<&'static Encoding> {
    const PREFIX: &[u8] = b"@charset \"";
    let rest = bytes.strip_prefix(PREFIX)?;
    let end = rest.iter().take(64).position(|&b| b == b'"')?;
    if rest.get(end + 1) != Some(&b';') {
        return None;
    }
    let encoding = Encoding::for_label(&rest[..end])?;
    // An ASCII-incompatible label in an ASCII-readable rule means UTF-8.
    if encoding == encoding_rs::UTF_16BE || encoding == encoding_rs::UTF_16LE {
        return Some(UTF_8);
    }
    Some(encoding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bom_wins() {
        let bytes = b"\xEF\xBB\xBFbody { color: red }";
        let text = decode_text(bytes, TextKind::StyleSheet, Some("iso-8859-1"), None);
        assert_eq!(text, "body { color: red }");
    }

    #[test]
    fn test_response_charset() {
        let bytes = b"caf\xE9";
        assert_eq!(decode_text(bytes, TextKind::Script, Some("windows-1252"), None), "café");
    }

    #[test]
    fn test_charset_rule_for_style_sheets_only() {
        let bytes = b"@charset \"windows-1252\"; a::after { content: \"\xE9\" }";
        assert!(decode_text(bytes, TextKind::StyleSheet, None, None).contains('é'));
        assert!(decode_text(bytes, TextKind::Script, None, None).contains('\u{FFFD}'));
    }

    #[test]
    fn test_hint_and_fallback() {
        let bytes = b"caf\xE9";
        assert_eq!(decode_text(bytes, TextKind::Xml, None, Some("latin1")), "café");
        assert_eq!(decode_text(bytes, TextKind::Xml, None, None), "caf\u{FFFD}");
    }
}
