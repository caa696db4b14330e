//! MIME allow-lists used by the typed accessors.

const JAVASCRIPT_MIME_TYPES: &[&str] = &[
    "application/ecmascript",
    "application/javascript",
    "application/x-ecmascript",
    "application/x-javascript",
    "text/ecmascript",
    "text/javascript",
    "text/javascript1.0",
    "text/javascript1.1",
    "text/javascript1.2",
    "text/javascript1.3",
    "text/javascript1.4",
    "text/javascript1.5",
    "text/jscript",
    "text/livescript",
    "text/x-ecmascript",
    "text/x-javascript",
];

const SVG_DOCUMENT_MIME_TYPES: &[&str] = &[
    "image/svg+xml",
    "text/xml",
    "application/xml",
    "application/xhtml+xml",
];

const XSL_MIME_TYPES: &[&str] = &[
    "text/xsl",
    "text/xml",
    "application/xml",
    "application/xhtml+xml",
    "application/rss+xml",
    "application/atom+xml",
];

pub fn is_supported_javascript_mime_type(mime_type: &str) -> bool {
    JAVASCRIPT_MIME_TYPES.contains(&mime_type.to_ascii_lowercase().as_str())
}

/// Types that are never executed as script, with or without `nosniff`.
pub fn is_blocked_script_mime_type(mime_type: &str) -> bool {
    let mime_type = mime_type.to_ascii_lowercase();
    mime_type.starts_with("image/")
        || mime_type.starts_with("audio/")
        || mime_type.starts_with("video/")
        || mime_type == "text/csv"
}

/// `X-Content-Type-Options: nosniff`. Only the first token counts.
pub fn is_nosniff(header: Option<&str>) -> bool {
    header
        .and_then(|value| value.split(',').next())
        .is_some_and(|token| token.trim().eq_ignore_ascii_case("nosniff"))
}

pub fn is_style_sheet_mime_type(mime_type: &str) -> bool {
    mime_type.is_empty()
        || mime_type.eq_ignore_ascii_case("text/css")
        || mime_type.eq_ignore_ascii_case("application/x-unknown-content-type")
}

pub fn is_svg_document_mime_type(mime_type: &str) -> bool {
    SVG_DOCUMENT_MIME_TYPES.contains(&mime_type.to_ascii_lowercase().as_str())
}

pub fn is_xsl_mime_type(mime_type: &str) -> bool {
    XSL_MIME_TYPES.contains(&mime_type.to_ascii_lowercase().as_str())
}
