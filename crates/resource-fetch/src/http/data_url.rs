//! `data:` URL decoding (RFC 2397).

use base64::Engine;
use bytes::Bytes;
use url::Url;

const DEFAULT_MIME_TYPE: &str = "text/plain";
const DEFAULT_CHARSET: &str = "US-ASCII";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataUrlError {
    #[error("URL scheme is not 'data'")]
    NotDataUrl,
    #[error("Missing comma in data URL")]
    MissingComma,
    #[error("Invalid base64 payload: {0}")]
    Base64(String),
    #[error("Invalid percent-escape at byte {0}")]
    PercentEscape(usize),
}

/// Decoded contents of a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub mime_type: String,
    pub charset: Option<String>,
    pub data: Bytes,
}

impl DataUrl {
    pub fn parse(url: &Url) -> Result<Self, DataUrlError> {
        if url.scheme() != "data" {
            return Err(DataUrlError::NotDataUrl);
        }
        let mut without_fragment = url.clone();
        without_fragment.set_fragment(None);
        let serialized = without_fragment.as_str();
        let rest = &serialized["data:".len()..];
        let (metadata, payload) = rest.split_once(',').ok_or(DataUrlError::MissingComma)?;

        let mut params = metadata.split(';');
        let media_type = params.next().unwrap_or("").trim();
        let mut is_base64 = false;
        let mut charset = None;
        for param in params {
            let param = param.trim();
            if param.eq_ignore_ascii_case("base64") {
                is_base64 = true;
            } else if let Some((name, value)) = param.split_once('=')
                && name.trim().eq_ignore_ascii_case("charset")
            {
                charset = Some(value.trim().trim_matches('"').to_string());
            }
        }

        let mime_type = if media_type.is_empty() {
            if charset.is_none() {
                charset = Some(DEFAULT_CHARSET.to_string());
            }
            DEFAULT_MIME_TYPE.to_string()
        } else {
            media_type.to_ascii_lowercase()
        };

        let decoded = percent_decode(payload)?;
        let data = if is_base64 {
            decode_base64(&decoded)?
        } else {
            decoded
        };

        Ok(Self {
            mime_type,
            charset,
            data: Bytes::from(data),
        })
    }
}

/// Base64 with ASCII whitespace tolerated.
fn decode_base64(input: &[u8]) -> Result<Vec<u8>, DataUrlError> {
    let cleaned: Vec<u8> = input
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    base64::engine::general_purpose::STANDARD
        .decode(&cleaned)
        .map_err(|e| DataUrlError::Base64(e.to_string()))
}

fn percent_decode(input: &str) -> Result<Vec<u8>, DataUrlError> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .and_then(|pair| std::str::from_utf8(pair).ok())
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or(DataUrlError::PercentEscape(i))?;
            out.push(hex);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<DataUrl, DataUrlError> {
        DataUrl::parse(&Url::parse(s).unwrap())
    }

    #[test]
    fn test_base64_payload() {
        let decoded = parse("data:text/css;charset=utf-8;base64,Ym9keXt9").unwrap();
        assert_eq!(decoded.mime_type, "text/css");
        assert_eq!(decoded.charset.as_deref(), Some("utf-8"));
        assert_eq!(&decoded.data[..], b"body{}");
    }

    #[test]
    fn test_percent_encoded_payload_and_defaults() {
        let decoded = parse("data:,a%20b#frag").unwrap();
        assert_eq!(decoded.mime_type, "text/plain");
        assert_eq!(decoded.charset.as_deref(), Some("US-ASCII"));
        assert_eq!(&decoded.data[..], b"a b");
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse("data:text/plain").unwrap_err(), DataUrlError::MissingComma);
        assert!(matches!(parse("data:;base64,!!!"), Err(DataUrlError::Base64(_))));
        assert!(matches!(parse("data:,%zz"), Err(DataUrlError::PercentEscape(_))));
        assert_eq!(
            DataUrl::parse(&Url::parse("https://example.com/").unwrap()).unwrap_err(),
            DataUrlError::NotDataUrl
        );
    }
}
