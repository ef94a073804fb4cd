//! Response body decoding keyed by content type.
//!
//! JSON (`application/json`, `+json`) goes through `serde_json`, XML (`application/xml`,
//! `text/xml`, `+xml`) through `quick-xml`. A `Content-Encoding: gzip` body is inflated first,
//! never past the byte ceiling.

use std::borrow::Cow;
use std::io::Read;

use flate2::read::GzDecoder;
use http::header::{CONTENT_ENCODING, CONTENT_TYPE};
use http::HeaderMap;
use serde::de::DeserializeOwned;

use super::error::DecodeError;
use super::DEFAULT_MAX_BYTES;

/// Media type without parameters, lowercased (`"application/json; charset=utf-8"` →
/// `"application/json"`).
pub fn media_type(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    let essence = value.split(';').next().unwrap_or_default().trim();
    (!essence.is_empty()).then(|| essence.to_ascii_lowercase())
}

/// Undo a gzip `Content-Encoding`, refusing to inflate past `limit` bytes.
///
/// Bodies without a content encoding (or with `identity`) are returned as is.
pub fn decompress<'a>(
    headers: &HeaderMap,
    body: &'a [u8],
    limit: usize,
) -> Result<Cow<'a, [u8]>, DecodeError> {
    let encoding = headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_ascii_lowercase());
    match encoding.as_deref() {
        None | Some("") | Some("identity") => Ok(Cow::Borrowed(body)),
        Some("gzip") | Some("x-gzip") => {
            let mut inflated = Vec::new();
            GzDecoder::new(body)
                .take((limit as u64).saturating_add(1))
                .read_to_end(&mut inflated)
                .map_err(DecodeError::Decompress)?;
            if inflated.len() > limit {
                return Err(DecodeError::TooLarge { limit });
            }
            Ok(Cow::Owned(inflated))
        }
        Some(other) => Err(DecodeError::UnsupportedContentEncoding(other.to_string())),
    }
}

/// Decode `body` according to its declared content type, with the default byte ceiling.
///
/// Anything other than JSON or XML is [`DecodeError::UnsupportedContentType`]; supply a custom
/// decode function for other formats.
pub fn decode_response<T: DeserializeOwned>(
    headers: &HeaderMap,
    body: &[u8],
) -> Result<T, DecodeError> {
    decode_response_limited(headers, body, DEFAULT_MAX_BYTES)
}

/// [`decode_response`] with an explicit ceiling for the decompressed body.
pub fn decode_response_limited<T: DeserializeOwned>(
    headers: &HeaderMap,
    body: &[u8],
    limit: usize,
) -> Result<T, DecodeError> {
    let media = media_type(headers).unwrap_or_default();
    if is_json(&media) {
        let body = decompress(headers, body, limit)?;
        Ok(serde_json::from_slice(&body)?)
    } else if is_xml(&media) {
        let body = decompress(headers, body, limit)?;
        Ok(quick_xml::de::from_reader(&body[..])?)
    } else {
        Err(DecodeError::UnsupportedContentType(media))
    }
}

fn is_json(media: &str) -> bool {
    media == "application/json" || media.ends_with("+json")
}

fn is_xml(media: &str) -> bool {
    media == "application/xml" || media == "text/xml" || media.ends_with("+xml")
}
