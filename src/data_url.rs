//! `data:` URL helpers and the extension to mime type table.

use crate::{Error, Result};
use base64::Engine as _;

const DATA_URL_PREFIX: &str = "data:";

/// A decoded `data:` URL
#[derive(Debug, Clone, PartialEq)]
pub struct DataUrl {
    /// Media type including parameters, e.g. `image/svg+xml;charset=utf-8`
    pub mime: String,
    pub bytes: Vec<u8>,
}

pub fn is_data_url(url: &str) -> bool {
    url.starts_with(DATA_URL_PREFIX)
}

/// Build a base64 `data:` URL from an already encoded payload.
pub fn make_data_url(mime: &str, base64_payload: &str) -> String {
    format!("data:{};base64,{}", mime, base64_payload)
}

/// Everything after the first comma, i.e. the still-encoded payload.
pub fn payload(url: &str) -> Option<&str> {
    url.split_once(',').map(|(_, data)| data).filter(|d| !d.is_empty())
}

/// Mime type derived from the extension of the URL path.
///
/// Unknown extensions map to an empty string; the resource is still
/// embedded, just without type metadata.
pub fn mime_type(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or("");
    let ext = match path.rfind('.') {
        Some(dot) if !path[dot + 1..].contains('/') => path[dot + 1..].to_ascii_lowercase(),
        _ => return "",
    };
    match ext.as_str() {
        "woff" | "woff2" => "application/font-woff",
        "ttf" => "application/font-truetype",
        "eot" => "application/vnd.ms-fontobject",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "tiff" => "image/tiff",
        "svg" => "image/svg+xml",
        _ => "",
    }
}

/// Decode a `data:` URL, base64 or percent-encoded.
pub fn decode(url: &str) -> Result<DataUrl> {
    let rest = url
        .strip_prefix(DATA_URL_PREFIX)
        .ok_or_else(|| Error::InvalidDataUrl("URL does not start with 'data:'".into()))?;
    let (metadata, data) = rest
        .split_once(',')
        .ok_or_else(|| Error::InvalidDataUrl("missing comma".into()))?;

    let mut params: Vec<&str> = metadata.split(';').map(str::trim).collect();
    let is_base64 = params
        .last()
        .map(|p| p.eq_ignore_ascii_case("base64"))
        .unwrap_or(false);
    if is_base64 {
        params.pop();
    }
    let mime = params.join(";");

    let bytes = if is_base64 {
        let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        base64::engine::general_purpose::STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| Error::InvalidDataUrl(format!("bad base64 payload: {}", e)))?
    } else {
        percent_decode(data)
    };

    Ok(DataUrl { mime, bytes })
}

// A `%` not followed by two hex digits is kept literally
fn percent_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let escaped = (bytes[i] == b'%')
            .then(|| bytes.get(i + 1..i + 3))
            .flatten()
            .and_then(|h| std::str::from_utf8(h).ok())
            .and_then(|h| u8::from_str_radix(h, 16).ok());
        match escaped {
            Some(byte) => {
                out.push(byte);
                i += 3;
            }
            None => {
                out.push(bytes[i]);
                i += 1;
            }
        }
    }
    out
}
