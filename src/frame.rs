//! Wire frame encoding and decoding (C4).
//!
//! Text frames are CRLF-delimited header lines, a blank line, then a body.
//! Binary frames are a two-byte big-endian header-length prefix, that many
//! bytes of header text, then the binary body.

use std::collections::HashMap;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc2822;

use crate::error::{Result, SynthesisError};

pub type Headers = HashMap<String, String>;

/// A decoded inbound frame.
#[derive(Debug, Clone)]
pub enum Frame {
    Text { headers: Headers, body: String },
    Binary { headers: Headers, body: Vec<u8> },
}

/// Current time rendered the way the service's outbound `X-Timestamp`
/// header expects it (approximated, per the grounding examples, as an
/// RFC-2822 date rather than the vendor's undocumented exact JS
/// `Date.toString()` form).
pub fn rfc2822_now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc2822)
        .unwrap_or_default()
}

/// Build a complete outbound text frame: header lines in the given order,
/// a blank line, then the body.
pub fn encode_text_frame(header_lines: &[(&str, &str)], body: &str) -> String {
    let mut out = String::new();
    for (key, value) in header_lines {
        out.push_str(key);
        out.push(':');
        out.push_str(value);
        out.push_str("\r\n");
    }
    out.push_str("\r\n");
    out.push_str(body);
    out
}

/// Decode an inbound text frame: locate the header/body separator, then
/// line-split and colon-split the header block into a map.
pub fn decode_text_frame(raw: &str) -> Result<(Headers, String)> {
    let separator = raw
        .find("\r\n\r\n")
        .ok_or_else(|| SynthesisError::UnexpectedResponse("text frame missing CRLFCRLF header/body separator".to_string()))?;
    let headers = parse_header_lines(&raw[..separator]);
    let body = raw[separator + 4..].to_string();
    Ok((headers, body))
}

/// Decode an inbound binary frame: a two-byte big-endian header length,
/// that many bytes of header text, then the remaining bytes as the body.
pub fn decode_binary_frame(raw: &[u8]) -> Result<(Headers, Vec<u8>)> {
    if raw.len() < 2 {
        return Err(SynthesisError::UnexpectedResponse(
            "binary frame shorter than the 2-byte header length prefix".to_string(),
        ));
    }
    let header_len = u16::from_be_bytes([raw[0], raw[1]]) as usize;
    let body_start = 2 + header_len;
    if body_start > raw.len() {
        return Err(SynthesisError::UnexpectedResponse(format!(
            "binary frame header length {header_len} exceeds message length {}",
            raw.len()
        )));
    }
    let header_text = String::from_utf8_lossy(&raw[2..body_start]);
    let headers = parse_header_lines(&header_text);
    Ok((headers, raw[body_start..].to_vec()))
}

fn parse_header_lines(block: &str) -> Headers {
    let mut headers = Headers::new();
    for line in block.split("\r\n") {
        if line.is_empty() {
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.to_string(), value.to_string());
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_frame_round_trips() {
        let encoded = encode_text_frame(
            &[("Path", "speech.config"), ("Content-Type", "application/json")],
            r#"{"a":1}"#,
        );
        let (headers, body) = decode_text_frame(&encoded).unwrap();
        assert_eq!(headers.get("Path").unwrap(), "speech.config");
        assert_eq!(headers.get("Content-Type").unwrap(), "application/json");
        assert_eq!(body, r#"{"a":1}"#);
    }

    #[test]
    fn text_frame_without_separator_errors() {
        let err = decode_text_frame("Path:turn.end").unwrap_err();
        assert!(matches!(err, SynthesisError::UnexpectedResponse(_)));
    }

    #[test]
    fn binary_frame_round_trips() {
        let header_text = b"Path:audio\r\nContent-Type:audio/mpeg\r\n\r\n";
        let mut raw = Vec::new();
        raw.extend_from_slice(&(header_text.len() as u16).to_be_bytes());
        raw.extend_from_slice(header_text);
        raw.extend_from_slice(b"mp3bytes");

        let (headers, body) = decode_binary_frame(&raw).unwrap();
        assert_eq!(headers.get("Path").unwrap(), "audio");
        assert_eq!(headers.get("Content-Type").unwrap(), "audio/mpeg");
        assert_eq!(body, b"mp3bytes");
    }

    #[test]
    fn binary_frame_too_short_errors() {
        assert!(decode_binary_frame(&[0x00]).is_err());
    }

    #[test]
    fn binary_frame_header_length_overrun_errors() {
        let raw = [0x00, 0xFF, b'P', b'a'];
        assert!(decode_binary_frame(&raw).is_err());
    }
}
