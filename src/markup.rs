//! Synthesis config validation and speech markup construction (C2).

use time::OffsetDateTime;
use time::macros::format_description;

use crate::error::{Result, SynthesisError};

/// Audio output format requested in every `speech.config` message. The
/// original project also supports non-streaming `riff-*` formats, but
/// those only matter once a caller writes a complete file to disk — an
/// out-of-scope, file-writing concern this client does not carry.
pub const AUDIO_FORMAT: &str = "audio-24khz-48kbitrate-mono-mp3";

const MAX_MESSAGE_BYTES: usize = 65_536;
const SAFETY_MARGIN_BYTES: usize = 50;
/// 32 hex characters — the width of a `Uuid::new_v4().simple()` request id,
/// used as a placeholder when measuring per-message overhead.
const PLACEHOLDER_REQUEST_ID: &str = "00000000000000000000000000000000";

/// Immutable parameters for one synthesis job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisConfig {
    pub voice: String,
    pub rate: String,
    pub volume: String,
    pub pitch: String,
}

impl SynthesisConfig {
    /// Validate and construct a config. Rejects an empty voice name and
    /// any rate/volume/pitch expression that isn't a signed percentage
    /// (`+0%`, `-25%`) or, for pitch, a signed Hertz value (`+0Hz`).
    pub fn new(
        voice: impl Into<String>,
        rate: impl Into<String>,
        volume: impl Into<String>,
        pitch: impl Into<String>,
    ) -> Result<Self> {
        let voice = voice.into();
        let rate = rate.into();
        let volume = volume.into();
        let pitch = pitch.into();

        if voice.trim().is_empty() {
            return Err(SynthesisError::Config("voice must not be empty".to_string()));
        }
        if parse_signed_expression(&rate, "%").is_none() {
            return Err(SynthesisError::Config(format!("invalid rate expression: {rate}")));
        }
        if parse_signed_expression(&volume, "%").is_none() {
            return Err(SynthesisError::Config(format!("invalid volume expression: {volume}")));
        }
        if parse_signed_expression(&pitch, "Hz").is_none() {
            return Err(SynthesisError::Config(format!("invalid pitch expression: {pitch}")));
        }

        Ok(Self { voice, rate, volume, pitch })
    }
}

/// Parse a leading-sign, integer, fixed-suffix expression such as `+0%` or
/// `-10Hz`. Mirrors the percent/Hz parsing the original project's
/// audiobook config performs before handing values to the markup builder.
fn parse_signed_expression(value: &str, suffix: &str) -> Option<i64> {
    let trimmed = value.trim();
    let body = trimmed.strip_suffix(suffix)?;
    if body.is_empty() {
        return None;
    }
    let (sign, digits) = match body.as_bytes()[0] {
        b'+' | b'-' => (&body[..1], &body[1..]),
        _ => return None,
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    format!("{sign}{digits}").parse::<i64>().ok()
}

/// Build the single-line speech markup document for one chunk of text.
///
/// `text` must already be XML-escaped (via [`escape_text`]) by the caller —
/// escaping happens once, on the full input, before the text is split into
/// chunks, so that the chunker's entity-preservation rule protects the
/// entities escaping produces. This function only wraps; it never escapes.
pub fn build(config: &SynthesisConfig, text: &str) -> String {
    format!(
        "<speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' xml:lang='en-US'>\
<voice name='{}'><prosody pitch='{}' rate='{}' volume='{}'>{}</prosody></voice></speak>",
        config.voice, config.pitch, config.rate, config.volume, text,
    )
}

/// XML-escape text, first blanking out characters in the Unicode Private
/// Use Area — the smallest defensible reading of the spec's "certain
/// private-use ranges" (the original source's regex literal for this step
/// is not recoverable; see DESIGN.md).
pub fn escape_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if is_private_use(ch) {
            out.push(' ');
            continue;
        }
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

fn is_private_use(ch: char) -> bool {
    matches!(ch as u32, 0xE000..=0xF8FF)
}

/// Build the full outbound `ssml` text frame: headers (including a fresh
/// `X-RequestId` and an ISO-8601 `X-Timestamp` suffixed with `Z`), a blank
/// line, then the markup body.
pub fn frame_headers(request_id: &str, timestamp_iso: &str, markup: &str) -> String {
    format!(
        "X-RequestId:{request_id}\r\nContent-Type:application/ssml+xml\r\nX-Timestamp:{timestamp_iso}Z\r\nPath:ssml\r\n\r\n{markup}"
    )
}

/// Current time as a bare ISO-8601 date-time (no offset) for use with
/// [`frame_headers`], which appends the trailing `Z` itself.
pub fn iso_timestamp_now() -> String {
    let format = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    OffsetDateTime::now_utc()
        .format(&format)
        .unwrap_or_default()
}

/// Maximum text payload, in bytes, that still keeps the resulting `ssml`
/// frame under the 65536-byte wire limit with a 50-byte safety margin.
pub fn max_payload_bytes(config: &SynthesisConfig) -> usize {
    let empty_markup = build(config, "");
    let frame = frame_headers(PLACEHOLDER_REQUEST_ID, &iso_timestamp_now(), &empty_markup);
    MAX_MESSAGE_BYTES.saturating_sub(frame.len()).saturating_sub(SAFETY_MARGIN_BYTES)
}
