//! Per-channel state machine driving one text chunk from config to
//! completed audio (C6).
//!
//! Grounded in `book_parser/edge_tts.rs::EdgeTtsClient::synthesize`, which
//! drives the same config → ssml → (turn.start, response, audio,
//! audio.metadata)* → turn.end sequence over one blocking socket; this
//! module generalizes it to the async [`Channel`] trait and returns a
//! batch of [`OutputRecord`]s rather than writing straight to a file.

use serde::Deserialize;
use uuid::Uuid;

use crate::error::{Result, SynthesisError};
use crate::frame::{self, Frame};
use crate::markup::{self, SynthesisConfig};
use crate::output::OutputRecord;
use crate::ws::{Channel, WireMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Init,
    ConfigSent,
    AwaitResponse,
    AwaitTurnStart,
    Streaming,
    Done,
}

/// Everything produced by driving one chunk to completion.
#[derive(Debug, Default)]
pub(crate) struct ChunkOutcome {
    pub records: Vec<OutputRecord>,
    /// End-of-timeline offset (in ticks) of the last audio emitted by this
    /// chunk, if any arrived. The Orchestrator folds this into
    /// `offset_compensation` for the next chunk.
    pub last_offset_ticks: Option<i64>,
}

/// Drive `channel` through exactly one chunk: send `speech.config` and
/// `ssml`, then consume frames until `turn.end`.
pub(crate) async fn run_chunk(
    channel: &mut impl Channel,
    config: &SynthesisConfig,
    text: &str,
) -> Result<ChunkOutcome> {
    let request_id = Uuid::new_v4().simple().to_string();

    send_config(channel, &request_id).await?; // Init -> ConfigSent
    send_ssml(channel, config, text, &request_id).await?; // ConfigSent -> AwaitResponse
    let mut state = State::AwaitResponse;

    let mut outcome = ChunkOutcome::default();
    let mut saw_audio = false;

    loop {
        let message = channel.recv().await?;
        let frame = match message {
            WireMessage::Closed => {
                return Err(SynthesisError::UnexpectedResponse(
                    "channel closed before turn.end".to_string(),
                ));
            }
            WireMessage::Text(text) => frame::decode_text_frame(&text).map(|(headers, body)| Frame::Text { headers, body })?,
            WireMessage::Binary(bytes) => frame::decode_binary_frame(&bytes).map(|(headers, body)| Frame::Binary { headers, body })?,
        };

        match frame {
            Frame::Text { headers, body } => {
                let path = headers.get("Path").map(String::as_str).unwrap_or("");
                match (state, path) {
                    (State::AwaitResponse, "response") => state = State::AwaitTurnStart,
                    (State::AwaitTurnStart, "turn.start") => state = State::Streaming,
                    (State::Streaming, "audio.metadata") => {
                        let boundaries = parse_metadata(&body)?;
                        let latest_end = boundaries.iter().rev().find_map(|record| match record {
                            OutputRecord::WordBoundary { offset_ticks, duration_ticks, .. } => {
                                Some(offset_ticks + duration_ticks)
                            }
                            OutputRecord::Audio(_) => None,
                        });
                        outcome.records.extend(boundaries);
                        if let Some(end) = latest_end {
                            outcome.last_offset_ticks = Some(end);
                        }
                    }
                    (State::Streaming, "turn.end") => {
                        state = State::Done;
                        break;
                    }
                    (_, other) => {
                        return Err(SynthesisError::UnknownResponse(format!(
                            "unexpected Path '{other}' while in state {state:?}"
                        )));
                    }
                }
            }
            Frame::Binary { headers, body } => {
                if state != State::Streaming {
                    return Err(SynthesisError::UnexpectedResponse(format!(
                        "binary frame while in state {state:?}"
                    )));
                }
                let path = headers.get("Path").map(String::as_str).unwrap_or("");
                if path != "audio" {
                    return Err(SynthesisError::UnknownResponse(format!(
                        "unexpected binary Path '{path}'"
                    )));
                }
                let has_content_type = headers.contains_key("Content-Type");
                match (has_content_type, body.is_empty()) {
                    (false, true) => continue, // keepalive frame, no audio data
                    (true, false) => {
                        saw_audio = true;
                        outcome.records.push(OutputRecord::Audio(body));
                    }
                    (false, false) | (true, true) => {
                        return Err(SynthesisError::UnexpectedResponse(
                            "audio frame Content-Type/body combination is invalid".to_string(),
                        ));
                    }
                }
            }
        }
    }

    if !saw_audio {
        return Err(SynthesisError::NoAudioReceived);
    }

    Ok(outcome)
}

async fn send_config(channel: &mut impl Channel, request_id: &str) -> Result<()> {
    let config_json = serde_json::json!({
        "context": {
            "synthesis": {
                "audio": {
                    "metadataoptions": {
                        "sentenceBoundaryEnabled": false,
                        "wordBoundaryEnabled": true,
                    },
                    "outputFormat": markup::AUDIO_FORMAT,
                }
            }
        }
    })
    .to_string();

    let body = frame::encode_text_frame(
        &[
            ("X-Timestamp", &frame::rfc2822_now()),
            ("X-RequestId", request_id),
            ("Content-Type", "application/json; charset=utf-8"),
            ("Path", "speech.config"),
        ],
        &config_json,
    );
    channel.send_text(body).await
}

async fn send_ssml(
    channel: &mut impl Channel,
    config: &SynthesisConfig,
    text: &str,
    request_id: &str,
) -> Result<()> {
    let markup = markup::build(config, text);
    let frame = markup::frame_headers(request_id, &markup::iso_timestamp_now(), &markup);
    channel.send_text(frame).await
}

#[derive(Deserialize)]
struct MetadataMessage {
    #[serde(rename = "Metadata")]
    metadata: Vec<MetadataItem>,
}

#[derive(Deserialize)]
struct MetadataItem {
    #[serde(rename = "Type")]
    kind: String,
    #[serde(rename = "Data", default)]
    data: MetadataData,
}

/// `Offset`/`Duration`/`text.Text` are only meaningful on a `WordBoundary`
/// item; a `SessionEnd` item carries a `Data` object without them, so every
/// field here is read leniently (cf. `9c2591cf_hs-CN-msedge-tts::
/// AudioMetadata::from_str`, which reads the same fields via
/// `as_u64().unwrap_or(0)`).
#[derive(Deserialize, Default)]
struct MetadataData {
    #[serde(rename = "Offset", default)]
    offset: i64,
    #[serde(rename = "Duration", default)]
    duration: i64,
    #[serde(default)]
    text: Option<MetadataText>,
}

#[derive(Deserialize)]
struct MetadataText {
    #[serde(rename = "Text")]
    text: String,
}

fn parse_metadata(body: &str) -> Result<Vec<OutputRecord>> {
    let parsed: MetadataMessage = serde_json::from_str(body).map_err(|err| {
        SynthesisError::UnexpectedResponse(format!("malformed audio.metadata body: {err}"))
    })?;

    let mut records = Vec::with_capacity(parsed.metadata.len());
    for item in parsed.metadata {
        match item.kind.as_str() {
            "WordBoundary" => records.push(OutputRecord::WordBoundary {
                offset_ticks: item.data.offset,
                duration_ticks: item.data.duration,
                text: item.data.text.map(|t| t.text).unwrap_or_default(),
            }),
            "SessionEnd" => {} // carries no timing data; nothing to emit
            other => {
                return Err(SynthesisError::UnknownResponse(format!(
                    "unrecognized audio.metadata Type '{other}'"
                )));
            }
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct FakeChannel {
        inbox: VecDeque<WireMessage>,
        sent: Vec<String>,
    }

    impl FakeChannel {
        fn new(inbox: Vec<WireMessage>) -> Self {
            Self { inbox: inbox.into(), sent: Vec::new() }
        }
    }

    impl Channel for FakeChannel {
        async fn send_text(&mut self, text: String) -> Result<()> {
            self.sent.push(text);
            Ok(())
        }

        async fn recv(&mut self) -> Result<WireMessage> {
            self.inbox
                .pop_front()
                .ok_or_else(|| SynthesisError::UnexpectedResponse("fake channel exhausted".to_string()))
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn text_frame(path: &str, body: &str) -> WireMessage {
        WireMessage::Text(frame::encode_text_frame(&[("Path", path)], body))
    }

    fn binary_audio_frame(bytes: &[u8]) -> WireMessage {
        let header = b"Path:audio\r\nContent-Type:audio/mpeg\r\n";
        let mut raw = Vec::new();
        raw.extend_from_slice(&(header.len() as u16).to_be_bytes());
        raw.extend_from_slice(header);
        raw.extend_from_slice(bytes);
        WireMessage::Binary(raw)
    }

    fn binary_keepalive_frame() -> WireMessage {
        let header = b"Path:audio\r\n";
        let mut raw = Vec::new();
        raw.extend_from_slice(&(header.len() as u16).to_be_bytes());
        raw.extend_from_slice(header);
        WireMessage::Binary(raw)
    }

    fn config() -> SynthesisConfig {
        SynthesisConfig::new("en-US-AriaNeural", "+0%", "+0%", "+0Hz").unwrap()
    }

    #[tokio::test]
    async fn happy_path_collects_audio_and_word_boundaries() {
        let metadata_body = serde_json::json!({
            "Metadata": [{
                "Type": "WordBoundary",
                "Data": { "Offset": 1000, "Duration": 2000, "text": { "Text": "hi" } }
            }]
        })
        .to_string();

        let mut channel = FakeChannel::new(vec![
            text_frame("response", ""),
            text_frame("turn.start", ""),
            binary_audio_frame(b"mp3bytes"),
            text_frame("audio.metadata", &metadata_body),
            text_frame("turn.end", ""),
        ]);

        let outcome = run_chunk(&mut channel, &config(), "hi").await.unwrap();
        assert_eq!(channel.sent.len(), 2); // config, then ssml
        assert!(matches!(&outcome.records[0], OutputRecord::Audio(bytes) if bytes == b"mp3bytes"));
        assert!(matches!(
            &outcome.records[1],
            OutputRecord::WordBoundary { offset_ticks: 1000, duration_ticks: 2000, text } if text == "hi"
        ));
        assert_eq!(outcome.last_offset_ticks, Some(3000));
    }

    #[tokio::test]
    async fn keepalive_binary_frame_is_ignored() {
        let mut channel = FakeChannel::new(vec![
            text_frame("response", ""),
            text_frame("turn.start", ""),
            binary_keepalive_frame(),
            binary_audio_frame(b"mp3bytes"),
            text_frame("turn.end", ""),
        ]);

        let outcome = run_chunk(&mut channel, &config(), "hi").await.unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert!(matches!(&outcome.records[0], OutputRecord::Audio(bytes) if bytes == b"mp3bytes"));
    }

    #[tokio::test]
    async fn audio_frame_with_content_type_but_empty_body_errors() {
        let header = b"Path:audio\r\nContent-Type:audio/mpeg\r\n";
        let mut raw = Vec::new();
        raw.extend_from_slice(&(header.len() as u16).to_be_bytes());
        raw.extend_from_slice(header);
        let mut channel = FakeChannel::new(vec![
            text_frame("response", ""),
            text_frame("turn.start", ""),
            WireMessage::Binary(raw),
        ]);

        let err = run_chunk(&mut channel, &config(), "hi").await.unwrap_err();
        assert!(matches!(err, SynthesisError::UnexpectedResponse(_)));
    }

    #[tokio::test]
    async fn turn_end_without_audio_is_an_error() {
        let mut channel = FakeChannel::new(vec![
            text_frame("response", ""),
            text_frame("turn.start", ""),
            text_frame("turn.end", ""),
        ]);

        let err = run_chunk(&mut channel, &config(), "hi").await.unwrap_err();
        assert!(matches!(err, SynthesisError::NoAudioReceived));
    }

    #[tokio::test]
    async fn unexpected_path_in_wrong_state_errors() {
        let mut channel = FakeChannel::new(vec![text_frame("turn.end", "")]);
        let err = run_chunk(&mut channel, &config(), "hi").await.unwrap_err();
        assert!(matches!(err, SynthesisError::UnknownResponse(_)));
    }

    #[tokio::test]
    async fn session_end_metadata_is_ignored() {
        let metadata_body = serde_json::json!({
            "Metadata": [{ "Type": "SessionEnd", "Data": {} }]
        })
        .to_string();

        let mut channel = FakeChannel::new(vec![
            text_frame("response", ""),
            text_frame("turn.start", ""),
            binary_audio_frame(b"mp3bytes"),
            text_frame("audio.metadata", &metadata_body),
            text_frame("turn.end", ""),
        ]);

        let outcome = run_chunk(&mut channel, &config(), "hi").await.unwrap();
        assert_eq!(outcome.records.len(), 1); // audio only, no word boundary
        assert!(outcome.last_offset_ticks.is_none());
    }

    #[tokio::test]
    async fn unrecognized_metadata_type_is_unknown_response() {
        let metadata_body = serde_json::json!({
            "Metadata": [{ "Type": "Xyz", "Data": {} }]
        })
        .to_string();

        let mut channel = FakeChannel::new(vec![
            text_frame("response", ""),
            text_frame("turn.start", ""),
            binary_audio_frame(b"mp3bytes"),
            text_frame("audio.metadata", &metadata_body),
        ]);

        let err = run_chunk(&mut channel, &config(), "hi").await.unwrap_err();
        assert!(matches!(err, SynthesisError::UnknownResponse(_)));
    }

    #[tokio::test]
    async fn channel_closed_mid_turn_errors() {
        let mut channel = FakeChannel::new(vec![
            text_frame("response", ""),
            text_frame("turn.start", ""),
            WireMessage::Closed,
        ]);
        let err = run_chunk(&mut channel, &config(), "hi").await.unwrap_err();
        assert!(matches!(err, SynthesisError::UnexpectedResponse(_)));
    }
}
