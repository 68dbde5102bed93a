//! Error taxonomy for the streaming synthesis client.

use std::time::Duration;

use thiserror::Error;

/// Everything that can go wrong driving one synthesis job.
///
/// Variant names track the error *kinds* from the design: they are not a
/// one-to-one mirror of any particular transport error type.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// Channel open timed out, a transport-level failure occurred, or the
    /// socket closed abruptly outside the expected `turn.end` sequence.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Opening the channel did not complete within the configured timeout.
    #[error("channel open timed out after {0:?}")]
    OpenTimeout(Duration),

    /// No frame arrived within the configured receive timeout.
    #[error("receive timed out after {0:?}")]
    ReceiveTimeout(Duration),

    /// A well-formed frame violated the protocol contract: missing
    /// header/body delimiter, wrong `Path` for the current state, or an
    /// invalid `Content-Type` combination.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// A structurally valid frame carried a `Path` or metadata `Type` this
    /// client does not recognize.
    #[error("unknown response: {0}")]
    UnknownResponse(String),

    /// The channel reached `turn.end` without ever receiving an audio
    /// frame. Usually means an invalid voice name or malformed markup.
    #[error("no audio received for chunk")]
    NoAudioReceived,

    /// Caller-supplied synthesis parameters failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Authentication failed (HTTP 403-equivalent). Carries the server's
    /// `Date` header, if one was present, so the caller can learn clock
    /// skew from it.
    #[error("authentication failed (DRM)")]
    Drm { server_date: Option<String> },

    /// The output stream was cancelled by the consumer before completion.
    #[error("synthesis cancelled")]
    Cancelled,
}

impl SynthesisError {
    /// Whether the Reconnect Policy should retry this failure, rather than
    /// surface it immediately for special handling (DRM) or propagation.
    pub(crate) fn is_transient(&self) -> bool {
        matches!(
            self,
            SynthesisError::WebSocket(_)
                | SynthesisError::OpenTimeout(_)
                | SynthesisError::ReceiveTimeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SynthesisError>;
