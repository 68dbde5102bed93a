//! The typed, ordered output sequence consumers pull from (C8).

/// One item of the synthesis output stream.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputRecord {
    /// Raw audio payload, in the job's fixed output format
    /// ([`crate::markup::AUDIO_FORMAT`]).
    Audio(Vec<u8>),

    /// A word-level timing record. `offset_ticks` is measured from the
    /// start of the full synthesized timeline, not the start of the
    /// current chunk.
    WordBoundary {
        offset_ticks: i64,
        duration_ticks: i64,
        text: String,
    },
}
