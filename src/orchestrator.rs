//! Cross-chunk job orchestration: chunking, per-chunk reconnect policy, DRM
//! recovery, and the consumer-facing output stream (C7, C8).
//!
//! Grounded in `book_parser/audio_generator.rs`'s chunk-by-chunk synthesis
//! loop (one `EdgeTtsClient::synthesize` call per chunk, concatenated into
//! one output) and `gglib-voice/src/pipeline.rs`'s `tokio::sync::mpsc`
//! event-channel pattern, generalized here into a lazily-pulled,
//! once-consumable stream the caller drives at its own pace.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};
use tokio_stream::wrappers::ReceiverStream;

use crate::chunker;
use crate::error::{Result, SynthesisError};
use crate::markup::{self, SynthesisConfig};
use crate::options::Options;
use crate::output::OutputRecord;
use crate::reconnect::{self, ReconnectEvent};
use crate::token::{ClockSkew, TokenGenerator};
use crate::ws::{self, Channel};

/// Ticks of silence inserted between chunks' timelines, matching the gap
/// the service's own word-boundary offsets leave between turns.
const INTER_CHUNK_SILENCE_TICKS: i64 = 8_750_000;

/// One synthesis request: the text to speak plus the voice parameters to
/// speak it with.
#[derive(Debug, Clone)]
pub struct SynthesisJob {
    pub config: SynthesisConfig,
    pub text: String,
}

/// Drives a [`SynthesisJob`] to completion, producing a [`ReceiverStream`]
/// of [`OutputRecord`]s that the caller consumes once, in order.
pub struct Orchestrator {
    options: Options,
    skew: ClockSkew,
}

impl Orchestrator {
    pub fn new(options: Options) -> Self {
        Self { options, skew: ClockSkew::new() }
    }

    /// Share a [`ClockSkew`] across multiple orchestrators (and therefore
    /// jobs), so a learned correction from one job benefits the next.
    pub fn with_clock_skew(options: Options, skew: ClockSkew) -> Self {
        Self { options, skew }
    }

    /// Begin running `job`. Returns immediately with a stream; the actual
    /// network activity happens in a spawned background task and is torn
    /// down if the stream is dropped before it finishes.
    pub fn run(&self, job: SynthesisJob) -> ReceiverStream<Result<OutputRecord>> {
        let (tx, rx) = mpsc::channel(32);
        let cancel = Arc::new(Notify::new());
        let cancel_for_watch = cancel.clone();
        let tx_for_watch = tx.clone();

        let options = self.options.clone();
        let token_gen = TokenGenerator::new(self.skew.clone());

        tokio::spawn(async move {
            tx_for_watch.closed().await;
            cancel_for_watch.notify_one();
        });

        tokio::spawn(async move {
            let open_channel = || ws::open(&token_gen, &options);
            drive_job(job, &options, &token_gen, &cancel, tx, open_channel).await;
        });

        ReceiverStream::new(rx)
    }
}

/// Iterate a job's chunks against whatever `open_channel` produces. Generic
/// over the channel opener so tests can substitute an in-memory fake for
/// the real WebSocket transport (see `mod tests` below).
async fn drive_job<Open, Fut, C>(
    job: SynthesisJob,
    options: &Options,
    token_gen: &TokenGenerator,
    cancel: &Notify,
    tx: mpsc::Sender<Result<OutputRecord>>,
    open_channel: Open,
) where
    Open: Fn() -> Fut,
    Fut: Future<Output = Result<C>>,
    C: Channel,
{
    let budget = markup::max_payload_bytes(&job.config);
    // Escape once, on the full text, before chunking: the chunker's
    // entity-preservation rule only protects entities that already exist in
    // the text it sees, and only escaping up front keeps each chunk's wire
    // size within `budget` after `markup::build` inserts it verbatim.
    let cleaned = markup::escape_text(&job.text);
    let chunks = chunker::chunk_text(&cleaned, budget);
    let mut offset_compensation: i64 = 0;

    for chunk in chunks {
        if tx.is_closed() {
            return;
        }

        match run_chunk_with_recovery(&chunk, &job.config, options, token_gen, cancel, &open_channel).await {
            Ok(outcome) => {
                for record in outcome.records {
                    let shifted = shift_record(record, offset_compensation);
                    if let Some(on_record) = &options.on_record {
                        on_record(&shifted);
                    }
                    if tx.send(Ok(shifted)).await.is_err() {
                        return;
                    }
                }
                if let Some(last) = outcome.last_offset_ticks {
                    offset_compensation = last + INTER_CHUNK_SILENCE_TICKS;
                }
            }
            Err(err) => {
                let _ = tx.send(Err(err)).await;
                return;
            }
        }
    }
}

/// Run one chunk, wrapped in the bounded reconnect policy, with a single
/// skew-adjust-and-retry special case when the channel rejects with DRM.
async fn run_chunk_with_recovery<Open, Fut, C>(
    text: &str,
    config: &SynthesisConfig,
    options: &Options,
    token_gen: &TokenGenerator,
    cancel: &Notify,
    open_channel: &Open,
) -> Result<crate::session::ChunkOutcome>
where
    Open: Fn() -> Fut,
    Fut: Future<Output = Result<C>>,
    C: Channel,
{
    let attempt = reconnect::execute(
        &options.reconnect,
        cancel,
        |event| log_reconnect_event(&event),
        || async { run_chunk_once(text, config, open_channel).await },
    )
    .await;

    match attempt {
        Err(SynthesisError::Drm { server_date: Some(server_date) }) => {
            token_gen.adjust_skew_from_server_date(&server_date)?;
            tracing::info!("adjusted clock skew after DRM rejection, retrying once");
            run_chunk_once(text, config, open_channel).await
        }
        other => other,
    }
}

async fn run_chunk_once<Open, Fut, C>(
    text: &str,
    config: &SynthesisConfig,
    open_channel: &Open,
) -> Result<crate::session::ChunkOutcome>
where
    Open: Fn() -> Fut,
    Fut: Future<Output = Result<C>>,
    C: Channel,
{
    let mut channel = open_channel().await?;
    let result = crate::session::run_chunk(&mut channel, config, text).await;
    let _ = channel.close().await;
    result
}

fn shift_record(record: OutputRecord, offset: i64) -> OutputRecord {
    match record {
        OutputRecord::WordBoundary { offset_ticks, duration_ticks, text } => OutputRecord::WordBoundary {
            offset_ticks: offset_ticks + offset,
            duration_ticks,
            text,
        },
        audio @ OutputRecord::Audio(_) => audio,
    }
}

fn log_reconnect_event(event: &ReconnectEvent) {
    match event {
        ReconnectEvent::Attempt { attempt, delay } => {
            tracing::warn!(attempt, ?delay, "retrying chunk after transient failure")
        }
        ReconnectEvent::Success => tracing::debug!("chunk succeeded"),
        ReconnectEvent::Failure => tracing::error!("chunk failed, retries exhausted"),
        ReconnectEvent::Abort { reason } => tracing::error!(reason, "chunk aborted"),
    }
}
