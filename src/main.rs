//! Thin demonstration CLI: synthesize text read from an argument or stdin,
//! write the decoded MP3 bytes to a path or stdout, and (with `--verbose`)
//! print a plain-text word-boundary transcript to stderr as it streams in.

use std::io::Read as _;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_stream::StreamExt;

use edge_speech_stream::{Options, Orchestrator, OutputRecord, SynthesisConfig, SynthesisJob};

#[derive(Parser, Debug)]
#[command(about = "Stream speech synthesis from Microsoft Edge's Read Aloud service")]
struct Cli {
    /// Text to synthesize. Reads from stdin if omitted.
    text: Option<String>,

    /// Voice name, e.g. en-US-AriaNeural.
    #[arg(long, default_value = "en-US-AriaNeural")]
    voice: String,

    /// Rate adjustment, e.g. +0%, -10%.
    #[arg(long, default_value = "+0%")]
    rate: String,

    /// Volume adjustment, e.g. +0%.
    #[arg(long, default_value = "+0%")]
    volume: String,

    /// Pitch adjustment, e.g. +0Hz.
    #[arg(long, default_value = "+0Hz")]
    pitch: String,

    /// Output MP3 path. Writes to stdout if omitted.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Print a word-boundary transcript to stderr as it arrives.
    #[arg(long)]
    verbose: bool,

    /// Enable debug-level logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    edge_speech_stream::logging::init(cli.debug).context("failed to initialize logging")?;

    let text = match cli.text {
        Some(text) => text,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read text from stdin")?;
            buffer
        }
    };

    let config = SynthesisConfig::new(cli.voice, cli.rate, cli.volume, cli.pitch)
        .context("invalid synthesis configuration")?;
    let job = SynthesisJob { config, text };

    let orchestrator = Orchestrator::new(Options::default());
    let mut stream = orchestrator.run(job);

    let mut sink: Box<dyn AsyncWrite + Unpin> = match &cli.out {
        Some(path) => Box::new(
            tokio::fs::File::create(path)
                .await
                .with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };

    let mut audio_bytes = 0usize;
    while let Some(record) = stream.next().await {
        match record? {
            OutputRecord::Audio(bytes) => {
                audio_bytes += bytes.len();
                sink.write_all(&bytes).await?;
            }
            OutputRecord::WordBoundary { offset_ticks, duration_ticks, text } => {
                if cli.verbose {
                    eprintln!("[{offset_ticks}+{duration_ticks}] {text}");
                }
            }
        }
    }

    sink.flush().await?;
    tracing::info!(audio_bytes, "synthesis complete");
    Ok(())
}
