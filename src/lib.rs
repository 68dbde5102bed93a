//! Streaming client for Microsoft Edge's online text-to-speech synthesis
//! service: turns text into a lazily-pulled sequence of audio chunks and
//! word-boundary timing records over the same WebSocket protocol the Edge
//! Read Aloud browser feature uses.

mod chunker;
mod error;
mod frame;
pub mod logging;
mod markup;
mod options;
mod orchestrator;
mod output;
mod reconnect;
mod session;
mod token;
mod ws;

pub use error::{Result, SynthesisError};
pub use markup::SynthesisConfig;
pub use options::Options;
pub use orchestrator::{Orchestrator, SynthesisJob};
pub use output::OutputRecord;
pub use reconnect::{ReconnectConfig, ReconnectEvent};
pub use token::ClockSkew;
