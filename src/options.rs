//! Construction options for a synthesis job (the Factory contract, C7).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::output::OutputRecord;
use crate::reconnect::ReconnectConfig;

/// Tunables that govern how an [`crate::orchestrator::Orchestrator`] opens
/// channels, retries, and times out, plus an optional hook for observing
/// word-boundary metadata as it arrives.
#[derive(Clone)]
pub struct Options {
    /// Per-chunk channel open timeout.
    pub connect_timeout: Duration,
    /// How long to wait for the next frame on an open channel before
    /// treating the channel as stalled.
    pub receive_timeout: Duration,
    /// Backoff policy applied when opening or running a chunk fails
    /// transiently.
    pub reconnect: ReconnectConfig,
    /// Optional forward proxy URL for the WebSocket handshake. Carried in
    /// the options contract for parity with the original service's proxy
    /// support; this client does not yet route connections through one.
    pub proxy: Option<String>,
    /// Invoked once per [`OutputRecord`] as it is produced, in addition to
    /// delivering it through the output stream. Useful for a caller that
    /// wants a live subtitle callback without consuming the stream itself.
    pub on_record: Option<Arc<dyn Fn(&OutputRecord) + Send + Sync>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            receive_timeout: Duration::from_secs(60),
            reconnect: ReconnectConfig::default(),
            proxy: None,
            on_record: None,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("connect_timeout", &self.connect_timeout)
            .field("receive_timeout", &self.receive_timeout)
            .field("reconnect", &self.reconnect)
            .field("proxy", &self.proxy)
            .field("on_record", &self.on_record.as_ref().map(|_| "<closure>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_sane_timeouts() {
        let options = Options::default();
        assert!(options.connect_timeout > Duration::ZERO);
        assert!(options.receive_timeout > Duration::ZERO);
        assert!(options.on_record.is_none());
    }

    #[test]
    fn debug_does_not_require_the_closure_to_be_debug() {
        let options = Options {
            on_record: Some(Arc::new(|_record: &OutputRecord| {})),
            ..Options::default()
        };
        let rendered = format!("{options:?}");
        assert!(rendered.contains("<closure>"));
    }
}
