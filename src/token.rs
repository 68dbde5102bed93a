//! Connection token generation and clock-skew tracking (C1).
//!
//! The service expects a token derived from server time rounded to a
//! 5-minute window. Coarse alignment lets clients within roughly ±150s of
//! server time succeed unadjusted; `ClockSkew` recovers drifted clocks the
//! first time the service rejects a channel with a 403 and a `Date` header.

use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc2822;

use crate::error::{Result, SynthesisError};

/// Fixed trusted-client token the service expects concatenated with the
/// rounded timestamp before hashing.
pub const TRUSTED_CLIENT_TOKEN: &str = "6A5AA1D4EAFF4E9FB37E23D68491D6F4";

const WINDOWS_EPOCH_OFFSET_SECS: i64 = 11_644_473_600;
const WINDOW_SECS: i64 = 300;
const TICKS_PER_SECOND: i64 = 10_000_000;

/// Process-wide (or job-wide, if not shared) signed clock skew in seconds.
///
/// Cheaply cloneable; every clone shares the same underlying counter, so
/// multiple jobs can share one learned offset if the caller wants that.
#[derive(Clone, Default)]
pub struct ClockSkew(Arc<Mutex<i64>>);

impl ClockSkew {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(0)))
    }

    pub fn seconds(&self) -> i64 {
        *self.0.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Add `delta` seconds to the accumulated skew.
    pub fn adjust(&self, delta: i64) {
        let mut guard = self.0.lock().unwrap_or_else(|poison| poison.into_inner());
        *guard += delta;
    }
}

/// Produces fresh connection tokens aligned to the service's expected
/// 5-minute server-time window.
pub struct TokenGenerator {
    skew: ClockSkew,
}

impl TokenGenerator {
    pub fn new(skew: ClockSkew) -> Self {
        Self { skew }
    }

    /// Uppercase hex SHA-256 digest of the rounded, skew-adjusted
    /// timestamp concatenated with [`TRUSTED_CLIENT_TOKEN`].
    pub fn generate(&self) -> String {
        let now_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        let adjusted = now_secs + self.skew.seconds() + WINDOWS_EPOCH_OFFSET_SECS;
        let floored = adjusted - adjusted.rem_euclid(WINDOW_SECS);
        let ticks = floored * TICKS_PER_SECOND;

        let mut hasher = Sha256::new();
        hasher.update(format!("{ticks}{TRUSTED_CLIENT_TOKEN}").as_bytes());
        let digest = hasher.finalize();

        let mut hex_str = String::with_capacity(digest.len() * 2);
        for byte in digest {
            hex_str.push_str(&format!("{byte:02X}"));
        }
        hex_str
    }

    /// Parse an RFC-2616 (HTTP-date / RFC-2822-compatible) server date and
    /// fold `server_time - local_time` into the accumulated skew.
    pub fn adjust_skew_from_server_date(&self, server_date: &str) -> Result<()> {
        let server = OffsetDateTime::parse(server_date, &Rfc2822).map_err(|err| {
            SynthesisError::UnexpectedResponse(format!(
                "invalid server date '{server_date}': {err}"
            ))
        })?;
        let local = OffsetDateTime::now_utc();
        let delta = (server - local).whole_seconds();
        self.skew.adjust(delta);
        Ok(())
    }
}
