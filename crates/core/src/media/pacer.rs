//! Audio cadence limiter.
//!
//! HomeKit cameras emit audio in bursts. The pacer forwards at most one
//! 480-sample frame per 30 ms of wall-clock time (16 kHz nominal rate),
//! drops frames that arrive ahead of that schedule, and rewrites each
//! forwarded packet's timestamp with the running sample count:
//!
//! ```text
//! arrival (ms):   0    10   20   30   60   70   90
//! elapsed (smp):  0   160  320  480  960 1120 1440
//! action:        fwd drop drop drop  fwd drop  fwd
//! timestamp:     480                 960      1440
//! ```

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use super::{PacketSink, RtpPacket};

/// Nominal audio clock rate enforced by the pacer.
pub const SAMPLE_RATE: u64 = 16000;
/// Samples carried by one forwarded frame.
pub const FRAME_SAMPLES: u64 = 480;

#[derive(Debug, Default)]
struct PacerState {
    sent: u64,
    first: Option<Instant>,
}

/// Rate limiter that stamps forwarded packets with a monotonic sample count.
#[derive(Debug, Default)]
pub struct AudioPacer {
    state: Mutex<PacerState>,
}

impl AudioPacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether `packet`, arriving at `now`, is forwarded.
    ///
    /// Returns the restamped packet, or `None` when it arrived too early.
    pub fn pace(&self, mut packet: RtpPacket, now: Instant) -> Option<RtpPacket> {
        let mut state = self.state.lock();

        match state.first {
            Some(first) if state.sent != 0 => {
                let elapsed = now.saturating_duration_since(first);
                let elapsed_samples = (elapsed.as_nanos() * SAMPLE_RATE as u128 / 1_000_000_000) as u64;
                if state.sent + FRAME_SAMPLES > elapsed_samples {
                    tracing::trace!(sent = state.sent, elapsed_samples, "audio frame dropped");
                    return None;
                }
            }
            _ => state.first = Some(now),
        }

        state.sent += FRAME_SAMPLES;
        packet.header.timestamp = state.sent as u32;
        Some(packet)
    }
}

/// [`PacketSink`] adapter that paces packets before handing them on.
pub struct PacedSink {
    pacer: AudioPacer,
    inner: Arc<dyn PacketSink>,
}

impl PacedSink {
    pub fn new(inner: Arc<dyn PacketSink>) -> Self {
        Self {
            pacer: AudioPacer::new(),
            inner,
        }
    }
}

impl PacketSink for PacedSink {
    fn write_rtp(&self, packet: RtpPacket) {
        if let Some(packet) = self.pacer.pace(packet, Instant::now()) {
            self.inner.write_rtp(packet);
        }
    }
}
