//! Still-image fallback.
//!
//! When the only receiver wants JPEG there is nothing to negotiate: the
//! snapshot endpoint is polled back to back and every image becomes one
//! RTP packet on a 90 kHz clock measured from the start of capture.

use std::time::Instant;

use crate::error::Result;
use crate::hap::AccessoryConn;
use crate::media::{Receiver, RtpHeader, RtpPacket};

const CLOCK_RATE: u128 = 90000;

/// Poll snapshots into `receiver` until the first fetch error, which is
/// returned as is.
pub fn capture(conn: &dyn AccessoryConn, receiver: &Receiver, width: u16, height: u16) -> Result<()> {
    let start = Instant::now();
    let mut sequence: u16 = 0;
    let mut frames: u64 = 0;

    tracing::info!(width, height, "MJPEG capture started");

    loop {
        let image = conn.get_image(width, height).inspect_err(|e| {
            tracing::debug!(error = %e, frames, "MJPEG capture stopped");
        })?;

        let timestamp = (start.elapsed().as_micros() * CLOCK_RATE / 1_000_000) as u32;
        let packet = RtpPacket::new(
            RtpHeader {
                marker: true,
                sequence,
                timestamp,
                ..Default::default()
            },
            image,
        );
        tracing::trace!(sequence, timestamp, bytes = packet.payload.len(), "MJPEG frame");

        receiver.write_rtp(packet);
        sequence = sequence.wrapping_add(1);
        frames += 1;
    }
}
