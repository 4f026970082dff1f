//! Generic media model shared with the rest of the media server.
//!
//! A source advertises [`Media`] descriptions (one per direction), and
//! consumers attach [`Receiver`] tracks for the codecs they picked. The
//! source only ever calls [`Receiver::write_rtp`]; what happens to the
//! packet afterwards is the consumer's business.
//!
//! ## Kinds and codecs
//!
//! | Codec | Kind | Clock |
//! |-------|------|-------|
//! | `H264` | video | 90000 |
//! | `JPEG` | video | 90000 |
//! | `OPUS` | audio | 8000/16000/24000 |
//! | `ELD` (AAC-ELD) | audio | 8000/16000/24000 |
//! | `PCMU`/`PCMA` | audio | 8000 |

pub mod pacer;
pub mod rtp;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;

pub use pacer::{AudioPacer, PacedSink};
pub use rtp::{RtpHeader, RtpPacket};

/// Media kind. Every codec belongs to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Video,
    Audio,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

/// Codec identity as understood by the rest of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CodecName {
    #[serde(rename = "H264")]
    H264,
    #[serde(rename = "JPEG")]
    Jpeg,
    #[serde(rename = "OPUS")]
    Opus,
    #[serde(rename = "ELD")]
    Eld,
    #[serde(rename = "PCMU")]
    Pcmu,
    #[serde(rename = "PCMA")]
    Pcma,
}

impl CodecName {
    pub fn kind(self) -> Kind {
        match self {
            Self::H264 | Self::Jpeg => Kind::Video,
            Self::Opus | Self::Eld | Self::Pcmu | Self::Pcma => Kind::Audio,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::H264 => "H264",
            Self::Jpeg => "JPEG",
            Self::Opus => "OPUS",
            Self::Eld => "ELD",
            Self::Pcmu => "PCMU",
            Self::Pcma => "PCMA",
        }
    }
}

/// A single codec offer or selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Codec {
    pub name: CodecName,
    pub clock_rate: u32,
    /// Audio channel count, 0 for video.
    #[serde(skip_serializing_if = "is_zero")]
    pub channels: u8,
    /// SDP-style `a=fmtp` parameters without the payload type prefix.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub fmtp_line: String,
}

fn is_zero(v: &u8) -> bool {
    *v == 0
}

impl Codec {
    pub fn new(name: CodecName, clock_rate: u32) -> Self {
        Self {
            name,
            clock_rate,
            channels: 0,
            fmtp_line: String::new(),
        }
    }

    pub fn kind(&self) -> Kind {
        self.name.kind()
    }

    /// Value of one `key=value` pair from the fmtp line.
    pub fn fmtp(&self, key: &str) -> Option<&str> {
        self.fmtp_line.split(';').find_map(|pair| {
            let (k, v) = pair.trim().split_once('=')?;
            (k == key).then_some(v)
        })
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name.as_str(), self.clock_rate)?;
        if self.channels > 1 {
            write!(f, "/{}", self.channels)?;
        }
        Ok(())
    }
}

/// Direction of a media description, from the server's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The source delivers media to the server.
    Recvonly,
    Sendonly,
}

/// One direction of media a source can produce, with the codecs it offers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Media {
    pub kind: Kind,
    pub direction: Direction,
    pub codecs: Vec<Codec>,
}

/// Something RTP packets can be written to.
///
/// Implementations must tolerate concurrent calls from independent
/// delivery threads; the source performs no cross-track locking.
pub trait PacketSink: Send + Sync {
    fn write_rtp(&self, packet: RtpPacket);
}

impl<F> PacketSink for F
where
    F: Fn(RtpPacket) + Send + Sync,
{
    fn write_rtp(&self, packet: RtpPacket) {
        self(packet)
    }
}

/// A consumer-owned track attached to a source.
pub struct Receiver {
    codec: Codec,
    sink: Arc<dyn PacketSink>,
    packets: AtomicU64,
    bytes: AtomicU64,
}

impl Receiver {
    pub fn new(codec: Codec, sink: Arc<dyn PacketSink>) -> Self {
        Self {
            codec,
            sink,
            packets: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn kind(&self) -> Kind {
        self.codec.kind()
    }

    pub fn write_rtp(&self, packet: RtpPacket) {
        self.packets.fetch_add(1, Ordering::Relaxed);
        self.bytes
            .fetch_add(packet.payload.len() as u64, Ordering::Relaxed);
        self.sink.write_rtp(packet);
    }

    /// Snapshot for status reporting.
    pub fn info(&self) -> ReceiverInfo {
        ReceiverInfo {
            codec: self.codec.clone(),
            packets: self.packets.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for Receiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("codec", &self.codec)
            .field("packets", &self.packets.load(Ordering::Relaxed))
            .finish()
    }
}

impl PacketSink for Receiver {
    fn write_rtp(&self, packet: RtpPacket) {
        Receiver::write_rtp(self, packet)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceiverInfo {
    pub codec: Codec,
    pub packets: u64,
    pub bytes: u64,
}

/// Shared producer state: advertised medias and attached receivers.
///
/// Every source embeds one. Consumers attach receivers through
/// [`add_receiver`](Self::add_receiver) before the source is started.
#[derive(Debug, Default)]
pub struct Producer {
    medias: RwLock<Option<Vec<Media>>>,
    receivers: RwLock<Vec<Arc<Receiver>>>,
}

impl Producer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached medias, if negotiation already succeeded.
    pub fn medias(&self) -> Option<Vec<Media>> {
        self.medias.read().clone()
    }

    pub fn set_medias(&self, medias: Vec<Media>) {
        *self.medias.write() = Some(medias);
    }

    pub fn add_receiver(&self, receiver: Arc<Receiver>) {
        tracing::debug!(codec = %receiver.codec(), kind = %receiver.kind(), "receiver attached");
        self.receivers.write().push(receiver);
    }

    pub fn receivers(&self) -> Vec<Arc<Receiver>> {
        self.receivers.read().clone()
    }

    /// First receiver of the given kind, if any.
    pub fn receiver_by_kind(&self, kind: Kind) -> Option<Arc<Receiver>> {
        self.receivers
            .read()
            .iter()
            .find(|r| r.kind() == kind)
            .cloned()
    }

    /// Detach all receivers.
    pub fn close(&self) {
        let detached = std::mem::take(&mut *self.receivers.write());
        if !detached.is_empty() {
            tracing::debug!(receivers = detached.len(), "producer closed");
        }
    }
}
