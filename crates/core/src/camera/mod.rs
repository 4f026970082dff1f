//! HomeKit camera RTP stream management service (HAP §11).
//!
//! The accessory advertises what it can stream through two read-only
//! TLV8 characteristics:
//!
//! | Type | Characteristic | Decoded as |
//! |------|----------------|------------|
//! | `114` | Supported Video Stream Configuration | [`SupportedVideoStreamConfig`] |
//! | `115` | Supported Audio Stream Configuration | [`SupportedAudioStreamConfig`] |
//!
//! After narrowing those to one codec each (see [`negotiate`]), a
//! [`StreamOpener`] writes *Setup Endpoints* and *Selected RTP Stream
//! Configuration* to the accessory, which then starts pushing SRTP to
//! the local endpoints.
//!
//! ## Video codec configuration
//!
//! ```text
//! 0x01 codec type      u8   (0 = H.264)
//! 0x02 codec params    TLV  0x01 profile id (0 baseline, 1 main, 2 high)
//!                           0x02 level      (0 3.1, 1 3.2, 2 4.0)
//!                           0x03 packetization mode
//! 0x03 attributes*     TLV  0x01 width u16, 0x02 height u16, 0x03 fps u8
//! ```
//!
//! ## Audio codec configuration
//!
//! ```text
//! 0x01 codec type      u8   (2 = AAC-ELD, 3 = Opus)
//! 0x02 codec params    TLV  0x01 channels, 0x02 bitrate mode,
//!                           0x03 sample rate (0 8k, 1 16k, 2 24k),
//!                           0x04 RTP time (selected config only)
//! ```

pub mod negotiate;

use crate::error::Result;
use crate::hap::{AccessoryConn, FromTlv8, Tlv8, Tlv8Writer, ToTlv8};
use crate::srtp::Session;

/// Characteristic type of the supported video stream configuration.
pub const TYPE_SUPPORTED_VIDEO_STREAM_CONFIGURATION: &str = "114";
/// Characteristic type of the supported audio stream configuration.
pub const TYPE_SUPPORTED_AUDIO_STREAM_CONFIGURATION: &str = "115";

pub const VIDEO_CODEC_TYPE_H264: u8 = 0;

pub const AUDIO_CODEC_TYPE_PCMU: u8 = 0;
pub const AUDIO_CODEC_TYPE_PCMA: u8 = 1;
pub const AUDIO_CODEC_TYPE_AAC_ELD: u8 = 2;
pub const AUDIO_CODEC_TYPE_OPUS: u8 = 3;

/// Collect a repeated byte field, whether the accessory sent one item
/// per value or one multi-byte item.
fn byte_list(tlv: &Tlv8, tag: u8) -> Vec<u8> {
    tlv.get_all(tag).flatten().copied().collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupportedVideoStreamConfig {
    pub codecs: Vec<VideoCodec>,
}

impl FromTlv8 for SupportedVideoStreamConfig {
    fn from_tlv8(tlv: &Tlv8) -> Result<Self> {
        Ok(Self {
            codecs: tlv.list(0x01)?,
        })
    }
}

impl ToTlv8 for SupportedVideoStreamConfig {
    fn write_tlv8(&self, w: &mut Tlv8Writer) {
        w.list(0x01, &self.codecs);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoCodec {
    pub codec_type: u8,
    pub params: Vec<VideoParams>,
    pub attrs: Vec<VideoAttrs>,
}

impl FromTlv8 for VideoCodec {
    fn from_tlv8(tlv: &Tlv8) -> Result<Self> {
        Ok(Self {
            codec_type: tlv.u8(0x01)?,
            params: tlv.list(0x02)?,
            attrs: tlv.list(0x03)?,
        })
    }
}

impl ToTlv8 for VideoCodec {
    fn write_tlv8(&self, w: &mut Tlv8Writer) {
        w.u8(0x01, self.codec_type)
            .list(0x02, &self.params)
            .list(0x03, &self.attrs);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoParams {
    pub profile_ids: Vec<u8>,
    pub levels: Vec<u8>,
    pub packetization_modes: Vec<u8>,
}

impl FromTlv8 for VideoParams {
    fn from_tlv8(tlv: &Tlv8) -> Result<Self> {
        Ok(Self {
            profile_ids: byte_list(tlv, 0x01),
            levels: byte_list(tlv, 0x02),
            packetization_modes: byte_list(tlv, 0x03),
        })
    }
}

impl ToTlv8 for VideoParams {
    fn write_tlv8(&self, w: &mut Tlv8Writer) {
        w.bytes(0x01, &self.profile_ids)
            .bytes(0x02, &self.levels)
            .bytes(0x03, &self.packetization_modes);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VideoAttrs {
    pub width: u16,
    pub height: u16,
    pub framerate: u8,
}

impl FromTlv8 for VideoAttrs {
    fn from_tlv8(tlv: &Tlv8) -> Result<Self> {
        Ok(Self {
            width: tlv.u16(0x01)?,
            height: tlv.u16(0x02)?,
            framerate: tlv.u8(0x03)?,
        })
    }
}

impl ToTlv8 for VideoAttrs {
    fn write_tlv8(&self, w: &mut Tlv8Writer) {
        w.u16(0x01, self.width)
            .u16(0x02, self.height)
            .u8(0x03, self.framerate);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupportedAudioStreamConfig {
    pub codecs: Vec<AudioCodec>,
    pub comfort_noise: u8,
}

impl FromTlv8 for SupportedAudioStreamConfig {
    fn from_tlv8(tlv: &Tlv8) -> Result<Self> {
        Ok(Self {
            codecs: tlv.list(0x01)?,
            comfort_noise: tlv.u8_or(0x02, 0)?,
        })
    }
}

impl ToTlv8 for SupportedAudioStreamConfig {
    fn write_tlv8(&self, w: &mut Tlv8Writer) {
        w.list(0x01, &self.codecs).u8(0x02, self.comfort_noise);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioCodec {
    pub codec_type: u8,
    pub params: Vec<AudioParams>,
}

impl FromTlv8 for AudioCodec {
    fn from_tlv8(tlv: &Tlv8) -> Result<Self> {
        Ok(Self {
            codec_type: tlv.u8(0x01)?,
            params: tlv.list(0x02)?,
        })
    }
}

impl ToTlv8 for AudioCodec {
    fn write_tlv8(&self, w: &mut Tlv8Writer) {
        w.u8(0x01, self.codec_type).list(0x02, &self.params);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioParams {
    pub channels: u8,
    /// 0 = variable, 1 = constant.
    pub bitrate_mode: u8,
    pub sample_rates: Vec<u8>,
    /// Packet duration in ms. Only present in a selected configuration.
    pub rtp_time: Option<u8>,
}

impl FromTlv8 for AudioParams {
    fn from_tlv8(tlv: &Tlv8) -> Result<Self> {
        Ok(Self {
            channels: tlv.u8(0x01)?,
            bitrate_mode: tlv.u8_or(0x02, 0)?,
            sample_rates: byte_list(tlv, 0x03),
            rtp_time: tlv.get(0x04).map(|_| tlv.u8(0x04)).transpose()?,
        })
    }
}

impl ToTlv8 for AudioParams {
    fn write_tlv8(&self, w: &mut Tlv8Writer) {
        w.u8(0x01, self.channels)
            .u8(0x02, self.bitrate_mode)
            .bytes(0x03, &self.sample_rates);
        if let Some(rtp_time) = self.rtp_time {
            w.u8(0x04, rtp_time);
        }
    }
}

/// Handle for a stream the accessory agreed to push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
    /// Accessory-side stream session identifier.
    pub id: String,
}

/// Allocates the accessory-side stream (Setup Endpoints + Selected RTP
/// Stream Configuration writes).
///
/// Implementations should record the accessory's endpoints on both
/// sessions via [`Session::set_remote`] so that inbound packets can be
/// routed by SSRC.
pub trait StreamOpener: Send + Sync {
    fn open_stream(
        &self,
        conn: &dyn AccessoryConn,
        video: &VideoCodec,
        audio: &AudioCodec,
        video_session: &Session,
        audio_session: &Session,
    ) -> Result<Stream>;
}
