//! Conversion between accessory codec descriptors and generic medias.
//!
//! Forward direction ([`video_to_media`], [`audio_to_media`]) advertises
//! everything the accessory supports. Reverse direction
//! ([`track_to_video`], [`track_to_audio`]) narrows the accessory's first
//! codec to exactly what the selected track asked for; that narrowed
//! codec is what gets written when opening the stream.

use super::{
    AUDIO_CODEC_TYPE_AAC_ELD, AUDIO_CODEC_TYPE_OPUS, AUDIO_CODEC_TYPE_PCMA, AUDIO_CODEC_TYPE_PCMU,
    AudioCodec, AudioParams, VIDEO_CODEC_TYPE_H264, VideoCodec, VideoParams,
};
use crate::error::{HomekitError, Result};
use crate::media::{Codec, CodecName, Direction, Kind, Media, Receiver};

/// H.264 `profile_idc` + `constraint` bytes, indexed by HAP profile id.
const VIDEO_PROFILES: [&str; 3] = ["4200", "4D00", "6400"];
/// H.264 `level_idc`, indexed by HAP level.
const VIDEO_LEVELS: [&str; 3] = ["1F", "20", "28"];
/// Sample rate in Hz, indexed by HAP sample rate value.
const AUDIO_SAMPLE_RATES: [u32; 3] = [8000, 16000, 24000];
/// Packet time in ms written to the selected audio configuration: one
/// 480-sample frame at 16 kHz.
pub const AUDIO_RTP_TIME: u8 = 30;

/// Highest advertised id that has an entry in `table`.
fn best_known<'a>(table: &[&'a str], ids: &[u8]) -> Option<&'a str> {
    ids.iter()
        .filter(|&&id| (id as usize) < table.len())
        .max()
        .and_then(|&id| table.get(id as usize))
        .copied()
}

pub fn video_to_media(codecs: &[VideoCodec]) -> Media {
    let codecs = codecs
        .iter()
        .filter(|codec| {
            let h264 = codec.codec_type == VIDEO_CODEC_TYPE_H264;
            if !h264 {
                tracing::debug!(codec_type = codec.codec_type, "skipping unknown video codec");
            }
            h264
        })
        .flat_map(|codec| codec.params.iter())
        .filter_map(|params| {
            let profile = best_known(&VIDEO_PROFILES, &params.profile_ids)?;
            let level = best_known(&VIDEO_LEVELS, &params.levels)?;

            let mut codec = Codec::new(CodecName::H264, 90000);
            codec.fmtp_line = format!("packetization-mode=1;profile-level-id={profile}{level}");
            Some(codec)
        })
        .collect();

    Media {
        kind: Kind::Video,
        direction: Direction::Recvonly,
        codecs,
    }
}

fn audio_codec_name(codec_type: u8) -> Option<CodecName> {
    match codec_type {
        AUDIO_CODEC_TYPE_PCMU => Some(CodecName::Pcmu),
        AUDIO_CODEC_TYPE_PCMA => Some(CodecName::Pcma),
        AUDIO_CODEC_TYPE_AAC_ELD => Some(CodecName::Eld),
        AUDIO_CODEC_TYPE_OPUS => Some(CodecName::Opus),
        _ => None,
    }
}

pub fn audio_to_media(codecs: &[AudioCodec]) -> Media {
    let mut out = Vec::new();

    for codec in codecs {
        let Some(name) = audio_codec_name(codec.codec_type) else {
            tracing::debug!(codec_type = codec.codec_type, "skipping unknown audio codec");
            continue;
        };
        for params in &codec.params {
            for rate in &params.sample_rates {
                let Some(&clock_rate) = AUDIO_SAMPLE_RATES.get(*rate as usize) else {
                    continue;
                };
                let mut media_codec = Codec::new(name, clock_rate);
                media_codec.channels = params.channels;
                out.push(media_codec);
            }
        }
    }

    Media {
        kind: Kind::Audio,
        direction: Direction::Recvonly,
        codecs: out,
    }
}

fn first<'a, T>(items: &'a [T], what: &str) -> Result<&'a T> {
    items
        .first()
        .ok_or_else(|| HomekitError::Negotiation(format!("accessory advertised no {what}")))
}

/// Narrow `video0` to a single profile, level and resolution.
pub fn track_to_video(track: Option<&Receiver>, video0: &VideoCodec) -> Result<VideoCodec> {
    let params0 = first(&video0.params, "video codec params")?;
    let mut profile_id = *first(&params0.profile_ids, "video profiles")?;
    let mut level = *first(&params0.levels, "video levels")?;
    let mut attrs = *first(&video0.attrs, "video attributes")?;

    if let Some(track) = track {
        if let Some(id) = track.codec().fmtp("profile-level-id").filter(|id| id.len() == 6) {
            let (profile, lvl) = id.split_at(4);
            if let Some(i) = VIDEO_PROFILES.iter().position(|p| p.eq_ignore_ascii_case(profile)) {
                profile_id = i as u8;
            }
            if let Some(i) = VIDEO_LEVELS.iter().position(|l| l.eq_ignore_ascii_case(lvl)) {
                level = i as u8;
            }
        }
        for candidate in &video0.attrs {
            if candidate.width > attrs.width || candidate.height > attrs.height {
                attrs = *candidate;
            }
        }
    }

    Ok(VideoCodec {
        codec_type: video0.codec_type,
        params: vec![VideoParams {
            profile_ids: vec![profile_id],
            levels: vec![level],
            packetization_modes: params0.packetization_modes.first().copied().into_iter().collect(),
        }],
        attrs: vec![attrs],
    })
}

/// Narrow `audio0` to a single channel count and sample rate.
///
/// The result is a selected configuration, so it always carries a packet
/// time: the accessory's own if it advertised one, else [`AUDIO_RTP_TIME`].
pub fn track_to_audio(track: Option<&Receiver>, audio0: &AudioCodec) -> Result<AudioCodec> {
    let params0 = first(&audio0.params, "audio codec params")?;
    let mut channels = params0.channels;
    let mut sample_rate = *first(&params0.sample_rates, "audio sample rates")?;

    if let Some(track) = track {
        let codec = track.codec();
        if codec.channels > 0 {
            channels = codec.channels;
        }
        if let Some(i) = AUDIO_SAMPLE_RATES.iter().position(|&r| r == codec.clock_rate) {
            sample_rate = i as u8;
        }
    }

    Ok(AudioCodec {
        codec_type: audio0.codec_type,
        params: vec![AudioParams {
            channels,
            bitrate_mode: params0.bitrate_mode,
            sample_rates: vec![sample_rate],
            rtp_time: Some(params0.rtp_time.unwrap_or(AUDIO_RTP_TIME)),
        }],
    })
}
