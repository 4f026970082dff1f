//! HomeKit camera producer.
//!
//! A [`Client`] turns one paired accessory into a generic producer with a
//! video and an audio track. Lifecycle:
//!
//! ```text
//! Client::dial      -> HAP connection established
//! get_medias        -> capability descriptors read and cached
//! add_receiver      -> consumer attaches tracks
//! start             -> endpoints built, remote stream opened, sessions
//!                      registered, blocks until the stream goes quiet
//! stop              -> sessions removed, connection closed
//! ```
//!
//! If the first receiver is a JPEG track, `start` skips all of the SRTP
//! machinery and polls snapshots instead (see [`mjpeg`]).

pub mod bridge;
pub mod mjpeg;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Serialize, Serializer};

use crate::camera::negotiate::{audio_to_media, track_to_audio, track_to_video, video_to_media};
use crate::camera::{
    Stream, StreamOpener, SupportedAudioStreamConfig, SupportedVideoStreamConfig,
    TYPE_SUPPORTED_AUDIO_STREAM_CONFIGURATION, TYPE_SUPPORTED_VIDEO_STREAM_CONFIGURATION,
};
use crate::error::{HomekitError, Result};
use crate::hap::{AccessoryConn, Connector, HapConfig};
use crate::media::{CodecName, Kind, Media, Producer, Receiver, ReceiverInfo};
use crate::random::{RandomSource, ThreadRandom};
use crate::srtp::{self, Endpoint, Session};
use bridge::Deadline;

/// Inactivity window after which a live stream is considered finished.
pub const DEFAULT_CONN_DEADLINE: Duration = Duration::from_secs(5);

/// Type tag reported in [`Info`].
pub const PRODUCER_TYPE: &str = "HomeKit active producer";

/// Per-client tunables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Inactivity window for the liveness deadline.
    pub conn_deadline: Duration,
    /// Snapshot size requested in MJPEG fallback mode.
    pub snapshot_width: u16,
    pub snapshot_height: u16,
    /// Run the audio track through [`AudioPacer`](crate::media::AudioPacer).
    pub pace_audio: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            conn_deadline: DEFAULT_CONN_DEADLINE,
            snapshot_width: 1920,
            snapshot_height: 1080,
            pace_audio: false,
        }
    }
}

/// Server-wide collaborators shared by every HomeKit client.
#[derive(Clone)]
pub struct Context {
    pub srtp: srtp::Server,
    pub connector: Arc<dyn Connector>,
    pub opener: Arc<dyn StreamOpener>,
    pub random: Arc<dyn RandomSource>,
    pub config: ClientConfig,
}

impl Context {
    pub fn new(
        srtp: srtp::Server,
        connector: Arc<dyn Connector>,
        opener: Arc<dyn StreamOpener>,
    ) -> Self {
        Self {
            srtp,
            connector,
            opener,
            random: Arc::new(ThreadRandom),
            config: ClientConfig::default(),
        }
    }

    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Handler for the server's `homekit://` scheme registry.
    pub fn handler(self) -> impl Fn(&str) -> Result<Client> + Send + Sync {
        move |url: &str| Client::dial(url, &self)
    }
}

struct Negotiated {
    video: SupportedVideoStreamConfig,
    audio: SupportedAudioStreamConfig,
}

#[derive(Default)]
struct Active {
    video: Option<Arc<Session>>,
    audio: Option<Arc<Session>>,
    stream: Option<Stream>,
    deadline: Option<Arc<Deadline>>,
    stopped: bool,
}

/// Status snapshot, serialized for the server's API.
#[derive(Debug, Clone, Serialize)]
pub struct Info {
    #[serde(rename = "type")]
    pub type_: &'static str,
    pub url: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub medias: Vec<Media>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub receivers: Vec<ReceiverInfo>,
    pub recv: u64,
}

/// Producer backed by one HomeKit camera accessory.
pub struct Client {
    producer: Producer,
    conn: Arc<dyn AccessoryConn>,
    srtp: srtp::Server,
    opener: Arc<dyn StreamOpener>,
    random: Arc<dyn RandomSource>,
    config: ClientConfig,
    negotiated: Mutex<Option<Arc<Negotiated>>>,
    active: Mutex<Active>,
}

impl Client {
    /// Parse a `homekit://` URL, connect, and run the HAP handshake.
    pub fn dial(raw_url: &str, ctx: &Context) -> Result<Self> {
        let config = HapConfig::from_url(raw_url)?;
        tracing::debug!(
            address = %config.device_address,
            device_id = %config.device_id,
            "dialing accessory"
        );

        let conn = ctx.connector.connect(config)?;
        conn.dial()?;

        tracing::info!(url = %conn.url(), "accessory connected");
        Ok(Self::with_conn(conn, ctx))
    }

    /// Wrap an already dialed connection.
    pub fn with_conn(conn: Arc<dyn AccessoryConn>, ctx: &Context) -> Self {
        Self {
            producer: Producer::new(),
            conn,
            srtp: ctx.srtp.clone(),
            opener: ctx.opener.clone(),
            random: ctx.random.clone(),
            config: ctx.config.clone(),
            negotiated: Mutex::new(None),
            active: Mutex::new(Active::default()),
        }
    }

    pub fn conn(&self) -> &Arc<dyn AccessoryConn> {
        &self.conn
    }

    pub fn producer(&self) -> &Producer {
        &self.producer
    }

    pub fn add_receiver(&self, receiver: Arc<Receiver>) {
        self.producer.add_receiver(receiver);
    }

    /// Identifier of the accessory-side stream, once opened.
    pub fn stream_id(&self) -> Option<String> {
        self.active.lock().stream.as_ref().map(|s| s.id.clone())
    }

    /// Medias the accessory can produce: `[video, audio]`.
    ///
    /// Reads the capability descriptors on the first successful call and
    /// serves the cache afterwards. Any lookup or decode failure yields an
    /// empty list and caches nothing.
    pub fn get_medias(&self) -> Vec<Media> {
        let mut negotiated = self.negotiated.lock();
        if let Some(medias) = self.producer.medias() {
            return medias;
        }

        match self.read_capabilities() {
            Ok(caps) => {
                let medias = vec![
                    video_to_media(&caps.video.codecs),
                    audio_to_media(&caps.audio.codecs),
                ];
                tracing::debug!(
                    video_codecs = medias[0].codecs.len(),
                    audio_codecs = medias[1].codecs.len(),
                    "capabilities negotiated"
                );
                *negotiated = Some(Arc::new(caps));
                self.producer.set_medias(medias.clone());
                medias
            }
            Err(e) => {
                tracing::debug!(error = %e, "capability negotiation failed");
                Vec::new()
            }
        }
    }

    fn read_capabilities(&self) -> Result<Negotiated> {
        let accessory = self.conn.first_accessory()?;

        let video = accessory
            .get_character(TYPE_SUPPORTED_VIDEO_STREAM_CONFIGURATION)
            .ok_or_else(|| {
                HomekitError::Negotiation("no supported video stream configuration".to_string())
            })?
            .read_tlv8()?;

        let audio = accessory
            .get_character(TYPE_SUPPORTED_AUDIO_STREAM_CONFIGURATION)
            .ok_or_else(|| {
                HomekitError::Negotiation("no supported audio stream configuration".to_string())
            })?
            .read_tlv8()?;

        Ok(Negotiated { video, audio })
    }

    fn negotiated(&self) -> Result<Arc<Negotiated>> {
        if let Some(caps) = self.negotiated.lock().clone() {
            return Ok(caps);
        }
        self.get_medias();
        self.negotiated
            .lock()
            .clone()
            .ok_or_else(|| HomekitError::Negotiation("capabilities unavailable".to_string()))
    }

    /// Run the producer.
    ///
    /// In streaming mode, blocks until no packet arrived for
    /// [`ClientConfig::conn_deadline`] (or [`stop`](Self::stop) was called)
    /// and returns `Ok(())`; the caller is expected to call `stop`.
    /// In MJPEG mode, runs until the first snapshot error and returns it.
    pub fn start(&self) -> Result<()> {
        let receivers = self.producer.receivers();
        let first = receivers.first().ok_or(HomekitError::NoTracks)?;

        if first.codec().name == CodecName::Jpeg {
            return mjpeg::capture(
                self.conn.as_ref(),
                first,
                self.config.snapshot_width,
                self.config.snapshot_height,
            );
        }

        {
            let active = self.active.lock();
            if active.stopped {
                return Ok(());
            }
            if active.video.is_some() {
                return Err(HomekitError::AlreadyStarted);
            }
        }

        let caps = self.negotiated()?;
        let video_track = self.producer.receiver_by_kind(Kind::Video);
        let audio_track = self.producer.receiver_by_kind(Kind::Audio);

        let video0 = caps
            .video
            .codecs
            .first()
            .ok_or_else(|| HomekitError::Negotiation("no video codecs".to_string()))?;
        let audio0 = caps
            .audio
            .codecs
            .first()
            .ok_or_else(|| HomekitError::Negotiation("no audio codecs".to_string()))?;
        let video_codec = track_to_video(video_track.as_deref(), video0)?;
        let audio_codec = track_to_audio(audio_track.as_deref(), audio0)?;

        let video_session = Arc::new(Session::new(self.endpoint()));
        let audio_session = Arc::new(Session::new(self.endpoint()));

        let stream = self.opener.open_stream(
            self.conn.as_ref(),
            &video_codec,
            &audio_codec,
            &video_session,
            &audio_session,
        )?;
        tracing::debug!(stream_id = %stream.id, "remote stream opened");

        let deadline = Arc::new(Deadline::new(self.config.conn_deadline));
        bridge::wire(
            &deadline,
            video_track,
            audio_track,
            &video_session,
            &audio_session,
            self.config.pace_audio,
        );

        {
            let mut active = self.active.lock();
            if active.stopped {
                tracing::debug!(stream_id = %stream.id, "stopped before streaming began");
                return Ok(());
            }
            if active.video.is_some() {
                return Err(HomekitError::AlreadyStarted);
            }

            self.srtp.add_session(video_session.clone());
            self.srtp.add_session(audio_session.clone());

            active.video = Some(video_session);
            active.audio = Some(audio_session);
            active.stream = Some(stream);
            active.deadline = Some(deadline.clone());
        }

        tracing::info!(url = %self.conn.url(), "streaming");
        deadline.wait();
        tracing::info!(recv = self.recv(), "stream inactive");

        Ok(())
    }

    /// Tear down sessions and close the connection.
    ///
    /// Safe to call repeatedly, before `start`, after a failed `start`,
    /// or concurrently with a running one. Only the first call does any
    /// work; it returns the error from closing the connection, if any.
    pub fn stop(&self) -> Result<()> {
        let (video, audio, deadline) = {
            let mut active = self.active.lock();
            if active.stopped {
                return Ok(());
            }
            active.stopped = true;
            (
                active.video.clone(),
                active.audio.clone(),
                active.deadline.clone(),
            )
        };

        self.producer.close();

        for session in [video, audio].into_iter().flatten() {
            self.srtp.del_session(&session);
        }
        if let Some(deadline) = deadline {
            deadline.expire();
        }

        tracing::debug!(url = %self.conn.url(), "closing accessory connection");
        self.conn.close()
    }

    /// Bytes received across the video and audio sessions.
    pub fn recv(&self) -> u64 {
        let active = self.active.lock();
        [&active.video, &active.audio]
            .into_iter()
            .flatten()
            .map(|s| s.recv())
            .sum()
    }

    pub fn info(&self) -> Info {
        Info {
            type_: PRODUCER_TYPE,
            url: self.conn.url(),
            medias: self.producer.medias().unwrap_or_default(),
            receivers: self.producer.receivers().iter().map(|r| r.info()).collect(),
            recv: self.recv(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint {
            addr: self.conn.local_ip(),
            port: self.srtp.port(),
            master_key: self.random.master_key().to_vec(),
            master_salt: self.random.master_salt().to_vec(),
            ssrc: self.random.ssrc(),
        }
    }
}

impl Serialize for Client {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.info().serialize(serializer)
    }
}
