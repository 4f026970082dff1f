pub mod camera;
pub mod client;
pub mod error;
pub mod hap;
pub mod media;
pub mod random;
pub mod srtp;

pub use client::{Client, ClientConfig, Context, Info};
pub use error::{HomekitError, Result};
pub use hap::{AccessoryConn, Connector, HapConfig, SCHEME};
pub use media::{Codec, CodecName, Kind, Media, PacketSink, Receiver, RtpPacket};
