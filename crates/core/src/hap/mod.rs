//! HomeKit Accessory Protocol (HAP) connection contract and data model.
//!
//! The pair-verify handshake and the encrypted HTTP session it produces
//! are owned by the host server. This module defines what the source
//! needs from that layer:
//!
//! - [`HapConfig`]: the parameters carried by a `homekit://` URL.
//! - [`Connector`]: builds an [`AccessoryConn`] from a [`HapConfig`].
//! - [`AccessoryConn`]: dial, read `/accessories`, fetch a snapshot, close.
//! - [`Accessory`]: the `/accessories` JSON model (HAP §6.6.4), with
//!   characteristic lookup by type and TLV8 decoding of values.
//!
//! ## Connection URL
//!
//! ```text
//! homekit://192.168.1.123:51827?device_id=AA:BB:CC:DD:EE:FF
//!     &device_public=<hex 32 bytes>&client_id=<uuid>&client_private=<hex 64 bytes>
//! ```

pub mod tlv8;

use std::net::IpAddr;
use std::sync::Arc;

use base64::prelude::{BASE64_STANDARD, Engine as _};
use serde::Deserialize;
use url::Url;

use crate::error::{HomekitError, Result};
pub use tlv8::{FromTlv8, Tlv8, Tlv8Writer, ToTlv8};

/// URL scheme handled by this source.
pub const SCHEME: &str = "homekit";

/// Parameters needed to reach a paired accessory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HapConfig {
    /// `host[:port]` of the accessory's HAP server.
    pub device_address: String,
    pub device_id: String,
    /// Accessory long-term Ed25519 public key.
    pub device_public: Vec<u8>,
    pub client_id: String,
    /// Controller long-term Ed25519 private key.
    pub client_private: Vec<u8>,
}

impl HapConfig {
    /// Parse a `homekit://` connection URL.
    pub fn from_url(raw: &str) -> Result<Self> {
        let url = Url::parse(raw)?;

        let host = url
            .host_str()
            .ok_or(HomekitError::Url(url::ParseError::EmptyHost))?;
        let device_address = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        let param = |name: &'static str| -> Result<String> {
            url.query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
                .ok_or(HomekitError::MissingParam(name))
        };

        let device_public = param("device_public")?;
        let client_private = param("client_private")?;

        Ok(Self {
            device_address,
            device_id: param("device_id")?,
            device_public: hex::decode(&device_public)
                .map_err(|_| HomekitError::InvalidKey("device_public"))?,
            client_id: param("client_id")?,
            client_private: hex::decode(&client_private)
                .map_err(|_| HomekitError::InvalidKey("client_private"))?,
        })
    }

    /// Canonical `homekit://` URL for this configuration.
    pub fn url(&self) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("device_id", &self.device_id)
            .append_pair("device_public", &hex::encode(&self.device_public))
            .append_pair("client_id", &self.client_id)
            .append_pair("client_private", &hex::encode(&self.client_private))
            .finish();
        format!("{SCHEME}://{}?{query}", self.device_address)
    }
}

/// An established (or establishable) HAP session with one accessory.
///
/// Implementations are shared between the thread blocked in
/// [`Client::start`](crate::Client::start) and whoever calls
/// [`Client::stop`](crate::Client::stop), so all methods take `&self`.
pub trait AccessoryConn: Send + Sync {
    /// Perform the network connect and pair-verify handshake.
    fn dial(&self) -> Result<()>;

    /// Read `/accessories` and return the first accessory.
    fn first_accessory(&self) -> Result<Accessory>;

    /// Fetch a JPEG snapshot (`POST /resource`).
    fn get_image(&self, width: u16, height: u16) -> Result<Vec<u8>>;

    /// Local address of the HAP connection, advertised as the SRTP endpoint.
    fn local_ip(&self) -> IpAddr;

    /// Canonical `homekit://` URL for status reporting.
    fn url(&self) -> String;

    fn close(&self) -> Result<()>;
}

/// Factory for [`AccessoryConn`]s, supplied by the host server.
pub trait Connector: Send + Sync {
    fn connect(&self, config: HapConfig) -> Result<Arc<dyn AccessoryConn>>;
}

/// `/accessories` response body.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessoryList {
    pub accessories: Vec<Accessory>,
}

impl AccessoryList {
    pub fn from_json(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    pub fn into_first(self) -> Result<Accessory> {
        self.accessories
            .into_iter()
            .next()
            .ok_or_else(|| HomekitError::Accessory("no accessories".to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Accessory {
    pub aid: u64,
    pub services: Vec<Service>,
}

impl Accessory {
    /// First characteristic of the given short type (e.g. `"114"`) in any service.
    pub fn get_character(&self, type_: &str) -> Option<&Character> {
        self.services
            .iter()
            .flat_map(|s| s.characters.iter())
            .find(|c| c.type_.eq_ignore_ascii_case(type_))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
    #[serde(rename = "type")]
    pub type_: String,
    pub iid: u64,
    #[serde(rename = "characteristics", default)]
    pub characters: Vec<Character>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Character {
    #[serde(rename = "type")]
    pub type_: String,
    pub iid: u64,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl Character {
    /// Decode a base64 TLV8 value into `T`.
    pub fn read_tlv8<T: FromTlv8>(&self) -> Result<T> {
        let encoded = self.value.as_str().ok_or_else(|| {
            HomekitError::Negotiation(format!("characteristic {} has no TLV8 value", self.type_))
        })?;
        let raw = BASE64_STANDARD.decode(encoded)?;
        T::decode(&raw)
    }
}
