//! TLV8 encoding used by HAP characteristic values (HAP §14.1).
//!
//! ```text
//! +------+--------+-----------------+
//! | type | length | value (0..=255) |
//! +------+--------+-----------------+
//! ```
//!
//! - Values longer than 255 bytes are split into consecutive items with
//!   the same type; readers concatenate them.
//! - Lists of structures repeat the same type, separated by a zero-length
//!   item of type `0x00`.
//! - Integers are little-endian.

use crate::error::{Result, Tlv8ErrorKind};

/// Separator between repeated list entries.
pub const SEPARATOR: u8 = 0x00;

const MAX_FRAGMENT: usize = 255;

/// A decoded TLV8 payload: an ordered list of `(type, value)` items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tlv8 {
    items: Vec<(u8, Vec<u8>)>,
}

impl Tlv8 {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut items: Vec<(u8, Vec<u8>)> = Vec::new();
        let mut pos = 0;
        // Set when the previous item was a full 255-byte fragment.
        let mut continues = false;

        while pos < buf.len() {
            if pos + 2 > buf.len() {
                return Err(Tlv8ErrorKind::Truncated.into());
            }
            let tag = buf[pos];
            let len = buf[pos + 1] as usize;
            pos += 2;
            if pos + len > buf.len() {
                return Err(Tlv8ErrorKind::Truncated.into());
            }
            let value = &buf[pos..pos + len];
            pos += len;

            let fragment = continues && items.last().is_some_and(|(last, _)| *last == tag);
            if let (true, Some((_, data))) = (fragment, items.last_mut()) {
                data.extend_from_slice(value);
            } else {
                items.push((tag, value.to_vec()));
            }
            continues = len == MAX_FRAGMENT;
        }

        Ok(Self { items })
    }

    /// First value with the given type.
    pub fn get(&self, tag: u8) -> Option<&[u8]> {
        self.items
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, v)| v.as_slice())
    }

    /// Every value with the given type, in order.
    pub fn get_all(&self, tag: u8) -> impl Iterator<Item = &[u8]> {
        self.items
            .iter()
            .filter(move |(t, _)| *t == tag)
            .map(|(_, v)| v.as_slice())
    }

    pub fn require(&self, tag: u8) -> Result<&[u8]> {
        self.get(tag).ok_or_else(|| Tlv8ErrorKind::MissingTag(tag).into())
    }

    pub fn u8(&self, tag: u8) -> Result<u8> {
        match self.require(tag)? {
            [v] => Ok(*v),
            v => Err(Tlv8ErrorKind::InvalidLength { tag, len: v.len() }.into()),
        }
    }

    /// Optional single-byte value; absent tags yield `default`.
    pub fn u8_or(&self, tag: u8, default: u8) -> Result<u8> {
        match self.get(tag) {
            Some(_) => self.u8(tag),
            None => Ok(default),
        }
    }

    pub fn u16(&self, tag: u8) -> Result<u16> {
        match self.require(tag)? {
            [a, b] => Ok(u16::from_le_bytes([*a, *b])),
            v => Err(Tlv8ErrorKind::InvalidLength { tag, len: v.len() }.into()),
        }
    }

    /// Decode every entry of a repeated nested structure.
    pub fn list<T: FromTlv8>(&self, tag: u8) -> Result<Vec<T>> {
        self.get_all(tag).map(T::decode).collect()
    }
}

/// Builder for TLV8 payloads.
#[derive(Debug, Default)]
pub struct Tlv8Writer {
    buf: Vec<u8>,
}

impl Tlv8Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(&mut self, tag: u8, value: &[u8]) -> &mut Self {
        if value.is_empty() {
            self.buf.extend_from_slice(&[tag, 0]);
            return self;
        }
        for chunk in value.chunks(MAX_FRAGMENT) {
            self.buf.push(tag);
            self.buf.push(chunk.len() as u8);
            self.buf.extend_from_slice(chunk);
        }
        self
    }

    pub fn u8(&mut self, tag: u8, value: u8) -> &mut Self {
        self.bytes(tag, &[value])
    }

    pub fn u16(&mut self, tag: u8, value: u16) -> &mut Self {
        self.bytes(tag, &value.to_le_bytes())
    }

    /// Write a repeated nested structure, separating entries.
    pub fn list<T: ToTlv8>(&mut self, tag: u8, entries: &[T]) -> &mut Self {
        for (i, entry) in entries.iter().enumerate() {
            if i > 0 {
                self.bytes(SEPARATOR, &[]);
            }
            self.bytes(tag, &entry.encode());
        }
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Structures decodable from a TLV8 payload.
pub trait FromTlv8: Sized {
    fn from_tlv8(tlv: &Tlv8) -> Result<Self>;

    fn decode(buf: &[u8]) -> Result<Self> {
        Self::from_tlv8(&Tlv8::parse(buf)?)
    }
}

impl FromTlv8 for Tlv8 {
    fn from_tlv8(tlv: &Tlv8) -> Result<Self> {
        Ok(tlv.clone())
    }
}

/// Structures encodable as a TLV8 payload.
pub trait ToTlv8 {
    fn write_tlv8(&self, w: &mut Tlv8Writer);

    fn encode(&self) -> Vec<u8> {
        let mut w = Tlv8Writer::new();
        self.write_tlv8(&mut w);
        w.finish()
    }
}
