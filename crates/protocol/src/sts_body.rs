//! STS message bodies.
//!
//! Request and reply bodies are small XML documents with flat elements.
//! Key exchange values travel as base64 blobs of length-prefixed byte
//! strings, read back with the packet codec.

use crate::codec::{CodecError, PacketReader};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

/// Upper bound for one length-prefixed value inside a key blob
pub const MAX_KEY_VALUE_LEN: usize = 0x1000;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BodyError {
    #[error("body is not UTF-8")]
    NotUtf8,

    #[error("missing element <{0}>")]
    MissingElement(String),

    #[error("invalid base64 in key data")]
    InvalidBase64,

    #[error("key value of {0} bytes is too large")]
    ValueTooLarge(usize),

    #[error("unexpected trailing bytes in key data")]
    TrailingData,

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl From<BodyError> for nexus_core::NexusError {
    fn from(err: BodyError) -> Self {
        nexus_core::NexusError::Protocol(err.to_string())
    }
}

/// Text content of the first `<tag>...</tag>` element, entities decoded
pub fn element(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);

    let start = xml.find(&open)? + open.len();
    let len = xml[start..].find(&close)?;
    Some(unescape(&xml[start..start + len]))
}

/// Like [`element`], but missing elements are an error
pub fn require_element(xml: &str, tag: &str) -> Result<String, BodyError> {
    element(xml, tag).ok_or_else(|| BodyError::MissingElement(tag.to_string()))
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Builder for flat XML documents such as `<Reply>...</Reply>`
#[derive(Debug, Clone)]
pub struct XmlBody {
    root: &'static str,
    elements: Vec<(String, String)>,
}

impl XmlBody {
    pub fn reply() -> Self {
        Self::new("Reply")
    }

    pub fn request() -> Self {
        Self::new("Request")
    }

    pub fn new(root: &'static str) -> Self {
        Self {
            root,
            elements: Vec::new(),
        }
    }

    pub fn element(mut self, tag: &str, value: impl ToString) -> Self {
        self.elements.push((tag.to_string(), value.to_string()));
        self
    }

    pub fn finish(&self) -> String {
        let mut out = format!("<{}>", self.root);
        for (tag, value) in &self.elements {
            out.push_str(&format!("<{}>{}</{}>", tag, escape(value), tag));
        }
        out.push_str(&format!("</{}>\n", self.root));
        out
    }
}

/// Encode byte strings as `u32 LE length + bytes` each, then base64
pub fn encode_key_blob(values: &[&[u8]]) -> String {
    let mut raw = Vec::new();
    for value in values {
        raw.extend_from_slice(&(value.len() as u32).to_le_bytes());
        raw.extend_from_slice(value);
    }
    STANDARD.encode(raw)
}

/// Decode exactly `count` length-prefixed byte strings from a base64 blob
pub fn decode_key_blob(blob: &str, count: usize) -> Result<Vec<Vec<u8>>, BodyError> {
    let raw = STANDARD
        .decode(blob.trim())
        .map_err(|_| BodyError::InvalidBase64)?;

    let mut reader = PacketReader::new(&raw);
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        let len = reader.read_u32()? as usize;
        if len > MAX_KEY_VALUE_LEN {
            return Err(BodyError::ValueTooLarge(len));
        }
        values.push(reader.read_bytes(len)?);
    }

    if !reader.is_at_end() {
        return Err(BodyError::TrailingData);
    }
    Ok(values)
}

/// `<LoginName>` from a LoginStart request
pub fn login_name(body: &[u8]) -> Result<String, BodyError> {
    let xml = std::str::from_utf8(body).map_err(|_| BodyError::NotUtf8)?;
    require_element(xml, "LoginName")
}

/// Server's LoginStart reply: salt and server public value
pub fn login_start_reply(salt: &[u8], server_public: &[u8]) -> String {
    XmlBody::reply()
        .element("KeyData", encode_key_blob(&[salt, server_public]))
        .finish()
}

/// Client's KeyData request: client public value and proof
pub fn key_data_request(client_public: &[u8], client_proof: &[u8]) -> String {
    XmlBody::request()
        .element("KeyData", encode_key_blob(&[client_public, client_proof]))
        .finish()
}

/// Server's KeyData reply: the server proof
pub fn key_data_reply(server_proof: &[u8]) -> String {
    XmlBody::reply()
        .element("KeyData", encode_key_blob(&[server_proof]))
        .finish()
}

/// Pull `count` key values out of any body carrying `<KeyData>`
pub fn key_data(body: &[u8], count: usize) -> Result<Vec<Vec<u8>>, BodyError> {
    let xml = std::str::from_utf8(body).map_err(|_| BodyError::NotUtf8)?;
    decode_key_blob(&require_element(xml, "KeyData")?, count)
}
