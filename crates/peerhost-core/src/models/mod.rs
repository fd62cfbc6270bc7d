//! Data models for the host
//!
//! Organized by domain: identities, drives, file headers, the transit wire
//! protocol and the inbox.

mod drive;
mod file;
mod identity;
mod inbox;
mod transfer;

pub use drive::*;
pub use file::*;
pub use identity::*;
pub use inbox::*;
pub use transfer::*;

/// Serde helper for byte fields that travel as base64 strings on the wire.
pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
