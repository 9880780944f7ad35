//! Base64 helpers for binary fields in JSON wire formats.

use crate::error::CryptoResult;
use base64::{engine::general_purpose::STANDARD, Engine};

pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode(encoded: &str) -> CryptoResult<Vec<u8>> {
    Ok(STANDARD.decode(encoded)?)
}

/// `#[serde(with = "ledgerlink_crypto::encoding::base64_bytes")]` for `Vec<u8>` fields.
pub mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::decode(&s).map_err(serde::de::Error::custom)
    }
}
