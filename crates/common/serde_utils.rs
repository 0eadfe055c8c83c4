//! Serde helpers for hex-encoded byte strings, used by the genesis format.

pub mod bytes {
    use ::bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(value: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(value)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let value = String::deserialize(deserializer)?;
        let bytes = hex::decode(value.strip_prefix("0x").unwrap_or(&value))
            .map_err(de::Error::custom)?;
        Ok(Bytes::from(bytes))
    }
}
