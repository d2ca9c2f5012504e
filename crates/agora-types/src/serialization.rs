//! Serde implementations for agora-types.
//!
//! Every type serializes to its display string so it can be used as a
//! JSON map key.

use std::str::FromStr;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use crate::*;

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_string().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Address::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl Serialize for AssetId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_string().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AssetId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        AssetId::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl Serialize for ContentRef {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_string().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ContentRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ContentRef::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_address_as_json_key() {
        let mut map = HashMap::new();
        map.insert(Address::from_low_u8(3), 42u64);
        let json = serde_json::to_string(&map).unwrap();
        let back: HashMap<Address, u64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_asset_as_json_key() {
        let mut map = HashMap::new();
        map.insert(AssetId::Native, 1u64);
        map.insert(AssetId::Token(Address::from_low_u8(9)), 2u64);
        let json = serde_json::to_string(&map).unwrap();
        assert!(json.contains("\"native\""));
        let back: HashMap<AssetId, u64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_content_ref_json() {
        let r = ContentRef::of(b"x");
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(serde_json::from_str::<ContentRef>(&json).unwrap(), r);
    }
}
