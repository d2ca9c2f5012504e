use std::fmt;
use std::str::FromStr;
use crate::error::TypesError;

/// 20-byte account identity.
///
/// The engine never verifies who controls an address; callers arrive
/// already authenticated by the hosting runtime.
/// Display format: Bech32m with the "agora" human-readable prefix.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; 20]);

impl Address {
    /// The null identity. Never a valid delegatee or recipient.
    pub const ZERO: Self = Self([0u8; 20]);
    pub const LEN: usize = 20;

    /// Bech32m human-readable prefix
    pub const BECH32_HRP: &'static str = "agora";

    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Create from a byte slice
    pub fn from_slice(slice: &[u8]) -> Result<Self, TypesError> {
        if slice.len() != Self::LEN {
            return Err(TypesError::InvalidAddressLength(slice.len()));
        }
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Address whose last byte is `n`. Handy for fixtures and system accounts.
    pub const fn from_low_u8(n: u8) -> Self {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        Self(bytes)
    }

    pub fn is_zero(&self) -> bool {
        self == &Self::ZERO
    }

    /// Hex string without 0x prefix
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hrp = bech32::Hrp::parse_unchecked(Self::BECH32_HRP);
        match bech32::encode::<bech32::Bech32m>(hrp, &self.0) {
            Ok(encoded) => write!(f, "{}", encoded),
            Err(_) => Err(fmt::Error),
        }
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address(0x{})", self.to_hex())
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl FromStr for Address {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(hex_part) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            let bytes = hex::decode(hex_part)?;
            return Self::from_slice(&bytes);
        }

        if !s.starts_with("agora1") {
            return Err(TypesError::InvalidAddressFormat(s.to_string()));
        }

        let (hrp, data) = bech32::decode(s).map_err(|e| TypesError::Bech32Error(e.to_string()))?;

        let expected_hrp = bech32::Hrp::parse_unchecked(Self::BECH32_HRP);
        if hrp != expected_hrp {
            return Err(TypesError::InvalidAddressFormat(format!(
                "Invalid HRP: expected '{}', got '{}'",
                Self::BECH32_HRP,
                hrp
            )));
        }

        Self::from_slice(&data)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_zero() {
        assert_eq!(Address::ZERO.as_bytes(), &[0u8; 20]);
        assert!(Address::ZERO.is_zero());
        assert!(!Address::from_low_u8(1).is_zero());
    }

    #[test]
    fn test_address_bech32m_roundtrip() {
        let bytes: [u8; 20] = core::array::from_fn(|i| i as u8);
        let addr = Address::from_bytes(bytes);

        let encoded = addr.to_string();
        assert!(encoded.starts_with("agora1"));

        let decoded: Address = encoded.parse().unwrap();
        assert_eq!(addr, decoded);
    }

    #[test]
    fn test_address_hex_parse() {
        let addr = Address::from_bytes([0xabu8; 20]);
        let parsed: Address = format!("{:x}", addr).parse().unwrap();
        assert_eq!(addr, parsed);
    }

    #[test]
    fn test_address_from_str_invalid() {
        assert!(Address::from_str("invalid").is_err());
        assert!(Address::from_str("0x1234").is_err());
        assert!(Address::from_str("agora1qqqq").is_err());
    }

    #[test]
    fn test_from_slice_length() {
        assert_eq!(
            Address::from_slice(&[1u8; 19]),
            Err(TypesError::InvalidAddressLength(19))
        );
    }
}
