use std::fmt;
use std::str::FromStr;
use crate::address::Address;
use crate::error::TypesError;

/// Asset held by the treasury.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum AssetId {
    /// The native value of the hosting ledger
    #[default]
    Native,
    /// A ledger asset identified by its contract address
    Token(Address),
}

impl AssetId {
    /// Textual form of the native sentinel.
    pub const NATIVE_STR: &'static str = "native";

    pub fn is_native(&self) -> bool {
        matches!(self, AssetId::Native)
    }

    pub fn token_address(&self) -> Option<Address> {
        match self {
            AssetId::Native => None,
            AssetId::Token(addr) => Some(*addr),
        }
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetId::Native => f.write_str(Self::NATIVE_STR),
            AssetId::Token(addr) => write!(f, "{}", addr),
        }
    }
}

impl FromStr for AssetId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == Self::NATIVE_STR {
            return Ok(AssetId::Native);
        }
        let addr = Address::from_str(s).map_err(|e| TypesError::InvalidAsset(e.to_string()))?;
        if addr.is_zero() {
            return Err(TypesError::InvalidAsset("zero token address".to_string()));
        }
        Ok(AssetId::Token(addr))
    }
}

impl From<Address> for AssetId {
    fn from(addr: Address) -> Self {
        AssetId::Token(addr)
    }
}
