//! Agora Types - Primitive types shared by the Agora governance engine.
//!
//! This crate provides:
//! - Account addresses (20-byte, Bech32m encoded)
//! - Asset identifiers (native sentinel or token address)
//! - Content references (32-byte blake3 digests of proposal bodies)
//! - The `Amount` alias used for balances, power and vote counts

pub mod address;
pub mod asset;
pub mod content;
pub mod error;

#[cfg(feature = "serde")]
mod serialization;

pub use address::Address;
pub use asset::AssetId;
pub use content::ContentRef;
pub use error::TypesError;

/// Token amounts, voting power, vote counts and quadratic costs.
pub type Amount = u128;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{Address, Amount, AssetId, ContentRef, TypesError};
}
