//! Fundamental types for seedswarm.
//!
//! Discovery keys (with their lossless string codec), the per-process network
//! identity, peer public keys and connection ids. Every other crate in the
//! workspace speaks in these types.

pub mod error;
pub mod identity;
pub mod key;

pub use error::KeyError;
pub use identity::{ConnectionId, NetworkIdentity, PublicKey};
pub use key::{decode, encode, DiscoveryKey, IntoDiscoveryKey, DISCOVERY_KEY_LEN};
