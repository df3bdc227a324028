//! Discovery keys and their string codec.
//!
//! A discovery key names a replicable resource. It doubles as the swarm topic
//! peers meet on and as the routing key for per-resource channels. The string
//! form is lowercase hex; decoding also accepts `dat://` links.

use std::fmt;
use std::str::FromStr;

use blake2::digest::consts::U32;
use blake2::digest::Mac;
use blake2::Blake2bMac;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{KeyError, PublicKey};

/// Length in bytes of a discovery key.
pub const DISCOVERY_KEY_LEN: usize = 32;

const URL_SCHEME: &str = "dat://";

/// Message hashed under the resource public key to derive its discovery key.
const DERIVATION_NAMESPACE: &[u8] = b"hypercore";

type Blake2bMac256 = Blake2bMac<U32>;

/// A 32-byte opaque resource identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DiscoveryKey([u8; DISCOVERY_KEY_LEN]);

impl DiscoveryKey {
    pub const fn new(bytes: [u8; DISCOVERY_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Build a key from a byte slice, which must be exactly 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let arr: [u8; DISCOVERY_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidLength(bytes.len()))?;
        Ok(Self(arr))
    }

    /// Derive the discovery key of a resource from its public key.
    ///
    /// Keyed BLAKE2b-256 over the ASCII string `hypercore`, keyed with the
    /// public key. Peers can look a resource up by this value without learning
    /// the public key itself.
    pub fn derive(public_key: &PublicKey) -> Result<Self, KeyError> {
        let key = public_key.as_bytes();
        let mut mac = Blake2bMac256::new_from_slice(key)
            .map_err(|_| KeyError::InvalidLength(key.len()))?;
        mac.update(DERIVATION_NAMESPACE);
        let digest = mac.finalize().into_bytes();
        let mut out = [0u8; DISCOVERY_KEY_LEN];
        out.copy_from_slice(&digest);
        Ok(Self(out))
    }

    pub fn as_bytes(&self) -> &[u8; DISCOVERY_KEY_LEN] {
        &self.0
    }

    /// The canonical string form. Same as [`encode`].
    pub fn to_hex(&self) -> String {
        encode(self)
    }
}

/// Encode a key as 64 lowercase hex characters.
pub fn encode(key: &DiscoveryKey) -> String {
    hex::encode(key.0)
}

/// Decode the string form of a key.
///
/// Accepts 64 hex characters in either case, optionally preceded by `dat://`
/// and optionally followed by `/` and a path, which is discarded.
pub fn decode(input: &str) -> Result<DiscoveryKey, KeyError> {
    let invalid = || KeyError::Invalid(input.to_string());

    let trimmed = input.trim();
    let body = match trimmed.get(..URL_SCHEME.len()) {
        Some(scheme) if scheme.eq_ignore_ascii_case(URL_SCHEME) => &trimmed[URL_SCHEME.len()..],
        _ => trimmed,
    };
    let hex_part = body.split_once('/').map_or(body, |(key, _path)| key);

    if hex_part.len() != DISCOVERY_KEY_LEN * 2 {
        return Err(invalid());
    }
    let mut bytes = [0u8; DISCOVERY_KEY_LEN];
    hex::decode_to_slice(hex_part, &mut bytes).map_err(|_| invalid())?;
    Ok(DiscoveryKey(bytes))
}

impl fmt::Debug for DiscoveryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DiscoveryKey({})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for DiscoveryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode(self))
    }
}

impl FromStr for DiscoveryKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s)
    }
}

impl From<[u8; DISCOVERY_KEY_LEN]> for DiscoveryKey {
    fn from(bytes: [u8; DISCOVERY_KEY_LEN]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for DiscoveryKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for DiscoveryKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DiscoveryKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        decode(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Boundary normalization
// ---------------------------------------------------------------------------

/// Anything a caller may hand in as a discovery key: the key itself, its raw
/// bytes, or its string form.
///
/// Public operations convert on entry so everything past the boundary works
/// with a single [`DiscoveryKey`].
pub trait IntoDiscoveryKey {
    fn into_discovery_key(self) -> Result<DiscoveryKey, KeyError>;
}

impl IntoDiscoveryKey for DiscoveryKey {
    fn into_discovery_key(self) -> Result<DiscoveryKey, KeyError> {
        Ok(self)
    }
}

impl IntoDiscoveryKey for &DiscoveryKey {
    fn into_discovery_key(self) -> Result<DiscoveryKey, KeyError> {
        Ok(*self)
    }
}

impl IntoDiscoveryKey for [u8; DISCOVERY_KEY_LEN] {
    fn into_discovery_key(self) -> Result<DiscoveryKey, KeyError> {
        Ok(DiscoveryKey(self))
    }
}

impl IntoDiscoveryKey for &[u8] {
    fn into_discovery_key(self) -> Result<DiscoveryKey, KeyError> {
        DiscoveryKey::from_slice(self)
    }
}

impl IntoDiscoveryKey for Vec<u8> {
    fn into_discovery_key(self) -> Result<DiscoveryKey, KeyError> {
        DiscoveryKey::from_slice(&self)
    }
}

impl IntoDiscoveryKey for &str {
    fn into_discovery_key(self) -> Result<DiscoveryKey, KeyError> {
        decode(self)
    }
}

impl IntoDiscoveryKey for String {
    fn into_discovery_key(self) -> Result<DiscoveryKey, KeyError> {
        decode(&self)
    }
}

impl IntoDiscoveryKey for &String {
    fn into_discovery_key(self) -> Result<DiscoveryKey, KeyError> {
        decode(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const HEX: &str = "4f1c6b0a9d2e3f40112233445566778899aabbccddeeff00102030405060708a";

    #[test]
    fn encode_is_lowercase_hex() {
        let key = DiscoveryKey::new([0xAB; 32]);
        let s = encode(&key);
        assert_eq!(s.len(), 64);
        assert_eq!(s, "ab".repeat(32));
    }

    #[test]
    fn decode_accepts_uppercase() {
        let key = decode(&HEX.to_uppercase()).unwrap();
        assert_eq!(key.to_hex(), HEX);
    }

    #[test]
    fn decode_strips_url_scheme_and_path() {
        let plain = decode(HEX).unwrap();
        assert_eq!(decode(&format!("dat://{HEX}")).unwrap(), plain);
        assert_eq!(decode(&format!("DAT://{HEX}/data.json")).unwrap(), plain);
        assert_eq!(decode(&format!("{HEX}/")).unwrap(), plain);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        assert!(matches!(decode(&HEX[..62]), Err(KeyError::Invalid(_))));
        assert!(matches!(decode(&format!("{HEX}00")), Err(KeyError::Invalid(_))));
        assert!(matches!(decode(""), Err(KeyError::Invalid(_))));
    }

    #[test]
    fn decode_rejects_non_hex() {
        let bad = format!("zz{}", &HEX[2..]);
        assert!(matches!(decode(&bad), Err(KeyError::Invalid(_))));
    }

    #[test]
    fn from_slice_checks_length() {
        assert_eq!(
            DiscoveryKey::from_slice(&[1u8; 31]),
            Err(KeyError::InvalidLength(31))
        );
        assert!(DiscoveryKey::from_slice(&[1u8; 32]).is_ok());
    }

    #[test]
    fn every_input_form_normalizes_to_the_same_key() {
        let key = decode(HEX).unwrap();
        let bytes = *key.as_bytes();
        assert_eq!(HEX.into_discovery_key().unwrap(), key);
        assert_eq!(HEX.to_string().into_discovery_key().unwrap(), key);
        assert_eq!(bytes.into_discovery_key().unwrap(), key);
        assert_eq!(bytes.as_slice().into_discovery_key().unwrap(), key);
        assert_eq!(bytes.to_vec().into_discovery_key().unwrap(), key);
        assert_eq!((&key).into_discovery_key().unwrap(), key);
    }

    #[test]
    fn derive_is_deterministic_and_key_dependent() {
        let a = DiscoveryKey::derive(&PublicKey::new([1u8; 32])).unwrap();
        let b = DiscoveryKey::derive(&PublicKey::new([1u8; 32])).unwrap();
        let c = DiscoveryKey::derive(&PublicKey::new([2u8; 32])).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a.as_bytes(), &[1u8; 32]);
    }

    #[test]
    fn serde_uses_string_form() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            key: DiscoveryKey,
        }
        let key = decode(HEX).unwrap();
        let toml_str = toml::to_string(&Wrapper { key }).unwrap();
        assert!(toml_str.contains(HEX));
        let parsed: Wrapper = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.key, key);
    }

    #[test]
    fn debug_is_abbreviated() {
        let key = DiscoveryKey::new([0xFF; 32]);
        assert_eq!(format!("{key:?}"), "DiscoveryKey(ffffffff)");
    }

    proptest! {
        #[test]
        fn codec_is_lossless(bytes in proptest::array::uniform32(any::<u8>())) {
            let key = DiscoveryKey::new(bytes);
            prop_assert_eq!(decode(&encode(&key)).unwrap(), key);
        }
    }
}
