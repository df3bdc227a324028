use proptest::prelude::*;

use seedswarm_types::{
    decode, encode, ConnectionId, DiscoveryKey, IntoDiscoveryKey, KeyError, NetworkIdentity,
    PublicKey,
};

proptest! {
    /// A URL-shaped key decodes to the same key as its bare hex, whatever the
    /// scheme casing and trailing path.
    #[test]
    fn url_form_decodes_like_bare_hex(
        bytes in prop::array::uniform32(any::<u8>()),
        upper_scheme in any::<bool>(),
        path in "(/[a-z0-9]{0,8}){0,3}",
    ) {
        let key = DiscoveryKey::new(bytes);
        let scheme = if upper_scheme { "DAT://" } else { "dat://" };
        let url = format!("{scheme}{}{path}", encode(&key));
        prop_assert_eq!(decode(&url), Ok(key));
    }

    /// Uppercase hex is accepted, output is always lowercase.
    #[test]
    fn decode_ignores_hex_case(bytes in prop::array::uniform32(any::<u8>())) {
        let key = DiscoveryKey::new(bytes);
        let shouted = encode(&key).to_uppercase();
        let decoded = decode(&shouted).unwrap();
        prop_assert_eq!(decoded, key);
        prop_assert_eq!(encode(&decoded), encode(&key).to_lowercase());
    }

    /// Byte input of any length other than 32 is rejected with its length.
    #[test]
    fn wrong_length_bytes_are_rejected(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        prop_assume!(bytes.len() != 32);
        let len = bytes.len();
        prop_assert_eq!(bytes.into_discovery_key(), Err(KeyError::InvalidLength(len)));
    }

    /// Distinct public keys map to distinct discovery keys.
    #[test]
    fn derive_separates_public_keys(
        a in prop::array::uniform32(any::<u8>()),
        b in prop::array::uniform32(any::<u8>()),
    ) {
        prop_assume!(a != b);
        prop_assert_ne!(
            DiscoveryKey::derive(&PublicKey::new(a)).unwrap(),
            DiscoveryKey::derive(&PublicKey::new(b)).unwrap()
        );
    }

    /// An identity survives its string form.
    #[test]
    fn identity_string_roundtrip(bytes in prop::array::uniform32(any::<u8>())) {
        let identity = NetworkIdentity::new(bytes);
        let parsed: NetworkIdentity = identity.to_string().parse().unwrap();
        prop_assert_eq!(parsed.as_bytes(), &bytes);
    }

    /// Connection ids order by their counter.
    #[test]
    fn connection_id_ordering(a in any::<u64>(), b in any::<u64>()) {
        prop_assert_eq!(ConnectionId(a) <= ConnectionId(b), a <= b);
    }
}
