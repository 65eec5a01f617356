//! x25519 keypairs for the Reality handshake.
//!
//! Every call draws fresh bytes from the OS CSPRNG. A failing source is a
//! hard error for that call; it is never retried.

use std::fmt;

use async_graphql::SimpleObject;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::{TryCryptoRng, TryRngCore};
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::ControlError;

/// Upper bound on keypairs produced by one batch call.
pub const MAX_BATCH: usize = 64;

/// Raw key material.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub public_key: [u8; 32],
    pub private_key: [u8; 32],
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &URL_SAFE_NO_PAD.encode(self.public_key))
            .field("private_key", &"[redacted]")
            .finish()
    }
}

/// Keypair as exchanged over the API: base64url without padding, the
/// encoding Xray expects for `privateKey` / `publicKey`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct EncodedKeyPair {
    pub public_key: String,
    pub private_key: String,
}

impl From<&KeyPair> for EncodedKeyPair {
    fn from(pair: &KeyPair) -> Self {
        Self {
            public_key: URL_SAFE_NO_PAD.encode(pair.public_key),
            private_key: URL_SAFE_NO_PAD.encode(pair.private_key),
        }
    }
}

/// Generate one keypair from the operating system's entropy source.
pub fn generate() -> Result<KeyPair, ControlError> {
    generate_with(&mut OsRng)
}

/// Generate one keypair from `rng`.
pub fn generate_with<R>(rng: &mut R) -> Result<KeyPair, ControlError>
where
    R: TryRngCore + TryCryptoRng,
{
    let mut secret = [0u8; 32];
    rng.try_fill_bytes(&mut secret)
        .map_err(|e| ControlError::EntropyUnavailable(e.to_string()))?;

    // RFC 7748 clamping, so the exported private key is already canonical.
    secret[0] &= 248;
    secret[31] &= 127;
    secret[31] |= 64;

    let static_secret = StaticSecret::from(secret);
    let public = PublicKey::from(&static_secret);

    Ok(KeyPair {
        public_key: public.to_bytes(),
        private_key: static_secret.to_bytes(),
    })
}

/// Generate `count` independent keypairs. Stops at the first entropy failure.
pub fn generate_batch(count: usize) -> Result<Vec<KeyPair>, ControlError> {
    let count = count.clamp(1, MAX_BATCH);
    (0..count).map(|_| generate()).collect()
}

/// Recompute the public half of a base64url private key.
pub fn public_from_private(private_key: &str) -> Result<String, ControlError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(private_key.trim())
        .map_err(|e| ControlError::invalid("privateKey", e.to_string()))?;
    let secret: [u8; 32] = bytes
        .try_into()
        .map_err(|_| ControlError::invalid("privateKey", "expected 32 bytes"))?;
    let public = PublicKey::from(&StaticSecret::from(secret));
    Ok(URL_SAFE_NO_PAD.encode(public.to_bytes()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    /// An entropy source that has run dry.
    struct Exhausted;

    #[derive(Debug)]
    struct Drained;

    impl fmt::Display for Drained {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("entropy pool drained")
        }
    }

    impl TryRngCore for Exhausted {
        type Error = Drained;

        fn try_next_u32(&mut self) -> Result<u32, Self::Error> {
            Err(Drained)
        }

        fn try_next_u64(&mut self) -> Result<u64, Self::Error> {
            Err(Drained)
        }

        fn try_fill_bytes(&mut self, _dst: &mut [u8]) -> Result<(), Self::Error> {
            Err(Drained)
        }
    }

    impl TryCryptoRng for Exhausted {}

    #[test]
    fn successive_pairs_never_repeat() {
        let mut seen_public = HashSet::new();
        let mut seen_private = HashSet::new();
        for _ in 0..2_000 {
            let pair = generate().unwrap();
            assert!(seen_public.insert(pair.public_key));
            assert!(seen_private.insert(pair.private_key));
        }
    }

    #[test]
    fn public_key_matches_private_key() {
        let pair = generate().unwrap();
        let encoded = EncodedKeyPair::from(&pair);
        assert_eq!(public_from_private(&encoded.private_key).unwrap(), encoded.public_key);
    }

    #[test]
    fn private_key_is_clamped() {
        let pair = generate().unwrap();
        assert_eq!(pair.private_key[0] & 7, 0);
        assert_eq!(pair.private_key[31] & 0x80, 0);
        assert_eq!(pair.private_key[31] & 0x40, 0x40);
    }

    #[test]
    fn encoding_is_unpadded_base64url() {
        let encoded = EncodedKeyPair::from(&generate().unwrap());
        assert_eq!(encoded.public_key.len(), 43);
        assert_eq!(encoded.private_key.len(), 43);
        assert!(!encoded.public_key.contains('='));
    }

    #[test]
    fn exhausted_source_is_fatal() {
        let err = generate_with(&mut Exhausted).unwrap_err();
        assert!(matches!(err, ControlError::EntropyUnavailable(ref msg) if msg.contains("drained")));
    }

    #[test]
    fn batch_size_is_bounded() {
        assert_eq!(generate_batch(0).unwrap().len(), 1);
        assert_eq!(generate_batch(3).unwrap().len(), 3);
        assert_eq!(generate_batch(10_000).unwrap().len(), MAX_BATCH);
    }

    #[test]
    fn debug_output_redacts_private_key() {
        let pair = generate().unwrap();
        let printed = format!("{pair:?}");
        assert!(printed.contains("[redacted]"));
        assert!(!printed.contains(&URL_SAFE_NO_PAD.encode(pair.private_key)));
    }
}
