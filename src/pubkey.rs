//! ECDSA public keys.
//!
//! This module wraps the P-256 and P-521 verifying keys used to check the
//! DSM-KROOT signature, together with their public key ID. The validation
//! type parameter records whether the key is trusted: keys loaded from
//! local storage are force-validated by the caller, while keys received
//! over the air in a DSM-PKR only become validated through the Merkle tree.

use crate::validation::{NotValidated, Validated};

/// ECDSA verifying key of either supported curve.
#[derive(Clone)]
pub enum VerifyingKey {
    /// P-256 key (used with SHA-256).
    P256(p256::ecdsa::VerifyingKey),
    /// P-521 key (used with SHA-512).
    P521(p521::ecdsa::VerifyingKey),
}

// p521::ecdsa::VerifyingKey does not implement Debug/PartialEq/Eq, so these
// are implemented by hand using its SEC1 encoding.
impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyingKey::P256(key) => f.debug_tuple("P256").field(key).finish(),
            VerifyingKey::P521(key) => f
                .debug_tuple("P521")
                .field(&key.to_encoded_point(true))
                .finish(),
        }
    }
}

impl PartialEq for VerifyingKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (VerifyingKey::P256(a), VerifyingKey::P256(b)) => a == b,
            (VerifyingKey::P521(a), VerifyingKey::P521(b)) => {
                a.to_encoded_point(true) == b.to_encoded_point(true)
            }
            _ => false,
        }
    }
}

impl Eq for VerifyingKey {}

/// ECDSA public key with its OSNMA metadata.
///
/// The `V` type parameter indicates the validation status. See
/// [validation](crate::validation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey<V> {
    key: VerifyingKey,
    pkid: u8,
    _validated: V,
}

impl PublicKey<NotValidated> {
    /// Creates a public key from a P-256 verifying key and its key ID.
    pub fn from_p256(key: p256::ecdsa::VerifyingKey, pkid: u8) -> PublicKey<NotValidated> {
        PublicKey {
            key: VerifyingKey::P256(key),
            pkid,
            _validated: NotValidated {},
        }
    }

    /// Creates a public key from a P-521 verifying key and its key ID.
    pub fn from_p521(key: p521::ecdsa::VerifyingKey, pkid: u8) -> PublicKey<NotValidated> {
        PublicKey {
            key: VerifyingKey::P521(key),
            pkid,
            _validated: NotValidated {},
        }
    }

    /// Marks the key as validated without any cryptographic check.
    ///
    /// Only call this for keys obtained from a trustworthy source, such as
    /// a local file whose provenance is known.
    pub fn force_valid(self) -> PublicKey<Validated> {
        PublicKey {
            key: self.key,
            pkid: self.pkid,
            _validated: Validated {},
        }
    }
}

impl PublicKey<Validated> {
    // Used by the Merkle tree code once a DSM-PKR key has been proven to
    // belong to the pinned tree.
    pub(crate) fn new_validated(key: VerifyingKey, pkid: u8) -> PublicKey<Validated> {
        PublicKey {
            key,
            pkid,
            _validated: Validated {},
        }
    }
}

impl<V> PublicKey<V> {
    /// Returns the wrapped verifying key.
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.key
    }

    /// Returns the public key ID.
    pub fn public_key_id(&self) -> u8 {
        self.pkid
    }
}
