//! OSNMA message bit fields.
//!
//! Wrappers giving field-level access to the messages of the OSNMA
//! protocol: the NMA and DSM headers, the DSM-KROOT and DSM-PKR messages,
//! and the MACK message with its tag-info entries. Field offsets follow
//! the OSNMA SIS ICD. As a general rule each structure wraps a `&[u8]` or
//! `&[u8; N]` and decodes fields on access.

use crate::tesla::{AdkdCheckError, Key, MacseqCheckError};
use crate::types::{BitSlice, MackMessage, MerkleTreeNode, Towh, MERKLE_TREE_NODE_BYTES};
use crate::validation::{NotValidated, Validated};
use crate::{Gst, Svn, Wn};
use bitvec::prelude::*;
use core::fmt;
use ecdsa::{PrimeCurve, Signature, SignatureSize};
use sha2::{Digest, Sha256};
use signature::Verifier;

// Implements Debug by listing accessor outputs.
macro_rules! fmt_debug_fields {
    ($name:ident, $($field:ident),*) => {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct(stringify!($name))
                $(.field(stringify!($field), &self.$field()))*
                .finish()
        }
    };
}

/// NMA header.
///
/// The first byte of an HKROOT message. The `V` type parameter indicates
/// whether the header has been validated; a header is validated together
/// with the DSM-KROOT it protects, since it is part of the signed message.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct NmaHeader<V> {
    data: u8,
    _validated: V,
}

/// Status of the NMA chain (NMAS field of the NMA header).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum NmaStatus {
    /// Reserved value (NMAS = 0).
    Reserved,
    /// Test (NMAS = 1).
    Test,
    /// Operational (NMAS = 2).
    Operational,
    /// Don't use (NMAS = 3).
    DontUse,
}

/// Chain and Public Key status (CPKS field of the NMA header).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ChainAndPubkeyStatus {
    /// Reserved value (CPKS = 0).
    Reserved,
    /// Nominal (CPKS = 1).
    Nominal,
    /// End of chain (CPKS = 2).
    EndOfChain,
    /// Chain revoked (CPKS = 3).
    ChainRevoked,
    /// New public key (CPKS = 4).
    NewPublicKey,
    /// Public key revoked (CPKS = 5).
    PublicKeyRevoked,
    /// New Merkle tree (CPKS = 6).
    NewMerkleTree,
    /// Alert message (CPKS = 7).
    AlertMessage,
}

impl NmaHeader<NotValidated> {
    /// Constructs a new NMA header from its byte. The header is marked as
    /// not validated.
    pub fn new(data: u8) -> NmaHeader<NotValidated> {
        NmaHeader {
            data,
            _validated: NotValidated {},
        }
    }

    pub(crate) fn force_valid(self) -> NmaHeader<Validated> {
        NmaHeader {
            data: self.data,
            _validated: Validated {},
        }
    }
}

impl<V> NmaHeader<V> {
    /// Returns the header byte.
    pub fn data(&self) -> u8 {
        self.data
    }

    /// Returns the value of the NMAS field.
    pub fn nma_status(&self) -> NmaStatus {
        match self.data >> 6 {
            1 => NmaStatus::Test,
            2 => NmaStatus::Operational,
            3 => NmaStatus::DontUse,
            _ => NmaStatus::Reserved,
        }
    }

    /// Returns the value of the CID field.
    pub fn chain_id(&self) -> u8 {
        (self.data >> 4) & 0x3
    }

    /// Returns the value of the CPKS field.
    pub fn chain_and_pubkey_status(&self) -> ChainAndPubkeyStatus {
        match (self.data >> 1) & 0x7 {
            1 => ChainAndPubkeyStatus::Nominal,
            2 => ChainAndPubkeyStatus::EndOfChain,
            3 => ChainAndPubkeyStatus::ChainRevoked,
            4 => ChainAndPubkeyStatus::NewPublicKey,
            5 => ChainAndPubkeyStatus::PublicKeyRevoked,
            6 => ChainAndPubkeyStatus::NewMerkleTree,
            7 => ChainAndPubkeyStatus::AlertMessage,
            _ => ChainAndPubkeyStatus::Reserved,
        }
    }
}

/// DSM header.
///
/// The second byte of an HKROOT message.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct DsmHeader<'a>(
    /// Reference to an array containing the 1-byte header data.
    pub &'a [u8; 1],
);

/// Type of a DSM message, derived from the DSM ID.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum DsmType {
    /// DSM-KROOT (DSM IDs 0 to 11), carrying a signed TESLA root key.
    Kroot,
    /// DSM-PKR (DSM IDs 12 to 15), carrying a public key renewal.
    Pkr,
}

impl DsmHeader<'_> {
    fn bits(&self) -> &BitSlice {
        BitSlice::from_slice(self.0)
    }

    /// Returns the value of the DSM ID field.
    pub fn dsm_id(&self) -> u8 {
        self.bits()[..4].load_be()
    }

    /// Returns the value of the DSM block ID field.
    pub fn dsm_block_id(&self) -> u8 {
        self.bits()[4..8].load_be()
    }

    /// Returns the type of DSM message, according to the DSM ID field.
    pub fn dsm_type(&self) -> DsmType {
        dsm_type_for_id(self.dsm_id())
    }
}

/// Returns the DSM type that corresponds to a DSM ID.
pub fn dsm_type_for_id(dsm_id: u8) -> DsmType {
    if dsm_id >= 12 {
        DsmType::Pkr
    } else {
        DsmType::Kroot
    }
}

impl fmt::Debug for DsmHeader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DsmHeader")
            .field("dsm_id", &self.dsm_id())
            .field("dsm_block_id", &self.dsm_block_id())
            .finish()
    }
}

/// Hash function (HF field of the DSM-KROOT message).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum HashFunction {
    /// SHA-256 (HF = 0).
    Sha256,
    /// SHA3-256 (HF = 2).
    Sha3_256,
    /// Reserved value (HF = 1, 3).
    Reserved,
}

/// MAC function (MF field of the DSM-KROOT message).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum MacFunction {
    /// HMAC-SHA-256 (MF = 0).
    HmacSha256,
    /// CMAC-AES (MF = 1).
    CmacAes,
    /// Reserved value (MF = 2, 3).
    Reserved,
}

/// ECDSA signature algorithm.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum EcdsaFunction {
    /// ECDSA P-256/SHA-256.
    P256Sha256,
    /// ECDSA P-521/SHA-512.
    P521Sha512,
}

/// DSM-KROOT message.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct DsmKroot<'a>(
    /// Reference to a slice containing the DSM-KROOT message data.
    ///
    /// # Panics
    ///
    /// The slice should be long enough to contain the full DSM-KROOT
    /// message. Otherwise the methods of `DsmKroot` may panic.
    pub &'a [u8],
);

impl DsmKroot<'_> {
    fn bits(&self) -> &BitSlice {
        BitSlice::from_slice(self.0)
    }

    /// Returns the number of DSM-KROOT blocks, or `None` if the NB field
    /// holds a reserved value.
    pub fn number_of_blocks(&self) -> Option<usize> {
        number_of_kroot_blocks(self.bits()[..4].load_be::<u8>())
    }

    /// Returns the value of the PKID (public key ID) field.
    pub fn public_key_id(&self) -> u8 {
        self.bits()[4..8].load_be()
    }

    /// Returns the value of the CIDKR (KROOT chain ID) field.
    pub fn kroot_chain_id(&self) -> u8 {
        self.bits()[8..10].load_be()
    }

    /// Returns the value of the hash function field.
    pub fn hash_function(&self) -> HashFunction {
        match self.bits()[12..14].load_be::<u8>() {
            0 => HashFunction::Sha256,
            2 => HashFunction::Sha3_256,
            _ => HashFunction::Reserved,
        }
    }

    /// Returns the value of the MAC function field.
    pub fn mac_function(&self) -> MacFunction {
        match self.bits()[14..16].load_be::<u8>() {
            0 => MacFunction::HmacSha256,
            1 => MacFunction::CmacAes,
            _ => MacFunction::Reserved,
        }
    }

    /// Returns the TESLA key size in bits, or `None` if the KS field holds a
    /// reserved value. All defined key sizes are a whole number of bytes.
    pub fn key_size(&self) -> Option<usize> {
        match self.bits()[16..20].load_be::<u8>() {
            0 => Some(96),
            1 => Some(104),
            2 => Some(112),
            3 => Some(120),
            4 => Some(128),
            5 => Some(160),
            6 => Some(192),
            7 => Some(224),
            8 => Some(256),
            _ => None,
        }
    }

    /// Returns the tag size in bits, or `None` if the TS field holds a
    /// reserved value.
    pub fn tag_size(&self) -> Option<usize> {
        match self.bits()[20..24].load_be::<u8>() {
            5 => Some(20),
            6 => Some(24),
            7 => Some(28),
            8 => Some(32),
            9 => Some(40),
            _ => None,
        }
    }

    /// Returns the value of the MACLT (MAC look-up table) field.
    pub fn mac_lookup_table(&self) -> u8 {
        self.bits()[24..32].load_be()
    }

    /// Returns the KROOT week number (WNK field).
    pub fn kroot_wn(&self) -> Wn {
        self.bits()[36..48].load_be()
    }

    /// Returns the KROOT time of week in hours (TOWHK field).
    pub fn kroot_towh(&self) -> Towh {
        self.bits()[48..56].load_be()
    }

    /// Returns the value of the 48-bit random pattern alpha.
    pub fn alpha(&self) -> u64 {
        self.bits()[56..104].load_be()
    }

    /// Returns the KROOT field. The length depends on the key size.
    ///
    /// # Panics
    ///
    /// Panics if the key size field holds a reserved value.
    pub fn kroot(&self) -> &[u8] {
        let size = self
            .key_size()
            .expect("attempted to extract KROOT with reserved key size");
        &self.0[13..13 + size / 8]
    }

    /// Returns the ECDSA function in use, guessed from the signature
    /// length (the remaining length after the fixed fields and KROOT).
    ///
    /// # Panics
    ///
    /// Panics if the remaining length matches neither a P-256 nor a P-521
    /// signature plus padding.
    pub fn ecdsa_function(&self) -> EcdsaFunction {
        let kroot_len = self.kroot().len();
        let remaining = self.0.len() - 13 - kroot_len;
        let block = 13;
        let p256_bytes = 64;
        let p521_bytes = 132;
        let p256_padding = (block - (kroot_len + p256_bytes) % block) % block;
        let p521_padding = (block - (kroot_len + p521_bytes) % block) % block;
        if remaining == p256_bytes + p256_padding {
            EcdsaFunction::P256Sha256
        } else if remaining == p521_bytes + p521_padding {
            EcdsaFunction::P521Sha512
        } else {
            panic!(
                "cannot guess ECDSA function from DSM-KROOT length {} (KROOT length {})",
                self.0.len(),
                kroot_len
            );
        }
    }

    /// Returns the digital signature (DS) field.
    pub fn digital_signature(&self) -> &[u8] {
        let size = match self.ecdsa_function() {
            EcdsaFunction::P256Sha256 => 64,
            EcdsaFunction::P521Sha512 => 132,
        };
        let start = 13 + self.kroot().len();
        &self.0[start..start + size]
    }

    /// Returns the padding (P_DK) field.
    pub fn padding(&self) -> &[u8] {
        let start = 13 + self.kroot().len() + self.digital_signature().len();
        &self.0[start..]
    }

    // Message over which the digital signature is computed: the NMA header
    // byte followed by the DSM-KROOT fields from CIDKR through the KROOT
    // (NB and PKID are not signed).
    fn signature_message(&self, nma_header: NmaHeader<NotValidated>) -> ([u8; 209], usize) {
        let mut m = [0; 209];
        m[0] = nma_header.data();
        let end = 13 + self.kroot().len();
        m[1..end].copy_from_slice(&self.0[1..end]);
        (m, end)
    }

    /// Checks the contents of the padding field.
    ///
    /// The padding must equal the truncated SHA-256 of the signed message
    /// concatenated with the signature. Returns `true` if it does.
    pub fn check_padding(&self, nma_header: NmaHeader<NotValidated>) -> bool {
        let (message, size) = self.signature_message(nma_header);
        let mut hash = Sha256::new();
        hash.update(&message[..size]);
        hash.update(self.digital_signature());
        let hash = hash.finalize();
        let padding = self.padding();
        &hash[..padding.len()] == padding
    }

    /// Checks the ECDSA P-256 signature of the message.
    ///
    /// # Panics
    ///
    /// Panics if the message does not use a P-256 signature.
    pub fn check_signature_p256(
        &self,
        nma_header: NmaHeader<NotValidated>,
        pubkey: &p256::ecdsa::VerifyingKey,
    ) -> bool {
        assert_eq!(self.ecdsa_function(), EcdsaFunction::P256Sha256);
        self.check_signature(nma_header, pubkey)
    }

    /// Checks the ECDSA P-521 signature of the message.
    ///
    /// # Panics
    ///
    /// Panics if the message does not use a P-521 signature.
    pub fn check_signature_p521(
        &self,
        nma_header: NmaHeader<NotValidated>,
        pubkey: &p521::ecdsa::VerifyingKey,
    ) -> bool {
        assert_eq!(self.ecdsa_function(), EcdsaFunction::P521Sha512);
        self.check_signature(nma_header, pubkey)
    }

    fn check_signature<VK, C>(&self, nma_header: NmaHeader<NotValidated>, pubkey: &VK) -> bool
    where
        VK: Verifier<Signature<C>>,
        C: PrimeCurve,
        SignatureSize<C>: crypto_common::generic_array::ArrayLength<u8>,
    {
        let (message, size) = self.signature_message(nma_header);
        let signature = Signature::from_bytes(self.digital_signature().into())
            .expect("error deserializing ECDSA signature");
        pubkey.verify(&message[..size], &signature).is_ok()
    }
}

/// Returns the number of blocks of a DSM-KROOT for an NB field value, or
/// `None` for reserved values.
pub fn number_of_kroot_blocks(nb: u8) -> Option<usize> {
    match nb {
        1..=8 => Some(usize::from(nb) + 6),
        _ => None,
    }
}

/// Returns the number of blocks of a DSM-PKR for an NB field value, or
/// `None` for reserved values.
pub fn number_of_pkr_blocks(nb: u8) -> Option<usize> {
    match nb {
        7..=10 => Some(usize::from(nb) + 6),
        _ => None,
    }
}

impl fmt::Debug for DsmKroot<'_> {
    fmt_debug_fields! {
        DsmKroot,
        number_of_blocks,
        public_key_id,
        kroot_chain_id,
        hash_function,
        mac_function,
        key_size,
        tag_size,
        mac_lookup_table,
        kroot_wn,
        kroot_towh,
        alpha,
        kroot,
        digital_signature,
        padding
    }
}

/// New Public Key Type (NPKT field of the DSM-PKR message).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum NewPublicKeyType {
    /// An ECDSA public key.
    EcdsaKey(EcdsaFunction),
    /// OSNMA alert message (OAM).
    OsnmaAlertMessage,
    /// Reserved value.
    Reserved,
}

/// DSM-PKR message.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct DsmPkr<'a>(
    /// Reference to a slice containing the DSM-PKR message data.
    ///
    /// # Panics
    ///
    /// The slice should be long enough to contain the full DSM-PKR
    /// message. Otherwise the methods of `DsmPkr` may panic.
    pub &'a [u8],
);

impl DsmPkr<'_> {
    fn bits(&self) -> &BitSlice {
        BitSlice::from_slice(self.0)
    }

    /// Returns the number of DSM-PKR blocks, or `None` if the NB field holds
    /// a reserved value.
    pub fn number_of_blocks(&self) -> Option<usize> {
        number_of_pkr_blocks(self.bits()[..4].load_be::<u8>())
    }

    /// Returns the value of the Message ID (MID) field.
    pub fn message_id(&self) -> u8 {
        self.bits()[4..8].load_be()
    }

    /// Returns the intermediate tree node in position `node_number`.
    ///
    /// # Panics
    ///
    /// Panics if `node_number` is not 0, 1, 2, or 3.
    pub fn intermediate_tree_node(&self, node_number: usize) -> &MerkleTreeNode {
        assert!(node_number < 4);
        (&self.0[1 + node_number * MERKLE_TREE_NODE_BYTES
            ..1 + (node_number + 1) * MERKLE_TREE_NODE_BYTES])
            .try_into()
            .unwrap()
    }

    /// Returns the value of the New Public Key Type (NPKT) field.
    pub fn new_public_key_type(&self) -> NewPublicKeyType {
        match self.bits()[1032..1036].load_be::<u8>() {
            1 => NewPublicKeyType::EcdsaKey(EcdsaFunction::P256Sha256),
            3 => NewPublicKeyType::EcdsaKey(EcdsaFunction::P521Sha512),
            4 => NewPublicKeyType::OsnmaAlertMessage,
            _ => NewPublicKeyType::Reserved,
        }
    }

    /// Returns the value of the New Public Key ID (NPKID) field.
    pub fn new_public_key_id(&self) -> u8 {
        self.bits()[1036..1040].load_be()
    }

    /// Returns the size of the new public key field in bytes, or `None` if
    /// it cannot be determined because of reserved field values.
    pub fn key_size(&self) -> Option<usize> {
        match self.new_public_key_type() {
            NewPublicKeyType::EcdsaKey(EcdsaFunction::P256Sha256) => Some(264 / 8),
            NewPublicKeyType::EcdsaKey(EcdsaFunction::P521Sha512) => Some(536 / 8),
            NewPublicKeyType::OsnmaAlertMessage => {
                self.number_of_blocks().map(|n| n * (104 / 8) - 1040 / 8)
            }
            NewPublicKeyType::Reserved => None,
        }
    }

    /// Returns the new public key field, or `None` if its size cannot be
    /// determined.
    pub fn new_public_key(&self) -> Option<&[u8]> {
        self.key_size().map(|s| &self.0[1040 / 8..1040 / 8 + s])
    }

    /// Returns the padding field, or `None` if its extent cannot be
    /// determined.
    pub fn padding(&self) -> Option<&[u8]> {
        if let (Some(ks), Some(nb)) = (self.key_size(), self.number_of_blocks()) {
            Some(&self.0[1040 / 8 + ks..nb * 104 / 8])
        } else {
            None
        }
    }

    /// Returns the Merkle tree leaf corresponding to this message (the NPKT,
    /// NPKID and key fields), or `None` if its extent cannot be determined.
    pub fn merkle_tree_leaf(&self) -> Option<&[u8]> {
        self.key_size().map(|s| &self.0[1032 / 8..1040 / 8 + s])
    }

    /// Checks the contents of the padding field against the truncated
    /// SHA-256 of the Merkle tree root and leaf. An empty padding (as in
    /// alert messages) is accepted.
    pub fn check_padding(&self, merkle_tree_root: &MerkleTreeNode) -> bool {
        let Some(padding) = self.padding() else {
            return false;
        };
        if padding.is_empty() {
            return true;
        }
        let mut hash = Sha256::new();
        hash.update(merkle_tree_root);
        // merkle_tree_leaf cannot be None here, because padding is not None
        hash.update(self.merkle_tree_leaf().unwrap());
        let hash = hash.finalize();
        &hash[..padding.len()] == padding
    }
}

impl fmt::Debug for DsmPkr<'_> {
    fmt_debug_fields! {
        DsmPkr,
        number_of_blocks,
        message_id,
        new_public_key_type,
        new_public_key_id,
        new_public_key,
        padding
    }
}

/// MACK message.
///
/// Interpreting a MACK message requires the key and tag sizes of the
/// TESLA chain in force, so `Mack` holds these along with the data.
///
/// The `V` type parameter indicates the validation status of the message.
/// Validating a MACK message checks its MACSEQ field and its ADKD sequence
/// against the MAC look-up table; see [`Mack::validate`].
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct Mack<'a, V> {
    data: &'a BitSlice,
    key_size: usize,
    tag_size: usize,
    _validated: V,
}

impl Mack<'_, NotValidated> {
    /// Constructs a new MACK message from its 60 bytes and the key and tag
    /// sizes in bits of the current TESLA chain.
    pub fn new(data: &MackMessage, key_size: usize, tag_size: usize) -> Mack<'_, NotValidated> {
        Mack {
            data: BitSlice::from_slice(data),
            key_size,
            tag_size,
            _validated: NotValidated {},
        }
    }
}

#[cfg(test)]
impl<'a> Mack<'a, NotValidated> {
    pub(crate) fn force_valid(self) -> Mack<'a, Validated> {
        Mack {
            data: self.data,
            key_size: self.key_size,
            tag_size: self.tag_size,
            _validated: Validated {},
        }
    }
}

impl<V> Mack<'_, V> {
    /// Returns the key size in bits used to interpret the message.
    pub fn key_size(&self) -> usize {
        self.key_size
    }

    /// Returns the tag size in bits used to interpret the message.
    pub fn tag_size(&self) -> usize {
        self.tag_size
    }

    /// Returns the tag0 field from the MACK header.
    pub fn tag0(&self) -> &BitSlice {
        &self.data[..self.tag_size()]
    }

    /// Returns the 12-bit MACSEQ field from the MACK header.
    pub fn macseq(&self) -> u16 {
        const MACSEQ_BITS: usize = 12;
        self.data[self.tag_size()..self.tag_size() + MACSEQ_BITS].load_be()
    }

    /// Returns the 4-bit COP field from the MACK header.
    pub fn cop(&self) -> u8 {
        let offset = self.tag_size() + 12;
        self.data[offset..offset + 4].load_be()
    }

    /// Returns the number of tags in the MACK message.
    pub fn num_tags(&self) -> usize {
        (self.data.len() - self.key_size()) / (self.tag_size() + 16)
    }

    /// Returns the disclosed TESLA key field.
    pub fn key(&self) -> &BitSlice {
        let start = (self.tag_size() + 16) * self.num_tags();
        &self.data[start..start + self.key_size()]
    }
}

impl<V: Clone> Mack<'_, V> {
    /// Returns the Tag-Info section with index `n`.
    ///
    /// The first Tag-Info has `n = 1`; `n = 0` would correspond to tag0,
    /// which has no info field and is obtained with [`Mack::tag0`]. The
    /// validation status is inherited from the MACK message.
    ///
    /// # Panics
    ///
    /// Panics if `n` is not between 1 and `self.num_tags() - 1`.
    pub fn tag_and_info(&self, n: usize) -> TagAndInfo<'_, V> {
        assert!(0 < n && n < self.num_tags());
        let size = self.tag_size() + 16;
        TagAndInfo {
            data: &self.data[size * n..size * (n + 1)],
            _validated: self._validated.clone(),
        }
    }
}

impl<'a, V: Clone> Mack<'a, V> {
    /// Try to validate the MACK message.
    ///
    /// Checks the MACSEQ field using the TESLA `key` transmitted in the
    /// following sub-frame, and the ADKD sequence against the MAC look-up
    /// table of the chain. The `prna` parameter is the SVN that
    /// transmitted the MACK message and `gst_mack` the GST at the start of
    /// the sub-frame in which it was transmitted.
    ///
    /// On success a copy of `self` marked [`Validated`] is returned.
    pub fn validate(
        &self,
        key: &Key<Validated>,
        prna: Svn,
        gst_mack: Gst,
    ) -> Result<Mack<'a, Validated>, MackValidationError> {
        key.validate_macseq(self, prna, gst_mack)?;
        for j in 1..self.num_tags() {
            let tag = self.tag_and_info(j);
            if let Err(error) = key.chain().validate_adkd(j, tag, prna, gst_mack) {
                return Err(MackValidationError::WrongAdkd {
                    tag_index: j,
                    error,
                });
            }
        }
        Ok(Mack {
            data: self.data,
            key_size: self.key_size,
            tag_size: self.tag_size,
            _validated: Validated {},
        })
    }
}

impl<V: fmt::Debug + Clone> fmt::Debug for Mack<'_, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Mack");
        dbg.field("tag0", &self.tag0())
            .field("macseq", &self.macseq())
            .field("cop", &self.cop());
        for tag in 1..self.num_tags() {
            dbg.field("tag", &self.tag_and_info(tag));
        }
        dbg.field("key", &self.key())
            .field("_validated", &self._validated)
            .finish()
    }
}

/// MACK validation error.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum MackValidationError {
    /// The MACSEQ field could not be verified.
    MacseqError(MacseqCheckError),
    /// One of the ADKD fields does not match the MAC look-up table.
    WrongAdkd {
        /// Index of the first tag whose ADKD is not correct.
        tag_index: usize,
        /// The reason why the ADKD field is not correct.
        error: AdkdCheckError,
    },
}

impl fmt::Display for MackValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MackValidationError::MacseqError(err) => err.fmt(f),
            MackValidationError::WrongAdkd { tag_index, error } => {
                write!(f, "incorrect ADKD field at tag {} ({})", tag_index, error)
            }
        }
    }
}

impl From<MacseqCheckError> for MackValidationError {
    fn from(value: MacseqCheckError) -> MackValidationError {
        MackValidationError::MacseqError(value)
    }
}

impl std::error::Error for MackValidationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MackValidationError::MacseqError(err) => Some(err),
            MackValidationError::WrongAdkd { error, .. } => Some(error),
        }
    }
}

/// Tag-Info section of a MACK message.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct TagAndInfo<'a, V> {
    data: &'a BitSlice,
    _validated: V,
}

/// PRND field of a Tag-Info section: the satellite transmitting the
/// authenticated data.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Prnd {
    /// Galileo SVID (PRND = 1 - 36).
    GalileoSvid(
        /// The SVID value (between 1 and 36).
        u8,
    ),
    /// Galileo constellation-related information (PRND = 255).
    GalileoConstellation,
    /// Reserved value (any other PRND value).
    Reserved,
}

impl TryFrom<Prnd> for u8 {
    type Error = ();
    fn try_from(value: Prnd) -> Result<u8, ()> {
        match value {
            Prnd::GalileoSvid(svid) => Ok(svid),
            Prnd::GalileoConstellation => Ok(255),
            Prnd::Reserved => Err(()),
        }
    }
}

/// ADKD (Authentication Data and Key Delay) field.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Adkd {
    /// Galileo I/NAV ephemeris, clock and status (ADKD = 0).
    InavCed,
    /// Galileo I/NAV timing parameters (ADKD = 4).
    InavTiming,
    /// Slow MAC: I/NAV ephemeris, clock and status with an 11 sub-frame
    /// key delay (ADKD = 12).
    SlowMac,
    /// Reserved value (any other ADKD value).
    Reserved,
}

impl Adkd {
    /// Returns the numeric value of the ADKD. Reserved values map to 15.
    pub fn value(&self) -> u8 {
        match self {
            Adkd::InavCed => 0,
            Adkd::InavTiming => 4,
            Adkd::SlowMac => 12,
            Adkd::Reserved => 15,
        }
    }
}

impl<V> TagAndInfo<'_, V> {
    /// Returns the tag field.
    pub fn tag(&self) -> &BitSlice {
        &self.data[..self.data.len() - 16]
    }

    /// Returns the 16-bit tag-info field as a [`BitSlice`].
    pub fn tag_info(&self) -> &BitSlice {
        &self.data[self.data.len() - 16..]
    }

    /// Returns the value of the PRND field.
    pub fn prnd(&self) -> Prnd {
        let len = self.data.len();
        match self.data[len - 16..len - 8].load_be::<u8>() {
            n @ 1..=36 => Prnd::GalileoSvid(n),
            255 => Prnd::GalileoConstellation,
            _ => Prnd::Reserved,
        }
    }

    /// Returns the value of the ADKD field.
    pub fn adkd(&self) -> Adkd {
        let len = self.data.len();
        match self.data[len - 8..len - 4].load_be::<u8>() {
            0 => Adkd::InavCed,
            4 => Adkd::InavTiming,
            12 => Adkd::SlowMac,
            _ => Adkd::Reserved,
        }
    }

    /// Returns the value of the 4-bit COP field.
    pub fn cop(&self) -> u8 {
        let len = self.data.len();
        self.data[len - 4..].load_be()
    }
}

impl<V: fmt::Debug> fmt::Debug for TagAndInfo<'_, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagAndInfo")
            .field("tag", &self.tag())
            .field("prnd", &self.prnd())
            .field("adkd", &self.adkd())
            .field("cop", &self.cop())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn nma_header() {
        // NMA header broadcast on 2022-03-07
        let nma_header = NmaHeader::new(0x52);
        assert_eq!(nma_header.nma_status(), NmaStatus::Test);
        assert_eq!(nma_header.chain_id(), 1);
        assert_eq!(
            nma_header.chain_and_pubkey_status(),
            ChainAndPubkeyStatus::Nominal
        );
    }

    #[test]
    fn dsm_header() {
        let header = [0x17];
        let dsm_header = DsmHeader(&header);
        assert_eq!(dsm_header.dsm_id(), 1);
        assert_eq!(dsm_header.dsm_block_id(), 7);
        assert_eq!(dsm_header.dsm_type(), DsmType::Kroot);
        assert_eq!(dsm_type_for_id(12), DsmType::Pkr);
    }

    #[test]
    fn dsm_kroot() {
        // DSM-KROOT broadcast on 2022-03-07 9:00 UTC
        let dsm = hex!(
            "
            22 50 49 21 04 98 21 25 d3 96 4d a3 a2 84 1e 1d
            e4 d4 58 c0 e9 84 24 76 e0 04 66 6c f3 79 58 de
            28 51 97 a2 63 53 f1 a4 c6 6d 7e 3d 29 18 53 ba
            5a 13 c9 c3 48 4a 26 77 70 11 2a 13 38 3e a5 2d
            3a 01 9d 5b 6e 1d d1 87 b9 45 3c df 06 ca 7f 34
            ea 14 97 52 5a af 18 f1 f9 f1 fc cb 12 29 89 77
            35 c0 21 b0 41 73 93 b5"
        );
        let dsm = DsmKroot(&dsm);
        assert_eq!(dsm.number_of_blocks(), Some(8));
        assert_eq!(dsm.public_key_id(), 2);
        assert_eq!(dsm.kroot_chain_id(), 1);
        assert_eq!(dsm.hash_function(), HashFunction::Sha256);
        assert_eq!(dsm.mac_function(), MacFunction::HmacSha256);
        assert_eq!(dsm.key_size(), Some(128));
        assert_eq!(dsm.tag_size(), Some(40));
        assert_eq!(dsm.mac_lookup_table(), 0x21);
        assert_eq!(dsm.kroot_wn(), 0x498);
        assert_eq!(dsm.kroot_towh(), 0x21);
        assert_eq!(dsm.alpha(), 0x25d3964da3a2);
        assert_eq!(
            dsm.kroot(),
            hex!("84 1e 1d e4 d4 58 c0 e9 84 24 76 e0 04 66 6c f3")
        );
        assert_eq!(dsm.ecdsa_function(), EcdsaFunction::P256Sha256);
        assert_eq!(
            dsm.digital_signature(),
            hex!(
                "79 58 de 28 51 97 a2 63 53 f1 a4 c6 6d 7e 3d 29
                 18 53 ba 5a 13 c9 c3 48 4a 26 77 70 11 2a 13 38
                 3e a5 2d 3a 01 9d 5b 6e 1d d1 87 b9 45 3c df 06
                 ca 7f 34 ea 14 97 52 5a af 18 f1 f9 f1 fc cb 12"
            )
        );
        assert_eq!(dsm.padding(), hex!("29 89 77 35 c0 21 b0 41 73 93 b5"));
        let nma_header = NmaHeader::new(0x52);
        assert!(dsm.check_padding(nma_header));
    }

    #[test]
    fn dsm_pkr() {
        // DSM-PKR broadcast on 2023-12-12 12:00 UTC
        let dsm = hex!(
            "
            70 01 63 1b dc ed 79 d4 31 7b c2 87 0e e3 89 5b
            d5 9c f2 b6 ea 51 6f ab bf df 1d 73 96 26 14 6f
            fe 31 6f a9 28 5f 5a 1e 44 04 24 13 bd af 18 aa
            3c f6 84 72 33 97 d7 b8 32 5a ec a1 eb ca 9f 0f
            64 99 05 42 4c be 48 2a 1a 32 b0 10 64 f8 5d 0c
            36 df 03 8e 52 ce 12 8e 7e c5 f3 23 e1 65 b1 82
            a7 15 37 bd b0 10 97 2e b4 a3 b9 0b aa cd 14 94
            1e f4 0d a2 cb 2b 82 d3 78 b3 15 c0 08 de ce fd
            8e 11 03 74 a9 25 cf a0 ff 18 05 e5 c5 a5 8f db
            a3 1b f0 14 5d 5b 5b e2 f0 62 d3 f8 bb 2e e9 8f
            0f 6d b0 e8 23 c5 e7 5e 78"
        );
        let dsm = DsmPkr(&dsm);
        assert_eq!(dsm.number_of_blocks(), Some(13));
        assert_eq!(dsm.message_id(), 0);
        assert_eq!(
            dsm.intermediate_tree_node(0),
            &hex!(
                "01 63 1b dc ed 79 d4 31 7b c2 87 0e e3 89 5b d5
                 9c f2 b6 ea 51 6f ab bf df 1d 73 96 26 14 6f fe"
            )
        );
        assert_eq!(
            dsm.new_public_key_type(),
            NewPublicKeyType::EcdsaKey(EcdsaFunction::P256Sha256)
        );
        assert_eq!(dsm.new_public_key_id(), 1);
        assert_eq!(
            dsm.new_public_key(),
            Some(
                &hex!(
                    "03 74 a9 25 cf a0 ff 18 05 e5 c5 a5 8f db a3 1b
                     f0 14 5d 5b 5b e2 f0 62 d3 f8 bb 2e e9 8f 0f 6d b0"
                )[..]
            )
        );
        assert_eq!(dsm.padding(), Some(&hex!("e8 23 c5 e7 5e 78")[..]));
        // Merkle tree root of the 2023 test phase tree
        let merkle_tree_root =
            hex!("0E63F552C8021709043C239032EFFE941BF22C8389032F5F2701E0FBC80148B8");
        assert!(dsm.check_padding(&merkle_tree_root));
    }

    #[test]
    fn mack() {
        // MACK broadcast on 2022-03-07 9:00 UTC
        let mack = hex!(
            "
            11 55 d3 71 f2 1f 30 a8 e4 ec e0 c0 1b 07 6d 17
            7d 64 03 12 05 d4 02 7e 77 13 15 c0 4c ca 1c 16
            99 1a 05 48 91 07 a7 f7 0e c5 42 b4 19 da 6a da
            1c 0a 3d 6f 56 a5 e5 dc 59 a7 00 00"
        );
        let key_size = 128;
        let tag_size = 40;
        let mack = Mack::new(&mack, key_size, tag_size);
        assert_eq!(mack.key_size(), key_size);
        assert_eq!(mack.tag_size(), tag_size);
        assert_eq!(mack.tag0(), BitSlice::from_slice(&hex!("11 55 d3 71 f2")));
        assert_eq!(mack.macseq(), 0x1f3);
        assert_eq!(mack.num_tags(), 6);
        assert_eq!(
            mack.tag_and_info(1).tag(),
            BitSlice::from_slice(&hex!("a8 e4 ec e0 c0"))
        );
        assert_eq!(mack.tag_and_info(1).prnd(), Prnd::GalileoSvid(0x1b));
        assert_eq!(mack.tag_and_info(1).adkd(), Adkd::InavCed);
        assert_eq!(
            mack.tag_and_info(3).tag(),
            BitSlice::from_slice(&hex!("d4 02 7e 77 13"))
        );
        assert_eq!(mack.tag_and_info(3).prnd(), Prnd::GalileoSvid(0x15));
        assert_eq!(mack.tag_and_info(3).adkd(), Adkd::SlowMac);
        assert_eq!(
            mack.key(),
            BitSlice::from_slice(&hex!("42 b4 19 da 6a da 1c 0a 3d 6f 56 a5 e5 dc 59 a7"))
        );
    }

    #[test]
    fn adkd_values() {
        assert_eq!(Adkd::InavCed.value(), 0);
        assert_eq!(Adkd::InavTiming.value(), 4);
        assert_eq!(Adkd::SlowMac.value(), 12);
    }
}
