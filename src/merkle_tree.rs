//! Merkle tree.
//!
//! This module authenticates public keys against the OSNMA Merkle tree,
//! which pins the set of legitimate keys to a single root hash that the
//! receiver stores offline. A proof consists of the leaf (key type, key
//! id and key material) and one sibling node per tree level; the leaf
//! hash is combined with the siblings, taking the left or right position
//! at each level according to the bits of the leaf index, and the result
//! must equal the pinned root.
//!
//! Proofs arrive in two forms: over the air in DSM-PKR messages, handled
//! by [`MerkleTree`], and locally in the Merkle tree file, handled by
//! [`MerkleTreeFile`]. Both share the same path computation.

use crate::bitfields::{DsmPkr, EcdsaFunction, NewPublicKeyType};
use crate::pubkey::{PublicKey, VerifyingKey};
use crate::types::{MerkleTreeNode, MERKLE_TREE_NODE_BYTES};
use crate::validation::Validated;
use core::fmt;
use sha2::{Digest, Sha256};

// The OSNMA tree has 16 leaves.
const MERKLE_TREE_DEPTH: usize = 4;

// Recomputes the root from a leaf hash, its index, and the sibling node
// of each level, from the leaves up.
fn merkle_path<'a>(
    leaf_hash: MerkleTreeNode,
    leaf_index: u8,
    siblings: impl Iterator<Item = &'a MerkleTreeNode>,
) -> MerkleTreeNode {
    let mut node = leaf_hash;
    let mut index = leaf_index;
    for sibling in siblings {
        let mut level = Sha256::new();
        if index & 1 == 0 {
            level.update(node);
            level.update(sibling);
        } else {
            level.update(sibling);
            level.update(node);
        }
        node = level.finalize().into();
        index >>= 1;
    }
    node
}

/// Merkle tree.
///
/// Holds the pinned root of the OSNMA Merkle tree.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct MerkleTree {
    root: MerkleTreeNode,
}

impl MerkleTree {
    /// Creates a new Merkle tree from its root.
    pub fn new(root: MerkleTreeNode) -> MerkleTree {
        MerkleTree { root }
    }

    /// Validates a DSM-PKR carrying a new public key.
    ///
    /// The proof carried by the message must reconstruct the pinned
    /// root. On success the carried public key is returned, already
    /// validated.
    pub fn validate_pkr(&self, dsm_pkr: DsmPkr) -> Result<PublicKey<Validated>, PkrError> {
        let NewPublicKeyType::EcdsaKey(function) = dsm_pkr.new_public_key_type() else {
            return Err(PkrError::NoPublicKey);
        };
        self.check_proof(dsm_pkr)?;
        // cannot be None, because the proof check interpreted the leaf
        let key = dsm_pkr.new_public_key().unwrap();
        let key = match function {
            EcdsaFunction::P256Sha256 => p256::ecdsa::VerifyingKey::from_sec1_bytes(key)
                .map(VerifyingKey::P256)
                .map_err(|_| PkrError::KeyParse)?,
            EcdsaFunction::P521Sha512 => p521::ecdsa::VerifyingKey::from_sec1_bytes(key)
                .map(VerifyingKey::P521)
                .map_err(|_| PkrError::KeyParse)?,
        };
        Ok(PublicKey::new_validated(key, dsm_pkr.new_public_key_id()))
    }

    /// Validates a DSM-PKR carrying an OSNMA alert message.
    ///
    /// The alert message is proven with the same path computation used
    /// for public keys. Returns `Ok(())` if the alert message is
    /// authentic.
    pub fn validate_alert_message(&self, dsm_pkr: DsmPkr) -> Result<(), PkrError> {
        if dsm_pkr.new_public_key_type() != NewPublicKeyType::OsnmaAlertMessage {
            return Err(PkrError::NotAlertMessage);
        }
        self.check_proof(dsm_pkr)
    }

    fn check_proof(&self, dsm_pkr: DsmPkr) -> Result<(), PkrError> {
        let leaf = dsm_pkr.merkle_tree_leaf().ok_or(PkrError::ReservedField)?;
        let mut siblings = [[0u8; MERKLE_TREE_NODE_BYTES]; MERKLE_TREE_DEPTH];
        for (level, sibling) in siblings.iter_mut().enumerate() {
            *sibling = *dsm_pkr.intermediate_tree_node(level);
        }
        let computed = merkle_path(
            Sha256::digest(leaf).into(),
            dsm_pkr.message_id(),
            siblings.iter(),
        );
        if computed == self.root {
            Ok(())
        } else {
            Err(PkrError::Invalid)
        }
    }
}

/// Errors produced during validation of a DSM-PKR.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum PkrError {
    /// A field needed to interpret the DSM-PKR has a reserved value.
    ReservedField,
    /// The computed root does not match the pinned root.
    Invalid,
    /// The DSM-PKR does not carry a public key.
    NoPublicKey,
    /// The DSM-PKR does not carry an alert message.
    NotAlertMessage,
    /// The public key bytes could not be parsed for the declared curve.
    KeyParse,
}

impl fmt::Display for PkrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PkrError::ReservedField => "reserved value present in some field".fmt(f),
            PkrError::Invalid => "wrong computed Merkle tree root".fmt(f),
            PkrError::NoPublicKey => "message does not carry a public key".fmt(f),
            PkrError::NotAlertMessage => "message does not carry an alert message".fmt(f),
            PkrError::KeyParse => "could not parse public key".fmt(f),
        }
    }
}

impl std::error::Error for PkrError {}

/// Contents of a Merkle tree file.
///
/// The file is line oriented, with `name = value` entries and `#`
/// comments. The `root` entry (32 bytes of hex) is mandatory. A candidate
/// public key may be pinned by providing `pkid`, `npkt` (1 for P-256, 3
/// for P-521), `key` (SEC1 hex), `mid` (leaf index) and four `node`
/// entries with the sibling hashes; the key is only accepted if the proof
/// reconstructs the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTreeFile {
    root: MerkleTreeNode,
    pinned_key: Option<PublicKey<Validated>>,
}

impl MerkleTreeFile {
    /// Parses a Merkle tree file, verifying the pinned key proof if one
    /// is present.
    pub fn parse(text: &str) -> Result<MerkleTreeFile, MerkleFileError> {
        let mut root = None;
        let mut pkid = None;
        let mut npkt = None;
        let mut key = None;
        let mut mid = None;
        let mut nodes: Vec<MerkleTreeNode> = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((name, value)) = line.split_once('=') else {
                return Err(MerkleFileError::Syntax);
            };
            let (name, value) = (name.trim(), value.trim());
            match name {
                "root" => root = Some(Self::parse_node(value)?),
                "pkid" => pkid = Some(value.parse().map_err(|_| MerkleFileError::Syntax)?),
                "npkt" => npkt = Some(value.parse().map_err(|_| MerkleFileError::Syntax)?),
                "key" => key = Some(hex::decode(value).map_err(|_| MerkleFileError::Syntax)?),
                "mid" => mid = Some(value.parse().map_err(|_| MerkleFileError::Syntax)?),
                "node" => nodes.push(Self::parse_node(value)?),
                _ => return Err(MerkleFileError::Syntax),
            }
        }
        let root = root.ok_or(MerkleFileError::MissingRoot)?;
        let pinned_key = match (pkid, npkt, key, mid) {
            (None, None, None, None) => None,
            (Some(pkid), Some(npkt), Some(key), Some(mid)) => {
                Some(Self::verify_pinned_key(root, pkid, npkt, &key, mid, &nodes)?)
            }
            _ => return Err(MerkleFileError::IncompleteKey),
        };
        Ok(MerkleTreeFile { root, pinned_key })
    }

    fn parse_node(value: &str) -> Result<MerkleTreeNode, MerkleFileError> {
        let bytes = hex::decode(value).map_err(|_| MerkleFileError::Syntax)?;
        bytes.try_into().map_err(|_| MerkleFileError::WrongLength)
    }

    fn verify_pinned_key(
        root: MerkleTreeNode,
        pkid: u8,
        npkt: u8,
        key: &[u8],
        mid: u8,
        nodes: &[MerkleTreeNode],
    ) -> Result<PublicKey<Validated>, MerkleFileError> {
        if nodes.len() != MERKLE_TREE_DEPTH || pkid >= 16 || mid >= 16 {
            return Err(MerkleFileError::IncompleteKey);
        }
        // leaf = NPKT (4 bits) | NPKID (4 bits) | key
        let mut leaf = Vec::with_capacity(1 + key.len());
        leaf.push((npkt << 4) | pkid);
        leaf.extend_from_slice(key);
        let computed = merkle_path(Sha256::digest(&leaf).into(), mid, nodes.iter());
        if computed != root {
            return Err(MerkleFileError::InvalidProof);
        }
        let key = match npkt {
            1 => p256::ecdsa::VerifyingKey::from_sec1_bytes(key)
                .map(VerifyingKey::P256)
                .map_err(|_| MerkleFileError::KeyParse)?,
            3 => p521::ecdsa::VerifyingKey::from_sec1_bytes(key)
                .map(VerifyingKey::P521)
                .map_err(|_| MerkleFileError::KeyParse)?,
            _ => return Err(MerkleFileError::UnknownKeyType),
        };
        Ok(PublicKey::new_validated(key, pkid))
    }

    /// Returns the pinned tree root.
    pub fn root(&self) -> MerkleTreeNode {
        self.root
    }

    /// Returns the pinned public key, if the file carried one.
    pub fn pinned_key(&self) -> Option<&PublicKey<Validated>> {
        self.pinned_key.as_ref()
    }
}

/// Errors produced while parsing a Merkle tree file.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum MerkleFileError {
    /// A line could not be parsed.
    Syntax,
    /// The mandatory root entry is missing.
    MissingRoot,
    /// A hex node value does not have 32 bytes.
    WrongLength,
    /// Only some of the pinned key entries are present.
    IncompleteKey,
    /// The pinned key proof does not reconstruct the root.
    InvalidProof,
    /// The NPKT value is not a known key type.
    UnknownKeyType,
    /// The key bytes could not be parsed for the declared curve.
    KeyParse,
}

impl fmt::Display for MerkleFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MerkleFileError::Syntax => "cannot parse line".fmt(f),
            MerkleFileError::MissingRoot => "missing root entry".fmt(f),
            MerkleFileError::WrongLength => "tree node with wrong length".fmt(f),
            MerkleFileError::IncompleteKey => "incomplete pinned key entries".fmt(f),
            MerkleFileError::InvalidProof => "pinned key proof does not match root".fmt(f),
            MerkleFileError::UnknownKeyType => "unknown public key type".fmt(f),
            MerkleFileError::KeyParse => "could not parse public key".fmt(f),
        }
    }
}

impl std::error::Error for MerkleFileError {}

#[cfg(test)]
mod test {
    //! The DSM-PKR messages and the tree root in these tests are real
    //! protocol data: the root belongs to the Merkle tree published for
    //! the OSNMA test phase in December 2023, and the two messages were
    //! broadcast on 2023-12-12 and 2023-12-15. Only captured material can
    //! exercise the path computation against the true tree. The corrupted
    //! variants below are derived locally from the captures.

    use super::*;
    use hex_literal::hex;

    const ROOT_HEX: &str = "0E63F552C8021709043C239032EFFE941BF22C8389032F5F2701E0FBC80148B8";

    fn pinned_root() -> MerkleTreeNode {
        hex!("0E63F552C8021709043C239032EFFE941BF22C8389032F5F2701E0FBC80148B8")
    }

    // DSM-PKR with leaf index 0, carrying the PKID 1 key
    const PKR_MID0: [u8; 169] = hex!(
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

    // DSM-PKR with leaf index 1, carrying the PKID 2 key
    const PKR_MID1: [u8; 169] = hex!(
        "
        71 e5 53 0a 33 d5 cb 60 c9 50 16 b8 ae c7 45 93
        db cd f2 71 1d 39 9e a2 48 69 17 3c a2 29 37 9a
        15 31 6f a9 28 5f 5a 1e 44 04 24 13 bd af 18 aa
        3c f6 84 72 33 97 d7 b8 32 5a ec a1 eb ca 9f 0f
        64 99 05 42 4c be 48 2a 1a 32 b0 10 64 f8 5d 0c
        36 df 03 8e 52 ce 12 8e 7e c5 f3 23 e1 65 b1 82
        a7 15 37 bd b0 10 97 2e b4 a3 b9 0b aa cd 14 94
        1e f4 0d a2 cb 2b 82 d3 78 b3 15 c0 08 de ce fd
        8e 12 03 35 78 e5 c7 11 a9 c3 bd dd 1c a4 ee 85
        f7 c5 1b 36 78 97 cb 40 b8 85 68 a0 c8 97 da 30
        ef b7 c3 24 e0 22 2c 90 80"
    );

    #[test]
    fn pkr_proofs() {
        let tree = MerkleTree::new(pinned_root());
        for (pkr, expected_pkid) in [(&PKR_MID0, 1u8), (&PKR_MID1, 2u8)] {
            let pubkey = tree.validate_pkr(DsmPkr(pkr)).unwrap();
            assert_eq!(pubkey.public_key_id(), expected_pkid);
        }
    }

    #[test]
    fn corrupted_proofs_rejected() {
        let tree = MerkleTree::new(pinned_root());
        // a corrupted sibling node changes the recomputed root
        let mut bad_sibling = PKR_MID0;
        bad_sibling[2] ^= 0x80; // inside the first intermediate node
        assert_eq!(tree.validate_pkr(DsmPkr(&bad_sibling)), Err(PkrError::Invalid));
        // a corrupted key changes the leaf hash
        let mut bad_key = PKR_MID1;
        bad_key[131] ^= 0x01; // inside the new public key field
        assert_eq!(tree.validate_pkr(DsmPkr(&bad_key)), Err(PkrError::Invalid));
        // a valid proof against a different pinned root
        let other_tree = MerkleTree::new([0x42; MERKLE_TREE_NODE_BYTES]);
        assert_eq!(other_tree.validate_pkr(DsmPkr(&PKR_MID0)), Err(PkrError::Invalid));
    }

    #[test]
    fn pkr_is_not_an_alert_message() {
        let tree = MerkleTree::new(pinned_root());
        assert_eq!(
            tree.validate_alert_message(DsmPkr(&PKR_MID0)),
            Err(PkrError::NotAlertMessage)
        );
    }

    #[test]
    fn file_with_root_only() {
        let text = format!("# pinned tree\nroot = {}\n", ROOT_HEX);
        let file = MerkleTreeFile::parse(&text).unwrap();
        assert_eq!(file.root(), pinned_root());
        assert!(file.pinned_key().is_none());
    }

    #[test]
    fn file_with_pinned_key() {
        // Pin the key of the leaf index 0 message through the file format
        let dsm = DsmPkr(&PKR_MID0);
        let key_hex = hex::encode(dsm.new_public_key().unwrap());
        let mut text = format!(
            "root = {}\npkid = 1\nnpkt = 1\nmid = 0\nkey = {}\n",
            ROOT_HEX, key_hex
        );
        for level in 0..MERKLE_TREE_DEPTH {
            text.push_str(&format!(
                "node = {}\n",
                hex::encode(dsm.intermediate_tree_node(level))
            ));
        }
        let file = MerkleTreeFile::parse(&text).unwrap();
        assert_eq!(file.pinned_key().unwrap().public_key_id(), 1);

        // a wrong pkid changes the leaf and breaks the proof
        let bad = text.replace("pkid = 1", "pkid = 2");
        assert_eq!(
            MerkleTreeFile::parse(&bad),
            Err(MerkleFileError::InvalidProof)
        );
    }

    #[test]
    fn file_errors() {
        assert_eq!(
            MerkleTreeFile::parse("node = 00\n"),
            Err(MerkleFileError::WrongLength)
        );
        assert_eq!(MerkleTreeFile::parse(""), Err(MerkleFileError::MissingRoot));
        let text = format!("root = {}\npkid = 1\n", ROOT_HEX);
        assert_eq!(
            MerkleTreeFile::parse(&text),
            Err(MerkleFileError::IncompleteKey)
        );
    }
}
