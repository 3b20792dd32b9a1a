//! Galileo OSNMA receiver engine.
//!
//! This crate implements the core of a receiver for OSNMA (Open Service
//! Navigation Message Authentication), the protocol overlaid on the
//! Galileo I/NAV broadcast that lets a receiver verify that the
//! navigation data it uses was issued by the constellation control
//! segment.
//!
//! Raw I/NAV pages are decoded and assembled into 30-second sub-frames;
//! the OSNMA bits interleaved in the pages are split into the HKROOT and
//! MACK streams; DSM messages reassembled from HKROOT are verified
//! against an ECDSA public key (optionally pinned through a Merkle tree)
//! and install a TESLA one-way key chain; and the MACK tags are checked
//! against the stored navigation data once their delayed-disclosure keys
//! become authentic. Authentication verdicts and reception anomalies are
//! delivered as events.
//!
//! The [`Engine`] struct drives the whole pipeline; the individual
//! modules can also be used directly when finer control is needed.

pub mod bitfields;
pub mod dsm;
pub mod engine;
pub mod events;
mod gst;
pub mod mack;
pub mod maclt;
pub mod merkle_tree;
pub mod navmessage;
pub mod pages;
mod pubkey;
pub mod storage;
pub mod subframe;
mod svn;
pub mod tesla;
pub mod transport;
pub mod types;
pub mod validation;

pub use engine::{Engine, EngineConfig};
pub use events::{AuthOutcome, Event, Subscriber};
pub use gst::{gst2timestamp, Gst, Tow, Wn};
pub use pubkey::{PublicKey, VerifyingKey};
pub use svn::{Svn, SvnError};
pub use types::{InavBand, MerkleTreeNode};
pub use validation::{NotValidated, Validated};
