//! Validation status markers.
//!
//! The types in this module are zero-sized markers used as type parameters
//! to track, at the type level, whether an object has passed its
//! cryptographic checks. Objects such as TESLA keys, MACK messages and
//! public keys are created with a [`NotValidated`] parameter and only
//! become [`Validated`] through the corresponding check (or through an
//! explicit `force_valid` for material loaded from a trusted source).
//! This prevents, for example, attempting to authenticate navigation data
//! with a TESLA key that has not been traced back to a verified root key.

/// Marker for objects that have passed all required cryptographic checks.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct Validated {}

/// Marker for objects that have not yet been validated.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct NotValidated {}
