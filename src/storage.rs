//! Storage size definitions.
//!
//! The [`StaticStorage`] trait defines the sizes of the navigation data
//! and MACK message histories kept by the engine. The depths must cover
//! the Slow MAC key delay (11 sub-frames) plus the expiry slack, so that
//! unresolved tags are reported before the ring overwrites them.
//!
//! Two sizes are provided: [`FullStorage`] covers the whole constellation
//! and Slow MAC, and [`SmallStorage`] fits memory constrained uses at the
//! cost of tracking fewer satellites and not resolving Slow MAC.

use generic_array::ArrayLength;

/// Auxiliary trait for generic array sizes.
///
/// Collects the traits required to use an unsigned `typenum` integer as a
/// length of the generic arrays used in the storage. A blanket
/// implementation covers all suitable types.
pub trait StaticStorageTypenum:
    typenum::marker_traits::Unsigned
    + core::fmt::Debug
    + core::cmp::PartialEq
    + core::cmp::Eq
    + ArrayLength
{
}

impl<T> StaticStorageTypenum for T where
    T: typenum::marker_traits::Unsigned
        + core::fmt::Debug
        + core::cmp::PartialEq
        + core::cmp::Eq
        + ArrayLength
{
}

/// Static storage sizes.
///
/// Implementors define the storage dimensions used by the engine. The
/// product types must be consistent with `NUM_SATS`; inconsistent sizes
/// cause panics or wrong results.
pub trait StaticStorage {
    /// Number of satellites stored in parallel.
    ///
    /// Use 36 to track the full constellation, or a value around 8 to 12
    /// to track only the satellites in view.
    const NUM_SATS: usize;
    /// Number of navigation data sub-frames kept as history.
    ///
    /// Should exceed `MackDepth` by one, since tags refer to navigation
    /// data of the sub-frame before them.
    type NavMessageDepth: StaticStorageTypenum;
    /// Product of `NUM_SATS` and `NavMessageDepth`.
    type NavMessageDepthSats: StaticStorageTypenum;
    /// Number of MACK message sub-frames kept as history.
    ///
    /// Slow MAC requires at least 12 (current sub-frame, previous
    /// sub-frame, and the 10 sub-frames of extra key delay), plus slack
    /// for the expiry sweep to run before entries are overwritten.
    type MackDepth: StaticStorageTypenum;
    /// Product of `NUM_SATS` and `MackDepth`.
    type MackDepthSats: StaticStorageTypenum;
}

/// Storage for 36 satellites and Slow MAC.
///
/// The largest storage that makes sense to have.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct FullStorage {}

impl StaticStorage for FullStorage {
    const NUM_SATS: usize = 36;
    type NavMessageDepth = typenum::U15;
    type NavMessageDepthSats = typenum::U540;
    type MackDepth = typenum::U14;
    type MackDepthSats = typenum::U504;
}

/// Storage for 12 satellites without Slow MAC.
///
/// A reduced size for memory constrained applications. The history is too
/// short to resolve Slow MAC tags, which will be reported as expired.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct SmallStorage {}

impl StaticStorage for SmallStorage {
    const NUM_SATS: usize = 12;
    type NavMessageDepth = typenum::U5;
    type NavMessageDepthSats = typenum::U60;
    type MackDepth = typenum::U4;
    type MackDepthSats = typenum::U48;
}
