//! Handles for entities stored in spatial partitions.

use crate::geometry::{AxisAlignedBox, num::Float};
use std::{
    fmt,
    hash::{self, Hash},
};

/// Opaque handle identifying an entity. Spatial partitions only store these
/// handles, so resolving an ID to the actual entity (and keeping that entity
/// alive) is the responsibility of whoever owns the entities.
#[cfg_attr(feature = "fuzzing", derive(arbitrary::Arbitrary))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct EntityID(u64);

/// Anything that has an [`EntityID`] and an axis-aligned bounding box in the
/// space of a spatial partition.
pub trait BoundedEntity<F: Float> {
    /// Returns the ID of the entity.
    fn entity_id(&self) -> EntityID;

    /// Returns the world space bounding box of the entity.
    fn bounding_box(&self) -> &AxisAlignedBox<F>;
}

impl EntityID {
    /// Converts the given `u64` into an entity ID.
    #[inline]
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    /// Returns the `u64` value corresponding to the entity ID.
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Hash for EntityID {
    #[inline]
    fn hash<H: hash::Hasher>(&self, hasher: &mut H) {
        hasher.write_u64(self.0);
    }
}

impl nohash_hasher::IsEnabled for EntityID {}

impl fmt::Display for EntityID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u64())
    }
}

impl<F: Float> BoundedEntity<F> for (EntityID, AxisAlignedBox<F>) {
    fn entity_id(&self) -> EntityID {
        self.0
    }

    fn bounding_box(&self) -> &AxisAlignedBox<F> {
        &self.1
    }
}
