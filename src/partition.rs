//! Interface for dynamic spatial partitions of entities.

use crate::{
    entity::EntityID,
    geometry::{AxisAlignedBox, Frustum, Ray, num::Float},
};

/// A structure that holds [`EntityID`]s organized by the entities' bounding
/// boxes and answers spatial queries with candidate IDs.
///
/// Query results are conservative: they may include entities that do not
/// actually satisfy the query, but callers can rely on entities satisfying it
/// being included as long as the partition holds them.
pub trait SpatialPartition<F: Float> {
    /// Inserts the entity with the given ID and bounding box.
    ///
    /// # Returns
    /// `false` if the partition cannot hold the entity.
    fn insert_with_bounds(&mut self, id: EntityID, aabb: &AxisAlignedBox<F>) -> bool;

    /// Removes the entity with the given ID, which must have been inserted
    /// with the given bounding box.
    ///
    /// # Returns
    /// `false` if the entity was not found.
    fn remove_with_bounds(&mut self, id: EntityID, aabb: &AxisAlignedBox<F>) -> bool;

    /// Calls the given closure with the ID of every held entity.
    fn for_each_entity(&self, f: impl FnMut(EntityID));

    /// Calls the given closure with the ID of every held entity that may be
    /// hit by the line along the given ray.
    fn for_each_entity_on_ray(&self, ray: &Ray<F>, f: impl FnMut(EntityID));

    /// Calls the given closure with the ID of every held entity that may be
    /// visible in the given frustum.
    fn for_each_entity_in_frustum(&self, frustum: &Frustum<F>, f: impl FnMut(EntityID));

    /// Returns the number of held entities.
    fn entity_count(&self) -> usize;

    /// Removes all entities.
    fn clear_entities(&mut self);
}
