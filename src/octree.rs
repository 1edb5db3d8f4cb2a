//! Octree partitioning of a fixed world volume.

use crate::{
    config::OctreeConfig,
    entity::{BoundedEntity, EntityID},
    geometry::{AxisAlignedBox, Frustum, Ray, num::Float},
    partition::SpatialPartition,
};
use anyhow::Result;
use nalgebra::{Vector3, point};

/// A fixed subdivision of an axis-aligned world volume into cells, where every
/// cell is either a leaf or split into eight equally sized children.
///
/// The cell geometry is determined once at construction. Afterwards only the
/// lists of [`EntityID`]s held by the cells change. Every entity is held by
/// the deepest cell fully containing its bounding box, so entities straddling
/// cell boundaries stay in the larger cells.
///
/// The octree does not know about the entities themselves. An entity must be
/// removed with the same bounding box it was inserted with, so an entity that
/// moves has to be removed with its old box and reinserted with its new one.
#[derive(Clone, Debug)]
pub struct Octree<F: Float> {
    nodes: Vec<OctreeNode<F>>,
    entity_count: usize,
}

#[derive(Clone, Debug)]
struct OctreeNode<F: Float> {
    aabb: AxisAlignedBox<F>,
    first_child_idx: Option<usize>,
    entities: Vec<EntityID>,
}

const ROOT_IDX: usize = 0;
const CHILD_COUNT: usize = 8;

impl<F: Float> Octree<F> {
    /// Creates a new octree with the root cell and leaf size given by the
    /// configuration. The root is subdivided as long as the cell extent
    /// exceeds the leaf size along all three axes.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid (see
    /// [`OctreeConfig::validate`]).
    pub fn new(config: &OctreeConfig<F>) -> Result<Self> {
        config.validate()?;

        let root_aabb = AxisAlignedBox::centered_with_extents(&config.center, &config.root_size);

        let octree = with_debug_logging!("Building octree"; {
            let mut nodes = vec![OctreeNode::new(root_aabb)];
            Self::subdivide(&mut nodes, ROOT_IDX, &config.leaf_size);
            Self {
                nodes,
                entity_count: 0,
            }
        });

        log::debug!(
            "Octree has {} nodes, of which {} are leaves",
            octree.node_count(),
            octree.leaf_count()
        );

        Ok(octree)
    }

    /// Returns the box covered by the root cell.
    pub fn root_aabb(&self) -> &AxisAlignedBox<F> {
        &self.nodes[ROOT_IDX].aabb
    }

    /// Returns the total number of cells.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of cells without children.
    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| node.first_child_idx.is_none())
            .count()
    }

    /// Returns the number of entity references currently held by the cells.
    pub fn entity_count(&self) -> usize {
        self.entity_count
    }

    /// Returns the box of the cell holding the entity with the given ID, or
    /// `None` if no cell holds it.
    pub fn node_holding(&self, id: EntityID) -> Option<&AxisAlignedBox<F>> {
        self.nodes
            .iter()
            .find(|node| node.entities.contains(&id))
            .map(|node| &node.aabb)
    }

    /// Inserts the given entity into the deepest cell fully containing its
    /// bounding box.
    ///
    /// # Returns
    /// `false` if the root cell does not fully contain the bounding box, in
    /// which case nothing is inserted.
    pub fn insert(&mut self, entity: &impl BoundedEntity<F>) -> bool {
        self.insert_with_bounds(entity.entity_id(), entity.bounding_box())
    }

    /// Inserts the entity with the given ID into the deepest cell fully
    /// containing the given bounding box. The octree does not check whether
    /// the entity is already present.
    ///
    /// # Returns
    /// `false` if the root cell does not fully contain the bounding box, in
    /// which case nothing is inserted.
    pub fn insert_with_bounds(&mut self, id: EntityID, aabb: &AxisAlignedBox<F>) -> bool {
        if !self.root_aabb().contains_box(aabb) {
            log::trace!("Entity {id} lies outside the octree root and was not inserted");
            return false;
        }

        let node_idx = self.find_deepest_node_containing(aabb);

        debug_assert!(self.nodes[node_idx].aabb.contains_box(aabb));
        self.nodes[node_idx].entities.push(id);
        self.entity_count += 1;

        true
    }

    /// Removes the given entity, which must have been inserted with the same
    /// bounding box.
    ///
    /// # Returns
    /// `false` if the entity was not found in any cell containing its bounding
    /// box.
    pub fn remove(&mut self, entity: &impl BoundedEntity<F>) -> bool {
        self.remove_with_bounds(entity.entity_id(), entity.bounding_box())
    }

    /// Removes the entity with the given ID, which must have been inserted
    /// with the given bounding box.
    ///
    /// # Returns
    /// `false` if the entity was not found in any cell containing the
    /// bounding box.
    pub fn remove_with_bounds(&mut self, id: EntityID, aabb: &AxisAlignedBox<F>) -> bool {
        let removed = self.remove_from_subtree(ROOT_IDX, id, aabb);
        if removed {
            self.entity_count -= 1;
        } else {
            log::trace!("Entity {id} was not found in the octree and could not be removed");
        }
        removed
    }

    /// Removes all entity references while keeping the cells.
    pub fn clear_entities(&mut self) {
        for node in &mut self.nodes {
            node.entities.clear();
        }
        self.entity_count = 0;
    }

    /// Appends the IDs of all entities in the octree to the given list.
    ///
    /// # Returns
    /// The length of the list after appending.
    pub fn query_all(&self, entities: &mut Vec<EntityID>) -> usize {
        self.for_each_entity(|id| entities.push(id));
        entities.len()
    }

    /// Appends the IDs of all entities held by cells the line along the given
    /// ray passes through to the given list.
    ///
    /// # Returns
    /// The length of the list after appending.
    pub fn query_ray(&self, ray: &Ray<F>, entities: &mut Vec<EntityID>) -> usize {
        self.for_each_entity_on_ray(ray, |id| entities.push(id));
        entities.len()
    }

    /// Appends the IDs of all entities held by cells lying fully inside the
    /// given box to the given list. The traversal stops at any cell not fully
    /// inside the box, so nothing is found unless the box contains the root.
    /// See [`Self::query_overlapping_axis_aligned_box`] for a query that also
    /// includes partially covered cells.
    ///
    /// # Returns
    /// The length of the list after appending.
    pub fn query_axis_aligned_box(
        &self,
        aabb: &AxisAlignedBox<F>,
        entities: &mut Vec<EntityID>,
    ) -> usize {
        self.for_each_entity_in_axis_aligned_box(aabb, |id| entities.push(id));
        entities.len()
    }

    /// Appends the IDs of all entities held by cells overlapping the given box
    /// to the given list.
    ///
    /// # Returns
    /// The length of the list after appending.
    pub fn query_overlapping_axis_aligned_box(
        &self,
        aabb: &AxisAlignedBox<F>,
        entities: &mut Vec<EntityID>,
    ) -> usize {
        self.for_each_entity_overlapping_axis_aligned_box(aabb, |id| entities.push(id));
        entities.len()
    }

    /// Appends the IDs of all entities held by cells the given frustum may
    /// see, as determined by [`Frustum::intersects_axis_aligned_box`], to the
    /// given list.
    ///
    /// # Returns
    /// The length of the list after appending.
    pub fn query_frustum(&self, frustum: &Frustum<F>, entities: &mut Vec<EntityID>) -> usize {
        self.for_each_entity_in_frustum(frustum, |id| entities.push(id));
        entities.len()
    }

    /// Calls the given closure with the ID of every entity in the octree, in
    /// depth-first order with the entities of a cell visited before those of
    /// its children.
    pub fn for_each_entity(&self, mut f: impl FnMut(EntityID)) {
        self.visit_subtree(ROOT_IDX, &mut |_| true, &mut f);
    }

    /// Like [`Self::query_ray`], but calls the given closure with each ID.
    pub fn for_each_entity_on_ray(&self, ray: &Ray<F>, mut f: impl FnMut(EntityID)) {
        self.visit_subtree(
            ROOT_IDX,
            &mut |node_aabb| ray.intersects_axis_aligned_box(node_aabb),
            &mut f,
        );
    }

    /// Like [`Self::query_axis_aligned_box`], but calls the given closure with
    /// each ID.
    pub fn for_each_entity_in_axis_aligned_box(
        &self,
        aabb: &AxisAlignedBox<F>,
        mut f: impl FnMut(EntityID),
    ) {
        self.visit_subtree(
            ROOT_IDX,
            &mut |node_aabb| aabb.contains_box(node_aabb),
            &mut f,
        );
    }

    /// Like [`Self::query_overlapping_axis_aligned_box`], but calls the given
    /// closure with each ID.
    pub fn for_each_entity_overlapping_axis_aligned_box(
        &self,
        aabb: &AxisAlignedBox<F>,
        mut f: impl FnMut(EntityID),
    ) {
        self.visit_subtree(
            ROOT_IDX,
            &mut |node_aabb| !aabb.box_lies_outside(node_aabb),
            &mut f,
        );
    }

    /// Like [`Self::query_frustum`], but calls the given closure with each ID.
    pub fn for_each_entity_in_frustum(&self, frustum: &Frustum<F>, mut f: impl FnMut(EntityID)) {
        self.visit_subtree(
            ROOT_IDX,
            &mut |node_aabb| frustum.intersects_axis_aligned_box(node_aabb),
            &mut f,
        );
    }

    fn subdivide(nodes: &mut Vec<OctreeNode<F>>, node_idx: usize, leaf_size: &Vector3<F>) {
        let aabb = &nodes[node_idx].aabb;

        if !OctreeConfig::exceeds(&aabb.extents(), leaf_size) {
            return;
        }

        // Child `i` covers the octant whose x-, y- and z-halves are selected
        // by bit 2, 1 and 0 of `i` respectively
        let bounds = [*aabb.lower_corner(), aabb.center(), *aabb.upper_corner()];
        let children = (0..CHILD_COUNT).map(|child| {
            let (x, y, z) = ((child >> 2) & 1, (child >> 1) & 1, child & 1);
            OctreeNode::new(AxisAlignedBox::new(
                point![bounds[x].x, bounds[y].y, bounds[z].z],
                point![bounds[x + 1].x, bounds[y + 1].y, bounds[z + 1].z],
            ))
        });

        let first_child_idx = nodes.len();
        nodes.extend(children);
        nodes[node_idx].first_child_idx = Some(first_child_idx);

        for child_idx in first_child_idx..first_child_idx + CHILD_COUNT {
            Self::subdivide(nodes, child_idx, leaf_size);
        }
    }

    fn find_deepest_node_containing(&self, aabb: &AxisAlignedBox<F>) -> usize {
        let mut node_idx = ROOT_IDX;

        while let Some(first_child_idx) = self.nodes[node_idx].first_child_idx {
            match (first_child_idx..first_child_idx + CHILD_COUNT)
                .find(|&child_idx| self.nodes[child_idx].aabb.contains_box(aabb))
            {
                Some(child_idx) => node_idx = child_idx,
                None => break,
            }
        }

        node_idx
    }

    fn remove_from_subtree(
        &mut self,
        node_idx: usize,
        id: EntityID,
        aabb: &AxisAlignedBox<F>,
    ) -> bool {
        if !self.nodes[node_idx].aabb.contains_box(aabb) {
            return false;
        }

        if let Some(first_child_idx) = self.nodes[node_idx].first_child_idx {
            for child_idx in first_child_idx..first_child_idx + CHILD_COUNT {
                if self.remove_from_subtree(child_idx, id, aabb) {
                    return true;
                }
            }
        }

        let entities = &mut self.nodes[node_idx].entities;
        if let Some(idx) = entities.iter().position(|&entity| entity == id) {
            entities.remove(idx);
            true
        } else {
            false
        }
    }

    fn visit_subtree<P, V>(&self, node_idx: usize, node_is_relevant: &mut P, visit: &mut V)
    where
        P: FnMut(&AxisAlignedBox<F>) -> bool,
        V: FnMut(EntityID),
    {
        let node = &self.nodes[node_idx];

        if !node_is_relevant(&node.aabb) {
            return;
        }

        for &id in &node.entities {
            visit(id);
        }

        if let Some(first_child_idx) = node.first_child_idx {
            for child_idx in first_child_idx..first_child_idx + CHILD_COUNT {
                self.visit_subtree(child_idx, node_is_relevant, visit);
            }
        }
    }
}

impl<F: Float> OctreeNode<F> {
    fn new(aabb: AxisAlignedBox<F>) -> Self {
        Self {
            aabb,
            first_child_idx: None,
            entities: Vec::new(),
        }
    }
}

impl<F: Float> SpatialPartition<F> for Octree<F> {
    fn insert_with_bounds(&mut self, id: EntityID, aabb: &AxisAlignedBox<F>) -> bool {
        Octree::insert_with_bounds(self, id, aabb)
    }

    fn remove_with_bounds(&mut self, id: EntityID, aabb: &AxisAlignedBox<F>) -> bool {
        Octree::remove_with_bounds(self, id, aabb)
    }

    fn for_each_entity(&self, f: impl FnMut(EntityID)) {
        Octree::for_each_entity(self, f);
    }

    fn for_each_entity_on_ray(&self, ray: &Ray<F>, f: impl FnMut(EntityID)) {
        Octree::for_each_entity_on_ray(self, ray, f);
    }

    fn for_each_entity_in_frustum(&self, frustum: &Frustum<F>, f: impl FnMut(EntityID)) {
        Octree::for_each_entity_in_frustum(self, frustum, f);
    }

    fn entity_count(&self) -> usize {
        Octree::entity_count(self)
    }

    fn clear_entities(&mut self) {
        Octree::clear_entities(self);
    }
}

#[cfg(feature = "fuzzing")]
pub mod fuzzing {
    use super::*;
    use arbitrary::{Arbitrary, Result, Unstructured};
    use nalgebra::{Point3, vector};
    use std::{collections::HashSet, mem};

    const WORLD_HALF_SIZE: f64 = 50.0;

    #[derive(Clone, Debug)]
    pub struct ArbitraryAABB(AxisAlignedBox<f64>);

    #[derive(Clone, Debug)]
    pub struct ArbitraryRay(Ray<f64>);

    impl Arbitrary<'_> for ArbitraryAABB {
        fn arbitrary(u: &mut Unstructured<'_>) -> Result<Self> {
            // Centers range somewhat beyond the world so that some boxes fall
            // outside the root
            let center = arbitrary_point(u, 1.2 * WORLD_HALF_SIZE)?;

            let ex = 10.0 * arbitrary_norm_f64(u)?;
            let ey = 10.0 * arbitrary_norm_f64(u)?;
            let ez = 10.0 * arbitrary_norm_f64(u)?;
            let half_extents = vector![ex, ey, ez];

            Ok(Self(AxisAlignedBox::new(
                center - half_extents,
                center + half_extents,
            )))
        }

        fn size_hint(_depth: usize) -> (usize, Option<usize>) {
            let size = 6 * mem::size_of::<u32>();
            (size, Some(size))
        }
    }

    impl Arbitrary<'_> for ArbitraryRay {
        fn arbitrary(u: &mut Unstructured<'_>) -> Result<Self> {
            let origin = arbitrary_point(u, 2.0 * WORLD_HALF_SIZE)?;
            let direction = arbitrary_point(u, 1.0)?.coords;
            Ok(Self(Ray::new(origin, direction)))
        }

        fn size_hint(_depth: usize) -> (usize, Option<usize>) {
            let size = 6 * mem::size_of::<u32>();
            (size, Some(size))
        }
    }

    pub fn fuzz_test_octree_insertion_and_removal(aabbs: Vec<ArbitraryAABB>) {
        let mut octree = create_octree();

        let mut inserted = Vec::new();
        for (idx, aabb) in aabbs.iter().enumerate() {
            let id = EntityID::from_u64(idx as u64);
            let was_inserted = octree.insert_with_bounds(id, &aabb.0);
            assert_eq!(was_inserted, octree.root_aabb().contains_box(&aabb.0));
            if was_inserted {
                assert!(octree.node_holding(id).unwrap().contains_box(&aabb.0));
                inserted.push(id);
            } else {
                assert!(octree.node_holding(id).is_none());
            }
        }

        let mut all = Vec::new();
        assert_eq!(octree.query_all(&mut all), inserted.len());
        assert_eq!(octree.entity_count(), inserted.len());
        all.sort();
        assert_eq!(all, inserted);

        for id in inserted {
            let aabb = &aabbs[id.as_u64() as usize].0;
            assert!(octree.remove_with_bounds(id, aabb));
            assert!(!octree.remove_with_bounds(id, aabb));
        }

        assert_eq!(octree.entity_count(), 0);
        assert_eq!(octree.query_all(&mut Vec::new()), 0);
    }

    pub fn fuzz_test_octree_ray_query((aabbs, ray): (Vec<ArbitraryAABB>, ArbitraryRay)) {
        let octree = create_populated_octree(&aabbs);

        let mut candidates = HashSet::new();
        octree.for_each_entity_on_ray(&ray.0, |id| {
            assert!(candidates.insert(id));
        });

        for (idx, aabb) in aabbs.iter().enumerate() {
            let id = EntityID::from_u64(idx as u64);
            if octree.node_holding(id).is_some() && ray.0.intersects_axis_aligned_box(&aabb.0) {
                assert!(candidates.contains(&id));
            }
        }
    }

    pub fn fuzz_test_octree_overlapping_box_query(
        (aabbs, query_aabb): (Vec<ArbitraryAABB>, ArbitraryAABB),
    ) {
        let octree = create_populated_octree(&aabbs);

        let mut candidates = HashSet::new();
        octree.for_each_entity_overlapping_axis_aligned_box(&query_aabb.0, |id| {
            assert!(candidates.insert(id));
        });

        for (idx, aabb) in aabbs.iter().enumerate() {
            let id = EntityID::from_u64(idx as u64);
            if octree.node_holding(id).is_some() && !query_aabb.0.box_lies_outside(&aabb.0) {
                assert!(candidates.contains(&id));
            }
        }

        let mut contained = HashSet::new();
        octree.for_each_entity_in_axis_aligned_box(&query_aabb.0, |id| {
            contained.insert(id);
        });
        assert!(contained.is_subset(&candidates));
    }

    fn create_octree() -> Octree<f64> {
        Octree::new(&OctreeConfig {
            center: Point3::origin(),
            root_size: Vector3::repeat(2.0 * WORLD_HALF_SIZE),
            leaf_size: Vector3::repeat(10.0),
        })
        .unwrap()
    }

    fn create_populated_octree(aabbs: &[ArbitraryAABB]) -> Octree<f64> {
        let mut octree = create_octree();
        for (idx, aabb) in aabbs.iter().enumerate() {
            octree.insert_with_bounds(EntityID::from_u64(idx as u64), &aabb.0);
        }
        octree
    }

    fn arbitrary_point(u: &mut Unstructured<'_>, max_coord: f64) -> Result<Point3<f64>> {
        let x = max_coord * (2.0 * arbitrary_norm_f64(u)? - 1.0);
        let y = max_coord * (2.0 * arbitrary_norm_f64(u)? - 1.0);
        let z = max_coord * (2.0 * arbitrary_norm_f64(u)? - 1.0);
        Ok(point![x, y, z])
    }

    fn arbitrary_norm_f64(u: &mut Unstructured<'_>) -> Result<f64> {
        Ok(f64::from(u.int_in_range(0..=1000000)?) / 1000000.0)
    }
}
