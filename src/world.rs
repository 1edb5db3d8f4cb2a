//! Entity bookkeeping on top of a spatial partition.

use crate::{
    config::{KDopTreeConfig, SpatialConfig},
    entity::EntityID,
    geometry::{AxisAlignedBox, Frustum, Ray, num::Float},
    kdop_tree::KDopTree,
    octree::Octree,
    partition::SpatialPartition,
};
use anyhow::{Result, anyhow, bail};
use nalgebra::{Matrix4, Point3};
use nohash_hasher::BuildNoHashHasher;
use std::{
    collections::{HashMap, HashSet, hash_map::Entry},
    mem,
};

/// Keeps track of the bounding boxes of dynamic entities and the static level
/// geometry, and answers visibility and ray queries for them.
///
/// Entities are held by a [`SpatialPartition`], which defaults to an
/// [`Octree`]. Entities whose boxes the partition cannot hold are kept in a
/// separate list and tested individually by every query.
#[derive(Debug)]
pub struct SpatialWorld<F: Float, P: SpatialPartition<F> = Octree<F>> {
    partition: P,
    entity_aabbs: HashMap<EntityID, AxisAlignedBox<F>, BuildNoHashHasher<EntityID>>,
    unpartitioned_entities: HashSet<EntityID, BuildNoHashHasher<EntityID>>,
    frustum: Frustum<F>,
    n_visible_entities: usize,
    kdop_tree_config: KDopTreeConfig,
    static_geometry: Option<KDopTree<F>>,
}

impl<F: Float> SpatialWorld<F, Octree<F>> {
    /// Creates an empty world whose entities are held by an octree built from
    /// the given configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(config: &SpatialConfig<F>) -> Result<Self> {
        let octree = Octree::new(&config.octree)?;
        Self::with_partition(octree, config.kdop_tree.clone())
    }

    pub fn octree(&self) -> &Octree<F> {
        &self.partition
    }
}

impl<F: Float, P: SpatialPartition<F>> SpatialWorld<F, P> {
    /// Creates an empty world whose entities are held by the given partition.
    /// Any entities already in the partition are removed.
    ///
    /// # Errors
    /// Returns an error if the k-DOP tree configuration is invalid.
    pub fn with_partition(mut partition: P, kdop_tree_config: KDopTreeConfig) -> Result<Self> {
        kdop_tree_config.validate()?;
        partition.clear_entities();
        Ok(Self {
            partition,
            entity_aabbs: HashMap::default(),
            unpartitioned_entities: HashSet::default(),
            frustum: Frustum::for_identity_transform(),
            n_visible_entities: 0,
            kdop_tree_config,
            static_geometry: None,
        })
    }

    pub fn partition(&self) -> &P {
        &self.partition
    }

    /// Returns the number of entities in the world.
    pub fn entity_count(&self) -> usize {
        self.entity_aabbs.len()
    }

    /// Returns the number of entities the partition could not hold.
    pub fn unpartitioned_entity_count(&self) -> usize {
        self.unpartitioned_entities.len()
    }

    /// Returns the bounding box of the entity with the given ID, or `None` if
    /// the entity is not in the world.
    pub fn entity_aabb(&self, id: EntityID) -> Option<&AxisAlignedBox<F>> {
        self.entity_aabbs.get(&id)
    }

    /// Returns the frustum used by the latest call to
    /// [`Self::find_visible_entities`].
    pub fn frustum(&self) -> &Frustum<F> {
        &self.frustum
    }

    /// Returns the number of entities found by the latest call to
    /// [`Self::find_visible_entities`].
    pub fn n_visible_entities(&self) -> usize {
        self.n_visible_entities
    }

    /// Adds the entity with the given ID and bounding box to the world.
    ///
    /// # Returns
    /// Whether the entity was inserted into the partition. If not, it is
    /// still part of the world but is tested individually by every query.
    ///
    /// # Errors
    /// Returns an error if an entity with the same ID is already present.
    pub fn insert_entity(&mut self, id: EntityID, aabb: AxisAlignedBox<F>) -> Result<bool> {
        let entry = match self.entity_aabbs.entry(id) {
            Entry::Occupied(_) => bail!("Entity {id} is already present in the world"),
            Entry::Vacant(entry) => entry,
        };

        let partitioned = self.partition.insert_with_bounds(id, &aabb);
        if !partitioned {
            log::trace!("Entity {id} could not be partitioned and will be tested individually");
            self.unpartitioned_entities.insert(id);
        }
        entry.insert(aabb);

        Ok(partitioned)
    }

    /// Removes the entity with the given ID from the world. Nothing happens
    /// if the entity is not present.
    pub fn remove_entity(&mut self, id: EntityID) {
        if let Some(aabb) = self.entity_aabbs.remove(&id) {
            self.detach(id, &aabb);
        }
    }

    /// Gives the entity with the given ID a new bounding box, which involves
    /// removing it from the partition with its old box and reinserting it with
    /// the new one.
    ///
    /// # Returns
    /// Whether the entity is now held by the partition.
    ///
    /// # Errors
    /// Returns an error if the entity is not present.
    pub fn move_entity(&mut self, id: EntityID, new_aabb: AxisAlignedBox<F>) -> Result<bool> {
        let aabb = self
            .entity_aabbs
            .get_mut(&id)
            .ok_or_else(|| anyhow!("Tried to move missing entity {id}"))?;

        let old_aabb = mem::replace(aabb, new_aabb);
        self.detach(id, &old_aabb);

        let partitioned = self.partition.insert_with_bounds(id, &self.entity_aabbs[&id]);
        if !partitioned {
            self.unpartitioned_entities.insert(id);
        }
        Ok(partitioned)
    }

    /// Removes all entities while keeping the static geometry.
    pub fn clear_entities(&mut self) {
        self.partition.clear_entities();
        self.entity_aabbs.clear();
        self.unpartitioned_entities.clear();
        self.n_visible_entities = 0;
    }

    /// Updates the frustum from the given projection and view transforms and
    /// appends the IDs of all entities whose bounding box may be visible in it
    /// to the given list.
    ///
    /// # Returns
    /// The number of IDs appended.
    pub fn find_visible_entities(
        &mut self,
        projection: &Matrix4<F>,
        view: &Matrix4<F>,
        entities: &mut Vec<EntityID>,
    ) -> usize {
        self.frustum.update(projection, view);

        let frustum = &self.frustum;
        let entity_aabbs = &self.entity_aabbs;
        let initial_len = entities.len();

        let mut push_if_visible = |id: EntityID| {
            if entity_aabbs
                .get(&id)
                .is_some_and(|aabb| frustum.intersects_axis_aligned_box(aabb))
            {
                entities.push(id);
            }
        };

        self.partition
            .for_each_entity_in_frustum(frustum, &mut push_if_visible);
        self.unpartitioned_entities
            .iter()
            .for_each(|&id| push_if_visible(id));

        self.n_visible_entities = entities.len() - initial_len;

        log::trace!(
            "Found {} visible entities out of {}",
            self.n_visible_entities,
            self.entity_count()
        );

        self.n_visible_entities
    }

    /// Appends the IDs of all entities whose bounding box is hit by the line
    /// along the given ray to the given list.
    ///
    /// # Returns
    /// The number of IDs appended.
    pub fn find_entities_hit_by_ray(&self, ray: &Ray<F>, entities: &mut Vec<EntityID>) -> usize {
        let initial_len = entities.len();

        let mut push_if_hit = |id: EntityID| {
            if self
                .entity_aabbs
                .get(&id)
                .is_some_and(|aabb| ray.intersects_axis_aligned_box(aabb))
            {
                entities.push(id);
            }
        };

        self.partition.for_each_entity_on_ray(ray, &mut push_if_hit);
        self.unpartitioned_entities
            .iter()
            .for_each(|&id| push_if_hit(id));

        entities.len() - initial_len
    }

    /// Returns the static geometry, if any has been set.
    pub fn static_geometry(&self) -> Option<&KDopTree<F>> {
        self.static_geometry.as_ref()
    }

    /// Replaces the static geometry with the given tree.
    pub fn set_static_geometry(&mut self, tree: KDopTree<F>) {
        self.static_geometry = Some(tree);
    }

    /// Builds a k-DOP tree over the given mesh using the world's
    /// configuration and makes it the static geometry.
    ///
    /// # Errors
    /// See [`KDopTree::build`].
    pub fn build_static_geometry(
        &mut self,
        triangles: &[[u32; 3]],
        vertices: &[Point3<F>],
    ) -> Result<()> {
        let tree = KDopTree::build(triangles, vertices, &self.kdop_tree_config)?;
        self.set_static_geometry(tree);
        Ok(())
    }

    /// Whether the line along the given ray hits the static geometry. Always
    /// `false` if there is no static geometry.
    pub fn static_geometry_blocks_ray(&self, ray: &Ray<F>) -> bool {
        self.static_geometry
            .as_ref()
            .is_some_and(|tree| tree.line_check(ray))
    }

    fn detach(&mut self, id: EntityID, aabb: &AxisAlignedBox<F>) {
        if !self.unpartitioned_entities.remove(&id) {
            let removed = self.partition.remove_with_bounds(id, aabb);
            debug_assert!(removed, "Entity {id} was missing from the partition");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::OctreeConfig;
    use nalgebra::{Perspective3, Vector3, point, vector};
    use std::f64::consts::FRAC_PI_2;

    /// Holds every entity in a flat list and only rejects boxes extending
    /// beyond `limit` in any direction.
    #[derive(Debug, Default)]
    struct FlatPartition {
        entities: Vec<(EntityID, AxisAlignedBox<f64>)>,
        limit: f64,
    }

    impl SpatialPartition<f64> for FlatPartition {
        fn insert_with_bounds(&mut self, id: EntityID, aabb: &AxisAlignedBox<f64>) -> bool {
            let limit = AxisAlignedBox::centered_with_extents(
                &Point3::origin(),
                &Vector3::repeat(2.0 * self.limit),
            );
            if !limit.contains_box(aabb) {
                return false;
            }
            self.entities.push((id, aabb.clone()));
            true
        }

        fn remove_with_bounds(&mut self, id: EntityID, aabb: &AxisAlignedBox<f64>) -> bool {
            match self
                .entities
                .iter()
                .position(|(entity_id, entity_aabb)| *entity_id == id && entity_aabb == aabb)
            {
                Some(idx) => {
                    self.entities.remove(idx);
                    true
                }
                None => false,
            }
        }

        fn for_each_entity(&self, mut f: impl FnMut(EntityID)) {
            self.entities.iter().for_each(|(id, _)| f(*id));
        }

        fn for_each_entity_on_ray(&self, _ray: &Ray<f64>, f: impl FnMut(EntityID)) {
            self.for_each_entity(f);
        }

        fn for_each_entity_in_frustum(&self, _frustum: &Frustum<f64>, f: impl FnMut(EntityID)) {
            self.for_each_entity(f);
        }

        fn entity_count(&self) -> usize {
            self.entities.len()
        }

        fn clear_entities(&mut self) {
            self.entities.clear();
        }
    }

    fn id(value: u64) -> EntityID {
        EntityID::from_u64(value)
    }

    fn cube(center: [f64; 3], half_size: f64) -> AxisAlignedBox<f64> {
        AxisAlignedBox::centered_with_extents(&center.into(), &Vector3::repeat(2.0 * half_size))
    }

    fn create_world() -> SpatialWorld<f64> {
        SpatialWorld::new(&SpatialConfig {
            octree: OctreeConfig {
                center: Point3::origin(),
                root_size: Vector3::repeat(200.0),
                leaf_size: Vector3::repeat(20.0),
            },
            kdop_tree: KDopTreeConfig::default(),
        })
        .unwrap()
    }

    fn create_flat_world() -> SpatialWorld<f64, FlatPartition> {
        let partition = FlatPartition {
            entities: Vec::new(),
            limit: 100.0,
        };
        SpatialWorld::with_partition(partition, KDopTreeConfig::default()).unwrap()
    }

    /// A camera at the origin looking down the negative z-axis.
    fn perspective() -> Matrix4<f64> {
        Perspective3::new(1.0, FRAC_PI_2, 1.0, 100.0).to_homogeneous()
    }

    fn sorted(mut entities: Vec<EntityID>) -> Vec<EntityID> {
        entities.sort();
        entities
    }

    #[test]
    fn creating_world_with_invalid_config_fails() {
        let mut config = SpatialConfig::<f64>::default();
        config.kdop_tree.max_triangles_per_leaf = 0;
        assert!(SpatialWorld::new(&config).is_err());
    }

    #[test]
    fn inserting_entity_records_its_box() {
        let mut world = create_world();
        assert!(world.insert_entity(id(1), cube([1.0, 2.0, 3.0], 1.0)).unwrap());
        assert_eq!(world.entity_count(), 1);
        assert_eq!(world.entity_aabb(id(1)), Some(&cube([1.0, 2.0, 3.0], 1.0)));
        assert_eq!(world.octree().entity_count(), 1);
    }

    #[test]
    fn inserting_duplicate_entity_fails() {
        let mut world = create_world();
        world.insert_entity(id(1), cube([0.0; 3], 1.0)).unwrap();
        assert!(world.insert_entity(id(1), cube([5.0; 3], 1.0)).is_err());
        assert_eq!(world.entity_aabb(id(1)), Some(&cube([0.0; 3], 1.0)));
        assert_eq!(world.octree().entity_count(), 1);
    }

    #[test]
    fn entity_outside_octree_is_kept_unpartitioned() {
        let mut world = create_world();
        assert!(!world.insert_entity(id(1), cube([500.0, 0.0, 0.0], 1.0)).unwrap());
        assert_eq!(world.entity_count(), 1);
        assert_eq!(world.unpartitioned_entity_count(), 1);
        assert_eq!(world.octree().entity_count(), 0);
    }

    #[test]
    fn removing_entity_removes_it_everywhere() {
        let mut world = create_world();
        world.insert_entity(id(1), cube([10.0; 3], 1.0)).unwrap();
        world.insert_entity(id(2), cube([500.0; 3], 1.0)).unwrap();

        world.remove_entity(id(1));
        world.remove_entity(id(2));
        world.remove_entity(id(3));

        assert_eq!(world.entity_count(), 0);
        assert_eq!(world.unpartitioned_entity_count(), 0);
        assert_eq!(world.octree().entity_count(), 0);
    }

    #[test]
    fn moving_entity_relocates_it_in_octree() {
        let mut world = create_world();
        world.insert_entity(id(1), cube([-50.0; 3], 1.0)).unwrap();

        assert!(world.move_entity(id(1), cube([50.0; 3], 1.0)).unwrap());

        assert_eq!(world.octree().entity_count(), 1);
        let holder = world.octree().node_holding(id(1)).unwrap();
        assert!(holder.contains_box(&cube([50.0; 3], 1.0)));
        assert_eq!(world.entity_aabb(id(1)), Some(&cube([50.0; 3], 1.0)));
    }

    #[test]
    fn moving_entity_in_and_out_of_octree_works() {
        let mut world = create_world();
        world.insert_entity(id(1), cube([0.0; 3], 1.0)).unwrap();

        assert!(!world.move_entity(id(1), cube([500.0; 3], 1.0)).unwrap());
        assert_eq!(world.unpartitioned_entity_count(), 1);
        assert_eq!(world.octree().entity_count(), 0);

        assert!(world.move_entity(id(1), cube([5.0; 3], 1.0)).unwrap());
        assert_eq!(world.unpartitioned_entity_count(), 0);
        assert_eq!(world.octree().entity_count(), 1);
    }

    #[test]
    fn moving_missing_entity_fails() {
        let mut world = create_world();
        assert!(world.move_entity(id(1), cube([0.0; 3], 1.0)).is_err());
    }

    #[test]
    fn visible_entities_are_refined_by_their_own_boxes() {
        let mut world = create_world();
        // In front of the camera
        world.insert_entity(id(0), cube([0.0, 0.0, -50.0], 1.0)).unwrap();
        // Behind the camera
        world.insert_entity(id(1), cube([0.0, 0.0, 50.0], 1.0)).unwrap();
        // Straddles the center, so it is held by the root, but lies far off
        // to the side
        let off_to_the_side = AxisAlignedBox::new(point![-90.0, -1.0, -1.0], point![-80.0, 1.0, 1.0]);
        world.insert_entity(id(2), off_to_the_side).unwrap();
        // Outside the octree and beyond the far plane
        assert!(!world.insert_entity(id(3), cube([0.0, 0.0, -150.0], 1.0)).unwrap());
        world.insert_entity(id(4), cube([0.0, 0.0, -99.0], 0.5)).unwrap();

        let mut entities = Vec::new();
        let count = world.find_visible_entities(&perspective(), &Matrix4::identity(), &mut entities);

        assert_eq!(count, 2);
        assert_eq!(world.n_visible_entities(), 2);
        assert_eq!(sorted(entities), vec![id(0), id(4)]);
    }

    #[test]
    fn unpartitioned_entities_can_be_visible() {
        let mut world = create_world();
        world.insert_entity(id(0), cube([0.0, 0.0, -50.0], 1.0)).unwrap();
        assert!(!world.insert_entity(id(1), cube([0.0, 0.0, -99.0], 5.0)).unwrap());

        let mut entities = Vec::new();
        world.find_visible_entities(&perspective(), &Matrix4::identity(), &mut entities);

        assert_eq!(sorted(entities), vec![id(0), id(1)]);
    }

    #[test]
    fn visible_entities_follow_the_view_transform() {
        let mut world = create_world();
        world.insert_entity(id(0), cube([0.0, 0.0, -50.0], 1.0)).unwrap();
        world.insert_entity(id(1), cube([0.0, 0.0, 50.0], 1.0)).unwrap();

        // Turn the camera around
        let view = Matrix4::from_euler_angles(0.0, std::f64::consts::PI, 0.0);

        let mut entities = Vec::new();
        world.find_visible_entities(&perspective(), &view, &mut entities);

        assert_eq!(entities, vec![id(1)]);
        assert_eq!(world.frustum().transform_matrix(), &(perspective() * view));
    }

    #[test]
    fn visible_entities_are_appended_to_existing_list() {
        let mut world = create_world();
        world.insert_entity(id(0), cube([0.0, 0.0, -50.0], 1.0)).unwrap();

        let mut entities = vec![id(7)];
        let count = world.find_visible_entities(&perspective(), &Matrix4::identity(), &mut entities);

        assert_eq!(count, 1);
        assert_eq!(entities, vec![id(7), id(0)]);
    }

    #[test]
    fn entities_hit_by_ray_are_found() {
        let mut world = create_world();
        world.insert_entity(id(0), cube([0.0, 0.0, -50.0], 1.0)).unwrap();
        world.insert_entity(id(1), cube([0.0, 0.0, 50.0], 1.0)).unwrap();
        world.insert_entity(id(2), cube([30.0, 0.0, 0.0], 1.0)).unwrap();
        world.insert_entity(id(3), cube([0.0, 0.0, 300.0], 1.0)).unwrap();

        let ray = Ray::new(Point3::origin(), vector![0.0, 0.0, 1.0]);
        let mut entities = Vec::new();
        let count = world.find_entities_hit_by_ray(&ray, &mut entities);

        // The line extends in both directions
        assert_eq!(count, 3);
        assert_eq!(sorted(entities), vec![id(0), id(1), id(3)]);
    }

    #[test]
    fn static_geometry_blocks_rays_through_it() {
        let mut world = create_world();

        let ray = Ray::new(point![0.2, 0.2, 5.0], vector![0.0, 0.0, -1.0]);
        assert!(!world.static_geometry_blocks_ray(&ray));

        world
            .build_static_geometry(
                &[[0, 1, 2]],
                &[point![0.0, 0.0, 0.0], point![1.0, 0.0, 0.0], point![0.0, 1.0, 0.0]],
            )
            .unwrap();

        assert!(world.static_geometry().is_some());
        assert!(world.static_geometry_blocks_ray(&ray));
        assert!(!world.static_geometry_blocks_ray(&Ray::new(
            point![2.0, 2.0, 5.0],
            vector![0.0, 0.0, -1.0]
        )));
    }

    #[test]
    fn static_geometry_is_kept_when_clearing_entities() {
        let mut world = create_world();
        world.insert_entity(id(0), cube([0.0; 3], 1.0)).unwrap();
        world.set_static_geometry(
            KDopTree::build(
                &[[0, 1, 2]],
                &[point![0.0, 0.0, 0.0], point![1.0, 0.0, 0.0], point![0.0, 1.0, 0.0]],
                &KDopTreeConfig::default(),
            )
            .unwrap(),
        );

        world.clear_entities();

        assert_eq!(world.entity_count(), 0);
        assert_eq!(world.octree().entity_count(), 0);
        assert!(world.static_geometry().is_some());
    }

    #[test]
    fn world_works_with_other_partitions() {
        let mut world = create_flat_world();
        assert!(world.insert_entity(id(0), cube([0.0, 0.0, -50.0], 1.0)).unwrap());
        assert!(world.insert_entity(id(1), cube([0.0, 0.0, 50.0], 1.0)).unwrap());
        assert!(!world.insert_entity(id(2), cube([0.0, 0.0, -150.0], 1.0)).unwrap());
        assert_eq!(world.partition().entity_count(), 2);

        let mut entities = Vec::new();
        world.find_visible_entities(&perspective(), &Matrix4::identity(), &mut entities);
        assert_eq!(sorted(entities), vec![id(0)]);

        assert!(world.move_entity(id(1), cube([0.0, 0.0, -20.0], 1.0)).unwrap());
        world.remove_entity(id(0));

        let mut entities = Vec::new();
        world.find_visible_entities(&perspective(), &Matrix4::identity(), &mut entities);
        assert_eq!(entities, vec![id(1)]);
        assert_eq!(world.partition().entity_count(), 1);
    }

    #[test]
    fn partition_given_to_world_is_emptied() {
        let mut partition = FlatPartition {
            entities: Vec::new(),
            limit: 10.0,
        };
        partition.insert_with_bounds(id(0), &cube([0.0; 3], 1.0));

        let world = SpatialWorld::with_partition(partition, KDopTreeConfig::default()).unwrap();

        assert_eq!(world.partition().entity_count(), 0);
        assert_eq!(world.entity_count(), 0);
    }
}
