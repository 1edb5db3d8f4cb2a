//! Static bounding box tree over a triangle mesh, for line checks.

use crate::{
    config::KDopTreeConfig,
    geometry::{AxisAlignedBox, Ray, num::Float},
};
use anyhow::{Result, bail};
use nalgebra::Point3;
use std::mem;

/// A binary tree of axis-aligned bounding boxes (a k-DOP with k = 6) built
/// once over a triangle mesh, answering whether a line hits the mesh.
///
/// The tree keeps its own copy of the mesh, so it does not borrow from the
/// data it was built from. It is never modified after construction.
#[derive(Clone, Debug)]
pub struct KDopTree<F: Float> {
    vertices: Vec<Point3<F>>,
    triangles: Vec<[u32; 3]>,
    nodes: Vec<KDopNode<F>>,
    stats: KDopTreeStats,
}

/// Statistics gathered while building a [`KDopTree`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct KDopTreeStats {
    /// Total number of nodes, including leaves.
    pub node_count: usize,
    /// Number of nodes holding triangles.
    pub leaf_count: usize,
    /// Depth of the deepest node, with the root at depth 1.
    pub max_depth: usize,
}

#[derive(Clone, Debug)]
struct KDopNode<F: Float> {
    aabb: AxisAlignedBox<F>,
    first_child_idx: Option<usize>,
    triangle_indices: Vec<usize>,
}

#[derive(Debug)]
struct KDopTreeBuilder<'a, F: Float> {
    vertices: &'a [Point3<F>],
    triangles: &'a [[u32; 3]],
    centroids: Vec<Point3<F>>,
    config: &'a KDopTreeConfig,
    nodes: Vec<KDopNode<F>>,
    stats: KDopTreeStats,
}

const ROOT_IDX: usize = 0;

impl<F: Float> KDopTree<F> {
    /// Builds a tree over the triangles with the given vertex indices.
    ///
    /// Starting from a root holding all triangles, each node with more than
    /// [`KDopTreeConfig::max_triangles_per_leaf`] triangles is split in two.
    /// The split is made along the axis where the triangle centroids have the
    /// greatest variance, at the mean centroid coordinate along that axis.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or if any triangle
    /// refers to a vertex index outside the vertex slice.
    pub fn build(
        triangles: &[[u32; 3]],
        vertices: &[Point3<F>],
        config: &KDopTreeConfig,
    ) -> Result<Self> {
        config.validate()?;

        for (triangle_idx, triangle) in triangles.iter().enumerate() {
            for &vertex_idx in triangle {
                if vertex_idx as usize >= vertices.len() {
                    bail!(
                        "Triangle {triangle_idx} refers to vertex {vertex_idx}, but the mesh only has {} vertices",
                        vertices.len()
                    );
                }
            }
        }

        let tree = with_debug_logging!("Building k-DOP tree for {} triangles", triangles.len(); {
            KDopTreeBuilder::new(triangles, vertices, config).build()
        });

        log::debug!(
            "k-DOP tree has {} nodes, {} leaves and depth {}",
            tree.stats.node_count,
            tree.stats.leaf_count,
            tree.stats.max_depth
        );

        Ok(tree)
    }

    /// Returns the vertices of the mesh the tree was built over.
    pub fn vertices(&self) -> &[Point3<F>] {
        &self.vertices
    }

    /// Returns the vertex indices of each triangle in the mesh.
    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    /// Returns the bounding box of the whole mesh. The box is empty if the
    /// mesh has no triangles.
    pub fn root_aabb(&self) -> &AxisAlignedBox<F> {
        &self.nodes[ROOT_IDX].aabb
    }

    pub fn stats(&self) -> KDopTreeStats {
        self.stats
    }

    /// Whether the line along the given ray hits any triangle of the mesh.
    pub fn line_check(&self, ray: &Ray<F>) -> bool {
        self.line_check_subtree(ROOT_IDX, ray)
    }

    /// Calls the given closure with the bounding box of every node at the
    /// given depth, as well as of every leaf above that depth. The root is at
    /// depth 1.
    pub fn for_each_node_box_at_level(&self, level: usize, mut f: impl FnMut(&AxisAlignedBox<F>)) {
        self.visit_level(ROOT_IDX, 1, level, &mut f);
    }

    fn line_check_subtree(&self, node_idx: usize, ray: &Ray<F>) -> bool {
        let node = &self.nodes[node_idx];

        if !ray.intersects_axis_aligned_box(&node.aabb) {
            return false;
        }

        match node.first_child_idx {
            Some(left_idx) => {
                self.line_check_subtree(left_idx, ray) || self.line_check_subtree(left_idx + 1, ray)
            }
            None => node.triangle_indices.iter().any(|&triangle_idx| {
                let [v0, v1, v2] = self.triangle_vertices(triangle_idx);
                ray.intersects_triangle(v0, v1, v2)
            }),
        }
    }

    fn visit_level(
        &self,
        node_idx: usize,
        depth: usize,
        level: usize,
        f: &mut impl FnMut(&AxisAlignedBox<F>),
    ) {
        let node = &self.nodes[node_idx];
        match node.first_child_idx {
            Some(left_idx) if depth != level => {
                self.visit_level(left_idx, depth + 1, level, f);
                self.visit_level(left_idx + 1, depth + 1, level, f);
            }
            _ => f(&node.aabb),
        }
    }

    fn triangle_vertices(&self, triangle_idx: usize) -> [&Point3<F>; 3] {
        self.triangles[triangle_idx].map(|vertex_idx| &self.vertices[vertex_idx as usize])
    }
}

impl<'a, F: Float> KDopTreeBuilder<'a, F> {
    fn new(
        triangles: &'a [[u32; 3]],
        vertices: &'a [Point3<F>],
        config: &'a KDopTreeConfig,
    ) -> Self {
        let centroids = triangles
            .iter()
            .map(|&[i0, i1, i2]| {
                let sum = vertices[i0 as usize].coords
                    + vertices[i1 as usize].coords
                    + vertices[i2 as usize].coords;
                Point3::from(sum / F::THREE)
            })
            .collect();

        Self {
            vertices,
            triangles,
            centroids,
            config,
            nodes: Vec::with_capacity(2 * triangles.len() / config.max_triangles_per_leaf + 1),
            stats: KDopTreeStats::default(),
        }
    }

    fn build(mut self) -> KDopTree<F> {
        self.nodes.push(KDopNode::new((0..self.triangles.len()).collect()));
        self.build_node(ROOT_IDX, 1);

        self.stats.node_count = self.nodes.len();

        // Centroids are only needed for splitting and are dropped with the
        // builder
        KDopTree {
            vertices: self.vertices.to_vec(),
            triangles: self.triangles.to_vec(),
            nodes: self.nodes,
            stats: self.stats,
        }
    }

    fn build_node(&mut self, node_idx: usize, depth: usize) {
        self.stats.max_depth = self.stats.max_depth.max(depth);

        let aabb = self.compute_aabb(&self.nodes[node_idx].triangle_indices);
        self.nodes[node_idx].aabb = aabb;

        let triangle_count = self.nodes[node_idx].triangle_indices.len();

        if triangle_count <= self.config.max_triangles_per_leaf || depth >= self.config.max_depth
        {
            self.stats.leaf_count += 1;
            return;
        }

        let triangle_indices = mem::take(&mut self.nodes[node_idx].triangle_indices);

        let (split_axis, axis_mean) = self.select_split_axis(&triangle_indices);
        let (left_indices, right_indices) =
            self.split_triangles(triangle_indices, split_axis, axis_mean);

        // Centroids that coincide up to rounding may all land on one side
        if left_indices.is_empty() || right_indices.is_empty() {
            self.nodes[node_idx].triangle_indices = if left_indices.is_empty() {
                right_indices
            } else {
                left_indices
            };
            self.stats.leaf_count += 1;
            return;
        }

        let left_idx = self.nodes.len();
        self.nodes.push(KDopNode::new(left_indices));
        self.nodes.push(KDopNode::new(right_indices));
        self.nodes[node_idx].first_child_idx = Some(left_idx);

        self.build_node(left_idx, depth + 1);
        self.build_node(left_idx + 1, depth + 1);
    }

    fn compute_aabb(&self, triangle_indices: &[usize]) -> AxisAlignedBox<F> {
        let mut aabb = AxisAlignedBox::empty();
        for &triangle_idx in triangle_indices {
            for vertex_idx in self.triangles[triangle_idx] {
                aabb.grow_to_include_point(&self.vertices[vertex_idx as usize]);
            }
        }
        aabb
    }

    /// Returns the axis along which the centroids of the given triangles have
    /// the largest variance, together with the mean centroid coordinate along
    /// that axis. X is only chosen if its variance is strictly largest, and Y
    /// only if it strictly exceeds that of Z.
    fn select_split_axis(&self, triangle_indices: &[usize]) -> (usize, F) {
        let mut count = F::ZERO;
        let mut sum = Point3::origin().coords;
        for &triangle_idx in triangle_indices {
            sum += self.centroids[triangle_idx].coords;
            count += F::ONE;
        }
        let means = sum / count;

        let mut squared_deviation_sum = Point3::origin().coords;
        for &triangle_idx in triangle_indices {
            let deviation = self.centroids[triangle_idx].coords - means;
            squared_deviation_sum += deviation.component_mul(&deviation);
        }
        let variances = squared_deviation_sum / count;

        let split_axis = if variances.x > variances.y && variances.x > variances.z {
            0
        } else if variances.y > variances.z {
            1
        } else {
            2
        };

        (split_axis, means[split_axis])
    }

    /// Sends triangles with centroid coordinate below the mean to the left
    /// and above it to the right. Triangles with centroid comparing equal to
    /// the computed mean go to whichever side currently holds fewer
    /// triangles. When rounding makes the mean differ from a shared centroid,
    /// one side ends up empty and the caller keeps the node as a leaf.
    fn split_triangles(
        &self,
        triangle_indices: Vec<usize>,
        split_axis: usize,
        axis_mean: F,
    ) -> (Vec<usize>, Vec<usize>) {
        let mut left = Vec::with_capacity(triangle_indices.len());
        let mut right = Vec::with_capacity(triangle_indices.len());
        let mut on_mean = Vec::new();

        for triangle_idx in triangle_indices {
            let coord = self.centroids[triangle_idx][split_axis];
            if coord < axis_mean {
                left.push(triangle_idx);
            } else if coord > axis_mean {
                right.push(triangle_idx);
            } else {
                on_mean.push(triangle_idx);
            }
        }

        for triangle_idx in on_mean {
            if left.len() < right.len() {
                left.push(triangle_idx);
            } else {
                right.push(triangle_idx);
            }
        }

        (left, right)
    }
}

impl<F: Float> KDopNode<F> {
    fn new(triangle_indices: Vec<usize>) -> Self {
        Self {
            aabb: AxisAlignedBox::empty(),
            first_child_idx: None,
            triangle_indices,
        }
    }
}

#[cfg(feature = "fuzzing")]
pub mod fuzzing {
    use super::*;
    use crate::geometry::ray_triangle_intersection;
    use arbitrary::{Arbitrary, Result, Unstructured};
    use nalgebra::point;
    use std::mem;

    #[derive(Clone, Debug)]
    pub struct ArbitraryTriangle([Point3<f64>; 3]);

    #[derive(Clone, Debug)]
    pub struct ArbitraryLine(Ray<f64>);

    impl Arbitrary<'_> for ArbitraryTriangle {
        fn arbitrary(u: &mut Unstructured<'_>) -> Result<Self> {
            let center = arbitrary_point(u, 10.0)?;
            let v0 = center + arbitrary_point(u, 2.0)?.coords;
            let v1 = center + arbitrary_point(u, 2.0)?.coords;
            let v2 = center + arbitrary_point(u, 2.0)?.coords;
            Ok(Self([v0, v1, v2]))
        }

        fn size_hint(_depth: usize) -> (usize, Option<usize>) {
            let size = 12 * mem::size_of::<u32>();
            (size, Some(size))
        }
    }

    impl Arbitrary<'_> for ArbitraryLine {
        fn arbitrary(u: &mut Unstructured<'_>) -> Result<Self> {
            let origin = arbitrary_point(u, 15.0)?;
            let direction = arbitrary_point(u, 1.0)?.coords;
            Ok(Self(Ray::new(origin, direction)))
        }

        fn size_hint(_depth: usize) -> (usize, Option<usize>) {
            let size = 6 * mem::size_of::<u32>();
            (size, Some(size))
        }
    }

    pub fn fuzz_test_kdop_tree_line_check(
        (triangles, lines): (Vec<ArbitraryTriangle>, Vec<ArbitraryLine>),
    ) {
        let vertices: Vec<_> = triangles.iter().flat_map(|triangle| triangle.0).collect();
        let indices: Vec<_> = (0..triangles.len() as u32)
            .map(|idx| [3 * idx, 3 * idx + 1, 3 * idx + 2])
            .collect();

        let tree = KDopTree::build(&indices, &vertices, &KDopTreeConfig::default()).unwrap();

        let stats = tree.stats();
        assert_eq!(stats.node_count, 2 * stats.leaf_count - 1);

        for line in &lines {
            let line = &line.0;
            let hits: Vec<_> = triangles
                .iter()
                .filter_map(|triangle| {
                    let [v0, v1, v2] = &triangle.0;
                    ray_triangle_intersection(v0, v1, v2, line)
                })
                .collect();

            let tree_hit = tree.line_check(line);

            if tree_hit {
                assert!(!hits.is_empty());
            }
            // Hits on or near a triangle edge may be missed by a box test
            // due to rounding
            if hits
                .iter()
                .any(|hit| hit.u > 1e-3 && hit.v > 1e-3 && hit.u + hit.v < 1.0 - 1e-3)
            {
                assert!(tree_hit);
            }
        }
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

#[cfg(test)]
mod test {
    use super::*;
    use crate::geometry::ray_triangle_intersection;
    use nalgebra::{point, vector};
    use proptest::prelude::*;

    fn single_triangle_tree() -> KDopTree<f64> {
        KDopTree::build(
            &[[0, 1, 2]],
            &[
                point![0.0, 0.0, 0.0],
                point![1.0, 0.0, 0.0],
                point![0.0, 1.0, 0.0],
            ],
            &KDopTreeConfig::default(),
        )
        .unwrap()
    }

    /// Creates `n` small triangles lying in the z = 0 plane, spaced out along
    /// the x-axis with unit spacing.
    fn triangle_row(n: u32) -> (Vec<[u32; 3]>, Vec<Point3<f64>>) {
        let mut vertices = Vec::new();
        let mut triangles = Vec::new();
        for idx in 0..n {
            let x = f64::from(idx);
            vertices.push(point![x, 0.0, 0.0]);
            vertices.push(point![x + 0.5, 0.0, 0.0]);
            vertices.push(point![x, 0.5, 0.0]);
            triangles.push([3 * idx, 3 * idx + 1, 3 * idx + 2]);
        }
        (triangles, vertices)
    }

    prop_compose! {
        fn point_strategy(max_coord: f64)(
            x in -max_coord..max_coord,
            y in -max_coord..max_coord,
            z in -max_coord..max_coord,
        ) -> Point3<f64> {
            point![x, y, z]
        }
    }

    prop_compose! {
        fn triangle_strategy()(
            center in point_strategy(10.0),
            a in point_strategy(2.0),
            b in point_strategy(2.0),
            c in point_strategy(2.0),
        ) -> [Point3<f64>; 3] {
            [center + a.coords, center + b.coords, center + c.coords]
        }
    }

    #[test]
    fn line_through_single_triangle_hits() {
        let tree = single_triangle_tree();
        let ray = Ray::new(point![0.25, 0.25, 5.0], vector![0.0, 0.0, -1.0]);
        assert!(tree.line_check(&ray));
    }

    #[test]
    fn line_parallel_to_single_triangle_misses() {
        let tree = single_triangle_tree();
        let ray = Ray::new(point![0.25, 0.25, 1.0], vector![1.0, 0.0, 0.0]);
        assert!(!tree.line_check(&ray));
    }

    #[test]
    fn line_beside_single_triangle_misses() {
        let tree = single_triangle_tree();
        let ray = Ray::new(point![0.9, 0.9, 5.0], vector![0.0, 0.0, -1.0]);
        assert!(!tree.line_check(&ray));
    }

    #[test]
    fn empty_mesh_gives_single_empty_leaf_that_is_never_hit() {
        let tree = KDopTree::<f64>::build(&[], &[], &KDopTreeConfig::default()).unwrap();

        assert_eq!(
            tree.stats(),
            KDopTreeStats {
                node_count: 1,
                leaf_count: 1,
                max_depth: 1
            }
        );
        assert!(tree.root_aabb().is_empty());

        for direction in [
            vector![1.0, 0.0, 0.0],
            vector![-1.0, 2.0, 0.5],
            vector![0.0, 0.0, 0.0],
        ] {
            assert!(!tree.line_check(&Ray::new(Point3::origin(), direction)));
        }
    }

    #[test]
    fn building_with_out_of_range_vertex_index_fails() {
        let result = KDopTree::build(
            &[[0, 1, 3]],
            &[
                point![0.0, 0.0, 0.0],
                point![1.0, 0.0, 0.0],
                point![0.0, 1.0, 0.0],
            ],
            &KDopTreeConfig::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn building_with_invalid_config_fails() {
        let (triangles, vertices) = triangle_row(3);
        let config = KDopTreeConfig {
            max_triangles_per_leaf: 0,
            max_depth: 10,
        };
        assert!(KDopTree::build(&triangles, &vertices, &config).is_err());
    }

    #[test]
    fn few_triangles_give_single_leaf() {
        let (triangles, vertices) = triangle_row(5);
        let tree = KDopTree::build(&triangles, &vertices, &KDopTreeConfig::default()).unwrap();
        assert_eq!(tree.stats().node_count, 1);
        assert_eq!(tree.stats().leaf_count, 1);
    }

    #[test]
    fn triangles_are_split_at_mean_along_axis_of_largest_variance() {
        let (triangles, vertices) = triangle_row(6);
        let tree = KDopTree::build(&triangles, &vertices, &KDopTreeConfig::default()).unwrap();

        assert_eq!(
            tree.stats(),
            KDopTreeStats {
                node_count: 3,
                leaf_count: 2,
                max_depth: 2
            }
        );

        // Centroids lie at x = idx + 1/6, with mean 2.5 + 1/6, so the first
        // three triangles go left
        let mut boxes = Vec::new();
        tree.for_each_node_box_at_level(2, |aabb| boxes.push(aabb.clone()));
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].lower_corner().x, 0.0);
        assert_eq!(boxes[0].upper_corner().x, 2.5);
        assert_eq!(boxes[1].lower_corner().x, 3.0);
        assert_eq!(boxes[1].upper_corner().x, 5.5);
    }

    #[test]
    fn triangles_with_centroid_on_mean_are_balanced_between_children() {
        let vertices = [
            point![0.0, 0.0, 0.0],
            point![1.0, 0.0, 0.0],
            point![0.0, 1.0, 0.0],
        ];
        let triangles = [[0, 1, 2]; 6];

        let tree = KDopTree::build(&triangles, &vertices, &KDopTreeConfig::default()).unwrap();

        assert_eq!(tree.stats().node_count, 3);
        assert_eq!(tree.nodes[1].triangle_indices.len(), 3);
        assert_eq!(tree.nodes[2].triangle_indices.len(), 3);
    }

    #[test]
    fn coincident_centroids_off_the_computed_mean_give_single_leaf() {
        let vertices = [point![0.1, 0.1, 0.1]; 3];
        let triangles = [[0, 1, 2]; 7];

        let tree = KDopTree::build(&triangles, &vertices, &KDopTreeConfig::default()).unwrap();

        assert_eq!(
            tree.stats(),
            KDopTreeStats {
                node_count: 1,
                leaf_count: 1,
                max_depth: 1
            }
        );
        assert_eq!(tree.nodes[0].triangle_indices.len(), 7);
    }

    #[test]
    fn depth_limit_stops_splitting() {
        let (triangles, vertices) = triangle_row(40);
        let config = KDopTreeConfig {
            max_triangles_per_leaf: 1,
            max_depth: 3,
        };
        let tree = KDopTree::build(&triangles, &vertices, &config).unwrap();
        assert_eq!(tree.stats().max_depth, 3);
        assert_eq!(tree.stats().leaf_count, 4);
    }

    #[test]
    fn internal_nodes_hold_no_triangles() {
        let (triangles, vertices) = triangle_row(30);
        let tree = KDopTree::build(&triangles, &vertices, &KDopTreeConfig::default()).unwrap();

        let mut held = 0;
        for node in &tree.nodes {
            if node.first_child_idx.is_some() {
                assert!(node.triangle_indices.is_empty());
            } else {
                held += node.triangle_indices.len();
            }
        }
        assert_eq!(held, 30);
    }

    #[test]
    fn level_visit_includes_shallow_leaves() {
        let (triangles, vertices) = triangle_row(30);
        let tree = KDopTree::build(&triangles, &vertices, &KDopTreeConfig::default()).unwrap();

        let mut root_count = 0;
        tree.for_each_node_box_at_level(1, |aabb| {
            assert_eq!(aabb, tree.root_aabb());
            root_count += 1;
        });
        assert_eq!(root_count, 1);

        let mut leaf_count = 0;
        tree.for_each_node_box_at_level(usize::MAX, |_| leaf_count += 1);
        assert_eq!(leaf_count, tree.stats().leaf_count);
    }

    #[test]
    fn tree_owns_copy_of_mesh() {
        let (triangles, mut vertices) = triangle_row(8);
        let tree = KDopTree::build(&triangles, &vertices, &KDopTreeConfig::default()).unwrap();
        vertices.clear();

        assert_eq!(tree.vertices().len(), 24);
        assert_eq!(tree.triangles(), triangles.as_slice());
        let ray = Ray::new(point![7.1, 0.1, 1.0], vector![0.0, 0.0, -1.0]);
        assert!(tree.line_check(&ray));
    }

    proptest! {
        #[test]
        fn line_check_agrees_with_testing_every_triangle(
            mesh in prop::collection::vec(triangle_strategy(), 0..40),
            origin in point_strategy(15.0),
            direction in point_strategy(1.0),
        ) {
            let vertices: Vec<_> = mesh.iter().flatten().copied().collect();
            let triangles: Vec<_> = (0..mesh.len() as u32)
                .map(|idx| [3 * idx, 3 * idx + 1, 3 * idx + 2])
                .collect();
            let tree = KDopTree::build(&triangles, &vertices, &KDopTreeConfig::default()).unwrap();

            let ray = Ray::new(origin, direction.coords);
            let hits: Vec<_> = mesh
                .iter()
                .filter_map(|[v0, v1, v2]| ray_triangle_intersection(v0, v1, v2, &ray))
                .collect();

            let tree_hit = tree.line_check(&ray);
            if tree_hit {
                prop_assert!(!hits.is_empty());
            }
            if hits.iter().any(|hit| hit.u > 1e-3 && hit.v > 1e-3 && hit.u + hit.v < 1.0 - 1e-3) {
                prop_assert!(tree_hit);
            }
        }
    }
}
