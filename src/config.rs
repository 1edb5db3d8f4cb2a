//! Configuration parameters for spatial partitions.

use crate::geometry::num::{self, Float};
use anyhow::{Result, bail};
use nalgebra::{Point3, Vector3};

/// Configuration parameters for an [`Octree`](crate::Octree).
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
#[derive(Clone, Debug, PartialEq)]
pub struct OctreeConfig<F: Float> {
    /// Center of the root cell.
    pub center: Point3<F>,
    /// Full extent of the root cell along each axis.
    pub root_size: Vector3<F>,
    /// A cell is subdivided as long as its extent exceeds this size along
    /// every axis.
    pub leaf_size: Vector3<F>,
}

/// Configuration parameters for a [`KDopTree`](crate::KDopTree).
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KDopTreeConfig {
    /// Nodes holding more triangles than this are split.
    pub max_triangles_per_leaf: usize,
    /// Nodes at this depth are never split, regardless of how many triangles
    /// they hold. The root is at depth 1.
    pub max_depth: usize,
}

/// Configuration parameters for a [`SpatialWorld`](crate::SpatialWorld).
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
#[derive(Clone, Debug, PartialEq)]
pub struct SpatialConfig<F: Float> {
    pub octree: OctreeConfig<F>,
    pub kdop_tree: KDopTreeConfig,
}

/// The maximum number of times the octree root may be subdivided.
pub const MAX_OCTREE_SUBDIVISION_LEVELS: usize = 8;

impl<F: Float> OctreeConfig<F> {
    /// Checks that the configuration describes a buildable octree.
    ///
    /// # Errors
    /// Returns an error if any leaf size component is not strictly positive,
    /// if any root size component is negative or non-finite, or if the root
    /// would have to be subdivided more than
    /// [`MAX_OCTREE_SUBDIVISION_LEVELS`] times.
    pub fn validate(&self) -> Result<()> {
        for dim in 0..3 {
            let leaf_size = self.leaf_size[dim];
            if num::is_nan(leaf_size) || leaf_size <= F::ZERO {
                bail!("Octree leaf size must be positive along every axis, got {leaf_size} along axis {dim}");
            }
            let root_size = self.root_size[dim];
            if num::is_nan(root_size) || root_size < F::ZERO || root_size == F::INFINITY {
                bail!("Octree root size must be finite and non-negative along every axis, got {root_size} along axis {dim}");
            }
        }

        let levels = self.subdivision_levels();
        if levels > MAX_OCTREE_SUBDIVISION_LEVELS {
            bail!(
                "Octree with root size {:?} and leaf size {:?} would need {levels} subdivision levels (maximum is {MAX_OCTREE_SUBDIVISION_LEVELS})",
                self.root_size.as_slice(),
                self.leaf_size.as_slice()
            );
        }

        Ok(())
    }

    /// Returns the number of times the root cell will be subdivided, which is
    /// the number of halvings of the root size before it no longer exceeds
    /// the leaf size along every axis. Stops counting once the maximum is
    /// exceeded.
    pub fn subdivision_levels(&self) -> usize {
        let mut extents = self.root_size;
        let mut levels = 0;
        while levels <= MAX_OCTREE_SUBDIVISION_LEVELS && Self::exceeds(&extents, &self.leaf_size)
        {
            extents *= F::HALF;
            levels += 1;
        }
        levels
    }

    pub(crate) fn exceeds(extents: &Vector3<F>, leaf_size: &Vector3<F>) -> bool {
        (0..3).all(|dim| extents[dim] > leaf_size[dim])
    }
}

impl KDopTreeConfig {
    /// Checks that the configuration describes a buildable tree.
    ///
    /// # Errors
    /// Returns an error if either limit is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_triangles_per_leaf == 0 {
            bail!("k-DOP tree leaves must be allowed to hold at least one triangle");
        }
        if self.max_depth == 0 {
            bail!("k-DOP tree maximum depth must be at least 1");
        }
        Ok(())
    }
}

impl<F: Float> SpatialConfig<F> {
    /// Checks the configuration of every partition.
    ///
    /// # Errors
    /// See [`OctreeConfig::validate`] and [`KDopTreeConfig::validate`].
    pub fn validate(&self) -> Result<()> {
        self.octree.validate()?;
        self.kdop_tree.validate()
    }
}

impl<F: Float> Default for OctreeConfig<F> {
    fn default() -> Self {
        let root_size = F::from_f64(1024.0).unwrap_or(F::ONE);
        let leaf_size = F::from_f64(64.0).unwrap_or(F::ONE);
        Self {
            center: Point3::origin(),
            root_size: Vector3::repeat(root_size),
            leaf_size: Vector3::repeat(leaf_size),
        }
    }
}

impl Default for KDopTreeConfig {
    fn default() -> Self {
        Self {
            max_triangles_per_leaf: 5,
            max_depth: 64,
        }
    }
}

impl<F: Float> Default for SpatialConfig<F> {
    fn default() -> Self {
        Self {
            octree: OctreeConfig::default(),
            kdop_tree: KDopTreeConfig::default(),
        }
    }
}
