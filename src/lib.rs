//! Spatial partitioning and visibility culling.

#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]
#![warn(clippy::cast_lossless)]

#[macro_use]
mod macros;

pub mod config;
pub mod entity;
#[cfg(feature = "ron")]
pub mod io;
pub mod kdop_tree;
pub mod octree;
pub mod partition;
pub mod world;

pub use spacepart_geometry as geometry;

pub use config::{KDopTreeConfig, OctreeConfig, SpatialConfig};
pub use entity::{BoundedEntity, EntityID};
pub use kdop_tree::{KDopTree, KDopTreeStats};
pub use octree::Octree;
pub use partition::SpatialPartition;
pub use world::SpatialWorld;
