#![no_main]

use libfuzzer_sys::fuzz_target;
use spacepart::octree::fuzzing::{ArbitraryAABB, ArbitraryRay, fuzz_test_octree_ray_query};

fuzz_target!(|input: (Vec<ArbitraryAABB>, ArbitraryRay)| {
    fuzz_test_octree_ray_query(input);
});
