#![no_main]

use libfuzzer_sys::fuzz_target;
use spacepart::octree::fuzzing::{ArbitraryAABB, fuzz_test_octree_overlapping_box_query};

fuzz_target!(|input: (Vec<ArbitraryAABB>, ArbitraryAABB)| {
    fuzz_test_octree_overlapping_box_query(input);
});
