#![no_main]

use libfuzzer_sys::fuzz_target;
use spacepart::octree::fuzzing::{ArbitraryAABB, fuzz_test_octree_insertion_and_removal};

fuzz_target!(|aabbs: Vec<ArbitraryAABB>| {
    fuzz_test_octree_insertion_and_removal(aabbs);
});
