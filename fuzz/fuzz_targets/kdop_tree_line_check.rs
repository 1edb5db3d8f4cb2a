#![no_main]

use libfuzzer_sys::fuzz_target;
use spacepart::kdop_tree::fuzzing::{
    ArbitraryLine, ArbitraryTriangle, fuzz_test_kdop_tree_line_check,
};

fuzz_target!(|input: (Vec<ArbitraryTriangle>, Vec<ArbitraryLine>)| {
    fuzz_test_kdop_tree_line_check(input);
});
