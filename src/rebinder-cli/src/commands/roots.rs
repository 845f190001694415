//! Roots command handler

use rebinder::RootTable;

/// Print every legacy root in the order they are tried
pub fn handle(roots: &RootTable) {
    for prefix in roots.prefixes() {
        println!("{prefix}");
    }
}
