/**
 * tests/mod.rs
 *
 * Scenario tests driving a whole `Session`: value lifetime, broadcasting and
 * subscripting. Leaf modules keep their own unit tests next to the code.
 */

mod store;
mod utils;

pub(crate) use utils::Tester; // the testing harness
