pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{filesystem_store, seeded_bytes};
