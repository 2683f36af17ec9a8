pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{CountingStore, asset, seeded_store};
