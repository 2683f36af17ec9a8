//! Repository traits for catalog reads.

pub mod assets;
pub mod customers;
pub mod named_queries;

pub use assets::{AssetRepo, AssetStream};
pub use customers::CustomerRepo;
pub use named_queries::NamedQueryRepo;
