//! Core domain types and shared logic for the tessera IIIF delivery service.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Asset identifiers and catalog records
//! - Named query templates and their parser
//! - Projection control files
//! - Fast-storage path templates
//! - Service configuration

pub mod asset;
pub mod asset_id;
pub mod config;
pub mod control_file;
pub mod error;
pub mod local_path;
pub mod named_query;

pub use asset::{Asset, Customer, Space};
pub use asset_id::AssetId;
pub use control_file::{ControlFile, PersistedProjectionStatus};
pub use error::{Error, Result};
pub use named_query::{
    NamedQuery, OrderDirection, ParsedNamedQuery, ProjectionKind, QueryMapping, QueryOrder,
    parse_named_query,
};
