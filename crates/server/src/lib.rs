//! HTTP delivery server for tessera.
//!
//! This crate provides the request-serving side:
//! - Delivery path parsing and tenant resolution
//! - Asset orchestration into fast storage, guarded by a keyed lock
//! - Proxying to the image server and thumbnail delivery
//! - Zip and PDF projections of named queries behind control files

pub mod access;
pub mod destinations;
pub mod error;
pub mod handlers;
pub mod keyed_lock;
pub mod metrics;
pub mod orchestrator;
pub mod path_parser;
pub mod projection;
pub mod proxy;
pub mod routes;
pub mod state;

pub use access::{AccessValidator, OpenContentOnly};
pub use error::ApiError;
pub use keyed_lock::KeyedLock;
pub use orchestrator::{ImageOrchestrator, OrchestrationStatus};
pub use routes::create_router;
pub use state::AppState;
