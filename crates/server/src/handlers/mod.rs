//! HTTP request handlers.

pub mod health;
pub mod images;
pub mod named_queries;
pub mod thumbs;

pub use health::*;
pub use images::*;
pub use named_queries::*;
pub use thumbs::*;
