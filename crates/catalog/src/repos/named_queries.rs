//! Named query lookups.

use crate::error::CatalogResult;
use async_trait::async_trait;
use tessera_core::NamedQuery;

/// Repository for stored named queries.
#[async_trait]
pub trait NamedQueryRepo: Send + Sync {
    /// Get a named query owned by `customer`, falling back to a global query
    /// with the same name.
    async fn get_named_query(&self, customer: u32, name: &str)
    -> CatalogResult<Option<NamedQuery>>;
}
