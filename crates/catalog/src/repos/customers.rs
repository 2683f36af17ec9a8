//! Customer and space lookups.

use crate::error::{CatalogError, CatalogResult};
use async_trait::async_trait;
use tessera_core::{Customer, Space};

/// Repository for tenants and their spaces.
#[async_trait]
pub trait CustomerRepo: Send + Sync {
    /// Get a customer by a request path segment: numeric id first, then name.
    async fn get_customer(&self, segment: &str) -> CatalogResult<Option<Customer>>;

    /// Get a customer's space by its name.
    async fn get_space_by_name(&self, customer: u32, name: &str)
    -> CatalogResult<Option<Space>>;

    /// Resolve a path segment to a customer, failing with `NotFound`.
    async fn resolve_customer(&self, segment: &str) -> CatalogResult<Customer> {
        self.get_customer(segment)
            .await?
            .ok_or_else(|| CatalogError::NotFound(format!("customer '{segment}'")))
    }
}
