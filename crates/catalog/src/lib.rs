//! Asset catalog access for tessera.
//!
//! This crate provides the read side of the delivery data model:
//! - Customer, space and asset lookups
//! - Stored named queries with global fallback
//! - Execution of parsed named queries into ordered asset streams

pub mod error;
pub mod generator;
pub mod query;
pub mod repos;
pub mod store;

pub use error::{CatalogError, CatalogResult};
pub use generator::NamedQueryResultGenerator;
pub use query::AssetQuery;
pub use repos::{AssetRepo, AssetStream, CustomerRepo, NamedQueryRepo};
pub use store::{AssetStore, CatalogDocument, MemoryStore};

use std::sync::Arc;
use tessera_core::config::CatalogConfig;

/// Create an asset store from configuration.
pub async fn from_config(config: &CatalogConfig) -> CatalogResult<Arc<dyn AssetStore>> {
    match config {
        CatalogConfig::Memory => Ok(Arc::new(MemoryStore::new()) as Arc<dyn AssetStore>),
        CatalogConfig::File { path } => {
            let store = MemoryStore::from_file(path).await?;
            Ok(Arc::new(store) as Arc<dyn AssetStore>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_config_memory() {
        let store = from_config(&CatalogConfig::Memory).await.unwrap();
        store.health_check().await.unwrap();
        assert!(store.get_customer("1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_from_config_missing_file() {
        let config = CatalogConfig::File {
            path: "/does/not/exist.json".into(),
        };
        assert!(matches!(
            from_config(&config).await,
            Err(CatalogError::Io(_))
        ));
    }
}
