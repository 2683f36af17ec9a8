//! Asset lookups.

use crate::error::CatalogResult;
use crate::query::AssetQuery;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use tessera_core::{Asset, AssetId};

/// A boxed stream of assets, consumed lazily by projection builders.
pub type AssetStream = Pin<Box<dyn Stream<Item = CatalogResult<Asset>> + Send>>;

/// Repository for asset metadata.
#[async_trait]
pub trait AssetRepo: Send + Sync {
    /// Get an asset by id.
    async fn get_asset(&self, id: &AssetId) -> CatalogResult<Option<Asset>>;

    /// Stream every deliverable asset matching `query`, in the query's order.
    async fn assets_matching(&self, query: &AssetQuery) -> CatalogResult<AssetStream>;
}
