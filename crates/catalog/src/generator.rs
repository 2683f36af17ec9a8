//! Executes parsed named queries against the asset store.

use crate::error::{CatalogError, CatalogResult};
use crate::query::AssetQuery;
use crate::repos::AssetStream;
use crate::store::AssetStore;
use std::sync::Arc;
use tessera_core::ParsedNamedQuery;
use tracing::debug;

/// Turns a [`ParsedNamedQuery`] into an ordered, lazily consumed asset stream.
///
/// Each call to [`execute`](Self::execute) queries the store afresh.
#[derive(Clone)]
pub struct NamedQueryResultGenerator {
    store: Arc<dyn AssetStore>,
}

impl NamedQueryResultGenerator {
    pub fn new(store: Arc<dyn AssetStore>) -> Self {
        Self { store }
    }

    /// Build the store filter for a parsed query.
    ///
    /// Returns `None` when the query names a space that does not exist, which
    /// can never match any asset.
    pub async fn asset_query(&self, query: &ParsedNamedQuery) -> CatalogResult<Option<AssetQuery>> {
        if query.faulty {
            return Err(CatalogError::FaultyQuery(
                query.error_message.clone().unwrap_or_default(),
            ));
        }

        let mut space = query.space;
        if let Some(space_name) = &query.space_name {
            match self.store.get_space_by_name(query.customer, space_name).await? {
                Some(found) if space.is_none_or(|s| s == found.id) => space = Some(found.id),
                _ => return Ok(None),
            }
        }

        Ok(Some(AssetQuery {
            customer: query.customer,
            space,
            string1: query.string1.clone(),
            string2: query.string2.clone(),
            string3: query.string3.clone(),
            number1: query.number1,
            number2: query.number2,
            number3: query.number3,
            ordering: query.asset_ordering.clone(),
        }))
    }

    /// Stream the assets matching `query`. Faulty queries are rejected
    /// without touching the store.
    pub async fn execute(&self, query: &ParsedNamedQuery) -> CatalogResult<AssetStream> {
        match self.asset_query(query).await? {
            Some(asset_query) => self.store.assets_matching(&asset_query).await,
            None => {
                debug!(
                    customer = query.customer,
                    space_name = ?query.space_name,
                    "Named query space does not resolve, no results"
                );
                Ok(Box::pin(futures::stream::empty()))
            }
        }
    }
}
