//! Asset store trait and the in-memory implementation.

use crate::error::CatalogResult;
use crate::query::AssetQuery;
use crate::repos::{AssetRepo, AssetStream, CustomerRepo, NamedQueryRepo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tessera_core::{Asset, AssetId, Customer, NamedQuery, Space};
use tokio::sync::RwLock;
use tracing::info;

/// Combined catalog trait consumed by the server.
#[async_trait]
pub trait AssetStore: CustomerRepo + AssetRepo + NamedQueryRepo + Send + Sync {
    /// Check the catalog is usable.
    async fn health_check(&self) -> CatalogResult<()>;
}

/// Serialized form of a catalog, as loaded from a JSON file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub customers: Vec<Customer>,
    #[serde(default)]
    pub spaces: Vec<Space>,
    #[serde(default)]
    pub assets: Vec<Asset>,
    #[serde(default)]
    pub named_queries: Vec<NamedQuery>,
}

#[derive(Default)]
struct CatalogData {
    customers: HashMap<u32, Customer>,
    spaces: HashMap<(u32, u32), Space>,
    assets: HashMap<AssetId, Asset>,
    named_queries: Vec<NamedQuery>,
}

/// In-memory catalog. Seeded from a [`CatalogDocument`] or through the
/// `insert_*` methods.
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<CatalogData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_document(document: CatalogDocument) -> Self {
        let mut data = CatalogData::default();
        for customer in document.customers {
            data.customers.insert(customer.id, customer);
        }
        for space in document.spaces {
            data.spaces.insert((space.customer, space.id), space);
        }
        for asset in document.assets {
            data.assets.insert(asset.id.clone(), asset);
        }
        data.named_queries = document.named_queries;
        Self {
            data: RwLock::new(data),
        }
    }

    /// Load a JSON catalog document.
    pub async fn from_file(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read(path).await?;
        let document: CatalogDocument = serde_json::from_slice(&raw)?;
        info!(
            path = %path.display(),
            customers = document.customers.len(),
            assets = document.assets.len(),
            named_queries = document.named_queries.len(),
            "Loaded catalog"
        );
        Ok(Self::from_document(document))
    }

    pub async fn insert_customer(&self, customer: Customer) {
        self.data.write().await.customers.insert(customer.id, customer);
    }

    pub async fn insert_space(&self, space: Space) {
        self.data
            .write()
            .await
            .spaces
            .insert((space.customer, space.id), space);
    }

    pub async fn insert_asset(&self, asset: Asset) {
        self.data.write().await.assets.insert(asset.id.clone(), asset);
    }

    /// Insert a named query, replacing one with the same owner and name.
    pub async fn insert_named_query(&self, query: NamedQuery) {
        let mut data = self.data.write().await;
        data.named_queries
            .retain(|q| !(q.customer == query.customer && q.name == query.name));
        data.named_queries.push(query);
    }
}

#[async_trait]
impl CustomerRepo for MemoryStore {
    async fn get_customer(&self, segment: &str) -> CatalogResult<Option<Customer>> {
        let data = self.data.read().await;
        if let Ok(id) = segment.parse::<u32>()
            && let Some(customer) = data.customers.get(&id)
        {
            return Ok(Some(customer.clone()));
        }
        Ok(data.customers.values().find(|c| c.name == segment).cloned())
    }

    async fn get_space_by_name(&self, customer: u32, name: &str) -> CatalogResult<Option<Space>> {
        let data = self.data.read().await;
        Ok(data
            .spaces
            .values()
            .find(|s| s.customer == customer && s.name == name)
            .cloned())
    }
}

#[async_trait]
impl AssetRepo for MemoryStore {
    async fn get_asset(&self, id: &AssetId) -> CatalogResult<Option<Asset>> {
        Ok(self.data.read().await.assets.get(id).cloned())
    }

    async fn assets_matching(&self, query: &AssetQuery) -> CatalogResult<AssetStream> {
        let mut matching: Vec<Asset> = {
            let data = self.data.read().await;
            data.assets
                .values()
                .filter(|asset| query.matches(asset))
                .cloned()
                .collect()
        };
        query.sort(&mut matching);
        Ok(Box::pin(futures::stream::iter(matching.into_iter().map(Ok))))
    }
}

#[async_trait]
impl NamedQueryRepo for MemoryStore {
    async fn get_named_query(&self, customer: u32, name: &str) -> CatalogResult<Option<NamedQuery>> {
        let data = self.data.read().await;
        let own = data
            .named_queries
            .iter()
            .find(|q| q.customer == customer && q.name == name);
        Ok(own
            .or_else(|| data.named_queries.iter().find(|q| q.global && q.name == name))
            .cloned())
    }
}

#[async_trait]
impl AssetStore for MemoryStore {
    async fn health_check(&self) -> CatalogResult<()> {
        Ok(())
    }
}
