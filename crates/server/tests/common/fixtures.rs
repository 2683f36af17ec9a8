//! Catalog fixtures.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tessera_catalog::{
    AssetQuery, AssetRepo, AssetStore, AssetStream, CatalogResult, CustomerRepo, MemoryStore,
    NamedQueryRepo,
};
use tessera_core::{Asset, AssetId, Customer, NamedQuery, Space};

/// An open asset.
#[allow(dead_code)]
pub fn asset(id: &str) -> Asset {
    Asset::new(AssetId::parse(id).expect("valid asset id"), 1024, 768)
}

/// An asset that requires `role` to view.
#[allow(dead_code)]
pub fn restricted_asset(id: &str, role: &str) -> Asset {
    let mut asset = asset(id);
    asset.roles.push(role.to_string());
    asset
}

#[allow(dead_code)]
pub fn named_query(customer: u32, name: &str, template: &str) -> NamedQuery {
    NamedQuery {
        customer,
        name: name.to_string(),
        template: template.to_string(),
        global: false,
    }
}

/// Catalog wrapper counting `assets_matching` calls.
///
/// Customer 99 ("acme") with space 1 ("books") is always present.
#[allow(dead_code)]
pub struct CountingCatalog {
    inner: MemoryStore,
    queries: AtomicUsize,
}

#[allow(dead_code)]
impl CountingCatalog {
    pub async fn new() -> Self {
        let inner = MemoryStore::new();
        inner
            .insert_customer(Customer {
                id: 99,
                name: "acme".to_string(),
            })
            .await;
        inner
            .insert_space(Space {
                customer: 99,
                id: 1,
                name: "books".to_string(),
            })
            .await;
        Self {
            inner,
            queries: AtomicUsize::new(0),
        }
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub async fn insert_asset(&self, asset: Asset) {
        self.inner.insert_asset(asset).await;
    }

    pub async fn insert_named_query(&self, query: NamedQuery) {
        self.inner.insert_named_query(query).await;
    }
}

#[async_trait]
impl CustomerRepo for CountingCatalog {
    async fn get_customer(&self, segment: &str) -> CatalogResult<Option<Customer>> {
        self.inner.get_customer(segment).await
    }

    async fn get_space_by_name(&self, customer: u32, name: &str) -> CatalogResult<Option<Space>> {
        self.inner.get_space_by_name(customer, name).await
    }
}

#[async_trait]
impl AssetRepo for CountingCatalog {
    async fn get_asset(&self, id: &AssetId) -> CatalogResult<Option<Asset>> {
        self.inner.get_asset(id).await
    }

    async fn assets_matching(&self, query: &AssetQuery) -> CatalogResult<AssetStream> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.assets_matching(query).await
    }
}

#[async_trait]
impl NamedQueryRepo for CountingCatalog {
    async fn get_named_query(&self, customer: u32, name: &str) -> CatalogResult<Option<NamedQuery>> {
        self.inner.get_named_query(customer, name).await
    }
}

#[async_trait]
impl AssetStore for CountingCatalog {
    async fn health_check(&self) -> CatalogResult<()> {
        Ok(())
    }
}
