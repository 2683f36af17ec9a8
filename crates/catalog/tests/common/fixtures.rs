use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tessera_catalog::{
    AssetQuery, AssetRepo, AssetStore, AssetStream, CatalogResult, CustomerRepo, MemoryStore,
    NamedQueryRepo,
};
use tessera_core::{Asset, AssetId, Customer, NamedQuery, Space};

/// Build an asset with the given string1/number1 references.
#[allow(dead_code)]
pub fn asset(id: &str, string1: Option<&str>, number1: Option<i64>) -> Asset {
    let mut asset = Asset::new(AssetId::parse(id).expect("valid asset id"), 1000, 800);
    asset.string1 = string1.map(str::to_string);
    asset.number1 = number1;
    asset
}

/// Customer 99 ("acme") with spaces 1 ("books") and 2 ("maps").
#[allow(dead_code)]
pub async fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store
        .insert_customer(Customer {
            id: 99,
            name: "acme".to_string(),
        })
        .await;
    for (id, name) in [(1, "books"), (2, "maps")] {
        store
            .insert_space(Space {
                customer: 99,
                id,
                name: name.to_string(),
            })
            .await;
    }
    store
}

/// Asset store wrapper counting `assets_matching` calls.
#[allow(dead_code)]
pub struct CountingStore {
    inner: MemoryStore,
    pub queries: AtomicUsize,
}

#[allow(dead_code)]
impl CountingStore {
    pub fn new(inner: MemoryStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            queries: AtomicUsize::new(0),
        })
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub async fn insert_asset(&self, asset: Asset) {
        self.inner.insert_asset(asset).await;
    }
}

#[async_trait]
impl CustomerRepo for CountingStore {
    async fn get_customer(&self, segment: &str) -> CatalogResult<Option<Customer>> {
        self.inner.get_customer(segment).await
    }

    async fn get_space_by_name(&self, customer: u32, name: &str) -> CatalogResult<Option<Space>> {
        self.inner.get_space_by_name(customer, name).await
    }
}

#[async_trait]
impl AssetRepo for CountingStore {
    async fn get_asset(&self, id: &AssetId) -> CatalogResult<Option<Asset>> {
        self.inner.get_asset(id).await
    }

    async fn assets_matching(&self, query: &AssetQuery) -> CatalogResult<AssetStream> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.assets_matching(query).await
    }
}

#[async_trait]
impl NamedQueryRepo for CountingStore {
    async fn get_named_query(&self, customer: u32, name: &str) -> CatalogResult<Option<NamedQuery>> {
        self.inner.get_named_query(customer, name).await
    }
}

#[async_trait]
impl AssetStore for CountingStore {
    async fn health_check(&self) -> CatalogResult<()> {
        Ok(())
    }
}
