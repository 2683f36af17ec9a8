//! Authorization decisions for restricted projections.

use async_trait::async_trait;
use axum::http::HeaderMap;

/// Decides whether the caller may view content that requires `roles`.
#[async_trait]
pub trait AccessValidator: Send + Sync {
    async fn can_view(&self, customer: u32, roles: &[String], headers: &HeaderMap) -> bool;
}

/// Allows open content only. Used when no authorization service is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenContentOnly;

#[async_trait]
impl AccessValidator for OpenContentOnly {
    async fn can_view(&self, _customer: u32, roles: &[String], _headers: &HeaderMap) -> bool {
        roles.is_empty()
    }
}
