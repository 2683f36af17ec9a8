//! Catalog records: customers, spaces and assets.

use crate::asset_id::AssetId;
use serde::{Deserialize, Serialize};

/// A tenant of the delivery service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: u32,
    /// Human readable name, usable in request paths in place of the id.
    pub name: String,
}

/// A logical grouping of assets within a customer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    pub customer: u32,
    pub id: u32,
    pub name: String,
}

/// Catalog metadata for one asset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    /// Roles a caller must hold to view the asset. Empty means open.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Assets flagged not-for-delivery are never served or projected.
    #[serde(default)]
    pub not_for_delivery: bool,
    #[serde(default)]
    pub string1: Option<String>,
    #[serde(default)]
    pub string2: Option<String>,
    #[serde(default)]
    pub string3: Option<String>,
    #[serde(default)]
    pub number1: Option<i64>,
    #[serde(default)]
    pub number2: Option<i64>,
    #[serde(default)]
    pub number3: Option<i64>,
}

impl Asset {
    /// Create an open asset with no references set.
    pub fn new(id: AssetId, width: u32, height: u32) -> Self {
        Self {
            id,
            width,
            height,
            roles: Vec::new(),
            not_for_delivery: false,
            string1: None,
            string2: None,
            string3: None,
            number1: None,
            number2: None,
            number3: None,
        }
    }

    /// Whether the asset may only be redistributed to authorized callers.
    pub fn requires_auth(&self) -> bool {
        !self.roles.is_empty()
    }

    /// Blob store key (thumbs bucket) of the derivative used for redistribution.
    pub fn redistribution_key(&self) -> String {
        self.id.largest_thumbnail_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_auth_follows_roles() {
        let mut asset = Asset::new(AssetId::new(1, 2, "a").unwrap(), 10, 10);
        assert!(!asset.requires_auth());
        asset.roles.push("clickthrough".to_string());
        assert!(asset.requires_auth());
    }

    #[test]
    fn test_deserialize_defaults() {
        let asset: Asset = serde_json::from_str(r#"{"id": "1/2/foo"}"#).unwrap();
        assert_eq!(asset.id.name(), "foo");
        assert_eq!(asset.width, 0);
        assert!(asset.roles.is_empty());
        assert!(!asset.not_for_delivery);
        assert_eq!(asset.redistribution_key(), "1/2/foo/low.jpg");
    }
}
