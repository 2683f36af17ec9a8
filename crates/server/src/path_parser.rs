//! Delivery request path parsing.
//!
//! Paths have the shape `/{prefix}[/v{n}]/{customer}/{space}/{asset}[/{suffix}]`.
//! The shape is validated before the customer segment is resolved, so a
//! malformed path never reaches the catalog.

use crate::error::ApiResult;
use percent_encoding::percent_decode_str;
use std::sync::Arc;
use tessera_catalog::{AssetStore, CustomerRepo};
use tessera_core::{AssetId, Customer, Error};

/// A parsed and tenant-resolved delivery request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryRequest {
    /// Logical service addressed, e.g. `thumbs` or `iiif-img`.
    pub route_prefix: String,
    /// Optional `v<digit>` slug following the prefix.
    pub version: Option<String>,
    /// Customer segment as it appeared in the path.
    pub customer_segment: String,
    pub customer: Customer,
    pub space: u32,
    /// Everything after the space segment, without query string or fragment.
    pub asset_path: String,
    /// First segment of `asset_path`.
    pub asset_name: String,
    /// Remainder of `asset_path` after the asset name, uninterpreted.
    pub suffix: String,
    pub base_path: String,
    /// `base_path` with the customer segment replaced by the numeric id.
    pub normalised_base_path: String,
    pub normalised_full_path: String,
}

impl DeliveryRequest {
    pub fn asset_id(&self) -> tessera_core::Result<AssetId> {
        AssetId::new(self.customer.id, self.space, self.asset_name.clone())
    }
}

/// Shape of a request path before tenant resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathShape {
    pub route_prefix: String,
    pub version: Option<String>,
    pub customer_segment: String,
    pub space: u32,
    pub asset_path: String,
}

impl PathShape {
    /// Split and validate a raw request path. Performs no I/O.
    pub fn parse(path: &str) -> tessera_core::Result<Self> {
        let decoded = percent_decode_str(path)
            .decode_utf8()
            .map_err(|e| Error::Format(format!("path is not valid UTF-8: {e}")))?;

        let parts: Vec<&str> = decoded.split('/').filter(|p| !p.is_empty()).collect();
        let Some(&route_prefix) = parts.first() else {
            return Err(Error::Format("empty path".to_string()));
        };

        let (version, rest) = match parts.get(1) {
            Some(&slug) if is_version_slug(slug) => (Some(slug.to_string()), &parts[2..]),
            _ => (None, &parts[1..]),
        };

        let [customer_segment, space, asset @ ..] = rest else {
            return Err(Error::Format(format!(
                "path '{path}' does not contain customer, space and asset segments"
            )));
        };
        if asset.is_empty() {
            return Err(Error::Format(format!("path '{path}' has no asset segment")));
        }

        let space = space
            .parse::<u32>()
            .map_err(|_| Error::Format(format!("space '{space}' is not a number")))?;

        let asset_path = strip_query(&asset.join("/")).trim_end_matches('/').to_string();
        if asset_path.is_empty() {
            return Err(Error::Format(format!("path '{path}' has no asset segment")));
        }

        Ok(Self {
            route_prefix: route_prefix.to_string(),
            version,
            customer_segment: customer_segment.to_string(),
            space,
            asset_path,
        })
    }

    fn base_path(&self, customer: &str) -> String {
        match &self.version {
            Some(version) => format!(
                "/{}/{}/{}/{}/",
                self.route_prefix, version, customer, self.space
            ),
            None => format!("/{}/{}/{}/", self.route_prefix, customer, self.space),
        }
    }

    /// Attach a resolved customer.
    pub fn resolve(self, customer: Customer) -> DeliveryRequest {
        let (asset_name, suffix) = match self.asset_path.split_once('/') {
            Some((name, suffix)) => (name.to_string(), suffix.to_string()),
            None => (self.asset_path.clone(), String::new()),
        };
        let base_path = self.base_path(&self.customer_segment);
        let normalised_base_path = self.base_path(&customer.id.to_string());
        let normalised_full_path = format!("{normalised_base_path}{}", self.asset_path);

        DeliveryRequest {
            route_prefix: self.route_prefix,
            version: self.version,
            customer_segment: self.customer_segment,
            customer,
            space: self.space,
            asset_path: self.asset_path,
            asset_name,
            suffix,
            base_path,
            normalised_base_path,
            normalised_full_path,
        }
    }
}

fn is_version_slug(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() == 2 && bytes[0] == b'v' && bytes[1].is_ascii_digit()
}

fn strip_query(path: &str) -> &str {
    path.find(['?', '#']).map_or(path, |idx| &path[..idx])
}

/// Parses request paths and resolves their customer segment.
#[derive(Clone)]
pub struct PathParser {
    catalog: Arc<dyn AssetStore>,
}

impl PathParser {
    pub fn new(catalog: Arc<dyn AssetStore>) -> Self {
        Self { catalog }
    }

    /// Parse `path` into a [`DeliveryRequest`].
    ///
    /// Fails with a format error for malformed paths and a not-found error
    /// when the customer segment does not resolve.
    pub async fn parse(&self, path: &str) -> ApiResult<DeliveryRequest> {
        let shape = PathShape::parse(path)?;
        let customer = self.catalog.resolve_customer(&shape.customer_segment).await?;
        Ok(shape.resolve(customer))
    }
}

/// Typed view of an IIIF Image API request suffix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageRequest {
    Info,
    Image {
        region: String,
        size: String,
        rotation: String,
        quality: String,
        format: String,
    },
}

impl ImageRequest {
    pub fn parse(suffix: &str) -> tessera_core::Result<Self> {
        if suffix == "info.json" {
            return Ok(Self::Info);
        }

        let segments: Vec<&str> = suffix.split('/').collect();
        if let [region, size, rotation, file] = segments.as_slice()
            && let Some((quality, format)) = file.rsplit_once('.')
            && [*region, *size, *rotation, quality, format]
                .iter()
                .all(|s| !s.is_empty())
        {
            return Ok(Self::Image {
                region: region.to_string(),
                size: size.to_string(),
                rotation: rotation.to_string(),
                quality: quality.to_string(),
                format: format.to_string(),
            });
        }

        Err(Error::Format(format!(
            "'{suffix}' is not an IIIF image request"
        )))
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Info => "application/json",
            Self::Image { format, .. } => match format.as_str() {
                "jpg" | "jpeg" => "image/jpeg",
                "png" => "image/png",
                "gif" => "image/gif",
                "webp" => "image/webp",
                "tif" | "tiff" => "image/tiff",
                _ => "application/octet-stream",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use tessera_catalog::MemoryStore;

    async fn parser() -> PathParser {
        let store = MemoryStore::new();
        store
            .insert_customer(Customer {
                id: 99,
                name: "acme".to_string(),
            })
            .await;
        PathParser::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_thumbs_path_with_numeric_customer() {
        let request = parser().await.parse("/thumbs/99/1/bird").await.unwrap();
        assert_eq!(request.route_prefix, "thumbs");
        assert_eq!(request.customer.id, 99);
        assert_eq!(request.space, 1);
        assert_eq!(request.asset_path, "bird");
        assert_eq!(request.suffix, "");
        assert_eq!(request.asset_id().unwrap().to_string(), "99/1/bird");
    }

    #[tokio::test]
    async fn test_named_customer_is_normalised() {
        let request = parser()
            .await
            .parse("/iiif-img/acme/1/bird/full/max/0/default.jpg")
            .await
            .unwrap();
        assert_eq!(request.base_path, "/iiif-img/acme/1/");
        assert_eq!(request.normalised_base_path, "/iiif-img/99/1/");
        assert_eq!(
            request.normalised_full_path,
            "/iiif-img/99/1/bird/full/max/0/default.jpg"
        );
        assert_eq!(request.suffix, "full/max/0/default.jpg");
    }

    #[tokio::test]
    async fn test_unknown_customer_is_not_found() {
        let err = parser()
            .await
            .parse("/thumbs/unknown-tenant/1/bird")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Catalog(tessera_catalog::CatalogError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_malformed_paths_are_format_errors() {
        for path in [
            "/thumbs/full/x/y",
            "/iiif-img/full/!800,400/0/default.jpg",
            "/thumbs/99/1",
            "/thumbs/99/1/?foo=bar",
            "/",
        ] {
            match parser().await.parse(path).await {
                Err(ApiError::Core(Error::Format(_))) => {}
                other => panic!("expected format error for {path}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_version_slug() {
        let shape = PathShape::parse("/iiif-img/v2/99/1/bird/info.json").unwrap();
        assert_eq!(shape.version.as_deref(), Some("v2"));
        assert_eq!(shape.customer_segment, "99");

        let shape = PathShape::parse("/iiif-img/v3/99/1/bird").unwrap();
        assert_eq!(shape.version.as_deref(), Some("v3"));

        // Not a version slug, so it is the customer segment
        let shape = PathShape::parse("/iiif-img/v33/1/bird").unwrap();
        assert_eq!(shape.version, None);
        assert_eq!(shape.customer_segment, "v33");
        assert_eq!(
            shape.resolve(Customer {
                id: 5,
                name: "v33".to_string()
            })
            .normalised_base_path,
            "/iiif-img/5/1/"
        );
    }

    #[test]
    fn test_percent_decoding_and_query_stripping() {
        let shape = PathShape::parse("/thumbs/99/1/bird%5Eone/info.json").unwrap();
        assert_eq!(shape.asset_path, "bird^one/info.json");

        let shape = PathShape::parse("/thumbs/99/1/bird/info.json?x=1").unwrap();
        assert_eq!(shape.asset_path, "bird/info.json");

        let shape = PathShape::parse("/thumbs/99/1/bird#frag").unwrap();
        assert_eq!(shape.asset_path, "bird");
    }

    #[test]
    fn test_image_request_suffix() {
        assert_eq!(ImageRequest::parse("info.json").unwrap(), ImageRequest::Info);

        let request = ImageRequest::parse("full/!200,200/0/default.jpg").unwrap();
        assert_eq!(request.content_type(), "image/jpeg");
        match request {
            ImageRequest::Image { size, quality, .. } => {
                assert_eq!(size, "!200,200");
                assert_eq!(quality, "default");
            }
            other => panic!("unexpected {other:?}"),
        }

        for bad in ["", "full/max/0", "full/max/0/default", "a/b/c/d/e.jpg"] {
            assert!(ImageRequest::parse(bad).is_err(), "{bad} should not parse");
        }
    }
}
