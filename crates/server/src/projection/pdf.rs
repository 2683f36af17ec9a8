//! PDF projections rendered by an external service.
//!
//! The renderer receives a playbook describing every page, reads thumbnails
//! straight from blob storage and writes the finished PDF to the output
//! location itself.

use super::ProjectionCreator;
use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tessera_core::{Asset, ParsedNamedQuery, ProjectionKind};
use tessera_storage::ObjectInBucket;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

const DEFAULT_REDACTED_MESSAGE: &str = "Redacted";
const MISSING_MESSAGE: &str = "Missing";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Playbook {
    pub method: &'static str,
    pub output: String,
    pub title: String,
    pub custom_types: CustomTypes,
    pub pages: Vec<Page>,
}

#[derive(Debug, Serialize)]
pub struct CustomTypes {
    pub redacted: CustomMessage,
    pub missing: CustomMessage,
}

#[derive(Debug, Serialize)]
pub struct CustomMessage {
    pub message: String,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Page {
    Pdf { method: &'static str, input: String },
    Jpg { method: &'static str, input: String },
    Redacted,
}

#[derive(Debug, Deserialize)]
struct RenderResponse {
    success: bool,
    #[serde(default)]
    size: u64,
}

/// Builds PDFs by delegating to the renderer at `renderer_url`.
pub struct PdfCreator {
    client: reqwest::Client,
    renderer_url: Option<String>,
    thumbs_bucket: String,
}

impl PdfCreator {
    pub fn new(renderer_url: Option<String>, thumbs_bucket: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            renderer_url: renderer_url.map(|u| u.trim_end_matches('/').to_string()),
            thumbs_bucket: thumbs_bucket.into(),
        }
    }

    /// Describe the PDF for `assets`: an optional cover page, then one page
    /// per asset with restricted assets redacted.
    pub fn playbook(
        &self,
        query: &ParsedNamedQuery,
        assets: &[Asset],
        output: &ObjectInBucket,
    ) -> Playbook {
        let mut pages = Vec::with_capacity(assets.len() + 1);
        if let Some(cover) = &query.cover_page_url {
            pages.push(Page::Pdf {
                method: "download",
                input: cover.clone(),
            });
        }
        pages.extend(assets.iter().map(|asset| {
            if asset.requires_auth() {
                Page::Redacted
            } else {
                Page::Jpg {
                    method: "s3",
                    input: ObjectInBucket::new(&self.thumbs_bucket, asset.redistribution_key())
                        .s3_uri(),
                }
            }
        }));

        Playbook {
            method: "s3",
            output: output.s3_uri(),
            title: query.object_name.clone(),
            custom_types: CustomTypes {
                redacted: CustomMessage {
                    message: query
                        .redacted_message
                        .clone()
                        .unwrap_or_else(|| DEFAULT_REDACTED_MESSAGE.to_string()),
                },
                missing: CustomMessage {
                    message: MISSING_MESSAGE.to_string(),
                },
            },
            pages,
        }
    }
}

#[async_trait]
impl ProjectionCreator for PdfCreator {
    fn kind(&self) -> ProjectionKind {
        ProjectionKind::Pdf
    }

    #[instrument(skip_all, fields(output = %output))]
    async fn create(
        &self,
        query: &ParsedNamedQuery,
        assets: &[Asset],
        output: &ObjectInBucket,
        cancel: &CancellationToken,
    ) -> ApiResult<u64> {
        let Some(renderer_url) = &self.renderer_url else {
            return Err(ApiError::Build("no PDF renderer configured".to_string()));
        };

        let playbook = self.playbook(query, assets, output);
        let request = self
            .client
            .post(format!("{renderer_url}/pdf"))
            .json(&playbook)
            .send();

        let response = tokio::select! {
            response = request => response?,
            _ = cancel.cancelled() => return Err(ApiError::Cancelled),
        };
        if !response.status().is_success() {
            return Err(ApiError::Build(format!(
                "PDF renderer returned {}",
                response.status()
            )));
        }

        let rendered: RenderResponse = response.json().await?;
        if !rendered.success {
            return Err(ApiError::Build("PDF renderer reported failure".to_string()));
        }

        info!(pages = playbook.pages.len(), size = rendered.size, "Rendered PDF");
        Ok(rendered.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::AssetId;

    fn query() -> ParsedNamedQuery {
        tessera_core::parse_named_query(
            99,
            "book",
            "space=p1&objectname=Book {s1}&s1=p2&coverpage=https://example.org/cover.pdf",
            Some("1/vol"),
            ProjectionKind::Pdf,
        )
        .unwrap()
    }

    #[test]
    fn test_playbook_pages() {
        let creator = PdfCreator::new(Some("http://renderer/".to_string()), "thumbs");
        let open = Asset::new(AssetId::parse("99/1/a").unwrap(), 1, 1);
        let mut restricted = Asset::new(AssetId::parse("99/1/b").unwrap(), 1, 1);
        restricted.roles.push("clickthrough".to_string());
        let output = ObjectInBucket::new("output", "99/pdf/book/1/vol/Book vol");

        let playbook = creator.playbook(&query(), &[open, restricted], &output);
        assert_eq!(playbook.output, "s3://output/99/pdf/book/1/vol/Book vol");
        assert_eq!(playbook.title, "Book vol");
        assert_eq!(
            playbook.pages,
            vec![
                Page::Pdf {
                    method: "download",
                    input: "https://example.org/cover.pdf".to_string()
                },
                Page::Jpg {
                    method: "s3",
                    input: "s3://thumbs/99/1/a/low.jpg".to_string()
                },
                Page::Redacted,
            ]
        );

        let json = serde_json::to_value(&playbook).unwrap();
        assert_eq!(json["customTypes"]["redacted"]["message"], "Redacted");
        assert_eq!(json["pages"][0]["type"], "pdf");
        assert_eq!(json["pages"][2], serde_json::json!({"type": "redacted"}));
    }

    #[tokio::test]
    async fn test_unconfigured_renderer_is_build_error() {
        let creator = PdfCreator::new(None, "thumbs");
        let err = creator
            .create(
                &query(),
                &[],
                &ObjectInBucket::new("output", "x"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Build(_)));
    }
}
