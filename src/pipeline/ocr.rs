//! OCR capability: request/response contract and the HTTP client.
//!
//! [`OcrClient`] is the seam between the batch runner and the remote
//! service. [`MistralOcrClient`] speaks the Mistral `/v1/ocr` JSON API; tests
//! substitute a scripted implementation.
//!
//! Every failure is mapped to an [`AttemptError`] so the runner can record it
//! and retry without caring where it came from.

use crate::error::{AttemptError, BatchError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default service root.
pub const DEFAULT_BASE_URL: &str = "https://api.mistral.ai";

/// Environment variable holding the API key.
pub const API_KEY_VAR: &str = "MISTRAL_API_KEY";

/// Placeholder value shipped in sample `.env` files; treated as unset.
const PLACEHOLDER_KEY: &str = "your_mistral_api_key_here";

/// Longest service error body kept in an error message.
const MAX_ERROR_DETAIL: usize = 200;

// ── Wire types ───────────────────────────────────────────────────────────

/// Inline document reference, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocumentRef {
    DocumentUrl { document_url: String },
    ImageUrl { image_url: String },
}

/// Body of one OCR call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrRequest {
    pub model: String,
    pub document: DocumentRef,
    pub include_image_base64: bool,
}

/// One page of OCR output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrPage {
    /// Zero-based page index.
    pub index: usize,
    /// Extracted text as Markdown.
    pub markdown: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageInfo {
    #[serde(default)]
    pub pages_processed: u32,
    #[serde(default)]
    pub doc_size_bytes: Option<u64>,
}

/// Result of one OCR call. Unknown fields (images, dimensions) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrResponse {
    pub pages: Vec<OcrPage>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub usage_info: Option<UsageInfo>,
}

// ── Capability trait ─────────────────────────────────────────────────────

/// A remote OCR capability.
#[async_trait]
pub trait OcrClient: Send + Sync {
    /// Submit one document and return its pages.
    async fn process(&self, request: &OcrRequest) -> Result<OcrResponse, AttemptError>;
}

// ── HTTP implementation ──────────────────────────────────────────────────

/// Client for the Mistral OCR endpoint.
#[derive(Clone)]
pub struct MistralOcrClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl std::fmt::Debug for MistralOcrClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MistralOcrClient")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl MistralOcrClient {
    pub fn builder() -> MistralOcrClientBuilder {
        MistralOcrClientBuilder::default()
    }

    /// Build a client from `MISTRAL_API_KEY` with default settings.
    pub fn from_env() -> Result<Self, BatchError> {
        Self::builder()
            .api_key(std::env::var(API_KEY_VAR).ok())
            .build()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl OcrClient for MistralOcrClient {
    async fn process(&self, request: &OcrRequest) -> Result<OcrResponse, AttemptError> {
        debug!("POST {} model={}", self.endpoint, request.model);

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &body, retry_after));
        }

        let bytes = response.bytes().await.map_err(transport_error)?;
        parse_response(&bytes)
    }
}

/// Builder for [`MistralOcrClient`].
#[derive(Debug, Default)]
pub struct MistralOcrClientBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

impl MistralOcrClientBuilder {
    pub fn api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Per-request timeout. `None` keeps the HTTP client's default.
    pub fn timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn build(self) -> Result<MistralOcrClient, BatchError> {
        let api_key = self
            .api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty() && k != PLACEHOLDER_KEY)
            .ok_or_else(|| BatchError::MissingCredential {
                var: API_KEY_VAR.to_string(),
            })?;

        let mut http = reqwest::Client::builder();
        if let Some(secs) = self.timeout_secs {
            http = http.timeout(Duration::from_secs(secs));
        }
        let http = http
            .build()
            .map_err(|e| BatchError::ClientInit(e.to_string()))?;

        let base = self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        Ok(MistralOcrClient {
            http,
            endpoint: format!("{}/v1/ocr", base.trim_end_matches('/')),
            api_key,
        })
    }
}

// ── Response handling ────────────────────────────────────────────────────

/// Decode a successful response body.
pub fn parse_response(body: &[u8]) -> Result<OcrResponse, AttemptError> {
    serde_json::from_slice(body).map_err(|e| AttemptError::MalformedResponse(e.to_string()))
}

/// Map a non-success HTTP status and body to an attempt error.
pub fn classify_status(status: u16, body: &str, retry_after_secs: Option<u64>) -> AttemptError {
    match status {
        401 | 403 => AttemptError::Unauthorized {
            status,
            detail: error_detail(body),
        },
        429 => AttemptError::RateLimited { retry_after_secs },
        _ => AttemptError::Api {
            status,
            message: error_detail(body),
        },
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn transport_error(e: reqwest::Error) -> AttemptError {
    if e.is_timeout() {
        AttemptError::Transport(format!("request timed out: {e}"))
    } else {
        AttemptError::Transport(e.to_string())
    }
}

/// Pull `message`/`detail` out of a JSON error body, else use the raw text,
/// flattened to one line and truncated.
fn error_detail(body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["message", "detail"]
                .iter()
                .find_map(|k| v.get(*k).cloned())
        })
        .map(|v| match v {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });

    let text = from_json.unwrap_or_else(|| body.to_string());
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.is_empty() {
        return "<empty body>".to_string();
    }
    if flat.chars().count() > MAX_ERROR_DETAIL {
        let cut: String = flat.chars().take(MAX_ERROR_DETAIL - 1).collect();
        format!("{cut}\u{2026}")
    } else {
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serialises_to_ocr_api_shape() {
        let req = OcrRequest {
            model: "mistral-ocr-latest".into(),
            document: DocumentRef::DocumentUrl {
                document_url: "data:application/pdf;base64,JVBERg==".into(),
            },
            include_image_base64: false,
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "model": "mistral-ocr-latest",
                "document": {
                    "type": "document_url",
                    "document_url": "data:application/pdf;base64,JVBERg=="
                },
                "include_image_base64": false
            })
        );
    }

    #[test]
    fn image_reference_uses_image_url_tag() {
        let doc = DocumentRef::ImageUrl {
            image_url: "data:image/png;base64,AA==".into(),
        };
        let v = serde_json::to_value(&doc).unwrap();
        assert_eq!(v["type"], "image_url");
        assert_eq!(v["image_url"], "data:image/png;base64,AA==");
    }

    #[test]
    fn parses_response_and_ignores_extra_fields() {
        let body = json!({
            "pages": [
                {"index": 0, "markdown": "# Title", "images": [], "dimensions": {"dpi": 200}},
                {"index": 1, "markdown": "body"}
            ],
            "model": "mistral-ocr-2505",
            "usage_info": {"pages_processed": 2, "doc_size_bytes": 1024}
        });
        let resp = parse_response(body.to_string().as_bytes()).unwrap();
        assert_eq!(resp.pages.len(), 2);
        assert_eq!(resp.pages[1].index, 1);
        assert_eq!(resp.pages[0].markdown, "# Title");
        assert_eq!(resp.usage_info.unwrap().pages_processed, 2);
    }

    #[test]
    fn missing_pages_is_malformed() {
        let err = parse_response(br#"{"model": "x"}"#).unwrap_err();
        assert!(matches!(err, AttemptError::MalformedResponse(_)));
    }

    #[test]
    fn non_json_is_malformed() {
        let err = parse_response(b"<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, AttemptError::MalformedResponse(_)));
    }

    #[test]
    fn classifies_auth_failures() {
        let err = classify_status(401, r#"{"message": "Unauthorized"}"#, None);
        assert_eq!(
            err,
            AttemptError::Unauthorized {
                status: 401,
                detail: "Unauthorized".into()
            }
        );
        assert!(matches!(
            classify_status(403, "", None),
            AttemptError::Unauthorized { status: 403, .. }
        ));
    }

    #[test]
    fn classifies_rate_limit_with_retry_after() {
        assert_eq!(
            classify_status(429, "slow down", Some(12)),
            AttemptError::RateLimited {
                retry_after_secs: Some(12)
            }
        );
    }

    #[test]
    fn classifies_other_statuses_as_api_errors() {
        let err = classify_status(422, r#"{"detail": [{"msg": "bad document"}]}"#, None);
        match err {
            AttemptError::Api { status, message } => {
                assert_eq!(status, 422);
                assert!(message.contains("bad document"), "got: {message}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn error_detail_is_single_line_and_bounded() {
        let body = "line one\nline two\r\n".repeat(50);
        let detail = error_detail(&body);
        assert!(!detail.contains('\n'));
        assert_eq!(detail.chars().count(), MAX_ERROR_DETAIL);
        assert!(detail.ends_with('\u{2026}'));
        assert_eq!(error_detail("   "), "<empty body>");
    }

    #[test]
    fn retry_after_header_is_parsed() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(7));
        assert_eq!(parse_retry_after(&HeaderMap::new()), None);
    }

    #[test]
    fn builder_requires_api_key() {
        for key in [None, Some(String::new()), Some(PLACEHOLDER_KEY.to_string())] {
            let err = MistralOcrClient::builder().api_key(key).build().unwrap_err();
            assert!(matches!(err, BatchError::MissingCredential { .. }));
        }
    }

    #[test]
    fn builder_normalises_endpoint() {
        let client = MistralOcrClient::builder()
            .api_key(Some("k".into()))
            .base_url("http://localhost:8080/")
            .timeout_secs(Some(30))
            .build()
            .unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8080/v1/ocr");
        assert!(!format!("{client:?}").contains("\"k\""));
    }
}
