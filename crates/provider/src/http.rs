//! REST adapter for an HTTP generation service.
//!
//! Sends one multipart `POST {base}/v1/generations` per job and downloads
//! the artifact URLs listed in the JSON response.
//!
//! Response shape:
//!
//! ```text
//! { "artifacts": [ { "url": "https://...", "content_type": "image/png" } ] }
//! ```

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::adapter::{Artifact, GenerationProvider, ProgressSink, ProviderRequest, ResolvedImage};
use crate::error::ProviderError;

/// Progress reported once the provider has accepted and rendered the job;
/// the remainder is spread over artifact downloads.
const RENDERED_PERCENT: i16 = 60;

/// HTTP client for a single generation service.
pub struct HttpProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    artifacts: Vec<ArtifactRef>,
}

#[derive(Debug, Deserialize)]
struct ArtifactRef {
    url: String,
    content_type: Option<String>,
}

impl HttpProvider {
    /// * `base_url` - e.g. `https://gen.example.com`.
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, api_key)
    }

    /// Reuse an existing [`reqwest::Client`] (connection pooling across
    /// providers).
    pub fn with_client(client: reqwest::Client, base_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn build_form(request: &ProviderRequest) -> Result<Form, ProviderError> {
        let output_spec = serde_json::to_string(&request.output_spec)
            .map_err(|e| ProviderError::InvalidRequest(e.to_string()))?;

        let mut form = Form::new()
            .text("kind", request.kind.as_str())
            .text("model", request.model.clone())
            .text("prompt", request.prompt.clone())
            .text("variations", request.variations.to_string())
            .text("output_spec", output_spec);

        for (i, image) in request.input_images.iter().enumerate() {
            form = form.part("input_image", Self::image_part(image, &format!("input-{i}"))?);
        }
        if let Some(mask) = &request.mask {
            form = form.part("mask", Self::image_part(mask, "mask")?);
        }
        Ok(form)
    }

    fn image_part(image: &ResolvedImage, name: &str) -> Result<Part, ProviderError> {
        Part::bytes(image.bytes.clone())
            .file_name(name.to_string())
            .mime_str(&image.content_type)
            .map_err(|e| ProviderError::InvalidRequest(format!("bad content type: {e}")))
    }

    /// Turn a non-2xx response into a typed error.
    async fn error_from_response(response: reqwest::Response) -> ProviderError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        classify_status(status, body, retry_after)
    }

    async fn download(&self, artifact: &ArtifactRef) -> Result<Artifact, ProviderError> {
        let response = self.client.get(&artifact.url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::Unavailable(format!(
                "artifact download returned {}",
                response.status()
            )));
        }

        let header_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;

        Ok(Artifact {
            bytes: bytes.to_vec(),
            content_type: artifact
                .content_type
                .clone()
                .or(header_type)
                .unwrap_or_else(|| "application/octet-stream".to_string()),
        })
    }
}

/// Map an HTTP status to the provider error taxonomy.
///
/// - 429 -> rate limited
/// - other 4xx except auth failures -> invalid request
/// - 401/403 and 5xx -> unavailable (nothing the caller can fix per job)
pub fn classify_status(status: StatusCode, body: String, retry_after: Option<u64>) -> ProviderError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
            message: body,
            retry_after_secs: retry_after,
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::Unavailable(format!("provider rejected credentials ({status}): {body}"))
        }
        s if s.is_client_error() => ProviderError::InvalidRequest(format!("({status}) {body}")),
        _ => ProviderError::Unavailable(format!("({status}) {body}")),
    }
}

#[async_trait]
impl GenerationProvider for HttpProvider {
    async fn generate(
        &self,
        request: &ProviderRequest,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<Artifact>, ProviderError> {
        let mut call = self
            .client
            .post(format!("{}/v1/generations", self.base_url))
            .multipart(Self::build_form(request)?);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }

        progress.report(0).await;
        let response = call.send().await?;
        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let body: GenerationResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("malformed response: {e}")))?;
        if body.artifacts.is_empty() {
            return Err(ProviderError::Unavailable(
                "provider returned no artifacts".into(),
            ));
        }
        progress.report(RENDERED_PERCENT).await;

        let total = body.artifacts.len() as i16;
        let mut artifacts = Vec::with_capacity(body.artifacts.len());
        for (i, artifact_ref) in body.artifacts.iter().enumerate() {
            artifacts.push(self.download(artifact_ref).await?);
            let done = i as i16 + 1;
            progress
                .report(RENDERED_PERCENT + (100 - RENDERED_PERCENT) * done / total)
                .await;
        }

        tracing::debug!(
            base_url = %self.base_url,
            model = %request.model,
            artifacts = artifacts.len(),
            "Provider generation finished",
        );
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use atelier_core::job::{MediaKind, OutputSpec};

    use super::*;
    use crate::adapter::NoopProgress;

    #[test]
    fn rate_limit_keeps_retry_after() {
        let err = classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down".into(), Some(12));
        assert_matches!(
            &err,
            ProviderError::RateLimited { retry_after_secs: Some(12), .. }
        );
        assert_eq!(err.code(), "rate_limited");
    }

    #[test]
    fn client_errors_are_invalid_requests() {
        let err = classify_status(StatusCode::UNPROCESSABLE_ENTITY, "bad prompt".into(), None);
        assert_eq!(err.code(), "invalid_request");
    }

    #[test]
    fn auth_and_server_errors_are_unavailable() {
        for status in [
            StatusCode::UNAUTHORIZED,
            StatusCode::FORBIDDEN,
            StatusCode::BAD_GATEWAY,
            StatusCode::INTERNAL_SERVER_ERROR,
        ] {
            let err = classify_status(status, String::new(), None);
            assert_eq!(err.code(), "provider_unavailable");
        }
    }

    #[test]
    fn form_rejects_bad_image_mime() {
        let request = ProviderRequest {
            kind: MediaKind::Image,
            model: "m".into(),
            prompt: "p".into(),
            input_images: vec![ResolvedImage {
                bytes: vec![1],
                content_type: "not a mime".into(),
            }],
            mask: None,
            output_spec: OutputSpec::default(),
            variations: 1,
        };
        assert_matches!(
            HttpProvider::build_form(&request),
            Err(ProviderError::InvalidRequest(_))
        );
    }

    #[tokio::test]
    async fn unreachable_service_is_unavailable() {
        // Port 9 (discard) on localhost is not expected to serve HTTP.
        let provider = HttpProvider::new("http://127.0.0.1:9".into(), None);
        let request = ProviderRequest {
            kind: MediaKind::Image,
            model: "m".into(),
            prompt: "p".into(),
            input_images: vec![],
            mask: None,
            output_spec: OutputSpec::default(),
            variations: 1,
        };
        let err = provider.generate(&request, &NoopProgress).await.unwrap_err();
        assert_eq!(err.code(), "provider_unavailable");
    }
}
