use async_trait::async_trait;
use atelier_core::job::{MediaKind, OutputSpec};

use crate::error::ProviderError;

/// Reference image (or mask) already resolved to bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Everything a provider needs for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub kind: MediaKind,
    pub model: String,
    pub prompt: String,
    pub input_images: Vec<ResolvedImage>,
    pub mask: Option<ResolvedImage>,
    pub output_spec: OutputSpec,
    pub variations: u32,
}

/// One generated artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Receives incremental progress (0-100) while a provider call runs.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, percent: i16);
}

/// Sink that drops every report.
pub struct NoopProgress;

#[async_trait]
impl ProgressSink for NoopProgress {
    async fn report(&self, _percent: i16) {}
}

/// An external generation backend.
///
/// Implementations must return at least one artifact on success; the
/// executor treats an empty success as a provider failure.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(
        &self,
        request: &ProviderRequest,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<Artifact>, ProviderError>;
}
