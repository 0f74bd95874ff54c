//! Submission and listing request payloads.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::job::{InputImage, JobStatus, MediaKind, OutputSpec};
use crate::types::DbId;

/// Upper bound on variations per job.
pub const MAX_VARIATIONS: i32 = 8;

/// Upper bound on reference images per job (the mask is counted separately).
pub const MAX_INPUT_IMAGES: usize = 4;

/// Maximum page size for listings.
pub const MAX_LIMIT: i64 = 100;

/// Default page size for listings.
pub const DEFAULT_LIMIT: i64 = 50;

fn default_variations() -> i32 {
    1
}

/// Body of `POST /api/v1/jobs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SubmitJobRequest {
    pub kind: MediaKind,
    #[validate(length(min = 1, max = 64))]
    pub provider: String,
    #[validate(length(min = 1, max = 128))]
    pub model: String,
    #[validate(length(min = 1, max = 4000))]
    pub prompt: String,
    #[serde(default)]
    pub prompt_alternatives: Vec<String>,
    #[serde(default)]
    pub input_images: Vec<InputImage>,
    #[serde(default)]
    pub mask: Option<InputImage>,
    #[serde(default)]
    pub output_spec: OutputSpec,
    #[serde(default = "default_variations")]
    #[validate(range(min = 1, max = 8))]
    pub variations: i32,
}

/// A validated job ready to be inserted in `queued` state.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub owner_scope: DbId,
    pub kind: MediaKind,
    pub provider: String,
    pub model: String,
    pub prompt_original: String,
    pub prompt_alternatives: Vec<String>,
    pub input_images: Vec<InputImage>,
    pub mask: Option<InputImage>,
    pub output_spec: OutputSpec,
    pub variations: i32,
}

impl SubmitJobRequest {
    /// Validate the request and turn it into an insertable [`NewJob`].
    ///
    /// Scope resolution and provider registration are checked by the
    /// submission service, which owns the lookups.
    pub fn into_new_job(self, owner_scope: DbId) -> Result<NewJob, CoreError> {
        self.validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;

        let prompt = self.prompt.trim();
        if prompt.is_empty() {
            return Err(CoreError::Validation("Prompt must not be blank".into()));
        }
        if self.provider.trim().is_empty() || self.model.trim().is_empty() {
            return Err(CoreError::Validation(
                "Provider and model must not be blank".into(),
            ));
        }
        if self.input_images.len() > MAX_INPUT_IMAGES {
            return Err(CoreError::Validation(format!(
                "At most {MAX_INPUT_IMAGES} input images are allowed"
            )));
        }
        if self.mask.is_some() && self.input_images.is_empty() {
            return Err(CoreError::Validation(
                "A mask requires at least one input image".into(),
            ));
        }
        validate_output_spec(&self.output_spec)?;
        for image in self.input_images.iter().chain(self.mask.iter()) {
            validate_input_image(image)?;
        }

        let prompt_alternatives = self
            .prompt_alternatives
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();

        Ok(NewJob {
            owner_scope,
            kind: self.kind,
            provider: self.provider.trim().to_string(),
            model: self.model.trim().to_string(),
            prompt_original: prompt.to_string(),
            prompt_alternatives,
            input_images: self.input_images,
            mask: self.mask,
            output_spec: self.output_spec,
            variations: self.variations,
        })
    }
}

fn validate_output_spec(spec: &OutputSpec) -> Result<(), CoreError> {
    if spec.width == Some(0) || spec.height == Some(0) {
        return Err(CoreError::Validation(
            "Output dimensions must be positive".into(),
        ));
    }
    if let Some(ratio) = &spec.aspect_ratio {
        let valid = ratio
            .split_once(':')
            .and_then(|(w, h)| Some((w.parse::<u32>().ok()?, h.parse::<u32>().ok()?)))
            .is_some_and(|(w, h)| w > 0 && h > 0);
        if !valid {
            return Err(CoreError::Validation(format!(
                "Invalid aspect ratio '{ratio}'. Expected W:H, e.g. 16:9"
            )));
        }
    }
    Ok(())
}

fn validate_input_image(image: &InputImage) -> Result<(), CoreError> {
    match image {
        InputImage::Url { url } if !(url.starts_with("http://") || url.starts_with("https://")) => {
            Err(CoreError::Validation(format!(
                "Input image URL must be http(s): '{url}'"
            )))
        }
        InputImage::Asset { asset_id } if *asset_id <= 0 => Err(CoreError::Validation(
            format!("Invalid input asset id {asset_id}"),
        )),
        _ => Ok(()),
    }
}

/// Query parameters for `GET /api/v1/jobs`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobListQuery {
    pub status: Option<JobStatus>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

impl JobListQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn request() -> SubmitJobRequest {
        SubmitJobRequest {
            kind: MediaKind::Image,
            provider: "stub".into(),
            model: "m1".into(),
            prompt: "  a lighthouse at dusk  ".into(),
            prompt_alternatives: vec!["".into(), " a lighthouse at dawn ".into()],
            input_images: vec![],
            mask: None,
            output_spec: OutputSpec::default(),
            variations: 3,
        }
    }

    #[test]
    fn valid_request_is_normalized() {
        let job = request().into_new_job(9).unwrap();
        assert_eq!(job.owner_scope, 9);
        assert_eq!(job.prompt_original, "a lighthouse at dusk");
        assert_eq!(job.prompt_alternatives, vec!["a lighthouse at dawn".to_string()]);
        assert_eq!(job.variations, 3);
    }

    #[test]
    fn blank_prompt_is_rejected() {
        let mut req = request();
        req.prompt = "   ".into();
        assert_matches!(req.into_new_job(1), Err(CoreError::Validation(_)));

        let mut req = request();
        req.prompt = String::new();
        assert_matches!(req.into_new_job(1), Err(CoreError::Validation(_)));
    }

    #[test]
    fn variations_must_be_in_range() {
        for bad in [0, -1, MAX_VARIATIONS + 1] {
            let mut req = request();
            req.variations = bad;
            assert_matches!(req.into_new_job(1), Err(CoreError::Validation(_)));
        }
        let mut req = request();
        req.variations = MAX_VARIATIONS;
        assert!(req.into_new_job(1).is_ok());
    }

    #[test]
    fn mask_without_input_image_is_rejected() {
        let mut req = request();
        req.mask = Some(InputImage::Asset { asset_id: 4 });
        assert_matches!(req.into_new_job(1), Err(CoreError::Validation(_)));

        let mut req = request();
        req.input_images = vec![InputImage::Asset { asset_id: 3 }];
        req.mask = Some(InputImage::Asset { asset_id: 4 });
        assert!(req.into_new_job(1).is_ok());
    }

    #[test]
    fn non_http_input_url_is_rejected() {
        let mut req = request();
        req.input_images = vec![InputImage::Url {
            url: "file:///etc/passwd".into(),
        }];
        assert_matches!(req.into_new_job(1), Err(CoreError::Validation(_)));
    }

    #[test]
    fn output_spec_checks() {
        let mut req = request();
        req.output_spec.width = Some(0);
        assert!(req.into_new_job(1).is_err());

        let mut req = request();
        req.output_spec.aspect_ratio = Some("wide".into());
        assert!(req.into_new_job(1).is_err());

        let mut req = request();
        req.output_spec.aspect_ratio = Some("16:9".into());
        assert!(req.into_new_job(1).is_ok());
    }

    #[test]
    fn variations_default_to_one() {
        let req: SubmitJobRequest = serde_json::from_value(serde_json::json!({
            "kind": "video",
            "provider": "stub",
            "model": "m1",
            "prompt": "waves"
        }))
        .unwrap();
        assert_eq!(req.variations, 1);
        assert_eq!(req.kind, MediaKind::Video);
    }

    #[test]
    fn list_query_clamps() {
        let q = JobListQuery {
            status: None,
            limit: Some(10_000),
            offset: Some(-3),
        };
        assert_eq!(q.limit(), MAX_LIMIT);
        assert_eq!(q.offset(), 0);
        assert_eq!(JobListQuery::default().limit(), DEFAULT_LIMIT);
    }
}
