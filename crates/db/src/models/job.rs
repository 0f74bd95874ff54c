//! Row model for the `jobs` table.

use atelier_core::error::CoreError;
use atelier_core::job::{InputImage, Job, JobState, JobStatus, MediaKind, OutputSpec};
use atelier_core::types::{DbId, Timestamp};
use sqlx::types::Json;
use sqlx::FromRow;

/// A row from the `jobs` table, in its flat column layout.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: DbId,
    pub owner_scope: DbId,
    pub kind: String,
    pub provider: String,
    pub model: String,
    pub prompt_original: String,
    pub prompt_alternatives: Vec<String>,
    pub input_images: Json<Vec<InputImage>>,
    pub mask: Option<Json<InputImage>>,
    pub output_spec: Json<OutputSpec>,
    pub variations: i32,
    pub status: String,
    pub progress: Option<i16>,
    pub result: Option<Vec<DbId>>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl TryFrom<JobRow> for Job {
    type Error = CoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = JobStatus::from_name(&row.status)?;
        let state = JobState::from_columns(
            status,
            row.progress,
            row.result,
            row.error_code,
            row.error_message,
        )?;

        Ok(Job {
            id: row.id,
            owner_scope: row.owner_scope,
            kind: MediaKind::from_name(&row.kind)?,
            provider: row.provider,
            model: row.model,
            prompt_original: row.prompt_original,
            prompt_alternatives: row.prompt_alternatives,
            input_images: row.input_images.0,
            mask: row.mask.map(|m| m.0),
            output_spec: row.output_spec.0,
            variations: row.variations,
            state,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;

    use super::*;

    fn row(status: &str) -> JobRow {
        JobRow {
            id: 5,
            owner_scope: 1,
            kind: "image".into(),
            provider: "stub".into(),
            model: "m1".into(),
            prompt_original: "a cat".into(),
            prompt_alternatives: vec![],
            input_images: Json(vec![InputImage::Asset { asset_id: 2 }]),
            mask: None,
            output_spec: Json(OutputSpec::default()),
            variations: 2,
            status: status.into(),
            progress: None,
            result: None,
            error_code: None,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn done_row_converts_with_result() {
        let mut r = row("done");
        r.result = Some(vec![10, 11]);
        let job = Job::try_from(r).unwrap();
        assert_eq!(job.state, JobState::Done { result: vec![10, 11] });
        assert_eq!(job.input_images.len(), 1);
    }

    #[test]
    fn failed_row_carries_error() {
        let mut r = row("failed");
        r.error_code = Some("rate_limited".into());
        r.error_message = Some("429".into());
        let job = Job::try_from(r).unwrap();
        assert_eq!(job.state.error().unwrap().code, "rate_limited");
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert_matches!(Job::try_from(row("pending")), Err(CoreError::Validation(_)));
    }
}
