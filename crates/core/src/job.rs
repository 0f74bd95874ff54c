//! Generation job model and its status state machine.
//!
//! A job moves `queued -> processing -> {done | failed | canceled}`, or
//! straight from `queued` to `canceled`. The per-status payload lives in
//! [`JobState`] so a job can only carry `progress` while processing,
//! `result` when done, and `error` when failed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Flat status discriminant, as stored in the `jobs.status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Done,
    Failed,
    Canceled,
}

/// Statuses from which no further transition occurs.
pub const TERMINAL_STATUSES: [JobStatus; 3] =
    [JobStatus::Done, JobStatus::Failed, JobStatus::Canceled];

impl JobStatus {
    /// Database name value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    /// Parse from the database `status` column.
    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name {
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            other => Err(CoreError::Validation(format!("Unknown job status '{other}'"))),
        }
    }

    pub fn is_terminal(self) -> bool {
        TERMINAL_STATUSES.contains(&self)
    }

    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Processing)
                | (Self::Queued, Self::Canceled)
                | (Self::Processing, Self::Done)
                | (Self::Processing, Self::Failed)
                | (Self::Processing, Self::Canceled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Media kind
// ---------------------------------------------------------------------------

/// What a job generates, and what an asset holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            other => Err(CoreError::Validation(format!("Unknown media kind '{other}'"))),
        }
    }

    /// Content type assumed when the provider does not report one.
    pub fn default_content_type(self) -> &'static str {
        match self {
            Self::Image => "image/png",
            Self::Video => "video/mp4",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Request payload pieces
// ---------------------------------------------------------------------------

/// Target output shape. Every field is optional; providers fall back to
/// their own defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// Reference to an input image (or mask) for image-to-image requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum InputImage {
    /// Fetched over HTTP by the executor.
    Url { url: String },
    /// A previously generated or curated asset, read from the artifact store.
    Asset { asset_id: DbId },
}

/// Error recorded on a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobErrorInfo {
    pub code: String,
    pub message: String,
}

impl JobErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Status together with the fields that are meaningful for it.
///
/// Serializes as `{"status": "done", "result": [..]}` and so on, which is
/// also the shape of the status-query response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Processing {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress: Option<i16>,
    },
    Done {
        result: Vec<DbId>,
    },
    Failed {
        error: JobErrorInfo,
    },
    Canceled,
}

impl JobState {
    pub fn status(&self) -> JobStatus {
        match self {
            Self::Queued => JobStatus::Queued,
            Self::Processing { .. } => JobStatus::Processing,
            Self::Done { .. } => JobStatus::Done,
            Self::Failed { .. } => JobStatus::Failed,
            Self::Canceled => JobStatus::Canceled,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn progress(&self) -> Option<i16> {
        match self {
            Self::Processing { progress } => *progress,
            _ => None,
        }
    }

    pub fn result(&self) -> Option<&[DbId]> {
        match self {
            Self::Done { result } => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&JobErrorInfo> {
        match self {
            Self::Failed { error } => Some(error),
            _ => None,
        }
    }

    /// Rebuild a state from the flat column layout used by the database.
    ///
    /// Rejects combinations the state machine cannot produce, e.g. a
    /// `done` row without result ids or a `queued` row with an error.
    pub fn from_columns(
        status: JobStatus,
        progress: Option<i16>,
        result: Option<Vec<DbId>>,
        error_code: Option<String>,
        error_message: Option<String>,
    ) -> Result<Self, CoreError> {
        let has_error = error_code.is_some() || error_message.is_some();
        let state = match status {
            JobStatus::Queued => Self::Queued,
            JobStatus::Processing => Self::Processing { progress },
            JobStatus::Done => match result {
                Some(ids) if !ids.is_empty() => Self::Done { result: ids },
                _ => {
                    return Err(CoreError::Internal(
                        "done job has no result asset ids".into(),
                    ))
                }
            },
            JobStatus::Failed => Self::Failed {
                error: JobErrorInfo {
                    code: error_code.unwrap_or_else(|| crate::error_codes::INTERNAL.into()),
                    message: error_message.unwrap_or_default(),
                },
            },
            JobStatus::Canceled => Self::Canceled,
        };

        if status != JobStatus::Failed && has_error {
            return Err(CoreError::Internal(format!(
                "{status} job carries an error payload"
            )));
        }
        Ok(state)
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A durable generation request and its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: DbId,
    pub owner_scope: DbId,
    pub kind: MediaKind,
    pub provider: String,
    pub model: String,
    pub prompt_original: String,
    #[serde(default)]
    pub prompt_alternatives: Vec<String>,
    #[serde(default)]
    pub input_images: Vec<InputImage>,
    #[serde(default)]
    pub mask: Option<InputImage>,
    #[serde(default)]
    pub output_spec: OutputSpec,
    pub variations: i32,
    #[serde(flatten)]
    pub state: JobState,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl Job {
    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    /// Check the timestamp invariants against the current state.
    ///
    /// `started_at` is present once the job left `queued` through a claim
    /// (a job canceled straight from `queued` never gets one);
    /// `completed_at` is present exactly in terminal states; timestamps
    /// never go backwards.
    pub fn check_invariants(&self) -> Result<(), CoreError> {
        let status = self.status();

        match (status, self.started_at) {
            (JobStatus::Queued, Some(_)) => {
                return Err(CoreError::Internal(format!(
                    "job {} is queued but has started_at",
                    self.id
                )))
            }
            (JobStatus::Processing | JobStatus::Done | JobStatus::Failed, None) => {
                return Err(CoreError::Internal(format!(
                    "job {} is {status} but has no started_at",
                    self.id
                )))
            }
            _ => {}
        }

        if status.is_terminal() != self.completed_at.is_some() {
            return Err(CoreError::Internal(format!(
                "job {} is {status} but completed_at presence disagrees",
                self.id
            )));
        }

        let ordered = [Some(self.created_at), self.started_at, self.completed_at]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();
        if ordered.windows(2).any(|w| w[0] > w[1]) {
            return Err(CoreError::Internal(format!(
                "job {} has decreasing timestamps",
                self.id
            )));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{Duration, Utc};

    use super::*;

    fn job_with(state: JobState) -> Job {
        let now = Utc::now();
        Job {
            id: 1,
            owner_scope: 7,
            kind: MediaKind::Image,
            provider: "stub".into(),
            model: "m1".into(),
            prompt_original: "a red bicycle".into(),
            prompt_alternatives: vec![],
            input_images: vec![],
            mask: None,
            output_spec: OutputSpec::default(),
            variations: 1,
            state,
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn status_names_round_trip() {
        for status in [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Done,
            JobStatus::Failed,
            JobStatus::Canceled,
        ] {
            assert_eq!(JobStatus::from_name(status.as_str()).unwrap(), status);
        }
        assert!(JobStatus::from_name("pending").is_err());
    }

    #[test]
    fn only_state_machine_edges_are_allowed() {
        use JobStatus::*;
        assert!(Queued.can_transition_to(Processing));
        assert!(Queued.can_transition_to(Canceled));
        assert!(Processing.can_transition_to(Done));
        assert!(Processing.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Canceled));

        assert!(!Queued.can_transition_to(Done));
        assert!(!Queued.can_transition_to(Failed));
        assert!(!Processing.can_transition_to(Queued));
        for terminal in TERMINAL_STATUSES {
            for next in [Queued, Processing, Done, Failed, Canceled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn state_serializes_with_status_tag() {
        let done = JobState::Done { result: vec![3, 4] };
        let json = serde_json::to_value(&done).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "done", "result": [3, 4] }));

        let processing = JobState::Processing { progress: None };
        let json = serde_json::to_value(&processing).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "processing" }));
    }

    #[test]
    fn job_flattens_state_into_status_fields() {
        let mut job = job_with(JobState::Failed {
            error: JobErrorInfo::new("rate_limited", "slow down"),
        });
        job.started_at = Some(job.created_at);
        job.completed_at = Some(job.created_at);

        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"]["code"], "rate_limited");
        assert!(json.get("result").is_none());

        let back: Job = serde_json::from_value(json).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn from_columns_rejects_done_without_result() {
        let err = JobState::from_columns(JobStatus::Done, None, Some(vec![]), None, None);
        assert_matches!(err, Err(CoreError::Internal(_)));
    }

    #[test]
    fn from_columns_rejects_error_outside_failed() {
        let err = JobState::from_columns(
            JobStatus::Queued,
            None,
            None,
            Some("internal".into()),
            None,
        );
        assert_matches!(err, Err(CoreError::Internal(_)));
    }

    #[test]
    fn from_columns_drops_progress_outside_processing() {
        let state =
            JobState::from_columns(JobStatus::Canceled, Some(40), None, None, None).unwrap();
        assert_eq!(state, JobState::Canceled);
        assert_eq!(state.progress(), None);
    }

    #[test]
    fn invariants_hold_for_claimed_job() {
        let mut job = job_with(JobState::Processing { progress: Some(10) });
        job.started_at = Some(job.created_at + Duration::seconds(1));
        assert!(job.check_invariants().is_ok());
    }

    #[test]
    fn invariants_catch_terminal_without_completed_at() {
        let mut job = job_with(JobState::Done { result: vec![1] });
        job.started_at = Some(job.created_at);
        assert!(job.check_invariants().is_err());
    }

    #[test]
    fn invariants_allow_cancel_straight_from_queue() {
        let mut job = job_with(JobState::Canceled);
        job.completed_at = Some(job.created_at);
        assert!(job.check_invariants().is_ok());
    }

    #[test]
    fn invariants_catch_decreasing_timestamps() {
        let mut job = job_with(JobState::Processing { progress: None });
        job.started_at = Some(job.created_at - Duration::seconds(5));
        assert!(job.check_invariants().is_err());
    }
}
