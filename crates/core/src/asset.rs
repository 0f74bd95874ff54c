//! Generated-artifact records.

use serde::{Deserialize, Serialize};

use crate::job::MediaKind;
use crate::types::{DbId, Timestamp};

/// A durable record of one stored artifact.
///
/// `job_id` is `None` for independently curated assets. `location` is not
/// stored; it is filled in from `storage_ref` by the artifact store when
/// assets are handed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: DbId,
    pub job_id: Option<DbId>,
    pub owner_scope: DbId,
    pub kind: MediaKind,
    pub storage_ref: String,
    pub provider: String,
    pub provider_model: String,
    pub variation_index: Option<i32>,
    pub content_type: String,
    pub byte_size: i64,
    pub created_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Insert payload for a new asset, produced by the generation executor
/// once the artifact is durably stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAsset {
    pub job_id: Option<DbId>,
    pub owner_scope: DbId,
    pub kind: MediaKind,
    pub storage_ref: String,
    pub provider: String,
    pub provider_model: String,
    pub variation_index: Option<i32>,
    pub content_type: String,
    pub byte_size: i64,
}
