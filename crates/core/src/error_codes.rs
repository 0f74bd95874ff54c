//! Machine-readable codes stored in a failed job's `error.code`.
//!
//! Clients match on these strings, so they are part of the public
//! contract. Messages accompanying them are free-form.

/// The provider rejected the call because of rate limiting.
pub const RATE_LIMITED: &str = "rate_limited";

/// The provider rejected the request payload (bad prompt, bad model, ...).
pub const INVALID_REQUEST: &str = "invalid_request";

/// The provider could not be reached or returned a server error.
pub const PROVIDER_UNAVAILABLE: &str = "provider_unavailable";

/// No provider adapter is registered under the job's provider name.
pub const PROVIDER_NOT_CONFIGURED: &str = "provider_not_configured";

/// An input image or mask could not be resolved to bytes.
pub const INPUT_UNRESOLVABLE: &str = "input_unresolvable";

/// Artifact upload kept failing after the bounded retry budget.
pub const STORAGE_FAILED: &str = "storage_failed";

/// The storage container was missing and could not be provisioned.
pub const STORAGE_CONTAINER_MISSING: &str = "storage_container_missing";

/// Anything else (store write failures and the like).
pub const INTERNAL: &str = "internal";
