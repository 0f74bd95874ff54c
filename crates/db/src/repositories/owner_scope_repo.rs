//! Repository for the `owner_scopes` table.

use atelier_core::types::DbId;
use sqlx::PgPool;

use crate::models::owner_scope::OwnerScope;

/// Lookups against the tenant table. Scopes are provisioned elsewhere;
/// `create` exists for seeding and tests.
pub struct OwnerScopeRepo;

impl OwnerScopeRepo {
    /// Whether a scope with this id exists.
    pub async fn exists(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM owner_scopes WHERE id = $1)")
            .bind(id)
            .fetch_one(pool)
            .await
    }

    /// Insert a new scope and return it.
    pub async fn create(pool: &PgPool, name: &str) -> Result<OwnerScope, sqlx::Error> {
        sqlx::query_as::<_, OwnerScope>(
            "INSERT INTO owner_scopes (name) VALUES ($1) RETURNING id, name, created_at",
        )
        .bind(name)
        .fetch_one(pool)
        .await
    }
}
