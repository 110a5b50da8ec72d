//! Optimistic-concurrency updates.
//!
//! Every versioned table carries `version INTEGER` and `updated_at
//! TIMESTAMPTZ`. An update is one conditional statement:
//!
//! ```sql
//! UPDATE <table>
//! SET <col> = $1, ..., updated_at = ..., version = version + 1
//! WHERE id = $n AND version = $m
//! RETURNING version, updated_at
//! ```
//!
//! Zero returned rows means the caller's version is stale (or the row is
//! gone) and nothing was written: the caller gets [`AppError::EditConflict`].
//! There is never a read-then-write pair in application code.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Encode, Executor, Postgres, QueryBuilder, Type};
use uuid::Uuid;

use crate::error::AppError;

/// `SET` fragment every write to a versioned row ends with, including status
/// transitions that do not go through [`VersionedUpdate`].
///
/// GREATEST keeps `updated_at` strictly increasing even when two writes land
/// within the same clock tick.
pub const BUMP_VERSION: &str =
    "updated_at = GREATEST(NOW(), updated_at + INTERVAL '1 microsecond'), version = version + 1";

/// Version and timestamp a successful update produced.
///
/// Clients send `version` back on their next update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow, Serialize)]
pub struct VersionStamp {
    pub version: i32,
    pub updated_at: DateTime<Utc>,
}

/// Builder for a single version-conditioned `UPDATE`.
pub struct VersionedUpdate<'args> {
    builder: QueryBuilder<'args, Postgres>,
}

impl<'args> VersionedUpdate<'args> {
    pub fn table(table: &'static str) -> Self {
        let mut builder = QueryBuilder::new("UPDATE ");
        builder.push(table).push(" SET ");
        Self { builder }
    }

    /// Assign `value` to `column`. Column names are compile-time constants.
    pub fn set<T>(mut self, column: &'static str, value: T) -> Self
    where
        T: 'args + Encode<'args, Postgres> + Type<Postgres> + Send,
    {
        self.builder
            .push(column)
            .push(" = ")
            .push_bind(value)
            .push(", ");
        self
    }

    /// Run the update against `executor`, expecting the stored version to be
    /// `expected_version`.
    ///
    /// # Errors
    ///
    /// - `EditConflict` when no row has this id and version
    /// - `Duplicate` when a unique constraint rejects the new values
    /// - `Database` for anything else
    pub async fn execute<'e, E>(
        mut self,
        executor: E,
        id: Uuid,
        expected_version: i32,
    ) -> Result<VersionStamp, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        self.finish(id, expected_version);

        self.builder
            .build_query_as::<VersionStamp>()
            .fetch_optional(executor)
            .await
            .map_err(AppError::from_write)?
            .ok_or(AppError::EditConflict)
    }

    fn finish(&mut self, id: Uuid, expected_version: i32) {
        self.builder
            .push(BUMP_VERSION)
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" AND version = ")
            .push_bind(expected_version)
            .push(" RETURNING version, updated_at");
    }

    #[cfg(test)]
    fn sql(mut self, id: Uuid, expected_version: i32) -> String {
        self.finish(id, expected_version);
        self.builder.sql().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_is_conditioned_on_id_and_version() {
        let sql = VersionedUpdate::table("vehicles")
            .set("make", "Toyota".to_string())
            .set("is_default", true)
            .sql(Uuid::nil(), 3);

        assert_eq!(
            sql,
            "UPDATE vehicles SET make = $1, is_default = $2, \
             updated_at = GREATEST(NOW(), updated_at + INTERVAL '1 microsecond'), \
             version = version + 1 WHERE id = $3 AND version = $4 \
             RETURNING version, updated_at"
        );
    }

    #[test]
    fn status_only_update_still_bumps_version() {
        let sql = VersionedUpdate::table("payments")
            .set("status", "refunded".to_string())
            .sql(Uuid::nil(), 1);

        assert!(sql.starts_with("UPDATE payments SET status = $1, updated_at = "));
        assert!(sql.contains("version = version + 1 WHERE id = $2 AND version = $3"));
    }
}
