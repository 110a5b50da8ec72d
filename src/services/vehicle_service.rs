//! Vehicle service.
//!
//! Every query is scoped to the owning user, so a vehicle id belonging to
//! someone else behaves exactly like an unknown id.

use sqlx::{Executor, PgConnection, Postgres};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        pagination::{Filters, Page, collect_page},
        vehicle::{CreateVehicleRequest, Vehicle},
    },
    services::versioned::{BUMP_VERSION, VersionStamp, VersionedUpdate},
};

/// Register a vehicle for `user_id`.
///
/// When the new vehicle is marked default, the flag is cleared on the
/// user's other vehicles in the same transaction.
///
/// # Errors
///
/// - `Duplicate`: License plate already registered
pub async fn create(
    pool: &DbPool,
    user_id: Uuid,
    request: CreateVehicleRequest,
) -> Result<Vehicle, AppError> {
    let mut tx = pool.begin().await?;

    if request.is_default {
        clear_default(&mut *tx, user_id, None).await?;
    }

    let vehicle = sqlx::query_as::<_, Vehicle>(
        r#"
        INSERT INTO vehicles (user_id, license_plate, make, model, color, vehicle_type, is_default)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(request.license_plate)
    .bind(request.make)
    .bind(request.model)
    .bind(request.color)
    .bind(request.vehicle_type)
    .bind(request.is_default)
    .fetch_one(&mut *tx)
    .await
    .map_err(AppError::from_write)?;

    tx.commit().await?;

    Ok(vehicle)
}

pub async fn list(
    pool: &DbPool,
    user_id: Uuid,
    filters: &Filters,
) -> Result<Page<Vehicle>, AppError> {
    let sql = format!(
        r#"
        SELECT count(*) OVER() AS total_records, *
        FROM vehicles
        WHERE user_id = $1
        ORDER BY {}
        LIMIT $2 OFFSET $3
        "#,
        filters.order_by()
    );

    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(filters.limit())
        .bind(filters.offset())
        .fetch_all(pool)
        .await?;

    Ok(collect_page(rows, filters)?)
}

/// Fetch one of the user's vehicles, from the pool or inside a transaction.
///
/// # Errors
///
/// - `NotFound`: No such vehicle for this user
pub async fn get<'e, E>(executor: E, user_id: Uuid, id: Uuid) -> Result<Vehicle, AppError>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, Vehicle>("SELECT * FROM vehicles WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .fetch_optional(executor)
        .await?
        .ok_or(AppError::NotFound("vehicle"))
}

pub async fn update(
    pool: &DbPool,
    vehicle: &Vehicle,
    expected_version: i32,
) -> Result<VersionStamp, AppError> {
    VersionedUpdate::table("vehicles")
        .set("license_plate", vehicle.license_plate.clone())
        .set("make", vehicle.make.clone())
        .set("model", vehicle.model.clone())
        .set("color", vehicle.color.clone())
        .set("vehicle_type", vehicle.vehicle_type.clone())
        .execute(pool, vehicle.id, expected_version)
        .await
}

pub async fn delete(pool: &DbPool, user_id: Uuid, id: Uuid) -> Result<(), AppError> {
    let deleted = sqlx::query("DELETE FROM vehicles WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(|err| AppError::from_delete(err, "vehicle"))?
        .rows_affected();

    if deleted == 0 {
        return Err(AppError::NotFound("vehicle"));
    }

    Ok(())
}

/// Make `id` the user's default vehicle.
///
/// Both the clear and the set bump the version of every row they touch.
pub async fn set_default(pool: &DbPool, user_id: Uuid, id: Uuid) -> Result<Vehicle, AppError> {
    let mut tx = pool.begin().await?;

    // Lock the target first so two concurrent calls serialise here.
    sqlx::query("SELECT id FROM vehicles WHERE id = $1 AND user_id = $2 FOR UPDATE")
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("vehicle"))?;

    clear_default(&mut *tx, user_id, Some(id)).await?;

    let sql = format!(
        "UPDATE vehicles SET is_default = true, {BUMP_VERSION} WHERE id = $1 RETURNING *"
    );
    let vehicle = sqlx::query_as::<_, Vehicle>(&sql)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(vehicle_id = %id, user_id = %user_id, "default vehicle changed");
    Ok(vehicle)
}

async fn clear_default(
    conn: &mut PgConnection,
    user_id: Uuid,
    except: Option<Uuid>,
) -> Result<(), AppError> {
    let sql = format!(
        r#"
        UPDATE vehicles SET is_default = false, {BUMP_VERSION}
        WHERE user_id = $1 AND is_default AND ($2::UUID IS NULL OR id <> $2)
        "#
    );
    sqlx::query(&sql)
        .bind(user_id)
        .bind(except)
        .execute(conn)
        .await?;

    Ok(())
}
