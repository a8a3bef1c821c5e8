//! Database schema management for `gridsense-backend`.
//!
//! Ensures the readings table and its lookup index exist before serving
//! requests. Applied once on startup from `main.rs`.

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// The `sensor_readings` table mirrors the gateway document shape: timestamp
/// text is kept verbatim (parsing happens in the engine boundary), and the
/// two dynamic channel/device maps land in JSONB columns. Safe to call on
/// every startup.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensor_readings (
            id                SERIAL PRIMARY KEY,
            building_id       TEXT  NOT NULL,
            floor_plan_id     TEXT  NOT NULL,
            reading_date      TEXT  NOT NULL,
            reading_time      TEXT  NOT NULL,
            energy_readings   JSONB NOT NULL DEFAULT '{}'::jsonb,
            lorawan_readings  JSONB NOT NULL DEFAULT '{}'::jsonb
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Every fetch filters on the building/floor pair
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_sensor_readings_building_floor
            ON sensor_readings (building_id, floor_plan_id);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
