//! Aggregated readings endpoints.
//!
//! Two GET routes share one pipeline: fetch → filter → bucket → reduce →
//! assemble. They differ only in the energy strategy handed to the engine:
//! - `/web/get-sensor-readings/...` integrates instantaneous power
//!   (trapezoidal) into consumed energy per bucket;
//! - `/web/get-historical-energy-readings/...` averages the cumulative
//!   channel energy counters instead.
//!
//! The store is a collaborator here: this module fetches plain `RawReading`
//! rows and hands them to the pure engine in `aggregate`.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::PgPool;
use tracing::{debug, info};

use crate::aggregate::{
    aggregate, filter_window, resolve_window, AggregateOptions, CalendarPolicy, EnergyStrategy,
    Granularity,
};
use crate::error::ApiError;
use crate::{ChannelReading, Config, DeviceReading, RawReading};

// ---

pub fn router() -> Router<(PgPool, Config)> {
    // ---
    Router::new()
        .route(
            "/web/get-sensor-readings/{buildingId}/{floorPlanId}",
            get(sensor_readings),
        )
        .route(
            "/web/get-historical-energy-readings/{buildingId}/{floorPlanId}",
            get(historical_energy_readings),
        )
}

/// Query parameters shared by both series endpoints. `customStart` and
/// `customEnd` override `timeRange` when both are present.
#[derive(Debug, Deserialize)]
pub struct SeriesQuery {
    // ---
    #[serde(rename = "timeRange")]
    time_range: Option<String>,
    #[serde(rename = "customStart")]
    custom_start: Option<String>,
    #[serde(rename = "customEnd")]
    custom_end: Option<String>,
}

async fn sensor_readings(
    Path((building_id, floor_plan_id)): Path<(String, String)>,
    Query(params): Query<SeriesQuery>,
    State((pool, config)): State<(PgPool, Config)>,
) -> Result<Json<Value>, ApiError> {
    // ---
    info!("GET /web/get-sensor-readings - Starting pipeline");
    run_pipeline(
        &pool,
        &config,
        &building_id,
        &floor_plan_id,
        &params,
        EnergyStrategy::Integration,
    )
    .await
}

async fn historical_energy_readings(
    Path((building_id, floor_plan_id)): Path<(String, String)>,
    Query(params): Query<SeriesQuery>,
    State((pool, config)): State<(PgPool, Config)>,
) -> Result<Json<Value>, ApiError> {
    // ---
    info!("GET /web/get-historical-energy-readings - Starting pipeline");
    run_pipeline(
        &pool,
        &config,
        &building_id,
        &floor_plan_id,
        &params,
        EnergyStrategy::Averaging,
    )
    .await
}

// ---

/// One logical unit of work per request: everything after the fetch is a
/// pure in-memory transform owned by this call stack.
async fn run_pipeline(
    pool: &PgPool,
    config: &Config,
    building_id: &str,
    floor_plan_id: &str,
    params: &SeriesQuery,
    energy: EnergyStrategy,
) -> Result<Json<Value>, ApiError> {
    // ---
    if building_id.trim().is_empty() || floor_plan_id.trim().is_empty() {
        return Err(ApiError::Validation(
            "BuildingId and FloorPlanId are required".to_string(),
        ));
    }

    // Window resolution happens before the fetch; invalid custom bounds
    // reject the request without touching the store.
    let granularity = Granularity::parse(params.time_range.as_deref());
    let window = resolve_window(
        Utc::now(),
        granularity,
        params.custom_start.as_deref(),
        params.custom_end.as_deref(),
    )
    .map_err(|e| ApiError::Validation(e.to_string()))?;

    debug!(?granularity, start = %window.start, end = %window.end, "resolved request window");

    let readings = fetch_readings(pool, building_id, floor_plan_id).await?;
    if readings.is_empty() {
        return Err(ApiError::NotFound("No sensor readings found".to_string()));
    }

    let outcome = filter_window(&readings, &window);
    if outcome.skipped > 0 {
        debug!(
            skipped = outcome.skipped,
            "dropped readings with unparseable timestamps"
        );
    }
    if outcome.kept.is_empty() {
        return Err(ApiError::NotFound(
            "No sensor readings found for the specified range".to_string(),
        ));
    }

    let opts = AggregateOptions {
        granularity,
        energy,
        calendar: CalendarPolicy::Backfilled,
        unit_rate: config.unit_rate,
    };
    let series = aggregate(&outcome.kept, &window, &opts);

    info!(
        points = series.len(),
        considered = outcome.kept.len(),
        "aggregation complete"
    );
    Ok(Json(json!({ "data": series })))
}

// ---

/// Row shape of the `sensor_readings` table; the JSONB maps come back as
/// typed maps and are unwrapped into the plain model at this boundary.
#[derive(sqlx::FromRow)]
struct ReadingRow {
    // ---
    building_id: String,
    floor_plan_id: String,
    reading_date: String,
    reading_time: String,
    energy_readings: sqlx::types::Json<HashMap<String, ChannelReading>>,
    lorawan_readings: sqlx::types::Json<HashMap<String, DeviceReading>>,
}

impl ReadingRow {
    fn into_raw(self) -> RawReading {
        // ---
        RawReading {
            building_id: self.building_id,
            floor_plan_id: self.floor_plan_id,
            date: self.reading_date,
            time: self.reading_time,
            energy_readings: self.energy_readings.0,
            lorawan_readings: self.lorawan_readings.0,
        }
    }
}

/// Fetch every stored reading for the building/floor-plan pair. Window
/// filtering happens in the engine because the stored timestamps are
/// free-form text, not a queryable instant column.
async fn fetch_readings(
    pool: &PgPool,
    building_id: &str,
    floor_plan_id: &str,
) -> Result<Vec<RawReading>, sqlx::Error> {
    // ---
    let rows: Vec<ReadingRow> = sqlx::query_as(
        r#"
        SELECT building_id, floor_plan_id, reading_date, reading_time,
               energy_readings, lorawan_readings
        FROM sensor_readings
        WHERE building_id = $1 AND floor_plan_id = $2
        ORDER BY id
        "#,
    )
    .bind(building_id)
    .bind(floor_plan_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ReadingRow::into_raw).collect())
}
