//! End-to-end checks against a running server.
//!
//! Point `BASE_URL` at a live instance (default `http://localhost:8080`).
//! When no server is reachable the tests skip rather than fail, so the unit
//! suite stays green in environments without a database.

use anyhow::Result;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct SeriesResponse {
    data: Vec<SeriesPoint>,
}

#[derive(Debug, Deserialize)]
struct SeriesPoint {
    timestamp: String,
    energy: f64,
    cost: f64,
    temperature: f64,
    humidity: f64,
    occupancy: i64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

// ---

async fn server_base(client: &Client) -> Option<String> {
    // ---
    let base = std::env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:8080".into());
    match client.get(format!("{base}/health")).send().await {
        Ok(resp) if resp.status().is_success() => Some(base),
        _ => {
            eprintln!("skipping: no server reachable at {base}");
            None
        }
    }
}

#[tokio::test]
async fn inverted_custom_range_is_rejected_without_a_fetch() -> Result<()> {
    // ---
    let client = Client::new();
    let Some(base) = server_base(&client).await else {
        return Ok(());
    };

    let url = format!(
        "{base}/web/get-sensor-readings/b1/f1?customStart=2024-02-01&customEnd=2024-01-01"
    );
    let resp = client.get(&url).send().await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: ErrorBody = resp.json().await?;
    assert!(
        body.message.contains("customStart"),
        "unexpected message: {}",
        body.message
    );
    Ok(())
}

#[tokio::test]
async fn unknown_building_yields_not_found() -> Result<()> {
    // ---
    let client = Client::new();
    let Some(base) = server_base(&client).await else {
        return Ok(());
    };

    let url = format!("{base}/web/get-sensor-readings/no-such-building/no-such-floor");
    let resp = client.get(&url).send().await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let body: ErrorBody = resp.json().await?;
    assert_eq!(body.message, "No sensor readings found");
    Ok(())
}

#[tokio::test]
async fn seeded_year_series_has_canonical_shape() -> Result<()> {
    // ---
    // Needs seeded data; set TEST_BUILDING_ID / TEST_FLOOR_PLAN_ID to run
    // the full assertion set.
    let client = Client::new();
    let Some(base) = server_base(&client).await else {
        return Ok(());
    };
    let (Ok(building), Ok(floor)) = (
        std::env::var("TEST_BUILDING_ID"),
        std::env::var("TEST_FLOOR_PLAN_ID"),
    ) else {
        eprintln!("skipping: TEST_BUILDING_ID / TEST_FLOOR_PLAN_ID not set");
        return Ok(());
    };

    let url = format!("{base}/web/get-sensor-readings/{building}/{floor}?timeRange=year");
    let resp = client.get(&url).send().await?;
    assert!(
        resp.status().is_success(),
        "expected 200 from {url}, got {}",
        resp.status()
    );

    let series: SeriesResponse = resp.json().await?;

    // Back-filled year view: all twelve canonical months, in order
    let labels: Vec<&str> = series.data.iter().map(|p| p.timestamp.as_str()).collect();
    assert_eq!(
        labels,
        vec!["Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec"]
    );

    for point in &series.data {
        // ---
        assert!(point.occupancy >= 0, "occupancy must never be negative");
        assert!(point.energy.is_finite());
        assert!(point.cost.is_finite());
        // Documented precision: temperature/humidity to 1 decimal place
        let scaled_t = point.temperature * 10.0;
        assert!((scaled_t - scaled_t.round()).abs() < 1e-6);
        let scaled_h = point.humidity * 10.0;
        assert!((scaled_h - scaled_h.round()).abs() < 1e-6);
    }
    Ok(())
}
