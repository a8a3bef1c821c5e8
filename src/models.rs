//! Wire-level data models for the telemetry backend.
//!
//! `RawReading` mirrors the document shape produced by the on-site gateways:
//! a free-form `date`/`time` text pair plus two maps keyed by opaque channel
//! and device names. Channel/device names are dynamic — the aggregation code
//! enumerates map entries and never assumes a fixed set of keys.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

// ---

/// Date layouts observed in stored readings, tried in order.
/// The gateways write `Date.toDateString()` output ("Fri Nov 15 2024").
const DATE_LAYOUTS: &[&str] = &["%a %b %d %Y", "%b %d %Y", "%Y-%m-%d", "%m/%d/%Y"];

/// Wall-clock layouts, 12-hour AM/PM first ("4:25:07 PM").
const TIME_LAYOUTS: &[&str] = &["%I:%M:%S %p", "%I:%M %p", "%H:%M:%S", "%H:%M"];

// ---

/// One metered energy channel within a reading.
///
/// Missing numeric fields deserialize as zero; the original gateways omit
/// fields for idle channels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelReading {
    // ---
    #[serde(rename = "Current", default)]
    pub current: f64,
    #[serde(rename = "Energy", default)]
    pub energy: f64,
    #[serde(rename = "Power", default)]
    pub power: f64,
}

/// One LoRaWAN device snapshot within a reading. Environmental fields and
/// people-counter totals are all optional; devices report whatever they have.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceReading {
    // ---
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub line_1_total_in: Option<f64>,
    #[serde(default)]
    pub line_1_total_out: Option<f64>,
}

/// A raw telemetry document as fetched from the store, read-only to the
/// aggregation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawReading {
    // ---
    #[serde(rename = "buildingId")]
    pub building_id: String,
    #[serde(rename = "floorPlanId")]
    pub floor_plan_id: String,
    pub date: String,
    pub time: String,
    #[serde(rename = "Energy_Readings", default)]
    pub energy_readings: HashMap<String, ChannelReading>,
    #[serde(rename = "Lorawan_Readings", default)]
    pub lorawan_readings: HashMap<String, DeviceReading>,
}

impl RawReading {
    /// Combine the stored `date` and `time` text into a single UTC instant.
    ///
    /// Returns `None` when either part fails every known layout; callers drop
    /// such readings and count them, they never abort a request. The stored
    /// text carries no zone marker, so readings are interpreted as UTC
    /// everywhere for determinism.
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        // ---
        let date = parse_first(self.date.trim(), DATE_LAYOUTS, NaiveDate::parse_from_str)?;
        let time = parse_first(self.time.trim(), TIME_LAYOUTS, NaiveTime::parse_from_str)?;
        Some(date.and_time(time).and_utc())
    }

    /// Sum of instantaneous power (kW) over every energy channel.
    pub fn total_power(&self) -> f64 {
        self.energy_readings.values().map(|c| c.power).sum()
    }

    /// Sum of cumulative channel energy (kWh) over every energy channel.
    pub fn total_energy(&self) -> f64 {
        self.energy_readings.values().map(|c| c.energy).sum()
    }

    /// Net headcount from the people-counter totals of this one reading:
    /// all devices' `line_1_total_in` minus `line_1_total_out`, clamped at
    /// zero so counter drift can never report a negative occupancy.
    pub fn occupancy(&self) -> i64 {
        // ---
        let total_in: f64 = self
            .lorawan_readings
            .values()
            .filter_map(|d| d.line_1_total_in)
            .sum();
        let total_out: f64 = self
            .lorawan_readings
            .values()
            .filter_map(|d| d.line_1_total_out)
            .sum();
        (total_in - total_out).max(0.0).round() as i64
    }
}

// ---

fn parse_first<T>(
    text: &str,
    layouts: &[&str],
    parse: impl Fn(&str, &str) -> chrono::ParseResult<T>,
) -> Option<T> {
    layouts.iter().find_map(|layout| parse(text, layout).ok())
}
