//! Time-bucketed aggregation over raw building telemetry.
//!
//! One engine serves every report shape: resolve the requested window, keep
//! the readings whose parsed instant falls inside it, group them into
//! granularity-specific buckets, reduce each bucket to a metric record, and
//! emit the records in chronological order. The older per-endpoint variants
//! of this math are consolidated here behind two explicit knobs:
//! [`EnergyStrategy`] (trapezoidal integration vs. plain averaging) and
//! [`CalendarPolicy`] (back-filled vs. sparse bucket sets).
//!
//! Everything in this module is a pure transform over in-memory data: no I/O,
//! no shared state, all accumulators owned by the caller's stack.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::RawReading;

// ---

const MONTH_ABBR: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Requested aggregation resolution. Buckets and window offsets follow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Today,
    Week,
    Month,
    Year,
}

impl Granularity {
    /// Parse the `timeRange` query token. Unknown or missing tokens fall
    /// back to `Today`, matching the behaviour the dashboard has always
    /// relied on.
    pub fn parse(token: Option<&str>) -> Self {
        // ---
        match token {
            Some("week") => Granularity::Week,
            Some("month") => Granularity::Month,
            Some("year") => Granularity::Year,
            _ => Granularity::Today,
        }
    }
}

/// How a bucket's energy figure is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnergyStrategy {
    /// Trapezoidal integration of instantaneous power over consecutive
    /// readings. A bucket with fewer than two readings yields zero.
    Integration,
    /// Mean of the per-reading cumulative channel energy sums.
    Averaging,
}

/// Whether the output series always covers the full canonical bucket set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarPolicy {
    /// Emit every canonical bucket for the window, zero-valued where no data
    /// exists. Keeps chart axes stable across requests.
    Backfilled,
    /// Emit only buckets that received at least one reading.
    Sparse,
}

/// Per-request engine configuration.
#[derive(Debug, Clone)]
pub struct AggregateOptions {
    // ---
    pub granularity: Granularity,
    pub energy: EnergyStrategy,
    pub calendar: CalendarPolicy,
    /// Fixed tariff multiplier: cost = energy * unit_rate.
    pub unit_rate: f64,
}

/// Resolved half-open request window, both bounds inclusive when filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A reading admitted into the engine: the raw document plus its instant,
/// parsed exactly once at the filter boundary.
#[derive(Debug)]
pub struct ParsedReading<'a> {
    pub instant: DateTime<Utc>,
    pub raw: &'a RawReading,
}

/// Outcome of window filtering. `skipped` counts readings whose timestamp
/// text failed to parse; they are diagnostics, never request failures.
#[derive(Debug)]
pub struct FilterOutcome<'a> {
    pub kept: Vec<ParsedReading<'a>>,
    pub skipped: usize,
}

/// One emitted series record. Numeric fields carry their documented fixed
/// precision: energy 3 decimals, cost 2, temperature/humidity 1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatePoint {
    // ---
    pub timestamp: String,
    pub energy: f64,
    pub cost: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub occupancy: i64,
}

/// Rejected custom window bounds.
#[derive(Debug, Error)]
pub enum WindowError {
    #[error("invalid custom date bound: {0:?}")]
    UnparsableBound(String),
    #[error("customStart must not be after customEnd")]
    Inverted,
}

// ---

/// Resolve the requested range into a concrete `[start, end]` interval.
///
/// When both custom bounds are present they take precedence over the
/// granularity token; bounds accept `YYYY-MM-DD` (customEnd inclusive through
/// end of day) or full RFC 3339 instants. Otherwise the window reaches back
/// a fixed offset from `now`: start of day, 7, 30, or 365 days.
pub fn resolve_window(
    now: DateTime<Utc>,
    granularity: Granularity,
    custom_start: Option<&str>,
    custom_end: Option<&str>,
) -> Result<TimeWindow, WindowError> {
    // ---
    if let (Some(raw_start), Some(raw_end)) = (custom_start, custom_end) {
        let start = parse_bound(raw_start, false)
            .ok_or_else(|| WindowError::UnparsableBound(raw_start.to_string()))?;
        let end = parse_bound(raw_end, true)
            .ok_or_else(|| WindowError::UnparsableBound(raw_end.to_string()))?;
        if start > end {
            return Err(WindowError::Inverted);
        }
        return Ok(TimeWindow { start, end });
    }

    let start = match granularity {
        Granularity::Today => now.date_naive().and_time(NaiveTime::MIN).and_utc(),
        Granularity::Week => now - Duration::days(7),
        Granularity::Month => now - Duration::days(30),
        Granularity::Year => now - Duration::days(365),
    };
    Ok(TimeWindow { start, end: now })
}

fn parse_bound(text: &str, end_of_day: bool) -> Option<DateTime<Utc>> {
    // ---
    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Some(instant.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
    let time = if end_of_day {
        NaiveTime::from_hms_opt(23, 59, 59)?
    } else {
        NaiveTime::MIN
    };
    Some(date.and_time(time).and_utc())
}

/// Keep the readings whose parsed instant lies within the window, in input
/// order. Readings with unparseable timestamp text are skipped and counted;
/// each skip is logged for diagnostics.
pub fn filter_window<'a>(readings: &'a [RawReading], window: &TimeWindow) -> FilterOutcome<'a> {
    // ---
    let mut kept = Vec::new();
    let mut skipped = 0usize;

    for raw in readings {
        match raw.instant() {
            Some(instant) => {
                if instant >= window.start && instant <= window.end {
                    kept.push(ParsedReading { instant, raw });
                }
            }
            None => {
                skipped += 1;
                tracing::debug!(
                    date = %raw.date,
                    time = %raw.time,
                    "skipping reading with unparseable timestamp"
                );
            }
        }
    }

    FilterOutcome { kept, skipped }
}

/// Run bucketize → reduce → assemble over the filtered readings and return
/// the chronologically ordered series.
pub fn aggregate(
    readings: &[ParsedReading<'_>],
    window: &TimeWindow,
    opts: &AggregateOptions,
) -> Vec<AggregatePoint> {
    // ---
    // Keyed by chronological ordinal, so iteration order is emission order.
    let mut buckets: BTreeMap<i64, Bucket<'_, '_>> = BTreeMap::new();

    for reading in readings {
        let (ord, label) = bucket_slot(&reading.instant, opts.granularity);
        buckets
            .entry(ord)
            .or_insert_with(|| Bucket::empty(label))
            .readings
            .push(reading);
    }

    // Ascending-time order inside each bucket is a precondition for the
    // integration step, not a display concern.
    for bucket in buckets.values_mut() {
        bucket.readings.sort_by_key(|r| r.instant);
    }

    if opts.calendar == CalendarPolicy::Backfilled {
        for (ord, label) in canonical_slots(window, opts.granularity) {
            buckets.entry(ord).or_insert_with(|| Bucket::empty(label));
        }
    }

    buckets
        .into_values()
        .map(|bucket| reduce_bucket(&bucket, opts))
        .collect()
}

// ---

struct Bucket<'s, 'a> {
    label: String,
    readings: Vec<&'s ParsedReading<'a>>,
}

impl<'s, 'a> Bucket<'s, 'a> {
    fn empty(label: String) -> Self {
        Bucket {
            label,
            readings: Vec::new(),
        }
    }
}

/// Map an instant to its bucket: a chronological ordinal used for ordering
/// plus the display label. Pure in both arguments.
fn bucket_slot(instant: &DateTime<Utc>, granularity: Granularity) -> (i64, String) {
    // ---
    match granularity {
        Granularity::Today => {
            let hour = instant.hour();
            (hour as i64, format!("{hour:02}:00"))
        }
        Granularity::Week => {
            let date = instant.date_naive();
            (date.num_days_from_ce() as i64, date_label(date))
        }
        Granularity::Month => {
            let week = (instant.day() + 6) / 7;
            (week as i64, format!("Week {week}"))
        }
        Granularity::Year => {
            let month = instant.month();
            (month as i64, MONTH_ABBR[month as usize - 1].to_string())
        }
    }
}

/// The full canonical bucket set for a window, used by the back-fill policy.
fn canonical_slots(window: &TimeWindow, granularity: Granularity) -> Vec<(i64, String)> {
    // ---
    match granularity {
        Granularity::Today => (0..24).map(|h| (h, format!("{h:02}:00"))).collect(),
        Granularity::Week => {
            let last = window.end.date_naive();
            (0..7)
                .map(|back| {
                    let date = last - Duration::days(6 - back);
                    (date.num_days_from_ce() as i64, date_label(date))
                })
                .collect()
        }
        Granularity::Month => (1..=5).map(|w| (w, format!("Week {w}"))).collect(),
        Granularity::Year => (1..=12)
            .map(|m| (m, MONTH_ABBR[m as usize - 1].to_string()))
            .collect(),
    }
}

fn date_label(date: NaiveDate) -> String {
    date.format("%b %-d").to_string()
}

/// Reduce one bucket to its emitted record. Rounding happens here and only
/// here; all intermediate arithmetic stays at full precision.
fn reduce_bucket(bucket: &Bucket<'_, '_>, opts: &AggregateOptions) -> AggregatePoint {
    // ---
    let energy = match opts.energy {
        EnergyStrategy::Integration => integrate_energy(&bucket.readings),
        EnergyStrategy::Averaging => mean(bucket.readings.iter().map(|r| r.raw.total_energy())),
    };
    let cost = energy * opts.unit_rate;

    // Environmental values are pooled raw across every device of every
    // reading in the bucket, not averaged per reading first.
    let temperature = mean(
        bucket
            .readings
            .iter()
            .flat_map(|r| r.raw.lorawan_readings.values())
            .filter_map(|device| device.temperature),
    );
    let humidity = mean(
        bucket
            .readings
            .iter()
            .flat_map(|r| r.raw.lorawan_readings.values())
            .filter_map(|device| device.humidity),
    );

    // Last known occupancy: the most recent reading speaks for the bucket.
    let occupancy = bucket
        .readings
        .last()
        .map(|r| r.raw.occupancy())
        .unwrap_or(0);

    AggregatePoint {
        timestamp: bucket.label.clone(),
        energy: round_to(energy, 3),
        cost: round_to(cost, 2),
        temperature: round_to(temperature, 1),
        humidity: round_to(humidity, 1),
        occupancy,
    }
}

/// Trapezoidal integration over consecutive ordered readings:
/// `(power(curr) + power(next)) / 2 * elapsed hours`, summed.
fn integrate_energy(readings: &[&ParsedReading<'_>]) -> f64 {
    // ---
    readings
        .windows(2)
        .map(|pair| {
            let hours = (pair[1].instant - pair[0].instant).num_milliseconds() as f64 / 3_600_000.0;
            let avg_power = (pair[0].raw.total_power() + pair[1].raw.total_power()) / 2.0;
            avg_power * hours
        })
        .sum()
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    // ---
    let (sum, count) = values.fold((0.0f64, 0u32), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
