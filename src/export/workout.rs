//! Extraction and unit normalization of `<Workout>` blocks
//!
//! A workout fragment carries its summary attributes on the start tag and
//! nested `<WorkoutStatistics>`, `<MetadataEntry>` and `<WorkoutEvent>`
//! elements in the body. Everything here is best-effort: a missing optional
//! attribute leaves the field absent, and only unparseable start/end
//! timestamps drop the workout entirely.

use log::trace;

use super::dates::parse_health_date;
use super::models::{WorkoutEvent, WorkoutRecord, WorkoutStats};
use super::record::extract_event;
use super::scan::{attr, attr_f64};

const MILES_PER_KM: f64 = 0.621371;
const MILES_PER_METER: f64 = 0.000621371;
const KJ_PER_KCAL: f64 = 4.184;

const INDOOR_KEY_MARKER: &str = r#"key="HKIndoorWorkout""#;
const STATISTICS_OPEN: &str = "<WorkoutStatistics";
const EVENT_OPEN: &str = "<WorkoutEvent";

/// Extract a workout from a complete `<Workout>...</Workout>` fragment.
///
/// Returns `None` when either timestamp is unparseable; the caller drops the
/// workout silently.
pub(crate) fn extract_workout(fragment: &str) -> Option<WorkoutRecord> {
    let start_tag_end = fragment.find('>')?;
    let start_tag = &fragment[..start_tag_end];

    let start = parse_health_date(attr(start_tag, "startDate").unwrap_or(""))?;
    let end = parse_health_date(attr(start_tag, "endDate").unwrap_or(""))?;

    let duration_min = normalize_duration(
        attr_f64(start_tag, "duration").unwrap_or(0.0),
        attr(start_tag, "durationUnit").unwrap_or("min"),
    );

    let summary = collect_statistics(fragment);

    // The workout's own totals win; the statistics blocks only fill gaps.
    let mut distance = attr_f64(start_tag, "totalDistance").filter(|d| *d > 0.0);
    let mut distance_unit = attr(start_tag, "totalDistanceUnit").unwrap_or("mi").to_string();
    if distance.is_none() {
        if let Some((value, unit)) = &summary.distance {
            distance = Some(*value);
            distance_unit = unit.clone();
        }
    }
    let distance_mi = distance.map_or(0.0, |d| to_miles(d, &distance_unit));

    let mut energy = attr_f64(start_tag, "totalEnergyBurned").filter(|e| *e > 0.0);
    let mut energy_unit = attr(start_tag, "totalEnergyBurnedUnit")
        .unwrap_or("kcal")
        .to_string();
    if energy.is_none() {
        if let Some((value, unit)) = &summary.active_calories {
            energy = Some(*value);
            energy_unit = unit.clone();
        }
    }
    let energy_kcal = energy.map_or(0.0, |e| to_kcal(e, &energy_unit));

    let pace_min_per_mi = if distance_mi > 0.0 && duration_min > 0.0 {
        Some(duration_min / distance_mi)
    } else {
        None
    };

    let record = WorkoutRecord {
        start,
        end,
        duration_min,
        distance_mi,
        energy_kcal,
        source: attr(start_tag, "sourceName").map(str::to_string),
        indoor: detect_indoor(fragment),
        stats: WorkoutStats {
            avg_hr: summary.avg_hr,
            min_hr: summary.min_hr,
            max_hr: summary.max_hr,
            distance_mi: summary
                .distance
                .as_ref()
                .map(|(value, unit)| to_miles(*value, unit)),
            active_kcal: summary
                .active_calories
                .as_ref()
                .map(|(value, unit)| to_kcal(*value, unit)),
            avg_speed: summary.avg_speed,
            max_speed: summary.max_speed,
        },
        events: collect_events(fragment),
        hr_samples: Vec::new(),
        cadence_spm: None,
        pace_min_per_mi,
    };
    trace!("extracted workout {} -> {}", record.start, record.end);
    Some(record)
}

/// Normalize a duration to minutes
fn normalize_duration(value: f64, unit: &str) -> f64 {
    match unit.trim().to_ascii_lowercase().as_str() {
        "s" | "sec" | "secs" | "second" | "seconds" => value / 60.0,
        "h" | "hr" | "hour" | "hours" => value * 60.0,
        _ => value,
    }
}

/// Convert a distance to miles; unit comparison is case-insensitive
fn to_miles(value: f64, unit: &str) -> f64 {
    match unit.trim().to_ascii_lowercase().as_str() {
        "km" => value * MILES_PER_KM,
        "m" => value * MILES_PER_METER,
        _ => value,
    }
}

/// Convert an energy to kcal; unit comparison is case-insensitive
fn to_kcal(value: f64, unit: &str) -> f64 {
    match unit.trim().to_ascii_lowercase().as_str() {
        "kj" => value / KJ_PER_KCAL,
        _ => value,
    }
}

/// Statistics gathered from the nested WorkoutStatistics blocks.
///
/// Distance and calories keep their source unit so the fallback substitution
/// can convert exactly once.
#[derive(Debug, Default)]
struct StatisticsSummary {
    avg_hr: Option<f64>,
    min_hr: Option<f64>,
    max_hr: Option<f64>,
    distance: Option<(f64, String)>,
    active_calories: Option<(f64, String)>,
    avg_speed: Option<f64>,
    max_speed: Option<f64>,
}

/// Scan all nested `<WorkoutStatistics>` tags, self-closing or paired.
///
/// Classification is by case-sensitive substring on the `type` attribute so
/// variant identifier strings still match. Unknown types are ignored.
fn collect_statistics(fragment: &str) -> StatisticsSummary {
    let mut summary = StatisticsSummary::default();
    let mut from = 0;
    while let Some(pos) = fragment[from..].find(STATISTICS_OPEN) {
        let tag_start = from + pos;
        let tag_end = fragment[tag_start..]
            .find('>')
            .map_or(fragment.len(), |p| tag_start + p);
        let tag = &fragment[tag_start..tag_end];
        let kind = attr(tag, "type").unwrap_or("");

        if kind.contains("HeartRate") {
            summary.avg_hr = attr_f64(tag, "average").or_else(|| attr_f64(tag, "avg"));
            summary.min_hr = attr_f64(tag, "minimum").or_else(|| attr_f64(tag, "min"));
            summary.max_hr = attr_f64(tag, "maximum").or_else(|| attr_f64(tag, "max"));
        } else if kind.contains("Distance") {
            if let Some(value) = quantity_attr(tag) {
                summary.distance = Some((value, attr(tag, "unit").unwrap_or("mi").to_string()));
            }
        } else if kind.contains("Energy") {
            if let Some(value) = quantity_attr(tag) {
                summary.active_calories =
                    Some((value, attr(tag, "unit").unwrap_or("kcal").to_string()));
            }
        } else if kind.contains("RunningSpeed") {
            summary.avg_speed = attr_f64(tag, "average").or_else(|| attr_f64(tag, "avg"));
            summary.max_speed = attr_f64(tag, "maximum").or_else(|| attr_f64(tag, "max"));
        }

        from = tag_end;
    }
    summary
}

/// Quantity attribute fallback chain: sum, quantity, value, total.
///
/// Only positive values are accepted.
fn quantity_attr(tag: &str) -> Option<f64> {
    ["sum", "quantity", "value", "total"]
        .iter()
        .find_map(|name| attr_f64(tag, name).filter(|v| *v > 0.0))
}

/// Indoor workouts carry a `HKIndoorWorkout` metadata entry with value "1"
fn detect_indoor(fragment: &str) -> bool {
    let Some(at) = fragment.find(INDOOR_KEY_MARKER) else {
        return false;
    };
    let tag_start = fragment[..at].rfind('<').unwrap_or(at);
    let tag_end = fragment[at..].find('>').map_or(fragment.len(), |p| at + p);
    attr(&fragment[tag_start..tag_end], "value") == Some("1")
}

/// Collect all workout events in document order
fn collect_events(fragment: &str) -> Vec<WorkoutEvent> {
    let mut events = Vec::new();
    let mut from = 0;
    while let Some(pos) = fragment[from..].find(EVENT_OPEN) {
        let tag_start = from + pos;
        let tag_end = fragment[tag_start..]
            .find('>')
            .map_or(fragment.len(), |p| tag_start + p);
        if let Some(event) = extract_event(&fragment[tag_start..tag_end]) {
            events.push(event);
        }
        from = tag_end;
    }
    events
}
