//! Data models for parsed health-export structures
//!
//! These models represent the extracted workout data in a Rust-native format,
//! ready for JSON serialization to downstream consumers.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Parse mode selecting which record families are scanned for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParseMode {
    /// Extract workout-level records only, skipping time-series samples
    Fast,
    /// Additionally extract heart-rate and step samples and correlate them
    #[default]
    Detailed,
}

/// A single extracted workout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutRecord {
    /// Workout start instant (zone-explicit)
    pub start: DateTime<FixedOffset>,

    /// Workout end instant (zone-explicit)
    pub end: DateTime<FixedOffset>,

    /// Duration in minutes, normalized from the source unit
    pub duration_min: f64,

    /// Total distance in miles, normalized from the source unit
    pub distance_mi: f64,

    /// Total energy burned in kcal, normalized from the source unit
    pub energy_kcal: f64,

    /// Recording source (device or app name)
    pub source: Option<String>,

    /// Whether this was an indoor workout (HKIndoorWorkout metadata)
    pub indoor: bool,

    /// Statistics extracted from nested WorkoutStatistics blocks,
    /// supplemented by the correlator where the export omitted them
    pub stats: WorkoutStats,

    /// Workout events (pauses, segments, laps) in document order
    pub events: Vec<WorkoutEvent>,

    /// Heart-rate samples falling inside the workout window,
    /// attached by the correlator in detailed mode
    pub hr_samples: Vec<HeartRateSample>,

    /// Steps per minute, derived from overlapping step samples
    pub cadence_spm: Option<u32>,

    /// Pace in minutes per mile (duration / distance)
    pub pace_min_per_mi: Option<f64>,
}

/// Per-workout statistics, each optional
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkoutStats {
    /// Average heart rate in bpm
    pub avg_hr: Option<f64>,

    /// Minimum heart rate in bpm
    pub min_hr: Option<f64>,

    /// Maximum heart rate in bpm
    pub max_hr: Option<f64>,

    /// Statistics-block distance in miles
    pub distance_mi: Option<f64>,

    /// Active calories in kcal
    pub active_kcal: Option<f64>,

    /// Average running speed
    pub avg_speed: Option<f64>,

    /// Maximum running speed
    pub max_speed: Option<f64>,
}

/// A workout event such as a pause or segment boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutEvent {
    /// Event type identifier from the export
    pub kind: String,

    /// Event instant
    pub timestamp: DateTime<FixedOffset>,
}

/// A single heart-rate sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartRateSample {
    /// Sample instant
    pub timestamp: DateTime<FixedOffset>,

    /// Heart rate in beats per minute
    pub bpm: f64,
}

/// A step-count bucket covering an interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSample {
    /// Interval start
    pub start: DateTime<FixedOffset>,

    /// Interval end
    pub end: DateTime<FixedOffset>,

    /// Step count over the interval
    pub count: f64,
}

/// Running counts of discovered records, reported with progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParseCounts {
    /// Workouts discovered so far
    pub workouts: usize,

    /// Heart-rate records discovered so far
    pub hr_records: usize,

    /// Step records discovered so far
    pub step_records: usize,
}

/// A progress update emitted after each consumed chunk
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Fraction of the input consumed, 0.0 to 1.0
    pub fraction_complete: f64,

    /// Running record counts
    pub counts: ParseCounts,
}

impl WorkoutRecord {
    /// Number of attached heart-rate samples
    pub fn hr_sample_count(&self) -> usize {
        self.hr_samples.len()
    }
}
