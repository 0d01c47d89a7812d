//! Correlation of time-series samples with workout windows
//!
//! A single post-pass over the accumulated collections: workouts, heart-rate
//! samples and step samples are each sorted by start timestamp, then every
//! workout slices the sample streams over its time window by binary search.
//!
//! The search locates the last index whose key is strictly less than the
//! window start and the scan begins there with an inclusive lower-bound
//! check, so a sample exactly at the boundary is never missed.

use log::debug;

use super::models::{HeartRateSample, ParseMode, StepSample, WorkoutRecord};

/// Cross-reference samples against workouts and impose chronological order.
///
/// Sample attachment runs only in detailed mode and only when at least one
/// sample exists; fast mode returns the sorted workouts untouched.
pub(crate) fn correlate(
    mut workouts: Vec<WorkoutRecord>,
    mut hr_samples: Vec<HeartRateSample>,
    mut step_samples: Vec<StepSample>,
    mode: ParseMode,
) -> Vec<WorkoutRecord> {
    workouts.sort_by_key(|w| w.start);
    if mode != ParseMode::Detailed || (hr_samples.is_empty() && step_samples.is_empty()) {
        return workouts;
    }

    hr_samples.sort_by_key(|s| s.timestamp);
    step_samples.sort_by_key(|s| s.start);
    debug!(
        "correlating {} workouts against {} hr samples, {} step samples",
        workouts.len(),
        hr_samples.len(),
        step_samples.len()
    );

    for workout in &mut workouts {
        attach_heart_rate(workout, &hr_samples);
        apportion_steps(workout, &step_samples);
    }
    workouts
}

/// Attach in-window heart-rate samples and derive missing HR statistics.
///
/// Statistics extracted from the export always take precedence; each of
/// avg/min/max is derived only when the source supplied no value for it.
fn attach_heart_rate(workout: &mut WorkoutRecord, samples: &[HeartRateSample]) {
    if samples.is_empty() {
        return;
    }
    let from = samples
        .partition_point(|s| s.timestamp < workout.start)
        .saturating_sub(1);

    let mut attached = Vec::new();
    for sample in &samples[from..] {
        if sample.timestamp > workout.end {
            break;
        }
        if sample.timestamp >= workout.start {
            attached.push(sample.clone());
        }
    }
    if attached.is_empty() {
        return;
    }

    if workout.stats.avg_hr.is_none() {
        let sum: f64 = attached.iter().map(|s| s.bpm).sum();
        workout.stats.avg_hr = Some(sum / attached.len() as f64);
    }
    if workout.stats.min_hr.is_none() {
        workout.stats.min_hr = attached.iter().map(|s| s.bpm).reduce(f64::min);
    }
    if workout.stats.max_hr.is_none() {
        workout.stats.max_hr = attached.iter().map(|s| s.bpm).reduce(f64::max);
    }
    workout.hr_samples = attached;
}

/// Sum step counts apportioned by interval overlap and derive cadence.
///
/// A step bucket that only partially overlaps the workout contributes the
/// fraction of its count proportional to the overlapping duration.
fn apportion_steps(workout: &mut WorkoutRecord, samples: &[StepSample]) {
    if samples.is_empty() {
        return;
    }
    let from = samples
        .partition_point(|s| s.start < workout.start)
        .saturating_sub(1);

    let mut total_steps = 0.0;
    for sample in &samples[from..] {
        if sample.start > workout.end {
            break;
        }
        if sample.end < workout.start {
            continue;
        }
        let overlap_start = sample.start.max(workout.start);
        let overlap_end = sample.end.min(workout.end);
        let overlap_ms = (overlap_end - overlap_start).num_milliseconds();
        let sample_ms = (sample.end - sample.start).num_milliseconds();
        if sample_ms > 0 && overlap_ms >= 0 {
            total_steps += sample.count * (overlap_ms as f64 / sample_ms as f64);
        } else if overlap_ms >= 0 {
            // Zero-length bucket inside the window counts in full.
            total_steps += sample.count;
        }
    }

    if workout.duration_min > 0.0 && total_steps > 0.0 {
        workout.cadence_spm = Some((total_steps / workout.duration_min).round() as u32);
    }
}
