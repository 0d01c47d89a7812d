//! Extraction of self-contained `<Record>` and `<WorkoutEvent>` fragments

use super::dates::parse_health_date;
use super::models::{HeartRateSample, StepSample, WorkoutEvent};
use super::scan::{attr, attr_f64};

/// Extract a heart-rate sample from a bounded `<Record>` fragment.
///
/// The sample is kept only if both `value` and `startDate` parse.
pub(crate) fn extract_heart_rate(fragment: &str) -> Option<HeartRateSample> {
    let bpm = attr_f64(fragment, "value")?;
    let timestamp = parse_health_date(attr(fragment, "startDate")?)?;
    Some(HeartRateSample { timestamp, bpm })
}

/// Extract a step-count sample from a bounded `<Record>` fragment.
///
/// The sample is kept only if `value`, `startDate` and `endDate` all parse.
pub(crate) fn extract_steps(fragment: &str) -> Option<StepSample> {
    let count = attr_f64(fragment, "value")?;
    let start = parse_health_date(attr(fragment, "startDate")?)?;
    let end = parse_health_date(attr(fragment, "endDate")?)?;
    Some(StepSample { start, end, count })
}

/// Extract a workout event from a `<WorkoutEvent>` tag.
///
/// Some export versions name the date attribute `dateInterval`; both are
/// accepted. Events whose date fails to parse are skipped.
pub(crate) fn extract_event(tag: &str) -> Option<WorkoutEvent> {
    let kind = attr(tag, "type")?.to_string();
    let raw = attr(tag, "date").or_else(|| attr(tag, "dateInterval"))?;
    let timestamp = parse_health_date(raw)?;
    Some(WorkoutEvent { kind, timestamp })
}
