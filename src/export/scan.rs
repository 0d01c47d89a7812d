//! Substring-based tag scanning
//!
//! The export format is located by indexed substring search rather than a
//! general-purpose XML tokenizer: markers are attribute-value pairs that
//! identify the record families of interest, and tag boundaries are recovered
//! by scanning for the surrounding angle brackets.

/// Attribute-value marker identifying a heart-rate record
pub const HEART_RATE_MARKER: &str = r#"type="HKQuantityTypeIdentifierHeartRate""#;

/// Attribute-value marker identifying a step-count record
pub const STEP_COUNT_MARKER: &str = r#"type="HKQuantityTypeIdentifierStepCount""#;

/// Attribute-value marker identifying a running workout
pub const RUNNING_WORKOUT_MARKER: &str = r#"workoutActivityType="HKWorkoutActivityTypeRunning""#;

/// Find the earliest occurrence of any marker at or after `from`.
///
/// Returns the match offset and the index of the matched marker. Ties break
/// in favor of marker order; markers are mutually exclusive in well-formed
/// input so the tie-break is only a determinism guarantee.
pub(crate) fn find_nearest(buf: &str, from: usize, markers: &[&str]) -> Option<(usize, usize)> {
    let window = buf.get(from..)?;
    let mut best: Option<(usize, usize)> = None;
    for (idx, marker) in markers.iter().enumerate() {
        if let Some(pos) = window.find(marker) {
            let at = from + pos;
            match best {
                Some((found, _)) if found <= at => {}
                _ => best = Some((at, idx)),
            }
        }
    }
    best
}

/// Find the start of the tag enclosing a marker match.
///
/// Scans backward from the match for the previous `<`. `None` means the
/// element start lies before the current scan window; the caller must then
/// advance past the match rather than rescan, or it would loop forever.
pub(crate) fn enclosing_tag_start(buf: &str, marker_at: usize) -> Option<usize> {
    buf[..marker_at].rfind('<')
}

/// Extract a double-quoted attribute value from a tag fragment.
///
/// Returns `None` when the attribute is not present.
pub(crate) fn attr<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let needle_len = name.len() + 2;
    let start = tag.find(&format!("{name}=\"")).map(|p| p + needle_len)?;
    let end = tag[start..].find('"')? + start;
    Some(&tag[start..end])
}

/// Extract an attribute as a decimal number.
///
/// A missing attribute and unparseable numeric text both yield `None`:
/// invalid numbers are treated as missing data, never as a fatal error.
pub(crate) fn attr_f64(tag: &str, name: &str) -> Option<f64> {
    attr(tag, name)?.trim().parse().ok()
}

/// Largest index `<= at` that is a char boundary of `s`.
///
/// Offsets derived from byte arithmetic (tail trims, resume positions) must
/// be floored before slicing, as a chunk may end mid multi-byte sequence.
pub(crate) fn floor_char_boundary(s: &str, at: usize) -> usize {
    let mut at = at.min(s.len());
    while !s.is_char_boundary(at) {
        at -= 1;
    }
    at
}
