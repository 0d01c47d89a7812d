//! Chunked stream driver
//!
//! The driver consumes the export as a sequence of text chunks and maintains
//! the carry-over state between them. It is a pure state machine: feeding it
//! chunks emits records into a [`Harvest`] with no I/O of its own, so chunk
//! boundary handling can be tested in isolation.
//!
//! Two states exist. In `Scanning` the pending buffer is searched for the
//! nearest marker and complete elements are extracted in place. When a
//! `<Workout>` start is seen but its close tag has not arrived, the driver
//! moves to `AwaitingWorkoutClose` and accumulates chunks until it does.

use log::trace;

use super::models::{HeartRateSample, ParseCounts, ParseMode, StepSample, WorkoutRecord};
use super::record::{extract_heart_rate, extract_steps};
use super::scan::{
    enclosing_tag_start, find_nearest, floor_char_boundary, HEART_RATE_MARKER, STEP_COUNT_MARKER,
};
use super::workout::extract_workout;

/// Buffer tail retained when a scan exhausts the pending buffer without a
/// match. Long enough that a tag boundary split across two chunks is never
/// lost, short enough to bound memory.
pub(crate) const RETAINED_TAIL_LEN: usize = 512;

const WORKOUT_CLOSE: &str = "</Workout>";
const RECORD_CLOSE: &str = "</Record>";
const SELF_CLOSE: &str = "/>";

/// The three growing collections accumulated during one parse run.
///
/// Owned exclusively by the run; a fresh instance is created per invocation
/// so no state leaks across parses.
#[derive(Debug, Default)]
pub struct Harvest {
    /// Extracted workouts, unsorted until correlation
    pub workouts: Vec<WorkoutRecord>,

    /// Heart-rate samples (detailed mode only), consumed by the correlator
    pub hr_samples: Vec<HeartRateSample>,

    /// Step samples (detailed mode only), consumed by the correlator
    pub step_samples: Vec<StepSample>,
}

impl Harvest {
    /// Running counts for progress reporting
    pub fn counts(&self) -> ParseCounts {
        ParseCounts {
            workouts: self.workouts.len(),
            hr_records: self.hr_samples.len(),
            step_records: self.step_samples.len(),
        }
    }
}

/// Driver state between chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Normal buffer search
    Scanning,
    /// A workout start was found but its close tag has not arrived
    AwaitingWorkoutClose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerKind {
    Workout,
    HeartRate,
    Step,
}

/// Chunk-to-chunk carry-over state for one parse run
#[derive(Debug)]
struct ParseState {
    state: ScanState,
    /// Buffer scanned in `Scanning` state
    pending: String,
    /// From-element-start text of a still-open workout
    accumulator: String,
    /// Resume offset for the close-tag search over the accumulator
    accumulator_scanned: usize,
    /// Trailing bytes of an incomplete UTF-8 sequence at a chunk boundary
    utf8_carry: Vec<u8>,
}

impl ParseState {
    fn new() -> Self {
        Self {
            state: ScanState::Scanning,
            pending: String::new(),
            accumulator: String::new(),
            accumulator_scanned: 0,
            utf8_carry: Vec::new(),
        }
    }
}

/// The chunk-consuming state machine
pub(crate) struct ChunkDriver {
    mode: ParseMode,
    workout_markers: Vec<String>,
    state: ParseState,
}

impl ChunkDriver {
    pub(crate) fn new(mode: ParseMode, workout_markers: &[String]) -> Self {
        Self {
            mode,
            workout_markers: workout_markers.to_vec(),
            state: ParseState::new(),
        }
    }

    /// Consume one chunk, emitting completed records into `out`
    pub(crate) fn push_chunk(&mut self, chunk: &[u8], out: &mut Harvest) {
        let text = self.decode_chunk(chunk);
        self.absorb(&text, out);
    }

    /// Consume end-of-input.
    ///
    /// A leftover pending buffer gets one final scan pass. A non-empty
    /// accumulator means the final `</Workout>` never arrived (truncated
    /// file); extraction is attempted on the accumulator as-is.
    pub(crate) fn finish(mut self, out: &mut Harvest) {
        if !self.state.utf8_carry.is_empty() {
            let tail = std::mem::take(&mut self.state.utf8_carry);
            let text = String::from_utf8_lossy(&tail).into_owned();
            self.absorb(&text, out);
        }
        match self.state.state {
            ScanState::Scanning => self.scan_pending(out),
            ScanState::AwaitingWorkoutClose => {
                if !self.state.accumulator.is_empty() {
                    trace!("input ended inside an open workout, extracting best-effort");
                    if let Some(workout) = extract_workout(&self.state.accumulator) {
                        out.workouts.push(workout);
                    }
                }
            }
        }
    }

    fn absorb(&mut self, text: &str, out: &mut Harvest) {
        match self.state.state {
            ScanState::AwaitingWorkoutClose => {
                self.state.accumulator.push_str(text);
                self.try_close_workout(out);
                if self.state.state == ScanState::Scanning {
                    self.scan_pending(out);
                }
            }
            ScanState::Scanning => {
                self.state.pending.push_str(text);
                self.scan_pending(out);
            }
        }
    }

    /// Search the accumulator for the workout close tag.
    ///
    /// On success the completed fragment is extracted and the remainder is
    /// fed back into the pending buffer.
    fn try_close_workout(&mut self, out: &mut Harvest) {
        let from = self.state.accumulator_scanned;
        match self.state.accumulator[from..].find(WORKOUT_CLOSE) {
            Some(pos) => {
                let end = from + pos + WORKOUT_CLOSE.len();
                let remainder = self.state.accumulator.split_off(end);
                if let Some(workout) = extract_workout(&self.state.accumulator) {
                    out.workouts.push(workout);
                }
                self.state.accumulator.clear();
                self.state.accumulator_scanned = 0;
                self.state.pending.push_str(&remainder);
                self.state.state = ScanState::Scanning;
            }
            None => {
                // Overlap by the close-tag length so a tag split across the
                // next chunk boundary is still found.
                let resume = self
                    .state
                    .accumulator
                    .len()
                    .saturating_sub(WORKOUT_CLOSE.len() - 1);
                self.state.accumulator_scanned =
                    floor_char_boundary(&self.state.accumulator, resume);
            }
        }
    }

    /// Repeatedly scan the pending buffer for the nearest marker and extract
    /// complete elements until the buffer is exhausted or a workout stays
    /// open.
    fn scan_pending(&mut self, out: &mut Harvest) {
        let markers = self.marker_set();
        let refs: Vec<&str> = markers.iter().map(String::as_str).collect();
        let workout_marker_count = self.workout_markers.len();

        let mut from = 0usize;
        loop {
            let Some((at, idx)) = find_nearest(&self.state.pending, from, &refs) else {
                self.trim_pending(from);
                return;
            };
            let kind = marker_kind(idx, workout_marker_count);

            let Some(tag_start) = enclosing_tag_start(&self.state.pending, at) else {
                // Element start not yet in buffer: advance past the match.
                from = at + refs[idx].len();
                continue;
            };

            match kind {
                MarkerKind::Workout => {
                    match self.state.pending[tag_start..].find(WORKOUT_CLOSE) {
                        Some(pos) => {
                            let end = tag_start + pos + WORKOUT_CLOSE.len();
                            if let Some(workout) =
                                extract_workout(&self.state.pending[tag_start..end])
                            {
                                out.workouts.push(workout);
                            }
                            from = end;
                        }
                        None => {
                            // Stash the open workout and stop scanning this
                            // buffer; the close tag arrives in a later chunk.
                            self.state.accumulator = self.state.pending[tag_start..].to_string();
                            let resume = self
                                .state
                                .accumulator
                                .len()
                                .saturating_sub(WORKOUT_CLOSE.len() - 1);
                            self.state.accumulator_scanned =
                                floor_char_boundary(&self.state.accumulator, resume);
                            self.state.pending.clear();
                            self.state.state = ScanState::AwaitingWorkoutClose;
                            return;
                        }
                    }
                }
                MarkerKind::HeartRate | MarkerKind::Step => {
                    match record_end(&self.state.pending, at) {
                        Some(end) => {
                            let fragment = &self.state.pending[tag_start..end];
                            match kind {
                                MarkerKind::HeartRate => {
                                    if let Some(sample) = extract_heart_rate(fragment) {
                                        out.hr_samples.push(sample);
                                    }
                                }
                                MarkerKind::Step => {
                                    if let Some(sample) = extract_steps(fragment) {
                                        out.step_samples.push(sample);
                                    }
                                }
                                MarkerKind::Workout => {}
                            }
                            from = end;
                        }
                        None => {
                            // Terminator not in the buffer yet. Keep the
                            // whole element so the next chunk completes it.
                            self.state.pending.drain(..tag_start);
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Discard consumed and marker-free buffer text, keeping a bounded tail.
    ///
    /// Everything before `consumed` has been extracted; everything after it
    /// was scanned without a match, so only the retained tail can still
    /// matter once more data arrives.
    fn trim_pending(&mut self, consumed: usize) {
        let len = self.state.pending.len();
        let cut = consumed.max(len.saturating_sub(RETAINED_TAIL_LEN));
        let cut = floor_char_boundary(&self.state.pending, cut);
        if cut > 0 {
            self.state.pending.drain(..cut);
        }
    }

    /// Marker set for the current mode: fast mode looks for workouts only,
    /// detailed mode additionally for heart-rate and step records.
    fn marker_set(&self) -> Vec<String> {
        let mut markers = self.workout_markers.clone();
        if self.mode == ParseMode::Detailed {
            markers.push(HEART_RATE_MARKER.to_string());
            markers.push(STEP_COUNT_MARKER.to_string());
        }
        markers
    }

    /// Decode a chunk, carrying a trailing incomplete UTF-8 sequence over to
    /// the next chunk. Invalid interior bytes are replaced lossily.
    fn decode_chunk(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.state.utf8_carry);
        bytes.extend_from_slice(chunk);
        let err = match String::from_utf8(bytes) {
            Ok(text) => return text,
            Err(err) => err,
        };
        let incomplete_tail = err.utf8_error().error_len().is_none();
        let valid_up_to = err.utf8_error().valid_up_to();
        let mut bytes = err.into_bytes();
        if incomplete_tail {
            self.state.utf8_carry = bytes.split_off(valid_up_to);
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

fn marker_kind(idx: usize, workout_marker_count: usize) -> MarkerKind {
    if idx < workout_marker_count {
        MarkerKind::Workout
    } else if idx == workout_marker_count {
        MarkerKind::HeartRate
    } else {
        MarkerKind::Step
    }
}

/// End offset of a record element: the nearer of a self-closing `/>` or an
/// explicit `</Record>` after the marker match.
fn record_end(buf: &str, marker_at: usize) -> Option<usize> {
    let rest = &buf[marker_at..];
    let self_close = rest
        .find(SELF_CLOSE)
        .map(|p| marker_at + p + SELF_CLOSE.len());
    let explicit = rest
        .find(RECORD_CLOSE)
        .map(|p| marker_at + p + RECORD_CLOSE.len());
    match (self_close, explicit) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(end), None) | (None, Some(end)) => Some(end),
        (None, None) => None,
    }
}
