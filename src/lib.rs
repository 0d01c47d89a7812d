//! # hkexport - Streaming Health-Export Workout Parser
//!
//! `hkexport` extracts structured running-workout records, and optionally
//! heart-rate and step time-series samples, from large Apple-Health style
//! XML exports. The export is consumed in fixed-size chunks and elements are
//! located by indexed substring search, so multi-gigabyte files parse in
//! bounded memory.
//!
//! ## Key properties
//!
//! - **Streaming**: fixed 8 MiB chunks with explicit carry-over state across
//!   chunk boundaries; chunk placement never changes the output.
//! - **Tolerant**: consumer health exports are messy. Records missing
//!   required fields are dropped, unknown statistics are ignored, and a
//!   truncated trailing workout is extracted best-effort.
//! - **Normalized**: durations in minutes, distances in miles, energy in
//!   kcal, regardless of the units the export used.
//! - **Correlated**: in detailed mode, heart-rate and step samples are
//!   joined to each workout's time window by binary search, deriving
//!   avg/min/max heart rate and cadence where the export omitted them.
//!
//! ## Quick start
//!
//! ```no_run
//! use hkexport::export::{ExportParser, ParserConfig};
//!
//! let parser = ExportParser::new(ParserConfig::default());
//! let workouts = parser.parse_file("export.xml")?;
//! for workout in &workouts {
//!     println!(
//!         "{}: {:.2} mi in {:.1} min",
//!         workout.start, workout.distance_mi, workout.duration_min
//!     );
//! }
//! # Ok::<(), hkexport::export::ExportError>(())
//! ```
//!
//! ## Background parsing
//!
//! For large files the parse can run on a worker thread, delivering progress
//! and a single terminal message over a channel:
//!
//! ```no_run
//! use hkexport::export::{spawn_parse, FileChunkSource, ParseEvent, ParserConfig};
//!
//! let source = FileChunkSource::open("export.xml")?;
//! for event in spawn_parse(ParserConfig::default(), source) {
//!     match event {
//!         ParseEvent::Progress(p) => eprintln!("{:.0}%", p.fraction_complete * 100.0),
//!         ParseEvent::Finished(workouts) => println!("{} workouts", workouts.len()),
//!         ParseEvent::Failed(message) => eprintln!("parse failed: {message}"),
//!     }
//! }
//! # Ok::<(), std::io::Error>(())
//! ```

pub mod export;

pub use export::{
    spawn_parse, ChunkSource, ExportError, ExportParser, FileChunkSource, Harvest,
    HeartRateSample, ParseCounts, ParseEvent, ParseMode, ParserConfig, Progress, StepSample,
    WorkoutEvent, WorkoutRecord, WorkoutStats,
};
