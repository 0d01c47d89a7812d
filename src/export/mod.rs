//! # Health Export Parser Module
//!
//! Streaming, incremental extraction of workout records from an Apple-Health
//! style XML export. The file is consumed in fixed-size chunks and elements
//! are located by indexed substring search, so arbitrarily large exports are
//! parsed without ever holding the document in memory.
//!
//! ## Export structure
//!
//! ```text
//! HealthData
//! ├── Record*            (heart-rate, step-count, many others)
//! └── Workout*
//!     ├── MetadataEntry* (HKIndoorWorkout among them)
//!     ├── WorkoutEvent*  (pauses, segments)
//!     └── WorkoutStatistics*
//! ```
//!
//! ## Pipeline
//!
//! 1. The session pulls chunks from a [`ChunkSource`].
//! 2. The chunk driver locates complete `<Workout>` and `<Record>` elements,
//!    carrying partial elements across chunk boundaries.
//! 3. The extractors produce typed, unit-normalized records.
//! 4. The correlator joins heart-rate and step samples to workout windows
//!    and derives missing statistics.

mod correlate;
mod dates;
mod driver;
mod error;
mod models;
mod record;
mod scan;
mod session;
mod workout;

#[cfg(test)]
mod tests;

pub use dates::parse_health_date;
pub use driver::Harvest;
pub use error::ExportError;
pub use models::{
    HeartRateSample, ParseCounts, ParseMode, Progress, StepSample, WorkoutEvent, WorkoutRecord,
    WorkoutStats,
};
pub use scan::{HEART_RATE_MARKER, RUNNING_WORKOUT_MARKER, STEP_COUNT_MARKER};
pub use session::{
    spawn_parse, ChunkSource, ExportParser, FileChunkSource, ParseEvent, ParserConfig,
    DEFAULT_CHUNK_SIZE,
};
