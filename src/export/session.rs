//! Parse session: chunk sourcing, configuration and the run loop
//!
//! A session pulls fixed-size chunks from a [`ChunkSource`], feeds them
//! through the [`ChunkDriver`](super::driver) state machine, then hands the
//! accumulated collections to the correlator. Each invocation owns its
//! accumulators exclusively; nothing is shared across runs.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, info};

use super::correlate::correlate;
use super::driver::{ChunkDriver, Harvest};
use super::error::ExportError;
use super::models::{ParseMode, Progress, WorkoutRecord};
use super::scan::RUNNING_WORKOUT_MARKER;

/// Fixed chunk size for file reads: a throughput/memory tradeoff constant,
/// not derived from input size.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Bound of the progress queue; updates beyond it are dropped, never blocked
/// on.
const PROGRESS_QUEUE_LEN: usize = 64;

/// A seekable byte source delivering chunks by offset and length.
///
/// The parser never does file I/O itself, it only sequences calls to this
/// trait.
pub trait ChunkSource {
    /// Total length of the source in bytes
    fn len(&self) -> io::Result<u64>;

    /// Read up to `len` bytes starting at `offset`.
    ///
    /// A short read near end-of-input is fine; an empty read means the
    /// source is exhausted.
    fn read_chunk(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>>;

    /// Whether the source is empty
    fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// File-backed chunk source
pub struct FileChunkSource {
    file: File,
    len: u64,
}

impl FileChunkSource {
    /// Open a file for chunked reading
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }
}

impl ChunkSource for FileChunkSource {
    fn len(&self) -> io::Result<u64> {
        Ok(self.len)
    }

    fn read_chunk(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            let n = self.file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf)
    }
}

/// In-memory chunk source, mostly useful for tests and small inputs
impl ChunkSource for &[u8] {
    fn len(&self) -> io::Result<u64> {
        Ok(<[u8]>::len(self) as u64)
    }

    fn read_chunk(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let start = (offset as usize).min(<[u8]>::len(self));
        let end = (start + len).min(<[u8]>::len(self));
        Ok(self[start..end].to_vec())
    }
}

/// Configuration for a parse run
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Which record families to scan for
    pub mode: ParseMode,

    /// Chunk size for source reads
    pub chunk_size: usize,

    /// Attribute-value markers identifying workout elements of interest.
    /// Defaults to running workouts only; callers may supply any
    /// `workoutActivityType` markers.
    pub workout_markers: Vec<String>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            mode: ParseMode::Detailed,
            chunk_size: DEFAULT_CHUNK_SIZE,
            workout_markers: vec![RUNNING_WORKOUT_MARKER.to_string()],
        }
    }
}

impl ParserConfig {
    /// Workouts only, no time-series samples
    pub fn fast() -> Self {
        Self {
            mode: ParseMode::Fast,
            ..Self::default()
        }
    }

    /// Workouts plus heart-rate and step samples (default)
    pub fn detailed() -> Self {
        Self::default()
    }
}

/// One-shot streaming parser for a health export.
///
/// ```no_run
/// use hkexport::export::{ExportParser, ParserConfig};
///
/// let parser = ExportParser::new(ParserConfig::default());
/// let workouts = parser.parse_file("export.xml")?;
/// println!("{} workouts", workouts.len());
/// # Ok::<(), hkexport::export::ExportError>(())
/// ```
pub struct ExportParser {
    config: ParserConfig,
    progress: Option<Sender<Progress>>,
    cancel: Option<Arc<AtomicBool>>,
}

impl ExportParser {
    /// Create a parser with the given configuration
    pub fn new(config: ParserConfig) -> Self {
        Self {
            config,
            progress: None,
            cancel: None,
        }
    }

    /// Attach a progress channel.
    ///
    /// Updates are sent best-effort after each chunk; a slow consumer loses
    /// updates rather than stalling the parse.
    pub fn with_progress(mut self, progress: Sender<Progress>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Attach a cancellation flag, checked between chunks.
    ///
    /// Chunk processing itself is not preemptible; setting the flag aborts
    /// before the next chunk is requested.
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Parse a file from disk
    pub fn parse_file<P: AsRef<Path>>(&self, path: P) -> Result<Vec<WorkoutRecord>, ExportError> {
        let mut source = FileChunkSource::open(path)?;
        self.parse(&mut source)
    }

    /// Run one parse over a chunk source.
    ///
    /// Exactly two outcomes are possible: the complete, correlated,
    /// chronologically sorted record set, or a single terminal error. Records
    /// failing their own required-field checks are dropped, never raised.
    pub fn parse<S: ChunkSource>(&self, source: &mut S) -> Result<Vec<WorkoutRecord>, ExportError> {
        let total = source.len()?;
        let mut driver = ChunkDriver::new(self.config.mode, &self.config.workout_markers);
        let mut harvest = Harvest::default();

        let mut offset = 0u64;
        while offset < total {
            if self.is_cancelled() {
                return Err(ExportError::Cancelled);
            }
            let want = self.config.chunk_size.min((total - offset) as usize);
            let chunk = source.read_chunk(offset, want)?;
            if chunk.is_empty() {
                break;
            }
            offset += chunk.len() as u64;
            driver.push_chunk(&chunk, &mut harvest);

            let counts = harvest.counts();
            debug!(
                "consumed {}/{} bytes: {} workouts, {} hr, {} steps",
                offset, total, counts.workouts, counts.hr_records, counts.step_records
            );
            self.report(offset, total, &harvest);
        }
        driver.finish(&mut harvest);

        let counts = harvest.counts();
        info!(
            "parse complete: {} workouts, {} hr records, {} step records",
            counts.workouts, counts.hr_records, counts.step_records
        );

        Ok(correlate(
            harvest.workouts,
            harvest.hr_samples,
            harvest.step_samples,
            self.config.mode,
        ))
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn report(&self, offset: u64, total: u64, harvest: &Harvest) {
        let Some(progress) = &self.progress else {
            return;
        };
        let fraction_complete = if total == 0 {
            1.0
        } else {
            offset as f64 / total as f64
        };
        // Best-effort: a full or disconnected queue drops the update.
        let _ = progress.try_send(Progress {
            fraction_complete,
            counts: harvest.counts(),
        });
    }
}

/// Message stream of a background parse: progress updates terminated by
/// exactly one `Finished` or `Failed`.
#[derive(Debug)]
pub enum ParseEvent {
    /// Periodic progress update, best-effort
    Progress(Progress),
    /// Terminal success carrying the complete record set
    Finished(Vec<WorkoutRecord>),
    /// Terminal failure with a human-readable description
    Failed(String),
}

/// Run a parse on a worker thread, returning its event stream.
///
/// Single writer, single reader: one parse session feeds one listener.
/// Partial results are never emitted alongside a failure.
pub fn spawn_parse<S>(config: ParserConfig, mut source: S) -> Receiver<ParseEvent>
where
    S: ChunkSource + Send + 'static,
{
    let (tx, rx) = unbounded();
    let (progress_tx, progress_rx) = bounded::<Progress>(PROGRESS_QUEUE_LEN);

    let forward_tx = tx.clone();
    std::thread::spawn(move || {
        for update in progress_rx {
            if forward_tx.send(ParseEvent::Progress(update)).is_err() {
                break;
            }
        }
    });

    std::thread::spawn(move || {
        let parser = ExportParser::new(config).with_progress(progress_tx);
        let outcome = parser.parse(&mut source);
        // Dropping the parser closes the progress queue, so the forwarder
        // terminates; buffered updates may still interleave with the
        // terminal message.
        drop(parser);
        let terminal = match outcome {
            Ok(records) => ParseEvent::Finished(records),
            Err(err) => ParseEvent::Failed(err.to_string()),
        };
        let _ = tx.send(terminal);
    });

    rx
}
