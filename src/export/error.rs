/// Errors that can terminate a parse run
///
/// Per-record malformations never surface here: a record missing a required
/// field is dropped and parsing continues. Only whole-run failures abort.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// I/O error while reading a chunk from the source
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The run was cancelled between chunks via the cancellation flag
    #[error("parse cancelled")]
    Cancelled,
}
