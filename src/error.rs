use std::io;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// All the ways an operation against an array can fail.
///
/// Variants are grouped to match the semantic error kinds in the design
/// notes (configuration, I/O, serialization, codec, expression, overflow,
/// state, cancellation) rather than by the module that raises them.
#[derive(Error, Debug)]
pub enum Error {
    // -- Configuration --
    /// A schema failed validation at create time.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    /// Referenced an attribute or dimension name that does not exist.
    #[error("unknown attribute or dimension: {0}")]
    UnknownName(String),
    /// A name exceeded `Config::name_max_len`.
    #[error("name exceeds maximum length: {0}")]
    NameTooLong(String),

    // -- I/O --
    /// Underlying storage backend failed.
    #[error("storage error: {0}")]
    Io(#[from] io::Error),
    /// A path expected to exist (fragment, schema, sentinel) was missing.
    #[error("not found: {0}")]
    NotFound(String),
    /// A read or write crossed a file's logical end unexpectedly.
    #[error("unexpected end of stream")]
    UnexpectedEof,

    // -- Serialization --
    /// Book-keeping or schema bytes were truncated or malformed.
    #[error("truncated or malformed data: {0}")]
    Truncated(String),
    /// The on-disk magic number did not match.
    #[error("bad magic number")]
    BadMagic,
    /// The on-disk version tag is newer than this implementation understands.
    #[error("unsupported schema version: {0}")]
    UnsupportedVersion(u32),

    // -- Codec --
    /// A compressor id has no registered implementation.
    #[error("codec not available: {0}")]
    CodecUnavailable(String),
    /// Compression or decompression failed inside the codec itself.
    #[error("codec failure: {0}")]
    CodecFailure(String),
    /// Decompressed output length did not match the recorded uncompressed size.
    #[error("decompressed size mismatch: expected {expected}, got {actual}")]
    SizeMismatch {
        /// Expected size recorded in book-keeping.
        expected: usize,
        /// Size actually produced.
        actual: usize,
    },
    /// A filter's stride did not evenly divide the tile length.
    #[error("filter stride {stride} does not divide buffer length {len}")]
    StrideMismatch {
        /// The filter's configured stride.
        stride: usize,
        /// The buffer length the filter was asked to operate on.
        len: usize,
    },

    // -- Expression --
    /// The expression text could not be parsed.
    #[error("expression parse error: {0}")]
    ExpressionParse(String),
    /// The expression evaluated to something other than a boolean.
    #[error("expression did not evaluate to a boolean")]
    ExpressionNotBoolean,
    /// A custom operator or function was used incorrectly (e.g. empty RHS of `&=`).
    #[error("expression operator misuse: {0}")]
    ExpressionMisuse(String),
    /// An operator was applied to a value type it does not support.
    #[error("unsupported operand type for operator {op}")]
    ExpressionTypeError {
        /// The offending operator or function name.
        op: String,
    },

    // -- Overflow --
    /// The caller's buffer was too small to hold the next cell; not fatal.
    #[error("buffer overflow on attribute {0}; re-read to continue")]
    Overflow(String),

    // -- State --
    /// The operation is not valid in the coordinator's or writer's current mode.
    #[error("invalid operation for current state: {0}")]
    InvalidState(String),

    // -- Cancellation --
    /// The async worker was asked to stop.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// True if this error represents a recoverable buffer overflow rather
    /// than a terminal failure.
    #[must_use]
    pub fn is_overflow(&self) -> bool {
        matches!(self, Error::Overflow(_))
    }
}
