//! Structured kernel errors.
//!
//! Admission-time rejections (`off_feed`, `duplicate_vote`, ...) are NOT
//! errors: they are recorded outcomes, see [`crate::event::RejectReason`].
//! Everything here is either fatal (persistence fault, programmer error)
//! or a condition the driver must decide on (`AlreadyInitialized`).

/// Errors surfaced by the store, reducer, and kernel services.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying SQLite fault. Fatal; the current transaction is rolled
    /// back and the error bubbles to the driver.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored payload failed to encode or decode. Fatal: the log is the
    /// source of truth and must never be silently skipped over.
    #[error("payload encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem fault while opening the database.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// `init` was called on a database that already has an event log.
    #[error("database already initialized (use force to recreate)")]
    AlreadyInitialized,

    /// An event row carries a kind outside the closed tag set. Replaying
    /// past it would corrupt the projection, so this aborts replay.
    #[error("unknown event kind '{0}'")]
    UnknownEventKind(String),

    /// A stored event's payload shape disagrees with its kind column.
    #[error("payload does not match event kind '{kind}'")]
    PayloadMismatch { kind: &'static str },

    /// Ranking algorithm tag outside {new, top, hot}. Programmer error.
    #[error("unknown ranking algorithm '{0}'")]
    UnknownAlgorithm(String),

    /// An `advance_tick` event was appended out of order. Programmer
    /// error; only reachable through direct log insertion.
    #[error("tick regression: current tick is {current}, attempted {attempted}")]
    TickRegression { current: i64, attempted: i64 },
}
