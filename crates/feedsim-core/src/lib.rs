#![forbid(unsafe_code)]
//! feedsim-core: the event-log kernel of the feed simulator.
//!
//! Everything in this crate is driven by a single append-only event log.
//! Projection tables are a memoization of folding that log; dropping and
//! replaying them must reproduce bit-identical state. The write path is
//! logically single-writer: timeline serving, action admission, and tick
//! advancement each run inside one `BEGIN IMMEDIATE` transaction.
//!
//! # Conventions
//!
//! - **Errors**: structured [`error::StoreError`] values inside the kernel;
//!   `anyhow::Result` only at orchestration boundaries.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`).
//! - **Determinism**: no wall clocks, no process RNG. All randomness comes
//!   from seeds recorded in the log; all IDs are blake3-derived.

pub mod admission;
pub mod clock;
pub mod error;
pub mod event;
pub mod ident;
pub mod project;
pub mod rank;
pub mod store;
pub mod timeline;

pub use admission::{act, ActionOutcome, ActionRequest};
pub use error::StoreError;
pub use event::{ActionStatus, ActionType, Event, EventKind, EventPayload, RejectReason};
pub use rank::{Algorithm, RANKING_VERSION};
pub use store::Store;

/// Append an event and apply it to the projections in one transaction.
///
/// This is the write path used for run bookkeeping events (`run_started`,
/// `run_config`) that carry no validation of their own. Returns the
/// assigned sequence number.
///
/// # Errors
///
/// Returns an error if the append or projection fails; the transaction is
/// rolled back and the log is left untouched.
pub fn append_applied(
    store: &Store,
    tick: i64,
    payload: &EventPayload,
) -> Result<i64, StoreError> {
    store.transaction(|conn| {
        let event = store::append_event(conn, tick, payload)?;
        project::Projector::new(conn).apply(&event)?;
        Ok(event.seq)
    })
}
