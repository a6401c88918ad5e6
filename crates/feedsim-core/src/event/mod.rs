//! Event data model for the feedsim log.
//!
//! An [`Event`] maps 1:1 to a row of the `events` table:
//!
//! ```text
//! seq | tick | kind | payload (canonical JSON) | op_id (actions only)
//! ```
//!
//! `seq` is assigned by the store at append and totally orders the log.
//! The payload column is decoded through the `kind` column because the
//! type discriminant is external to the JSON blob.

pub mod canonical;
pub mod kinds;
pub mod payload;

pub use canonical::canonicalize_json;
pub use kinds::EventKind;
pub use payload::{
    ActionData, ActionStatus, ActionType, AdvanceTickData, EventPayload, ItemFeatures,
    RejectReason, RunConfigData, RunStartedData, TimelineItem, TimelineServedData,
};

/// A single immutable entry of the append-only log.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Gapless, strictly increasing sequence number assigned at append.
    pub seq: i64,
    /// Logical tick at which the event occurred. Non-decreasing in `seq`
    /// order.
    pub tick: i64,
    /// The closed event kind tag.
    pub kind: EventKind,
    /// Typed payload matching `kind`.
    pub payload: EventPayload,
    /// Idempotency key; `Some` exactly for action events.
    pub op_id: Option<String>,
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} t{} {}", self.seq, self.tick, self.kind)?;
        match &self.payload {
            EventPayload::Action(a) => {
                write!(f, " {} by {} [{}]", a.action_type, a.actor_id, a.status)?;
                if let Some(reason) = a.reason {
                    write!(f, " ({reason})")?;
                }
                Ok(())
            }
            EventPayload::TimelineServed(t) => {
                write!(
                    f,
                    " {} for {} ({} items)",
                    t.algorithm,
                    t.user_id,
                    t.items.len()
                )
            }
            EventPayload::AdvanceTick(t) => write!(f, " -> {}", t.new_tick),
            EventPayload::RunStarted(r) => write!(f, " {}", r.run_id),
            EventPayload::RunConfig(c) => {
                write!(f, " seed={} agents={} k={}", c.seed, c.agents, c.k)
            }
        }
    }
}
