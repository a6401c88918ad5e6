//! Action admission: validate, idempotency-check, exposure-tie-check,
//! record, apply.
//!
//! Admission runs entirely inside one `BEGIN IMMEDIATE` transaction so
//! that op_id uniqueness, exposure checks, and projection mutation are
//! atomic. Every decision is recorded: accepted actions mutate the
//! projections, rejected ones are appended to the log with their reason
//! so replay reproduces them. A repeated op_id is neither: it returns
//! the originally recorded outcome without touching the log.

use rusqlite::Connection;

use crate::error::StoreError;
use crate::event::{ActionData, ActionStatus, ActionType, EventPayload, RejectReason};
use crate::project::{query, Projector};
use crate::store::{self, Store};

/// A candidate action proposed by an agent.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    /// Caller-supplied idempotency key, unique across the log.
    pub op_id: String,
    pub actor_id: String,
    pub action_type: ActionType,
    pub timeline_id: Option<String>,
    pub position: Option<i64>,
    pub target_post_id: Option<String>,
    pub target_user_id: Option<String>,
    pub body: Option<String>,
}

/// The admission decision for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionOutcome {
    /// Sequence number of the action event (the original one, for
    /// idempotent replays).
    pub seq: i64,
    pub status: ActionStatus,
    pub reason: Option<RejectReason>,
    /// True when this op_id had already been admitted and the stored
    /// outcome was returned without appending anything.
    pub idempotent_replay: bool,
}

impl ActionOutcome {
    #[must_use]
    pub fn accepted(&self) -> bool {
        self.status == ActionStatus::Accepted
    }
}

/// Admit an action. See the module docs for the pipeline.
///
/// # Errors
///
/// Returns an error only on store faults; every validation failure is a
/// recorded rejection, not an error.
pub fn act(store: &Store, request: &ActionRequest) -> Result<ActionOutcome, StoreError> {
    store.transaction(|conn| admit(conn, request))
}

fn admit(conn: &Connection, request: &ActionRequest) -> Result<ActionOutcome, StoreError> {
    // 1. Idempotency: a known op_id returns its prior outcome verbatim.
    if let Some(prior) = store::find_action(conn, &request.op_id)? {
        let EventPayload::Action(data) = prior.payload else {
            return Err(StoreError::PayloadMismatch { kind: "action" });
        };
        tracing::debug!(op_id = %request.op_id, "idempotent replay of recorded outcome");
        return Ok(ActionOutcome {
            seq: prior.seq,
            status: data.status,
            reason: data.reason,
            idempotent_replay: true,
        });
    }

    // 2–4. Validation; the first failure wins.
    let reason = validate(conn, request)?;
    let status = match reason {
        None => ActionStatus::Accepted,
        Some(_) => ActionStatus::Rejected,
    };

    // 5. Record the decision and, if accepted, apply it.
    let tick = store::current_tick(conn)?;
    let payload = EventPayload::Action(ActionData {
        op_id: request.op_id.clone(),
        actor_id: request.actor_id.clone(),
        action_type: request.action_type,
        timeline_id: request.timeline_id.clone(),
        position: request.position,
        target_post_id: request.target_post_id.clone(),
        target_user_id: request.target_user_id.clone(),
        body: request.body.clone(),
        status,
        reason,
    });
    let event = store::append_event(conn, tick, &payload)?;
    Projector::new(conn).apply(&event)?;

    if let Some(reason) = reason {
        tracing::debug!(
            op_id = %request.op_id,
            actor = %request.actor_id,
            action = %request.action_type,
            %reason,
            "action rejected"
        );
    }

    Ok(ActionOutcome {
        seq: event.seq,
        status,
        reason,
        idempotent_replay: false,
    })
}

fn validate(
    conn: &Connection,
    request: &ActionRequest,
) -> Result<Option<RejectReason>, StoreError> {
    // 2. Schema shape.
    if let Some(reason) = shape_violation(request) {
        return Ok(Some(reason));
    }

    // 3. Exposure tie: the action must reference a timeline previously
    //    served to this actor, with the target post at the stated position.
    if request.action_type.requires_exposure() {
        let (Some(timeline_id), Some(position), Some(target)) = (
            request.timeline_id.as_deref(),
            request.position,
            request.target_post_id.as_deref(),
        ) else {
            return Ok(Some(RejectReason::Malformed));
        };

        match query::timeline_user(conn, timeline_id)? {
            Some(owner) if owner == request.actor_id => {}
            _ => return Ok(Some(RejectReason::OffFeed)),
        }
        match query::exposed_post_at(conn, timeline_id, position)? {
            Some(exposed) if exposed == target => {}
            _ => return Ok(Some(RejectReason::OffFeed)),
        }
    }

    // 4. Semantic rules over the current projection snapshot.
    match request.action_type {
        ActionType::Post => {}
        ActionType::Comment => {
            if request.body.as_deref().unwrap_or("").is_empty() {
                return Ok(Some(RejectReason::EmptyBody));
            }
        }
        ActionType::Like => {
            let target = request.target_post_id.as_deref().unwrap_or("");
            if query::has_vote(conn, &request.actor_id, target)? {
                return Ok(Some(RejectReason::DuplicateVote));
            }
        }
        ActionType::Unlike => {
            let target = request.target_post_id.as_deref().unwrap_or("");
            if !query::has_vote(conn, &request.actor_id, target)? {
                return Ok(Some(RejectReason::NoSuchVote));
            }
        }
        ActionType::Follow => {
            let target = request.target_user_id.as_deref().unwrap_or("");
            if target == request.actor_id {
                return Ok(Some(RejectReason::SelfFollow));
            }
            if query::has_follow(conn, &request.actor_id, target)? {
                return Ok(Some(RejectReason::DuplicateFollow));
            }
        }
        ActionType::Unfollow => {
            let target = request.target_user_id.as_deref().unwrap_or("");
            if !query::has_follow(conn, &request.actor_id, target)? {
                return Ok(Some(RejectReason::NoSuchFollow));
            }
        }
    }

    Ok(None)
}

/// Required/forbidden field matrix per action type.
fn shape_violation(request: &ActionRequest) -> Option<RejectReason> {
    let malformed = match request.action_type {
        // Posts are unsolicited: a body and no exposure reference.
        ActionType::Post => request.body.is_none() || request.timeline_id.is_some(),
        ActionType::Comment => {
            request.timeline_id.is_none()
                || request.position.is_none()
                || request.target_post_id.is_none()
                || request.body.is_none()
        }
        ActionType::Like | ActionType::Unlike => {
            request.timeline_id.is_none()
                || request.position.is_none()
                || request.target_post_id.is_none()
        }
        ActionType::Follow | ActionType::Unfollow => request.target_user_id.is_none(),
    };
    malformed.then_some(RejectReason::Malformed)
}
