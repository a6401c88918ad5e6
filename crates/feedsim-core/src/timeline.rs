//! Timeline service: build, record, and return a ranked view.
//!
//! Serving a timeline is itself an event. The served items are both
//! returned to the caller and written to the `timelines`/`timeline_items`
//! projections, which is what action admission later checks exposure
//! against. Everything happens in one write transaction, so a served
//! timeline is always consistent with the snapshot it was ranked over.

use crate::error::StoreError;
use crate::event::{EventPayload, TimelineItem, TimelineServedData};
use crate::ident;
use crate::project::{query, Projector};
use crate::rank::{self, Algorithm, RANKING_VERSION};
use crate::store::{self, Store};

/// A served timeline as returned to the agent.
#[derive(Debug, Clone, PartialEq)]
pub struct ServedTimeline {
    pub timeline_id: String,
    pub tick: i64,
    pub k: i64,
    pub items: Vec<TimelineItem>,
}

/// Serve a ranked timeline to `user_id` and record the exposure.
///
/// The timeline id is a pure function of (run, user, tick, algorithm,
/// seed) plus a counter recovered from the projection, so identical runs
/// serve identical ids.
///
/// # Errors
///
/// Returns an error on a SQLite fault; the transaction is rolled back and
/// no `timeline_served` event is recorded.
pub fn serve(
    store: &Store,
    user_id: &str,
    algorithm: Algorithm,
    k: i64,
    seed: i64,
) -> Result<ServedTimeline, StoreError> {
    store.transaction(|conn| {
        let tick = store::current_tick(conn)?;
        let run_id = store::run_id(conn)?.unwrap_or_default();
        let counter = query::timeline_count(conn)?;

        let candidates = query::candidate_posts(conn)?;
        let items = rank::rank(&candidates, algorithm, tick, seed, k);

        let timeline_id = ident::timeline_id(&run_id, user_id, tick, algorithm, seed, counter);
        let payload = EventPayload::TimelineServed(TimelineServedData {
            timeline_id: timeline_id.clone(),
            user_id: user_id.to_string(),
            k,
            algorithm,
            ranking_version: RANKING_VERSION,
            seed,
            items: items.clone(),
        });

        let event = store::append_event(conn, tick, &payload)?;
        Projector::new(conn).apply(&event)?;

        tracing::debug!(
            %timeline_id,
            user_id,
            tick,
            items = items.len(),
            "timeline served"
        );

        Ok(ServedTimeline {
            timeline_id,
            tick,
            k,
            items,
        })
    })
}
