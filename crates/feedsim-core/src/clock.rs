//! Monotonic tick clock driven by `advance_tick` events.

use rusqlite::Connection;

use crate::error::StoreError;
use crate::event::{AdvanceTickData, Event, EventPayload};
use crate::project::Projector;
use crate::store::{self, Store};

/// Advance the clock by one tick. Appends `advance_tick` with
/// `new_tick = current_tick + 1` and applies it, in one transaction.
/// Returns the new tick.
///
/// # Errors
///
/// Returns an error on a SQLite fault.
pub fn advance(store: &Store) -> Result<i64, StoreError> {
    store.transaction(|conn| {
        let current = store::current_tick(conn)?;
        let event = append_advance_tick(conn, current + 1)?;
        Ok(event.tick)
    })
}

/// Append an `advance_tick` event with an explicit target tick and apply
/// it. Direct log insertion, used by tests; the simulator goes through
/// [`advance`].
///
/// # Errors
///
/// Returns [`StoreError::TickRegression`] if `new_tick` is not exactly
/// one past the current tick. Nothing is appended in that case.
pub fn append_advance_tick(conn: &Connection, new_tick: i64) -> Result<Event, StoreError> {
    let current = store::current_tick(conn)?;
    if new_tick != current + 1 {
        return Err(StoreError::TickRegression {
            current,
            attempted: new_tick,
        });
    }
    let event = store::append_event(
        conn,
        new_tick,
        &EventPayload::AdvanceTick(AdvanceTickData { new_tick }),
    )?;
    Projector::new(conn).apply(&event)?;
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> Store {
        let store = Store::open_in_memory().expect("open in-memory store");
        store.init(false).expect("init schema");
        store
    }

    #[test]
    fn advance_increments_from_zero() {
        let store = test_store();
        assert_eq!(advance(&store).unwrap(), 1);
        assert_eq!(advance(&store).unwrap(), 2);
        assert_eq!(store.current_tick().unwrap(), 2);
    }

    #[test]
    fn stale_tick_is_a_regression_and_leaves_the_log_unchanged() {
        let store = test_store();
        advance(&store).unwrap();
        let head = store.head_seq().unwrap();

        let err = store
            .transaction(|conn| append_advance_tick(conn, 1))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::TickRegression {
                current: 1,
                attempted: 1
            }
        ));
        assert_eq!(store.head_seq().unwrap(), head);
        assert_eq!(store.current_tick().unwrap(), 1);
    }

    #[test]
    fn skipping_ahead_is_also_a_regression() {
        let store = test_store();
        let err = store
            .transaction(|conn| append_advance_tick(conn, 5))
            .unwrap_err();
        assert!(matches!(err, StoreError::TickRegression { .. }));
    }
}
