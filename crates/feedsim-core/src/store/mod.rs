//! SQLite-backed event log and projection store.
//!
//! Runtime defaults are intentionally conservative:
//! - `journal_mode = WAL` to allow concurrent readers while the single
//!   writer appends
//! - `busy_timeout = 5s` to ride out transient lock contention
//! - `foreign_keys = ON` to protect relational integrity in projections
//!
//! The write path (`append_event`, the reducer, admission) runs inside
//! `BEGIN IMMEDIATE` transactions taken through [`Store::transaction`];
//! partial appends never persist.

pub mod schema;

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::StoreError;
use crate::event::{Event, EventKind, EventPayload};

/// Busy timeout for store connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to an open feedsim database.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database file and apply runtime pragmas.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or configured.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        configure_connection(&conn)?;
        tracing::debug!(path = %path.display(), "opened store");
        Ok(Self { conn })
    }

    /// In-memory store for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the connection.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    /// Borrow the underlying connection for read-only queries.
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Whether the event log schema exists.
    ///
    /// # Errors
    ///
    /// Returns an error on a SQLite fault.
    pub fn is_initialized(&self) -> Result<bool, StoreError> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'events')",
            [],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Create the event + projection schema.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyInitialized`] if the schema exists and
    /// `force` is false. With `force`, all tables (events included) are
    /// dropped and recreated.
    pub fn init(&self, force: bool) -> Result<(), StoreError> {
        if self.is_initialized()? {
            if !force {
                return Err(StoreError::AlreadyInitialized);
            }
            self.conn.execute_batch(schema::DROP_ALL_SQL)?;
            tracing::info!("dropped existing schema (force init)");
        }
        self.conn.execute_batch(schema::EVENTS_SQL)?;
        self.conn.execute_batch(schema::PROJECTIONS_SQL)?;
        tracing::info!("initialized store schema");
        Ok(())
    }

    /// Run `body` inside a `BEGIN IMMEDIATE` transaction.
    ///
    /// Commits on `Ok`, rolls back on any error path. The closure gets the
    /// raw connection so it can compose appends, reducer application, and
    /// queries atomically.
    ///
    /// # Errors
    ///
    /// Propagates the closure's error (after rollback) or a commit fault.
    pub fn transaction<T>(
        &self,
        body: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match body(&self.conn) {
            Ok(value) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(err) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(err)
            }
        }
    }

    /// Append a single event outside any managed transaction.
    ///
    /// A lone `INSERT` is atomic on its own; multi-statement writers go
    /// through [`Store::transaction`] and call [`append_event`] directly.
    ///
    /// # Errors
    ///
    /// Returns an error on a SQLite fault, including an `op_id` collision.
    pub fn append(&self, tick: i64, payload: &EventPayload) -> Result<Event, StoreError> {
        append_event(&self.conn, tick, payload)
    }

    /// Scan events in ascending `seq` order starting after `from_seq`.
    ///
    /// # Errors
    ///
    /// Returns an error on a SQLite fault or an undecodable row.
    pub fn scan_from(&self, from_seq: i64) -> Result<Vec<Event>, StoreError> {
        scan_from(&self.conn, from_seq)
    }

    /// The most recent `limit` events in ascending `seq` order, optionally
    /// filtered by kind.
    ///
    /// # Errors
    ///
    /// Returns an error on a SQLite fault or an undecodable row.
    pub fn recent_events(
        &self,
        limit: i64,
        kind: Option<EventKind>,
    ) -> Result<Vec<Event>, StoreError> {
        let mut events = match kind {
            Some(kind) => {
                let mut stmt = self.conn.prepare(
                    "SELECT seq, tick, kind, payload, op_id FROM events \
                     WHERE kind = ?1 ORDER BY seq DESC LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![kind.as_str(), limit], row_to_raw)?;
                decode_rows(rows)?
            }
            None => {
                let mut stmt = self.conn.prepare(
                    "SELECT seq, tick, kind, payload, op_id FROM events \
                     ORDER BY seq DESC LIMIT ?1",
                )?;
                let rows = stmt.query_map(params![limit], row_to_raw)?;
                decode_rows(rows)?
            }
        };
        events.reverse();
        Ok(events)
    }

    /// Delete all projection rows; the event log is untouched.
    ///
    /// # Errors
    ///
    /// Returns an error on a SQLite fault.
    pub fn truncate_projections(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(schema::TRUNCATE_PROJECTIONS_SQL)?;
        Ok(())
    }

    /// The current logical tick.
    ///
    /// # Errors
    ///
    /// Returns an error on a SQLite fault.
    pub fn current_tick(&self) -> Result<i64, StoreError> {
        current_tick(&self.conn)
    }

    /// The `seq` high-water mark (0 for an empty log).
    ///
    /// # Errors
    ///
    /// Returns an error on a SQLite fault.
    pub fn head_seq(&self) -> Result<i64, StoreError> {
        let head: Option<i64> =
            self.conn
                .query_row("SELECT MAX(seq) FROM events", [], |row| row.get(0))?;
        Ok(head.unwrap_or(0))
    }
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

/// Append an event on the given connection and return it with its assigned
/// `seq`. Action payloads get their `op_id` mirrored into the unique
/// column; the UNIQUE constraint enforces log-wide idempotency-key
/// uniqueness inside the surrounding transaction.
///
/// # Errors
///
/// Returns an error on a SQLite fault or payload encoding failure.
pub fn append_event(
    conn: &Connection,
    tick: i64,
    payload: &EventPayload,
) -> Result<Event, StoreError> {
    let encoded = payload.to_canonical_json()?;
    let op_id = payload.op_id().map(str::to_owned);
    conn.execute(
        "INSERT INTO events (tick, kind, payload, op_id) VALUES (?1, ?2, ?3, ?4)",
        params![tick, payload.kind().as_str(), encoded, op_id],
    )?;
    let seq = conn.last_insert_rowid();
    Ok(Event {
        seq,
        tick,
        kind: payload.kind(),
        payload: payload.clone(),
        op_id,
    })
}

/// Look up the action event carrying `op_id`, if any.
///
/// # Errors
///
/// Returns an error on a SQLite fault or an undecodable row.
pub fn find_action(conn: &Connection, op_id: &str) -> Result<Option<Event>, StoreError> {
    let raw = conn
        .query_row(
            "SELECT seq, tick, kind, payload, op_id FROM events WHERE op_id = ?1",
            params![op_id],
            row_to_raw,
        )
        .optional()?;
    raw.map(decode_raw).transpose()
}

/// Scan events with `seq > from_seq` in ascending order.
///
/// # Errors
///
/// Returns an error on a SQLite fault or an undecodable row.
pub fn scan_from(conn: &Connection, from_seq: i64) -> Result<Vec<Event>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT seq, tick, kind, payload, op_id FROM events WHERE seq > ?1 ORDER BY seq",
    )?;
    let rows = stmt.query_map(params![from_seq], row_to_raw)?;
    decode_rows(rows)
}

/// Read the current tick from `sim_meta`.
///
/// # Errors
///
/// Returns an error on a SQLite fault.
pub fn current_tick(conn: &Connection) -> Result<i64, StoreError> {
    let tick: i64 = conn.query_row(
        "SELECT current_tick FROM sim_meta WHERE id = 1",
        [],
        |row| row.get(0),
    )?;
    Ok(tick)
}

/// Read the active run id, if a `run_started` event has been applied.
///
/// # Errors
///
/// Returns an error on a SQLite fault.
pub fn run_id(conn: &Connection) -> Result<Option<String>, StoreError> {
    let id: Option<String> =
        conn.query_row("SELECT run_id FROM sim_meta WHERE id = 1", [], |row| {
            row.get(0)
        })?;
    Ok(id)
}

type RawRow = (i64, i64, String, String, Option<String>);

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn decode_raw((seq, tick, kind, payload, op_id): RawRow) -> Result<Event, StoreError> {
    let kind = EventKind::from_str(&kind)?;
    let payload = EventPayload::decode_for(kind, &payload)?;
    Ok(Event {
        seq,
        tick,
        kind,
        payload,
        op_id,
    })
}

fn decode_rows(
    rows: impl Iterator<Item = rusqlite::Result<RawRow>>,
) -> Result<Vec<Event>, StoreError> {
    let mut events = Vec::new();
    for row in rows {
        events.push(decode_raw(row?)?);
    }
    Ok(events)
}
