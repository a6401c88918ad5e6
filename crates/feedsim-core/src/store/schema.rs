//! Canonical SQLite schema: the append-only event log plus projections.
//!
//! The `events` table is the sole source of truth. Every other table is a
//! projection rebuilt by folding events and may be dropped at any time.
//! `sim_meta` is the single-row projection of global state (current tick,
//! run identity, recorded config) and is reset together with the other
//! projection tables.

/// Event log DDL. `seq` is gapless because rows are never deleted.
pub const EVENTS_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    tick INTEGER NOT NULL,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL,
    op_id TEXT UNIQUE
);

CREATE INDEX IF NOT EXISTS idx_events_kind_tick ON events(kind, tick);
CREATE INDEX IF NOT EXISTS idx_events_tick ON events(tick);
"#;

/// Projection DDL.
pub const PROJECTIONS_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY,
    created_tick INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS posts (
    post_id TEXT PRIMARY KEY,
    author_id TEXT NOT NULL REFERENCES users(user_id),
    body TEXT NOT NULL,
    created_tick INTEGER NOT NULL,
    up_votes INTEGER NOT NULL DEFAULT 0 CHECK (up_votes >= 0)
);

CREATE TABLE IF NOT EXISTS comments (
    comment_id TEXT PRIMARY KEY,
    post_id TEXT NOT NULL REFERENCES posts(post_id),
    author_id TEXT NOT NULL REFERENCES users(user_id),
    body TEXT NOT NULL,
    created_tick INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS votes (
    user_id TEXT NOT NULL REFERENCES users(user_id),
    post_id TEXT NOT NULL REFERENCES posts(post_id),
    tick INTEGER NOT NULL,
    PRIMARY KEY (user_id, post_id)
);

CREATE TABLE IF NOT EXISTS follows (
    follower_id TEXT NOT NULL REFERENCES users(user_id),
    followee_id TEXT NOT NULL REFERENCES users(user_id),
    tick INTEGER NOT NULL,
    PRIMARY KEY (follower_id, followee_id),
    CHECK (follower_id <> followee_id)
);

CREATE TABLE IF NOT EXISTS timelines (
    timeline_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(user_id),
    tick INTEGER NOT NULL,
    algorithm TEXT NOT NULL,
    k INTEGER NOT NULL,
    seed INTEGER NOT NULL,
    ranking_version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS timeline_items (
    timeline_id TEXT NOT NULL REFERENCES timelines(timeline_id),
    position INTEGER NOT NULL,
    post_id TEXT NOT NULL REFERENCES posts(post_id),
    score REAL NOT NULL,
    features_blob TEXT NOT NULL,
    PRIMARY KEY (timeline_id, position)
);

CREATE TABLE IF NOT EXISTS sim_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    current_tick INTEGER NOT NULL DEFAULT 0,
    run_id TEXT,
    seed INTEGER,
    ranking_algorithm TEXT,
    k INTEGER,
    ticks INTEGER,
    agents INTEGER
);

INSERT OR IGNORE INTO sim_meta (id, current_tick) VALUES (1, 0);

CREATE INDEX IF NOT EXISTS idx_posts_author ON posts(author_id);
CREATE INDEX IF NOT EXISTS idx_posts_tick ON posts(created_tick);
CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id);
CREATE INDEX IF NOT EXISTS idx_votes_post ON votes(post_id);
CREATE INDEX IF NOT EXISTS idx_follows_followee ON follows(followee_id);
CREATE INDEX IF NOT EXISTS idx_timelines_user ON timelines(user_id);
"#;

/// Drop everything, events included. Used by `init --force` only.
pub const DROP_ALL_SQL: &str = r#"
DROP TABLE IF EXISTS timeline_items;
DROP TABLE IF EXISTS timelines;
DROP TABLE IF EXISTS votes;
DROP TABLE IF EXISTS follows;
DROP TABLE IF EXISTS comments;
DROP TABLE IF EXISTS posts;
DROP TABLE IF EXISTS users;
DROP TABLE IF EXISTS sim_meta;
DROP TABLE IF EXISTS events;
"#;

/// Delete all projection rows and reset `sim_meta`. Never touches `events`.
pub const TRUNCATE_PROJECTIONS_SQL: &str = r#"
DELETE FROM timeline_items;
DELETE FROM timelines;
DELETE FROM votes;
DELETE FROM follows;
DELETE FROM comments;
DELETE FROM posts;
DELETE FROM users;
UPDATE sim_meta
SET current_tick = 0, run_id = NULL, seed = NULL, ranking_algorithm = NULL,
    k = NULL, ticks = NULL, agents = NULL
WHERE id = 1;
"#;

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::{EVENTS_SQL, PROJECTIONS_SQL};

    fn fresh_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        conn.execute_batch(EVENTS_SQL).expect("events ddl");
        conn.execute_batch(PROJECTIONS_SQL).expect("projection ddl");
        conn
    }

    #[test]
    fn schema_applies_cleanly_twice() {
        let conn = fresh_conn();
        conn.execute_batch(EVENTS_SQL).expect("idempotent events ddl");
        conn.execute_batch(PROJECTIONS_SQL)
            .expect("idempotent projection ddl");
    }

    #[test]
    fn op_id_unique_across_the_log() {
        let conn = fresh_conn();
        conn.execute(
            "INSERT INTO events (tick, kind, payload, op_id) VALUES (0, 'action', '{}', 'op-1')",
            [],
        )
        .unwrap();
        let dup = conn.execute(
            "INSERT INTO events (tick, kind, payload, op_id) VALUES (0, 'action', '{}', 'op-1')",
            [],
        );
        assert!(dup.is_err(), "duplicate op_id must be rejected");
    }

    #[test]
    fn null_op_ids_do_not_collide() {
        let conn = fresh_conn();
        for _ in 0..3 {
            conn.execute(
                "INSERT INTO events (tick, kind, payload) VALUES (0, 'advance_tick', '{}')",
                [],
            )
            .unwrap();
        }
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn self_follow_violates_check() {
        let conn = fresh_conn();
        conn.execute("INSERT INTO users (user_id, created_tick) VALUES ('u1', 0)", [])
            .unwrap();
        let result = conn.execute(
            "INSERT INTO follows (follower_id, followee_id, tick) VALUES ('u1', 'u1', 0)",
            [],
        );
        assert!(result.is_err(), "self-follow must violate the CHECK");
    }

    #[test]
    fn posts_require_an_existing_author() {
        let conn = fresh_conn();
        let result = conn.execute(
            "INSERT INTO posts (post_id, author_id, body, created_tick) \
             VALUES ('p1', 'ghost', 'hi', 0)",
            [],
        );
        assert!(result.is_err(), "foreign keys must be enforced");
    }

    #[test]
    fn sim_meta_is_seeded_with_tick_zero() {
        let conn = fresh_conn();
        let tick: i64 = conn
            .query_row("SELECT current_tick FROM sim_meta WHERE id = 1", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(tick, 0);
    }
}
