//! Event replay → projection pipeline.
//!
//! The [`Projector`] is the only writer of projection tables. It applies
//! one event at a time with insert-if-absent / delete-if-present semantics
//! on the set-like tables (votes, follows), so applying the same event
//! sequence to a fresh store always lands on the same state.
//!
//! Users have no creation event of their own: a user row appears the first
//! time an event mentions the user (as the recipient of a served timeline
//! or the actor of an accepted action).

pub mod query;

use rusqlite::{params, Connection};

use crate::error::StoreError;
use crate::event::{
    ActionData, ActionStatus, ActionType, Event, EventPayload, TimelineServedData,
};
use crate::event::canonicalize_json;
use crate::ident;
use crate::store::{self, Store};

/// Applies events to the projection tables.
pub struct Projector<'conn> {
    conn: &'conn Connection,
}

impl<'conn> Projector<'conn> {
    /// Create a projector backed by the given connection.
    #[must_use]
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Apply a single event. Pure over the projection state: no I/O
    /// outside the provided connection.
    ///
    /// # Errors
    ///
    /// Returns an error on a SQLite fault or a malformed accepted action.
    pub fn apply(&self, event: &Event) -> Result<(), StoreError> {
        match &event.payload {
            EventPayload::RunStarted(data) => {
                self.conn.execute(
                    "UPDATE sim_meta \
                     SET run_id = ?1, current_tick = MAX(current_tick, ?2) \
                     WHERE id = 1",
                    params![data.run_id, data.started_tick],
                )?;
            }
            EventPayload::RunConfig(data) => {
                self.conn.execute(
                    "UPDATE sim_meta \
                     SET run_id = ?1, seed = ?2, ranking_algorithm = ?3, k = ?4, \
                         ticks = ?5, agents = ?6 \
                     WHERE id = 1",
                    params![
                        data.run_id,
                        data.seed,
                        data.ranking_algorithm.as_str(),
                        data.k,
                        data.ticks,
                        data.agents
                    ],
                )?;
            }
            EventPayload::AdvanceTick(data) => {
                self.conn.execute(
                    "UPDATE sim_meta SET current_tick = ?1 WHERE id = 1",
                    params![data.new_tick],
                )?;
            }
            EventPayload::TimelineServed(data) => self.apply_timeline(event.tick, data)?,
            EventPayload::Action(data) => self.apply_action(event.tick, data)?,
        }
        Ok(())
    }

    fn apply_timeline(&self, tick: i64, data: &TimelineServedData) -> Result<(), StoreError> {
        self.ensure_user(&data.user_id, tick)?;
        self.conn.execute(
            "INSERT INTO timelines \
             (timeline_id, user_id, tick, algorithm, k, seed, ranking_version) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                data.timeline_id,
                data.user_id,
                tick,
                data.algorithm.as_str(),
                data.k,
                data.seed,
                data.ranking_version
            ],
        )?;
        for item in &data.items {
            let features = canonicalize_json(&serde_json::to_value(&item.features)?);
            self.conn.execute(
                "INSERT INTO timeline_items \
                 (timeline_id, position, post_id, score, features_blob) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![data.timeline_id, item.position, item.post_id, item.score, features],
            )?;
        }
        Ok(())
    }

    fn apply_action(&self, tick: i64, data: &ActionData) -> Result<(), StoreError> {
        if data.status == ActionStatus::Rejected {
            // Kept in the log only; projections never see rejected actions.
            return Ok(());
        }

        match data.action_type {
            ActionType::Post => {
                let post_id = ident::post_id(&data.op_id);
                self.ensure_user(&data.actor_id, tick)?;
                self.conn.execute(
                    "INSERT INTO posts (post_id, author_id, body, created_tick, up_votes) \
                     VALUES (?1, ?2, ?3, ?4, 0)",
                    params![post_id, data.actor_id, required(data, data.body.as_deref())?, tick],
                )?;
            }
            ActionType::Comment => {
                let comment_id = ident::comment_id(&data.op_id);
                self.ensure_user(&data.actor_id, tick)?;
                self.conn.execute(
                    "INSERT INTO comments (comment_id, post_id, author_id, body, created_tick) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        comment_id,
                        required(data, data.target_post_id.as_deref())?,
                        data.actor_id,
                        required(data, data.body.as_deref())?,
                        tick
                    ],
                )?;
            }
            ActionType::Like => {
                self.ensure_user(&data.actor_id, tick)?;
                let inserted = self.conn.execute(
                    "INSERT OR IGNORE INTO votes (user_id, post_id, tick) VALUES (?1, ?2, ?3)",
                    params![data.actor_id, required(data, data.target_post_id.as_deref())?, tick],
                )?;
                if inserted > 0 {
                    self.conn.execute(
                        "UPDATE posts SET up_votes = up_votes + 1 WHERE post_id = ?1",
                        params![required(data, data.target_post_id.as_deref())?],
                    )?;
                }
            }
            ActionType::Unlike => {
                let deleted = self.conn.execute(
                    "DELETE FROM votes WHERE user_id = ?1 AND post_id = ?2",
                    params![data.actor_id, required(data, data.target_post_id.as_deref())?],
                )?;
                if deleted > 0 {
                    self.conn.execute(
                        "UPDATE posts SET up_votes = MAX(up_votes - 1, 0) WHERE post_id = ?1",
                        params![required(data, data.target_post_id.as_deref())?],
                    )?;
                }
            }
            ActionType::Follow => {
                let followee = required(data, data.target_user_id.as_deref())?;
                self.ensure_user(&data.actor_id, tick)?;
                self.ensure_user(followee, tick)?;
                self.conn.execute(
                    "INSERT OR IGNORE INTO follows (follower_id, followee_id, tick) \
                     VALUES (?1, ?2, ?3)",
                    params![data.actor_id, followee, tick],
                )?;
            }
            ActionType::Unfollow => {
                self.conn.execute(
                    "DELETE FROM follows WHERE follower_id = ?1 AND followee_id = ?2",
                    params![data.actor_id, required(data, data.target_user_id.as_deref())?],
                )?;
            }
        }
        Ok(())
    }

    /// Create a user row on first mention. Idempotent.
    fn ensure_user(&self, user_id: &str, tick: i64) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO users (user_id, created_tick) VALUES (?1, ?2)",
            params![user_id, tick],
        )?;
        Ok(())
    }
}

/// An accepted action is only appended after schema validation, so a
/// missing required field here means the log itself is inconsistent.
fn required<'a>(data: &ActionData, field: Option<&'a str>) -> Result<&'a str, StoreError> {
    field.ok_or(StoreError::PayloadMismatch {
        kind: data.action_type.as_str(),
    })
}

/// Drop all projections and rebuild them from the full event log in one
/// transaction. Returns the number of events replayed.
///
/// # Errors
///
/// Returns an error (and rolls back, leaving the previous projection
/// intact) on any SQLite fault, undecodable row, or unknown event kind.
pub fn replay_all(store: &Store) -> Result<usize, StoreError> {
    store.transaction(|conn| {
        conn.execute_batch(crate::store::schema::TRUNCATE_PROJECTIONS_SQL)?;

        let events = store::scan_from(conn, 0)?;
        let projector = Projector::new(conn);
        for event in &events {
            projector.apply(event)?;
        }

        tracing::info!(events = events.len(), "projection replay complete");
        Ok(events.len())
    })
}

/// Canonical blake3 hash of the entire projection state.
///
/// Rows are serialized as canonical JSON in a fixed table and key order,
/// so two stores hash equal exactly when their projections are
/// bit-identical.
///
/// # Errors
///
/// Returns an error on a SQLite fault.
pub fn state_hash(conn: &Connection) -> Result<String, StoreError> {
    let mut hasher = blake3::Hasher::new();

    hash_rows(conn, &mut hasher, "users", "SELECT user_id, created_tick FROM users ORDER BY user_id", |row| {
        Ok(serde_json::json!({
            "user_id": row.get::<_, String>(0)?,
            "created_tick": row.get::<_, i64>(1)?,
        }))
    })?;
    hash_rows(conn, &mut hasher, "posts", "SELECT post_id, author_id, body, created_tick, up_votes FROM posts ORDER BY post_id", |row| {
        Ok(serde_json::json!({
            "post_id": row.get::<_, String>(0)?,
            "author_id": row.get::<_, String>(1)?,
            "body": row.get::<_, String>(2)?,
            "created_tick": row.get::<_, i64>(3)?,
            "up_votes": row.get::<_, i64>(4)?,
        }))
    })?;
    hash_rows(conn, &mut hasher, "comments", "SELECT comment_id, post_id, author_id, body, created_tick FROM comments ORDER BY comment_id", |row| {
        Ok(serde_json::json!({
            "comment_id": row.get::<_, String>(0)?,
            "post_id": row.get::<_, String>(1)?,
            "author_id": row.get::<_, String>(2)?,
            "body": row.get::<_, String>(3)?,
            "created_tick": row.get::<_, i64>(4)?,
        }))
    })?;
    hash_rows(conn, &mut hasher, "votes", "SELECT user_id, post_id, tick FROM votes ORDER BY user_id, post_id", |row| {
        Ok(serde_json::json!({
            "user_id": row.get::<_, String>(0)?,
            "post_id": row.get::<_, String>(1)?,
            "tick": row.get::<_, i64>(2)?,
        }))
    })?;
    hash_rows(conn, &mut hasher, "follows", "SELECT follower_id, followee_id, tick FROM follows ORDER BY follower_id, followee_id", |row| {
        Ok(serde_json::json!({
            "follower_id": row.get::<_, String>(0)?,
            "followee_id": row.get::<_, String>(1)?,
            "tick": row.get::<_, i64>(2)?,
        }))
    })?;
    hash_rows(conn, &mut hasher, "timelines", "SELECT timeline_id, user_id, tick, algorithm, k, seed, ranking_version FROM timelines ORDER BY timeline_id", |row| {
        Ok(serde_json::json!({
            "timeline_id": row.get::<_, String>(0)?,
            "user_id": row.get::<_, String>(1)?,
            "tick": row.get::<_, i64>(2)?,
            "algorithm": row.get::<_, String>(3)?,
            "k": row.get::<_, i64>(4)?,
            "seed": row.get::<_, i64>(5)?,
            "ranking_version": row.get::<_, i64>(6)?,
        }))
    })?;
    hash_rows(conn, &mut hasher, "timeline_items", "SELECT timeline_id, position, post_id, score, features_blob FROM timeline_items ORDER BY timeline_id, position", |row| {
        Ok(serde_json::json!({
            "timeline_id": row.get::<_, String>(0)?,
            "position": row.get::<_, i64>(1)?,
            "post_id": row.get::<_, String>(2)?,
            "score": row.get::<_, f64>(3)?,
            "features_blob": row.get::<_, String>(4)?,
        }))
    })?;
    hash_rows(conn, &mut hasher, "sim_meta", "SELECT current_tick, run_id, seed, ranking_algorithm, k, ticks, agents FROM sim_meta WHERE id = 1", |row| {
        Ok(serde_json::json!({
            "current_tick": row.get::<_, i64>(0)?,
            "run_id": row.get::<_, Option<String>>(1)?,
            "seed": row.get::<_, Option<i64>>(2)?,
            "ranking_algorithm": row.get::<_, Option<String>>(3)?,
            "k": row.get::<_, Option<i64>>(4)?,
            "ticks": row.get::<_, Option<i64>>(5)?,
            "agents": row.get::<_, Option<i64>>(6)?,
        }))
    })?;

    Ok(hasher.finalize().to_hex().to_string())
}

fn hash_rows(
    conn: &Connection,
    hasher: &mut blake3::Hasher,
    table: &str,
    sql: &str,
    to_value: impl Fn(&rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value>,
) -> Result<(), StoreError> {
    hasher.update(table.as_bytes());
    hasher.update(b"\n");
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| to_value(row))?;
    for row in rows {
        hasher.update(canonicalize_json(&row?).as_bytes());
        hasher.update(b"\n");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{
        ActionStatus, ActionType, AdvanceTickData, EventKind, ItemFeatures, RunConfigData,
        RunStartedData, TimelineItem,
    };
    use crate::rank::Algorithm;
    use crate::store::append_event;

    fn test_store() -> Store {
        let store = Store::open_in_memory().expect("open in-memory store");
        store.init(false).expect("init schema");
        store
    }

    fn action(op_id: &str, actor: &str, action_type: ActionType) -> ActionData {
        ActionData {
            op_id: op_id.into(),
            actor_id: actor.into(),
            action_type,
            timeline_id: None,
            position: None,
            target_post_id: None,
            target_user_id: None,
            body: None,
            status: ActionStatus::Accepted,
            reason: None,
        }
    }

    fn accepted_post(op_id: &str, actor: &str, body: &str) -> EventPayload {
        let mut data = action(op_id, actor, ActionType::Post);
        data.body = Some(body.into());
        EventPayload::Action(data)
    }

    fn accepted_like(op_id: &str, actor: &str, post_id: &str) -> EventPayload {
        let mut data = action(op_id, actor, ActionType::Like);
        data.target_post_id = Some(post_id.into());
        data.timeline_id = Some("tl-test".into());
        data.position = Some(0);
        EventPayload::Action(data)
    }

    fn apply(store: &Store, tick: i64, payload: &EventPayload) -> Event {
        store
            .transaction(|conn| {
                let event = append_event(conn, tick, payload)?;
                Projector::new(conn).apply(&event)?;
                Ok(event)
            })
            .expect("append + apply")
    }

    #[test]
    fn accepted_post_creates_post_and_author() {
        let store = test_store();
        apply(&store, 2, &accepted_post("op-1", "u1", "hello world"));

        let post_id = ident::post_id("op-1");
        let (author, body, tick, ups): (String, String, i64, i64) = store
            .conn()
            .query_row(
                "SELECT author_id, body, created_tick, up_votes FROM posts WHERE post_id = ?1",
                params![post_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .unwrap();
        assert_eq!(author, "u1");
        assert_eq!(body, "hello world");
        assert_eq!(tick, 2);
        assert_eq!(ups, 0);

        let user_tick: i64 = store
            .conn()
            .query_row(
                "SELECT created_tick FROM users WHERE user_id = 'u1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(user_tick, 2, "author created on first mention");
    }

    #[test]
    fn rejected_actions_touch_nothing() {
        let store = test_store();
        let mut data = action("op-r", "u1", ActionType::Post);
        data.body = Some("never lands".into());
        data.status = ActionStatus::Rejected;
        data.reason = Some(crate::event::RejectReason::Malformed);
        apply(&store, 1, &EventPayload::Action(data));

        let posts: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))
            .unwrap();
        let users: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(posts, 0);
        assert_eq!(users, 0);
    }

    #[test]
    fn like_increments_and_unlike_decrements() {
        let store = test_store();
        apply(&store, 1, &accepted_post("op-p", "author", "post"));
        let post_id = ident::post_id("op-p");

        apply(&store, 2, &accepted_like("op-l1", "u1", &post_id));
        apply(&store, 2, &accepted_like("op-l2", "u2", &post_id));
        assert_eq!(
            query::post_up_votes(store.conn(), &post_id).unwrap(),
            Some(2)
        );

        let mut unlike = action("op-u1", "u1", ActionType::Unlike);
        unlike.target_post_id = Some(post_id.clone());
        unlike.timeline_id = Some("tl-test".into());
        unlike.position = Some(0);
        apply(&store, 3, &EventPayload::Action(unlike));

        assert_eq!(
            query::post_up_votes(store.conn(), &post_id).unwrap(),
            Some(1)
        );
        assert!(!query::has_vote(store.conn(), "u1", &post_id).unwrap());
        assert!(query::has_vote(store.conn(), "u2", &post_id).unwrap());
    }

    #[test]
    fn replaying_a_like_twice_counts_once() {
        // Insert-if-absent keeps up_votes equal to the vote-row count even
        // if the same accepted like is applied twice.
        let store = test_store();
        apply(&store, 1, &accepted_post("op-p", "author", "post"));
        let post_id = ident::post_id("op-p");

        let like = accepted_like("op-l", "u1", &post_id);
        let event = apply(&store, 2, &like);
        Projector::new(store.conn()).apply(&event).unwrap();

        assert_eq!(
            query::post_up_votes(store.conn(), &post_id).unwrap(),
            Some(1)
        );
    }

    #[test]
    fn unlike_without_vote_is_a_noop() {
        let store = test_store();
        apply(&store, 1, &accepted_post("op-p", "author", "post"));
        let post_id = ident::post_id("op-p");

        let mut unlike = action("op-u", "u1", ActionType::Unlike);
        unlike.target_post_id = Some(post_id.clone());
        unlike.timeline_id = Some("tl-test".into());
        unlike.position = Some(0);
        apply(&store, 2, &EventPayload::Action(unlike));

        assert_eq!(
            query::post_up_votes(store.conn(), &post_id).unwrap(),
            Some(0),
            "up_votes never goes below zero"
        );
    }

    #[test]
    fn follow_and_unfollow_maintain_the_edge_set() {
        let store = test_store();
        let mut follow = action("op-f", "u1", ActionType::Follow);
        follow.target_user_id = Some("u2".into());
        apply(&store, 1, &EventPayload::Action(follow.clone()));
        assert!(query::has_follow(store.conn(), "u1", "u2").unwrap());

        // Second identical edge insert is ignored.
        let mut follow2 = follow.clone();
        follow2.op_id = "op-f2".into();
        apply(&store, 2, &EventPayload::Action(follow2));
        let edges: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM follows", [], |row| row.get(0))
            .unwrap();
        assert_eq!(edges, 1);

        let mut unfollow = action("op-uf", "u1", ActionType::Unfollow);
        unfollow.target_user_id = Some("u2".into());
        apply(&store, 3, &EventPayload::Action(unfollow));
        assert!(!query::has_follow(store.conn(), "u1", "u2").unwrap());
    }

    #[test]
    fn comment_rows_reference_their_post() {
        let store = test_store();
        apply(&store, 1, &accepted_post("op-p", "author", "post"));
        let post_id = ident::post_id("op-p");

        let mut comment = action("op-c", "u1", ActionType::Comment);
        comment.target_post_id = Some(post_id.clone());
        comment.timeline_id = Some("tl-test".into());
        comment.position = Some(0);
        comment.body = Some("nice".into());
        apply(&store, 2, &EventPayload::Action(comment));

        let (cid, body): (String, String) = store
            .conn()
            .query_row(
                "SELECT comment_id, body FROM comments WHERE post_id = ?1",
                params![post_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(cid, ident::comment_id("op-c"));
        assert_eq!(body, "nice");
    }

    #[test]
    fn timeline_served_inserts_timeline_and_items() {
        let store = test_store();
        apply(&store, 1, &accepted_post("op-p", "author", "post"));
        let post_id = ident::post_id("op-p");

        let payload = EventPayload::TimelineServed(TimelineServedData {
            timeline_id: "tl-1".into(),
            user_id: "u1".into(),
            k: 3,
            algorithm: Algorithm::Hot,
            ranking_version: 1,
            seed: 42,
            items: vec![TimelineItem {
                post_id: post_id.clone(),
                position: 0,
                score: 0.0,
                features: ItemFeatures {
                    score: 0.0,
                    up_votes: 0,
                    age: 0,
                    algorithm: Algorithm::Hot,
                    ranking_version: 1,
                },
            }],
        });
        apply(&store, 1, &payload);

        assert_eq!(
            query::timeline_user(store.conn(), "tl-1").unwrap().as_deref(),
            Some("u1")
        );
        assert_eq!(
            query::exposed_post_at(store.conn(), "tl-1", 0)
                .unwrap()
                .as_deref(),
            Some(post_id.as_str())
        );
        assert!(query::exposed_post_at(store.conn(), "tl-1", 1)
            .unwrap()
            .is_none());
        assert_eq!(query::timeline_count(store.conn()).unwrap(), 1);
    }

    #[test]
    fn run_events_update_meta_only() {
        let store = test_store();
        apply(
            &store,
            0,
            &EventPayload::RunStarted(RunStartedData {
                run_id: "run-x".into(),
                started_tick: 0,
            }),
        );
        apply(
            &store,
            0,
            &EventPayload::RunConfig(RunConfigData {
                run_id: "run-x".into(),
                seed: 42,
                agents: 4,
                ranking_algorithm: Algorithm::Hot,
                k: 3,
                ticks: 5,
            }),
        );
        apply(
            &store,
            1,
            &EventPayload::AdvanceTick(AdvanceTickData { new_tick: 1 }),
        );

        assert_eq!(store.current_tick().unwrap(), 1);
        let (run, seed): (Option<String>, Option<i64>) = store
            .conn()
            .query_row("SELECT run_id, seed FROM sim_meta WHERE id = 1", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(run.as_deref(), Some("run-x"));
        assert_eq!(seed, Some(42));

        let users: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(users, 0, "run events do not create users");
    }

    #[test]
    fn replay_all_matches_incremental_state() {
        let store = test_store();
        apply(&store, 1, &accepted_post("op-p", "author", "post"));
        let post_id = ident::post_id("op-p");
        apply(&store, 2, &accepted_like("op-l", "u1", &post_id));
        apply(
            &store,
            3,
            &EventPayload::AdvanceTick(AdvanceTickData { new_tick: 3 }),
        );

        let before = state_hash(store.conn()).unwrap();
        let replayed = replay_all(&store).unwrap();
        let after = state_hash(store.conn()).unwrap();

        assert_eq!(replayed, 3);
        assert_eq!(before, after, "replay must reproduce incremental state");
    }

    #[test]
    fn replay_aborts_on_unknown_kind_and_keeps_old_state() {
        let store = test_store();
        apply(&store, 1, &accepted_post("op-p", "author", "post"));
        let before = state_hash(store.conn()).unwrap();

        store
            .conn()
            .execute(
                "INSERT INTO events (tick, kind, payload) VALUES (1, 'mystery', '{}')",
                [],
            )
            .unwrap();

        let err = replay_all(&store).unwrap_err();
        assert!(matches!(err, StoreError::UnknownEventKind(_)));
        assert_eq!(
            state_hash(store.conn()).unwrap(),
            before,
            "failed replay must roll back"
        );
    }

    #[test]
    fn state_hash_distinguishes_states() {
        let store_a = test_store();
        let store_b = test_store();
        assert_eq!(
            state_hash(store_a.conn()).unwrap(),
            state_hash(store_b.conn()).unwrap(),
            "empty stores hash equal"
        );

        apply(&store_a, 1, &accepted_post("op-p", "author", "post"));
        assert_ne!(
            state_hash(store_a.conn()).unwrap(),
            state_hash(store_b.conn()).unwrap()
        );
    }

    #[test]
    fn event_kind_tag_matches_payload_kind() {
        let payload = accepted_post("op-p", "author", "post");
        assert_eq!(payload.kind(), EventKind::Action);
    }
}
