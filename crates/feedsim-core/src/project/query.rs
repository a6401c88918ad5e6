//! Read-side queries over the projection tables.
//!
//! All functions here are read-only; the [`super::Projector`] is the only
//! writer. Callers that need a consistent snapshot run these inside the
//! same transaction as their writes.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;

/// A post as seen by the ranker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidatePost {
    pub post_id: String,
    pub author_id: String,
    pub created_tick: i64,
    pub up_votes: i64,
}

/// The full candidate set for timeline ranking: every post, in stable
/// `post_id` order. Visibility filtering is an external concern.
///
/// # Errors
///
/// Returns an error on a SQLite fault.
pub fn candidate_posts(conn: &Connection) -> Result<Vec<CandidatePost>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT post_id, author_id, created_tick, up_votes FROM posts ORDER BY post_id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(CandidatePost {
            post_id: row.get(0)?,
            author_id: row.get(1)?,
            created_tick: row.get(2)?,
            up_votes: row.get(3)?,
        })
    })?;
    let mut posts = Vec::new();
    for row in rows {
        posts.push(row?);
    }
    Ok(posts)
}

/// Number of up-votes currently on a post, or `None` if it does not exist.
///
/// # Errors
///
/// Returns an error on a SQLite fault.
pub fn post_up_votes(conn: &Connection, post_id: &str) -> Result<Option<i64>, StoreError> {
    let votes = conn
        .query_row(
            "SELECT up_votes FROM posts WHERE post_id = ?1",
            params![post_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(votes)
}

/// The author of a post, or `None` if the post does not exist.
///
/// # Errors
///
/// Returns an error on a SQLite fault.
pub fn post_author(conn: &Connection, post_id: &str) -> Result<Option<String>, StoreError> {
    let author = conn
        .query_row(
            "SELECT author_id FROM posts WHERE post_id = ?1",
            params![post_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(author)
}

/// Whether `user_id` has an active vote on `post_id`.
///
/// # Errors
///
/// Returns an error on a SQLite fault.
pub fn has_vote(conn: &Connection, user_id: &str, post_id: &str) -> Result<bool, StoreError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM votes WHERE user_id = ?1 AND post_id = ?2)",
        params![user_id, post_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Whether the follow edge `follower -> followee` exists.
///
/// # Errors
///
/// Returns an error on a SQLite fault.
pub fn has_follow(
    conn: &Connection,
    follower_id: &str,
    followee_id: &str,
) -> Result<bool, StoreError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM follows WHERE follower_id = ?1 AND followee_id = ?2)",
        params![follower_id, followee_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// The owner of a served timeline, or `None` if the id is unknown.
///
/// # Errors
///
/// Returns an error on a SQLite fault.
pub fn timeline_user(conn: &Connection, timeline_id: &str) -> Result<Option<String>, StoreError> {
    let user = conn
        .query_row(
            "SELECT user_id FROM timelines WHERE timeline_id = ?1",
            params![timeline_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(user)
}

/// The post exposed at `position` of a timeline, or `None` if absent.
///
/// # Errors
///
/// Returns an error on a SQLite fault.
pub fn exposed_post_at(
    conn: &Connection,
    timeline_id: &str,
    position: i64,
) -> Result<Option<String>, StoreError> {
    let post = conn
        .query_row(
            "SELECT post_id FROM timeline_items WHERE timeline_id = ?1 AND position = ?2",
            params![timeline_id, position],
            |row| row.get(0),
        )
        .optional()?;
    Ok(post)
}

/// Number of timelines served so far; used as the next timeline counter.
///
/// # Errors
///
/// Returns an error on a SQLite fault.
pub fn timeline_count(conn: &Connection) -> Result<i64, StoreError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM timelines", [], |row| row.get(0))?;
    Ok(count)
}
