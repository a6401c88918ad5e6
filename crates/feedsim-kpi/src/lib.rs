#![forbid(unsafe_code)]
//! feedsim-kpi: read-only KPI metrics over the projections.
//!
//! A strictly read-side consumer: it never writes, and everything it
//! reports can be recomputed from the event log by replaying first. The
//! headline metrics are inequality (Gini over attention) and diversity
//! (Shannon entropy over crude topics).

use std::collections::BTreeMap;

use rusqlite::Connection;
use serde::Serialize;

use feedsim_core::event::{ActionStatus, EventPayload};
use feedsim_core::{Store, StoreError};

/// Gini coefficient of a value distribution: 0 is perfect equality,
/// 1 is perfect inequality.
#[must_use]
pub fn gini(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mut cumsum = 0.0;
    for (i, v) in sorted.iter().enumerate() {
        cumsum += (2.0 * (i as f64 + 1.0) - n as f64 - 1.0) * v;
    }

    let mean = sorted.iter().sum::<f64>() / n as f64;
    if mean == 0.0 {
        return 0.0;
    }
    cumsum / (n as f64 * n as f64 * mean)
}

/// Shannon entropy of a count distribution, in bits.
#[must_use]
pub fn entropy(counts: &[u64]) -> f64 {
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return 0.0;
    }

    let mut h = 0.0;
    for &c in counts {
        if c > 0 {
            let p = c as f64 / total as f64;
            h -= p * p.log2();
        }
    }
    h
}

/// Basic projection row counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KpiCounts {
    pub posts: i64,
    pub users: i64,
    pub votes: i64,
    pub comments: i64,
    pub follows: i64,
}

/// Accepted/rejected action split with per-reason rejection counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActionBreakdown {
    pub accepted: i64,
    pub rejected: i64,
    pub rejection_reasons: BTreeMap<String, i64>,
}

/// The full KPI report, serializable for `kpis --json-output`.
#[derive(Debug, Clone, Serialize)]
pub struct KpiReport {
    pub counts: KpiCounts,
    pub actions: ActionBreakdown,
    pub attention_gini: f64,
    pub author_attention_gini: f64,
    pub topic_entropy: f64,
}

/// Compute all KPIs from the store's current projections and log.
///
/// # Errors
///
/// Returns an error on a SQLite fault or an undecodable event row.
pub fn compute_kpis(store: &Store) -> Result<KpiReport, StoreError> {
    let conn = store.conn();
    Ok(KpiReport {
        counts: counts(conn)?,
        actions: action_breakdown(store)?,
        attention_gini: attention_gini(conn)?,
        author_attention_gini: author_attention_gini(conn)?,
        topic_entropy: topic_entropy(conn)?,
    })
}

fn counts(conn: &Connection) -> Result<KpiCounts, StoreError> {
    let count = |table: &str| -> Result<i64, StoreError> {
        let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })?;
        Ok(n)
    };
    Ok(KpiCounts {
        posts: count("posts")?,
        users: count("users")?,
        votes: count("votes")?,
        comments: count("comments")?,
        follows: count("follows")?,
    })
}

/// Action outcomes are read from the log, not the projections: rejected
/// actions leave no projection trace by design.
fn action_breakdown(store: &Store) -> Result<ActionBreakdown, StoreError> {
    let mut breakdown = ActionBreakdown::default();
    for event in store.scan_from(0)? {
        let EventPayload::Action(data) = event.payload else {
            continue;
        };
        match data.status {
            ActionStatus::Accepted => breakdown.accepted += 1,
            ActionStatus::Rejected => {
                breakdown.rejected += 1;
                let reason = data
                    .reason
                    .map_or_else(|| "unknown".to_string(), |r| r.as_str().to_string());
                *breakdown.rejection_reasons.entry(reason).or_insert(0) += 1;
            }
        }
    }
    Ok(breakdown)
}

/// Gini over per-post engagement (votes + comments).
///
/// # Errors
///
/// Returns an error on a SQLite fault.
pub fn attention_gini(conn: &Connection) -> Result<f64, StoreError> {
    let engagements = engagement_rows(
        conn,
        "SELECT p.up_votes + COALESCE(c.comment_count, 0)
         FROM posts p
         LEFT JOIN (
             SELECT post_id, COUNT(*) AS comment_count FROM comments GROUP BY post_id
         ) c ON p.post_id = c.post_id",
    )?;
    Ok(gini(&engagements))
}

/// Gini over engagement aggregated per author: how evenly attention is
/// distributed across content creators.
///
/// # Errors
///
/// Returns an error on a SQLite fault.
pub fn author_attention_gini(conn: &Connection) -> Result<f64, StoreError> {
    let engagements = engagement_rows(
        conn,
        "SELECT SUM(p.up_votes + COALESCE(c.comment_count, 0))
         FROM posts p
         LEFT JOIN (
             SELECT post_id, COUNT(*) AS comment_count FROM comments GROUP BY post_id
         ) c ON p.post_id = c.post_id
         GROUP BY p.author_id",
    )?;
    Ok(gini(&engagements))
}

fn engagement_rows(conn: &Connection, sql: &str) -> Result<Vec<f64>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
    let mut values = Vec::new();
    for row in rows {
        values.push(row? as f64);
    }
    Ok(values)
}

/// Entropy over post "topics". Topic extraction is deliberately crude:
/// the lowercased first word of the body.
///
/// # Errors
///
/// Returns an error on a SQLite fault.
pub fn topic_entropy(conn: &Connection) -> Result<f64, StoreError> {
    let mut stmt = conn.prepare("SELECT body FROM posts")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut topic_counts: BTreeMap<String, u64> = BTreeMap::new();
    for row in rows {
        let body = row?;
        if let Some(first) = body.split_whitespace().next() {
            *topic_counts.entry(first.to_lowercase()).or_insert(0) += 1;
        }
    }

    let counts: Vec<u64> = topic_counts.into_values().collect();
    Ok(entropy(&counts))
}
