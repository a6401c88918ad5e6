//! Deterministic ranking over candidate posts.
//!
//! Three algorithms share one contract: score every candidate, order by
//! score descending with a seeded tie-break, truncate to `k`. There is no
//! floating-point nondeterminism to worry about: scores are computed with
//! a fixed expression over integers (plus `log10` for `hot`, whose inputs
//! are recorded in the item features so the score can be re-derived), and
//! ordering uses `f64::total_cmp`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;
use crate::event::{ItemFeatures, TimelineItem};
use crate::ident;
use crate::project::query::CandidatePost;

/// Bumped whenever scoring semantics change, so post-hoc analyses can
/// segregate mixed logs. Historical timelines are never re-scored.
pub const RANKING_VERSION: u32 = 1;

/// The closed set of ranking algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Newest first: `score = created_tick`.
    New,
    /// Most voted first: `score = up_votes`.
    Top,
    /// Engagement decayed by age:
    /// `score = log10(max(up_votes, 1)) - 0.1 * age`.
    Hot,
}

impl Algorithm {
    pub const ALL: [Self; 3] = [Self::New, Self::Top, Self::Hot];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Top => "top",
            Self::Hot => "hot",
        }
    }

    /// Score a single candidate at `current_tick`.
    #[must_use]
    pub fn score(self, post: &CandidatePost, current_tick: i64) -> f64 {
        match self {
            Self::New => post.created_tick as f64,
            Self::Top => post.up_votes as f64,
            Self::Hot => {
                let ups = post.up_votes.max(1) as f64;
                let age = (current_tick - post.created_tick) as f64;
                ups.log10() - 0.1 * age
            }
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "top" => Ok(Self::Top),
            "hot" => Ok(Self::Hot),
            _ => Err(StoreError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Rank `candidates` and return at most `k` timeline items.
///
/// Ordering: score descending, then `tie_break(seed, post_id)` ascending,
/// then `post_id` ascending as a last resort so the result is a total
/// order for any input.
#[must_use]
pub fn rank(
    candidates: &[CandidatePost],
    algorithm: Algorithm,
    current_tick: i64,
    seed: i64,
    k: i64,
) -> Vec<TimelineItem> {
    let mut scored: Vec<(&CandidatePost, f64, u64)> = candidates
        .iter()
        .map(|post| {
            (
                post,
                algorithm.score(post, current_tick),
                ident::tie_break(seed, &post.post_id),
            )
        })
        .collect();

    scored.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then_with(|| a.2.cmp(&b.2))
            .then_with(|| a.0.post_id.cmp(&b.0.post_id))
    });

    let k = usize::try_from(k).unwrap_or(0);
    scored
        .into_iter()
        .take(k)
        .enumerate()
        .map(|(position, (post, score, _))| TimelineItem {
            post_id: post.post_id.clone(),
            position: position as i64,
            score,
            features: ItemFeatures {
                score,
                up_votes: post.up_votes,
                age: current_tick - post.created_tick,
                algorithm,
                ranking_version: RANKING_VERSION,
            },
        })
        .collect()
}
