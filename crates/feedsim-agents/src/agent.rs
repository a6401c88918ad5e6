//! Probability-driven agent policy with a per-tick action budget.
//!
//! Agents are the simulator's only source of candidate actions. The core
//! sees them purely through `timeline()` and `act()`; everything here is
//! policy. All draws come from a per-agent [`DeterministicRng`] and all
//! op_ids from a per-agent counter, so a run is a pure function of its
//! seeds.

use feedsim_core::admission::{act, ActionOutcome, ActionRequest};
use feedsim_core::event::{ActionType, TimelineItem};
use feedsim_core::project::query;
use feedsim_core::timeline::ServedTimeline;
use feedsim_core::{Store, StoreError};

use crate::rng::DeterministicRng;

/// What an agent decided to do with its timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Idle,
    Post,
    Like,
    Comment,
    Follow,
}

/// Per-agent policy configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub agent_id: String,
    pub post_probability: f64,
    pub like_probability: f64,
    pub comment_probability: f64,
    pub follow_probability: f64,
    pub max_actions_per_tick: u32,
    pub seed: u64,
    /// Optional op_id namespace, typically the run id. Keeps op_ids
    /// unique when several runs append to the same log.
    pub op_namespace: Option<String>,
}

impl AgentConfig {
    /// Default policy mix for `agent_id` with the given seed.
    #[must_use]
    pub fn new(agent_id: impl Into<String>, seed: u64) -> Self {
        Self {
            agent_id: agent_id.into(),
            post_probability: 0.1,
            like_probability: 0.3,
            comment_probability: 0.1,
            follow_probability: 0.05,
            max_actions_per_tick: 3,
            seed,
            op_namespace: None,
        }
    }

    /// Namespace this agent's op_ids under `namespace`.
    #[must_use]
    pub fn with_op_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.op_namespace = Some(namespace.into());
        self
    }
}

/// Mutable per-agent counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentState {
    pub actions_this_tick: u32,
    pub total_posts: u64,
    pub total_likes: u64,
    pub total_comments: u64,
    pub total_follows: u64,
}

/// A simulated user driven by configured probabilities.
#[derive(Debug, Clone)]
pub struct Agent {
    config: AgentConfig,
    state: AgentState,
    rng: DeterministicRng,
    op_counter: u64,
}

impl Agent {
    #[must_use]
    pub fn new(config: AgentConfig) -> Self {
        let rng = DeterministicRng::new(config.seed);
        Self {
            config,
            state: AgentState::default(),
            rng,
            op_counter: 0,
        }
    }

    #[must_use]
    pub fn agent_id(&self) -> &str {
        &self.config.agent_id
    }

    #[must_use]
    pub fn state(&self) -> AgentState {
        self.state
    }

    /// Deterministic idempotency key: per-agent counter, never a UUID.
    fn next_op_id(&mut self) -> String {
        self.op_counter += 1;
        match self.config.op_namespace {
            Some(ref ns) => format!("{ns}:{}-{:04}", self.config.agent_id, self.op_counter),
            None => format!("{}-{:04}", self.config.agent_id, self.op_counter),
        }
    }

    /// Decide the next intent from the configured probability mix.
    ///
    /// Timeline-dependent intents are only possible when the feed is
    /// non-empty; an exhausted per-tick budget always yields `Idle`.
    pub fn plan(&mut self, timeline: &ServedTimeline) -> Intent {
        if self.state.actions_this_tick >= self.config.max_actions_per_tick {
            return Intent::Idle;
        }

        let mut r = self.rng.next_f64();

        if r < self.config.post_probability {
            return Intent::Post;
        }
        r -= self.config.post_probability;

        if !timeline.items.is_empty() {
            if r < self.config.like_probability {
                return Intent::Like;
            }
            r -= self.config.like_probability;

            if r < self.config.comment_probability {
                return Intent::Comment;
            }
            r -= self.config.comment_probability;

            if r < self.config.follow_probability {
                return Intent::Follow;
            }
        }

        Intent::Idle
    }

    /// Templated body text for posts and comments.
    fn compose(&mut self, intent: Intent, tick: i64, target: Option<&str>) -> String {
        match intent {
            Intent::Post => {
                self.state.total_posts += 1;
                format!(
                    "Post #{} from {} at tick {}",
                    self.state.total_posts, self.config.agent_id, tick
                )
            }
            Intent::Comment => {
                self.state.total_comments += 1;
                let target = target.unwrap_or("unknown");
                format!(
                    "Comment #{} on {} by {}",
                    self.state.total_comments, target, self.config.agent_id
                )
            }
            _ => String::new(),
        }
    }

    /// Pick a target item from the top of the feed.
    fn select_target<'tl>(&mut self, timeline: &'tl ServedTimeline) -> Option<&'tl TimelineItem> {
        if timeline.items.is_empty() {
            return None;
        }
        let upper = timeline.items.len().min(5) as u64;
        let idx = self.rng.next_bounded(upper) as usize;
        timeline.items.get(idx)
    }

    /// Run one full agent turn: plan, compose, and act until the budget is
    /// spent or the agent goes idle. Returns the admission outcomes.
    ///
    /// # Errors
    ///
    /// Returns an error only on store faults; rejected actions are normal
    /// outcomes and are counted against the budget like accepted ones.
    pub fn execute(
        &mut self,
        store: &Store,
        timeline: &ServedTimeline,
    ) -> Result<Vec<ActionOutcome>, StoreError> {
        let mut outcomes = Vec::new();

        while self.state.actions_this_tick < self.config.max_actions_per_tick {
            let intent = self.plan(timeline);
            if intent == Intent::Idle {
                break;
            }

            let Some(outcome) = self.execute_intent(store, timeline, intent)? else {
                continue;
            };
            outcomes.push(outcome);
            self.state.actions_this_tick += 1;
        }

        tracing::debug!(
            agent = %self.config.agent_id,
            tick = timeline.tick,
            actions = outcomes.len(),
            "agent turn complete"
        );
        Ok(outcomes)
    }

    fn execute_intent(
        &mut self,
        store: &Store,
        timeline: &ServedTimeline,
        intent: Intent,
    ) -> Result<Option<ActionOutcome>, StoreError> {
        let op_id = self.next_op_id();

        if intent == Intent::Post {
            let body = self.compose(Intent::Post, timeline.tick, None);
            let outcome = act(
                store,
                &ActionRequest {
                    op_id,
                    actor_id: self.config.agent_id.clone(),
                    action_type: ActionType::Post,
                    timeline_id: None,
                    position: None,
                    target_post_id: None,
                    target_user_id: None,
                    body: Some(body),
                },
            )?;
            return Ok(Some(outcome));
        }

        let Some(target) = self.select_target(timeline) else {
            return Ok(None);
        };
        let target = target.clone();

        let outcome = match intent {
            Intent::Like => {
                let outcome = act(
                    store,
                    &ActionRequest {
                        op_id,
                        actor_id: self.config.agent_id.clone(),
                        action_type: ActionType::Like,
                        timeline_id: Some(timeline.timeline_id.clone()),
                        position: Some(target.position),
                        target_post_id: Some(target.post_id.clone()),
                        target_user_id: None,
                        body: None,
                    },
                )?;
                if outcome.accepted() {
                    self.state.total_likes += 1;
                }
                outcome
            }
            Intent::Comment => {
                let body = self.compose(Intent::Comment, timeline.tick, Some(&target.post_id));
                act(
                    store,
                    &ActionRequest {
                        op_id,
                        actor_id: self.config.agent_id.clone(),
                        action_type: ActionType::Comment,
                        timeline_id: Some(timeline.timeline_id.clone()),
                        position: Some(target.position),
                        target_post_id: Some(target.post_id.clone()),
                        target_user_id: None,
                        body: Some(body),
                    },
                )?
            }
            Intent::Follow => {
                // Follow the author of the selected post.
                let Some(author) = query::post_author(store.conn(), &target.post_id)? else {
                    return Ok(None);
                };
                let outcome = act(
                    store,
                    &ActionRequest {
                        op_id,
                        actor_id: self.config.agent_id.clone(),
                        action_type: ActionType::Follow,
                        timeline_id: None,
                        position: None,
                        target_post_id: None,
                        target_user_id: Some(author),
                        body: None,
                    },
                )?;
                if outcome.accepted() {
                    self.state.total_follows += 1;
                }
                outcome
            }
            Intent::Post | Intent::Idle => return Ok(None),
        };

        Ok(Some(outcome))
    }

    /// Reset per-tick counters at the end of a tick.
    pub fn on_tick_end(&mut self) {
        self.state.actions_this_tick = 0;
    }
}

/// Create `count` agents with ids `agent-0000`, `agent-0001`, ... and
/// per-agent seeds `base_seed + index`. Op_ids are namespaced under
/// `op_namespace` when given.
#[must_use]
pub fn create_agents(count: usize, base_seed: u64, op_namespace: Option<&str>) -> Vec<Agent> {
    (0..count)
        .map(|i| {
            let agent_id = format!("agent-{i:04}");
            let mut config = AgentConfig::new(agent_id, base_seed + i as u64);
            if let Some(ns) = op_namespace {
                config = config.with_op_namespace(ns);
            }
            Agent::new(config)
        })
        .collect()
}
