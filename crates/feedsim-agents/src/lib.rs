#![forbid(unsafe_code)]
//! feedsim-agents: deterministic agent policy scaffold.
//!
//! The kernel sees agents only as a source of candidate actions; this
//! crate holds the policy side (probability-driven intents, templated
//! content, per-tick budgets) plus the seeded RNG that keeps entire runs
//! reproducible.

pub mod agent;
pub mod rng;

pub use agent::{create_agents, Agent, AgentConfig, AgentState, Intent};
pub use rng::DeterministicRng;
