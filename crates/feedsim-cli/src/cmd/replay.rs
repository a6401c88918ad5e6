//! `feedsim replay` — rebuild all projections from the event log.
//!
//! Proves the projections are disposable: the state hash before and after
//! a drop-and-replay must match if nothing mutated the log in between.

use anyhow::Context;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use feedsim_core::{project, Store};

use crate::output::{render, OutputMode};

#[derive(Debug, Serialize)]
struct ReplayOutput {
    events: usize,
    hash_before: String,
    hash_after: String,
    deterministic: bool,
}

pub fn run_replay(db_path: &Path, output: OutputMode) -> anyhow::Result<()> {
    let store = Store::open(db_path).context("open database")?;
    anyhow::ensure!(
        store.is_initialized().context("check schema")?,
        "database not initialized: {} (run 'feedsim init-db' first)",
        db_path.display()
    );

    let hash_before = project::state_hash(store.conn()).context("hash projections")?;
    let events = project::replay_all(&store).context("replay events")?;
    let hash_after = project::state_hash(store.conn()).context("hash projections")?;

    let result = ReplayOutput {
        events,
        deterministic: hash_before == hash_after,
        hash_before,
        hash_after,
    };
    render(output, &result, |r, w| {
        writeln!(w, "Replayed {} events", r.events)?;
        writeln!(w, "Hash before: {}...", &r.hash_before[..16])?;
        writeln!(w, "Hash after:  {}...", &r.hash_after[..16])?;
        if r.deterministic {
            writeln!(w, "Projections unchanged (deterministic)")?;
        } else {
            writeln!(w, "Projections rebuilt")?;
        }
        Ok(())
    })
}
