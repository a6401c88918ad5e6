//! `feedsim events` — show recent events from the log.

use anyhow::Context;
use clap::Args;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use feedsim_core::event::{Event, EventKind, EventPayload};
use feedsim_core::Store;

use crate::output::{render, OutputMode};

#[derive(Args, Debug)]
pub struct EventsArgs {
    /// Number of events to show.
    #[arg(long, default_value_t = 20)]
    pub limit: i64,

    /// Filter by event type.
    #[arg(long, value_parser = ["run_started", "run_config", "advance_tick", "timeline_served", "action"])]
    pub event_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct EventRow {
    seq: i64,
    kind: String,
    tick: i64,
    actor: Option<String>,
    status: Option<String>,
    details: String,
}

pub fn run_events(args: &EventsArgs, db_path: &Path, output: OutputMode) -> anyhow::Result<()> {
    let store = Store::open(db_path).context("open database")?;
    anyhow::ensure!(
        store.is_initialized().context("check schema")?,
        "database not initialized: {} (run 'feedsim init-db' first)",
        db_path.display()
    );

    let kind = args
        .event_type
        .as_deref()
        .map(EventKind::from_str)
        .transpose()
        .context("parse event type")?;

    let events = store
        .recent_events(args.limit, kind)
        .context("read events")?;
    let rows: Vec<EventRow> = events.iter().map(to_row).collect();

    render(output, &rows, |rows, w| {
        writeln!(
            w,
            "{:>6} {:<16} {:>5} {:<14} {:<10} {}",
            "Seq", "Kind", "Tick", "Actor", "Status", "Details"
        )?;
        writeln!(w, "{:-<80}", "")?;
        for row in rows {
            writeln!(
                w,
                "{:>6} {:<16} {:>5} {:<14} {:<10} {}",
                row.seq,
                row.kind,
                row.tick,
                row.actor.as_deref().unwrap_or("-"),
                row.status.as_deref().unwrap_or("-"),
                row.details
            )?;
        }
        Ok(())
    })
}

fn to_row(event: &Event) -> EventRow {
    let (actor, status, details) = match &event.payload {
        EventPayload::Action(data) => {
            let target = data
                .target_post_id
                .as_deref()
                .or(data.target_user_id.as_deref());
            let mut details = data.action_type.to_string();
            if let Some(target) = target {
                details.push_str(&format!(" -> {target}"));
            }
            if let Some(reason) = data.reason {
                details.push_str(&format!(" ({reason})"));
            }
            (
                Some(data.actor_id.clone()),
                Some(data.status.to_string()),
                details,
            )
        }
        EventPayload::TimelineServed(data) => (
            Some(data.user_id.clone()),
            None,
            format!("{} k={} items={}", data.algorithm, data.k, data.items.len()),
        ),
        EventPayload::AdvanceTick(data) => (None, None, format!("-> {}", data.new_tick)),
        EventPayload::RunStarted(data) => (None, None, data.run_id.clone()),
        EventPayload::RunConfig(data) => (
            None,
            None,
            format!(
                "seed={} agents={} k={} ticks={} ranking={}",
                data.seed, data.agents, data.k, data.ticks, data.ranking_algorithm
            ),
        ),
    };

    EventRow {
        seq: event.seq,
        kind: event.kind.to_string(),
        tick: event.tick,
        actor,
        status,
        details,
    }
}
