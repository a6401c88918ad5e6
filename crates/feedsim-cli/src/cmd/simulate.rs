//! `feedsim simulate` — run a deterministic simulation.
//!
//! The driver loop: record the run, create agents, then per tick advance
//! the clock, visit agents in a seeded permutation, serve each a timeline
//! and admit its proposed actions. Identical arguments produce an
//! identical event log, byte for byte.

use anyhow::Context;
use clap::Args;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use feedsim_agents::{create_agents, DeterministicRng};
use feedsim_core::event::{EventPayload, RunConfigData, RunStartedData};
use feedsim_core::rank::Algorithm;
use feedsim_core::{append_applied, clock, ident, timeline, Store};

use crate::output::{render, OutputMode};

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Number of ticks to simulate.
    #[arg(long, default_value_t = 10)]
    pub ticks: i64,

    /// Number of agents.
    #[arg(long, default_value_t = 5)]
    pub agents: i64,

    /// Timeline size (max items per serve).
    #[arg(long, default_value_t = 10)]
    pub k: i64,

    /// Ranking algorithm.
    #[arg(long, default_value = "hot", value_parser = ["new", "top", "hot"])]
    pub ranking: String,

    /// Random seed for reproducibility.
    #[arg(long, default_value_t = 42)]
    pub seed: i64,
}

#[derive(Debug, Serialize)]
struct SimulateOutput {
    run_id: String,
    ticks: i64,
    agents: i64,
    posts: i64,
    votes: i64,
    comments: i64,
    attention_gini: f64,
}

pub fn run_simulate(args: &SimulateArgs, db_path: &Path, output: OutputMode) -> anyhow::Result<()> {
    anyhow::ensure!(args.ticks > 0, "--ticks must be positive");
    anyhow::ensure!(args.agents > 0, "--agents must be positive");
    anyhow::ensure!(args.k > 0, "--k must be positive");

    let algorithm = Algorithm::from_str(&args.ranking).context("parse ranking algorithm")?;

    let store = Store::open(db_path).context("open database")?;
    anyhow::ensure!(
        store.is_initialized().context("check schema")?,
        "database not initialized: {} (run 'feedsim init-db' first)",
        db_path.display()
    );

    let started_tick = store.current_tick().context("read current tick")?;
    let run_id = ident::run_id(
        args.seed,
        args.agents,
        args.k,
        algorithm,
        args.ticks,
        started_tick,
    );

    append_applied(
        &store,
        started_tick,
        &EventPayload::RunStarted(RunStartedData {
            run_id: run_id.clone(),
            started_tick,
        }),
    )
    .context("record run_started")?;
    append_applied(
        &store,
        started_tick,
        &EventPayload::RunConfig(RunConfigData {
            run_id: run_id.clone(),
            seed: args.seed,
            agents: args.agents,
            ranking_algorithm: algorithm,
            k: args.k,
            ticks: args.ticks,
        }),
    )
    .context("record run_config")?;

    info!(
        %run_id,
        agents = args.agents,
        ticks = args.ticks,
        k = args.k,
        ranking = %algorithm,
        seed = args.seed,
        "starting simulation"
    );

    let mut agents = create_agents(args.agents as usize, args.seed as u64, Some(&run_id));

    for _ in 0..args.ticks {
        let tick = clock::advance(&store).context("advance tick")?;

        // Agent visit order is a seeded per-tick permutation so identical
        // configs produce identical logs.
        let mut order: Vec<usize> = (0..agents.len()).collect();
        DeterministicRng::new((args.seed as u64) ^ (tick as u64)).shuffle(&mut order);

        for index in order {
            let agent = &mut agents[index];
            let served = timeline::serve(
                &store,
                agent.agent_id(),
                algorithm,
                args.k,
                args.seed + tick,
            )
            .context("serve timeline")?;
            agent.execute(&store, &served).context("agent actions")?;
            agent.on_tick_end();
        }

        if tick % 5 == 0 || tick == started_tick + args.ticks {
            info!(tick, "tick complete");
        }
    }

    let report = feedsim_kpi::compute_kpis(&store).context("compute summary KPIs")?;
    let result = SimulateOutput {
        run_id,
        ticks: args.ticks,
        agents: args.agents,
        posts: report.counts.posts,
        votes: report.counts.votes,
        comments: report.counts.comments,
        attention_gini: report.attention_gini,
    };

    render(output, &result, |r, w| {
        writeln!(w, "Simulation complete: {}", r.run_id)?;
        writeln!(w, "  Posts:    {}", r.posts)?;
        writeln!(w, "  Votes:    {}", r.votes)?;
        writeln!(w, "  Comments: {}", r.comments)?;
        writeln!(w, "  Attention Gini: {:.4}", r.attention_gini)?;
        Ok(())
    })
}
