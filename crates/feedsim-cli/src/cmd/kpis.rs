//! `feedsim kpis` — compute and display KPIs.

use anyhow::Context;
use clap::Args;
use std::io::Write;
use std::path::Path;

use feedsim_core::Store;
use feedsim_kpi::KpiReport;

use crate::output::{render, OutputMode};

#[derive(Args, Debug)]
pub struct KpisArgs {
    /// Output the report as JSON.
    #[arg(long)]
    pub json_output: bool,
}

pub fn run_kpis(args: &KpisArgs, db_path: &Path, output: OutputMode) -> anyhow::Result<()> {
    let store = Store::open(db_path).context("open database")?;
    anyhow::ensure!(
        store.is_initialized().context("check schema")?,
        "database not initialized: {} (run 'feedsim init-db' first)",
        db_path.display()
    );

    let report = feedsim_kpi::compute_kpis(&store).context("compute KPIs")?;

    let mode = if args.json_output {
        OutputMode::Json
    } else {
        output
    };
    render(mode, &report, render_human)
}

fn render_human(report: &KpiReport, w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(w, "KPIs:")?;
    writeln!(w, "  Posts:    {}", report.counts.posts)?;
    writeln!(w, "  Users:    {}", report.counts.users)?;
    writeln!(w, "  Votes:    {}", report.counts.votes)?;
    writeln!(w, "  Comments: {}", report.counts.comments)?;
    writeln!(w, "  Follows:  {}", report.counts.follows)?;
    writeln!(w)?;
    writeln!(w, "Actions:")?;
    let total = report.actions.accepted + report.actions.rejected;
    if total > 0 {
        let accepted_pct = 100.0 * report.actions.accepted as f64 / total as f64;
        writeln!(
            w,
            "  Accepted: {} ({accepted_pct:.1}%)",
            report.actions.accepted
        )?;
        writeln!(
            w,
            "  Rejected: {} ({:.1}%)",
            report.actions.rejected,
            100.0 - accepted_pct
        )?;
        if !report.actions.rejection_reasons.is_empty() {
            writeln!(w, "  Rejection reasons:")?;
            for (reason, count) in &report.actions.rejection_reasons {
                writeln!(w, "    {reason}: {count}")?;
            }
        }
    } else {
        writeln!(w, "  No actions recorded")?;
    }
    writeln!(w)?;
    writeln!(w, "Attention Gini: {:.4}", report.attention_gini)?;
    writeln!(
        w,
        "Author Attention Gini: {:.4}",
        report.author_attention_gini
    )?;
    writeln!(w, "Topic Entropy: {:.4} bits", report.topic_entropy)?;
    Ok(())
}
