//! `feedsim init-db` — create the event + projection schema.

use anyhow::Context;
use clap::Args;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use feedsim_core::{Store, StoreError};

use crate::output::{render, OutputMode};

#[derive(Args, Debug)]
pub struct InitDbArgs {
    /// Drop existing tables (events included) before recreating them.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct InitOutput {
    db_path: String,
    recreated: bool,
}

pub fn run_init_db(args: &InitDbArgs, db_path: &Path, output: OutputMode) -> anyhow::Result<()> {
    let store = Store::open(db_path).context("open database")?;
    let existed = store.is_initialized().context("check schema")?;

    match store.init(args.force) {
        Ok(()) => {}
        Err(StoreError::AlreadyInitialized) => {
            anyhow::bail!(
                "database already initialized: {} (use --force to recreate)",
                db_path.display()
            );
        }
        Err(err) => return Err(err).context("initialize schema"),
    }

    let result = InitOutput {
        db_path: db_path.display().to_string(),
        recreated: existed && args.force,
    };
    render(output, &result, |r, w| {
        if r.recreated {
            writeln!(w, "Recreated database: {}", r.db_path)
        } else {
            writeln!(w, "Initialized database: {}", r.db_path)
        }
    })
}
