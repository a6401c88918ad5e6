//! Command handlers, one module per subcommand.

pub mod events;
pub mod init_db;
pub mod kpis;
pub mod replay;
pub mod simulate;
