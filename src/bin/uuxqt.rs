use anyhow::Result;
use clap::Parser;
use uucp_xqt::cli::UuxqtArgs;
use uucp_xqt::config::Config;
use uucp_xqt::executor::{Executor, ExecutorOptions};
use uucp_xqt::spool::Spool;

fn main() -> Result<()> {
    let args = UuxqtArgs::parse();

    let config = Config::load(args.config.as_deref())?;
    uucp_xqt::logging::init_tracing(&config, "uuxqt", args.debug);

    let spool = Spool::open(&config)?;
    let opts = ExecutorOptions { only_command: args.only_command.clone(), only_system: args.only_system.clone() };

    let mut executor = Executor::new(&config, spool)?;
    let report = executor.run(&opts)?;
    for (xfile, outcome) in &report.processed {
        tracing::debug!(xfile, ?outcome, "processed execute file");
    }

    // The batch daemon always exits successfully after a full scan;
    // per-file failures are logged/mailed, never surfaced as exit status
    // (spec.md §4.5).
    Ok(())
}
