use std::io;

use smu_sweep::cli;
use smu_sweep::config::{self, ItTraceConfig};
use smu_sweep::experiment;

fn main() -> io::Result<()> {
    let args = cli::parse("I-t trace: hold a constant voltage and record current over time");
    cli::init_logging();

    let mut cfg:ItTraceConfig = config::load(args.config.as_deref())?;
    args.apply(&mut cfg.run);
    if args.dump_config {
        println!("{}", config::to_json(&cfg)?);
        return Ok(());
    }

    let stop = cli::stop_on_interrupt()?;
    let mut smu = cli::open_smu(&cfg.run.bus)?;
    let summary = experiment::run_it_trace(&mut smu, &cfg, &stop)?;
    cli::report(&summary)
}
