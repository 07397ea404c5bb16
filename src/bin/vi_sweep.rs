use std::io;

use smu_sweep::cli;
use smu_sweep::config::{self, ViSweepConfig};
use smu_sweep::experiment;

fn main() -> io::Result<()> {
    let args = cli::parse("V-I sweep: source current 0 → min → max → 0 and measure voltage");
    cli::init_logging();

    let mut cfg:ViSweepConfig = config::load(args.config.as_deref())?;
    args.apply(&mut cfg.run);
    if args.dump_config {
        println!("{}", config::to_json(&cfg)?);
        return Ok(());
    }

    let stop = cli::stop_on_interrupt()?;
    let mut smu = cli::open_smu(&cfg.run.bus)?;
    let summary = experiment::run_vi_sweep(&mut smu, &cfg, &stop)?;
    cli::report(&summary)
}
