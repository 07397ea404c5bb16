use std::io;

use smu_sweep::cli;
use smu_sweep::config::{self, IvSweepConfig};
use smu_sweep::experiment;

fn main() -> io::Result<()> {
    let args = cli::parse("I-V sweep: source voltage 0 → -V → +V → 0 and measure current");
    cli::init_logging();

    let mut cfg:IvSweepConfig = config::load(args.config.as_deref())?;
    args.apply(&mut cfg.run);
    if args.dump_config {
        println!("{}", config::to_json(&cfg)?);
        return Ok(());
    }

    let stop = cli::stop_on_interrupt()?;
    let mut smu = cli::open_smu(&cfg.run.bus)?;
    let summary = experiment::run_iv_sweep(&mut smu, &cfg, &stop)?;
    cli::report(&summary)
}
