//! Command line shared by the three binaries.

use std::io::{self, Error, ErrorKind};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{CommandFactory, FromArgMatches};
use log::{info, warn};

use crate::bus::{Bus, BusConfig};
use crate::config::RunConfig;
use crate::devices::keithley2400::Keithley2400;
use crate::experiment::RunSummary;

#[derive(clap::Parser, Debug)]
#[command(version)]
pub struct Args {
    /// JSON file with run parameters.  Anything it leaves out keeps its default
    pub config:Option<PathBuf>,
    /// Run against the built-in simulated SourceMeter instead of the configured bus
    #[arg(long)]
    pub simulate:bool,
    #[arg(short, long)]
    pub output_dir:Option<PathBuf>,
    /// Appended to the file names after the timestamp
    #[arg(short, long)]
    pub suffix:Option<String>,
    /// Log every sample as it's taken
    #[arg(short, long)]
    pub verbose:bool,
    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    pub dump_config:bool,
}

impl Args {

    // Command line flags override the config file
    pub fn apply(&self, run:&mut RunConfig) {
        if self.simulate {
            run.bus = BusConfig::simulated();
        }
        if let Some(dir) = &self.output_dir {
            run.output_dir = dir.clone();
        }
        if let Some(suffix) = &self.suffix {
            run.file_suffix = Some(suffix.clone());
        }
        if self.verbose {
            run.verbose = true;
        }
    }

}

pub fn parse(about:&'static str) -> Args {
    let matches = Args::command().about(about).get_matches();
    Args::from_arg_matches(&matches).unwrap_or_else(|e| e.exit())
}

// RUST_LOG overrides the default level
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

/// Ctrl-C sets the returned flag, so the run stops before its next sample and still ramps down.
/// A second Ctrl-C exits at once.
pub fn stop_on_interrupt() -> io::Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    ctrlc::set_handler(move || {
        if request_stop(&flag) {
            std::process::exit(130);
        }
        warn!("Interrupted, stopping after the current sample.  Press Ctrl-C again to quit without ramping down");
    }).map_err(|e| Error::new(ErrorKind::Other, format!("Unable to install the Ctrl-C handler: {}", e)))?;
    Ok(stop)
}

// Returns true if a stop had already been requested
fn request_stop(stop:&AtomicBool) -> bool {
    stop.swap(true, Ordering::SeqCst)
}

pub fn open_smu(bus:&BusConfig) -> io::Result<Keithley2400<Box<dyn Bus>>> {
    info!("Opening {}", bus.describe());
    Keithley2400::new(bus.open()?)
}

/// Logs where the data went.  A run that ended on an error returns it here, after the files are saved.
pub fn report(summary:&RunSummary) -> io::Result<()> {
    info!("{} points saved to {}", summary.samples, summary.txt_path.display());
    if let Some(png) = &summary.png_path {
        info!("Plot saved to {}", png.display());
    }

    match &summary.error {
        Some(e) => Err(Error::new(ErrorKind::Other, format!("Measurement ended early: {}", e))),
        None => {
            if summary.completed {
                info!("Measurement completed, data recorded and graph created");
            }
            Ok(())
        },
    }
}
