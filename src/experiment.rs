//! The three bench procedures.
//!
//! Each one configures the instrument, runs its acquisition loop, then always brings the source back to zero
//! and saves whatever was collected, including after an error or a stop request.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use chrono::Local;
use log::{debug, error, info, warn};

use crate::bus::Bus;
use crate::config::{ItTraceConfig, IvSweepConfig, RunConfig, ViSweepConfig};
use crate::devices::keithley2400::{Keithley2400, Reading, SourceFunction};
use crate::output::{self, OutputPaths};
use crate::plot::{self, LivePlot, PlotStyle};
use crate::sweep::{self, Segment, SweepPoint};
use crate::trace::Trace;

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub samples: usize,
    // False when the loop ended early on an error or a stop request
    pub completed: bool,
    pub error: Option<String>,
    pub txt_path: PathBuf,
    // None if the image couldn't be rendered
    pub png_path: Option<PathBuf>,
    pub mean_interval: Option<f64>,
}

// Everything a procedure needs besides its loop
struct Procedure<'a> {
    name: &'static str,
    prefix: &'static str,
    function: SourceFunction,
    compliance: f64,
    sense_range: f64,
    labels: (&'static str, &'static str),
    units: (&'static str, &'static str),
    run: &'a RunConfig,
    style: PlotStyle,
    // Cleanup ramp
    ramp_step: f64,
    ramp_delay: Duration,
}

// Why the acquisition loop ended
enum Outcome {
    Completed,
    Stopped,
}

struct Session<'a> {
    trace: Trace,
    live: LivePlot,
    verbose: bool,
    stop: &'a AtomicBool,
    units: (&'static str, &'static str),
}

impl<'a> Session<'a> {

    fn stop_requested(&self) -> bool { self.stop.load(Ordering::SeqCst) }

    fn record(&mut self, x:f64, y:f64, segment:Segment, reading:&Reading) {
        self.trace.push(x, y, segment);

        let line = format!("{:>5}  {:+.6e} {}\t{:+.6e} {}", self.trace.len(), x, self.units.0, y, self.units.1);
        if self.verbose { info!("{}", line) } else { debug!("{}", line) }
        if reading.in_compliance() {
            warn!("Sample {} is at the compliance limit", self.trace.len());
        }

        self.live.update(&self.trace);
    }

}

fn configure<B: Bus>(smu:&mut Keithley2400<B>, procedure:&Procedure) -> io::Result<()> {
    smu.reset()?;
    smu.configure(procedure.function, procedure.compliance, procedure.sense_range)?;
    smu.output(true)
}

fn sweep_loop<B: Bus>(smu:&mut Keithley2400<B>, session:&mut Session, points:&[SweepPoint], delay:Duration) -> io::Result<Outcome> {
    let function = smu.function()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "Sweep started before the source was configured"))?;
    for point in points.iter() {
        if session.stop_requested() {
            return Ok(Outcome::Stopped);
        }
        smu.set_level(point.level)?;
        thread::sleep(delay);

        let reading = smu.measure()?;
        session.record(reading.sourced(function), reading.sensed(function), point.segment, &reading);
    }
    Ok(Outcome::Completed)
}

fn trace_loop<B: Bus>(smu:&mut Keithley2400<B>, session:&mut Session, cfg:&ItTraceConfig) -> io::Result<Outcome> {
    info!("Ramping to {} V", cfg.voltage);
    smu.ramp_to(cfg.voltage, cfg.v_ramp, cfg.ramping_delay())?;

    info!("Recording current for {} s", cfg.total_time_s);
    smu.reset_timestamp()?;
    loop {
        if session.stop_requested() {
            return Ok(Outcome::Stopped);
        }

        let reading = smu.measure()?;
        let elapsed = reading.timestamp
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "Reading has no timestamp element"))?;
        session.record(elapsed, reading.current, Segment::Forward, &reading);

        if elapsed >= cfg.total_time_s {
            return Ok(Outcome::Completed);
        }
    }
}

// Shared by all three procedures: configure, acquire, clean up, save
fn execute<B, F>(smu:&mut Keithley2400<B>, procedure:Procedure, stop:&AtomicBool, acquire:F) -> io::Result<RunSummary>
where
    B: Bus,
    F: FnOnce(&mut Keithley2400<B>, &mut Session) -> io::Result<Outcome>,
{
    let started = Local::now();
    let base = output::base_name(procedure.prefix, &started, procedure.run.file_suffix.as_deref());
    let paths = OutputPaths::new(&procedure.run.output_dir, &base)?;

    let mut session = Session{
        trace: Trace::new(procedure.labels.0, procedure.labels.1),
        live: LivePlot::new(&paths.preview, procedure.style.clone(), procedure.run.live_every),
        verbose: procedure.run.verbose,
        stop,
        units: procedure.units,
    };
    if session.live.enabled() {
        info!("Live preview at {}", session.live.path().display());
    }

    info!("Starting {} on {}", procedure.name, smu.identity());
    let outcome = configure(smu, &procedure).and_then(|_| acquire(&mut *smu, &mut session));

    let (completed, error) = match outcome {
        Ok(Outcome::Completed) => (true, None),
        Ok(Outcome::Stopped) => {
            warn!("Measurement stopped after {} samples", session.trace.len());
            (false, None)
        },
        Err(e) => {
            error!("Error during measurement: {}", e);
            (false, Some(e.to_string()))
        },
    };

    smu.shutdown(procedure.ramp_step, procedure.ramp_delay);
    if let Err(e) = smu.close() {
        warn!("Unable to close the bus: {}", e);
    }

    let comment = format!("{} | {} | started {}", procedure.name, smu.identity(), started.format("%Y-%m-%d %H:%M:%S"));
    output::write_tsv(&paths.txt, &session.trace, &comment)?;

    let png_path = match plot::render(&paths.png, &session.trace, &procedure.style) {
        Ok(()) => Some(paths.png.clone()),
        Err(e) => {
            warn!("{}", e);
            None
        },
    };

    Ok(RunSummary{
        samples: session.trace.len(),
        completed,
        error,
        txt_path: paths.txt,
        png_path,
        mean_interval: session.trace.mean_interval(),
    })
}

/// Voltage sweep 0 → -V → +V → 0, sensing current.
pub fn run_iv_sweep<B: Bus>(smu:&mut Keithley2400<B>, cfg:&IvSweepConfig, stop:&AtomicBool) -> io::Result<RunSummary> {
    cfg.validate()?;
    let (lower, upper) = cfg.bounds();
    let points = sweep::triangular(lower, upper, cfg.step_voltage, cfg.decimals)?;
    info!("Voltage sweep of {} points between {} V and {} V", points.len(), lower, upper);

    let procedure = Procedure{
        name: "I-V sweep",
        prefix: "voltage_sweep_data",
        function: SourceFunction::Voltage,
        compliance: cfg.current_compliance,
        sense_range: cfg.current_range,
        labels: ("Voltage (V)", "Current (A)"),
        units: ("V", "A"),
        run: &cfg.run,
        style: PlotStyle::sweep("I-V Measurement", lower, upper).with_readout("V", "I"),
        ramp_step: cfg.step_voltage,
        ramp_delay: cfg.delay(),
    };
    let delay = cfg.delay();
    execute(smu, procedure, stop, |smu, session| sweep_loop(smu, session, &points, delay))
}

/// Current sweep 0 → min → max → 0, sensing voltage.
pub fn run_vi_sweep<B: Bus>(smu:&mut Keithley2400<B>, cfg:&ViSweepConfig, stop:&AtomicBool) -> io::Result<RunSummary> {
    cfg.validate()?;
    let points = sweep::triangular(cfg.min_current, cfg.max_current, cfg.step_current, None)?;
    info!("Current sweep of {} points between {} A and {} A", points.len(), cfg.min_current, cfg.max_current);

    let procedure = Procedure{
        name: "V-I sweep",
        prefix: "current_sweep_data",
        function: SourceFunction::Current,
        compliance: cfg.voltage_compliance,
        sense_range: cfg.voltage_range,
        labels: ("Current (A)", "Voltage (V)"),
        units: ("A", "V"),
        run: &cfg.run,
        style: PlotStyle::sweep("I-V Measurement", cfg.min_current, cfg.max_current).with_readout("I", "V"),
        ramp_step: cfg.step_current,
        ramp_delay: cfg.delay(),
    };
    let delay = cfg.delay();
    execute(smu, procedure, stop, |smu, session| sweep_loop(smu, session, &points, delay))
}

/// Constant voltage, current recorded against the instrument's own timestamp.
pub fn run_it_trace<B: Bus>(smu:&mut Keithley2400<B>, cfg:&ItTraceConfig, stop:&AtomicBool) -> io::Result<RunSummary> {
    cfg.validate()?;

    let procedure = Procedure{
        name: "I-t trace",
        prefix: "current_time_data",
        function: SourceFunction::Voltage,
        compliance: cfg.current_compliance,
        sense_range: cfg.current_range,
        labels: ("Time (s)", "Current (A)"),
        units: ("s", "A"),
        run: &cfg.run,
        style: PlotStyle::window("I-t Measurement", cfg.window_s, "Current").with_readout("t", "I"),
        ramp_step: cfg.v_ramp,
        ramp_delay: cfg.ramping_delay(),
    };
    let summary = execute(smu, procedure, stop, |smu, session| trace_loop(smu, session, cfg))?;

    if let Some(dt) = summary.mean_interval {
        info!("Average time interval: {:.4} seconds", dt);
    }
    info!("Number of data points: {}", summary.samples);
    Ok(summary)
}
