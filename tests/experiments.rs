use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use smu_sweep::bus::SimulatedSmu;
use smu_sweep::config::{ItTraceConfig, IvSweepConfig, ViSweepConfig};
use smu_sweep::devices::keithley2400::Keithley2400;
use smu_sweep::experiment::{run_it_trace, run_iv_sweep, run_vi_sweep};
use smu_sweep::output::read_tsv;

fn header(path:&Path) -> Vec<String> {
    fs::read_to_string(path).unwrap().lines().take(2).map(|l| l.to_owned()).collect()
}

#[test]
fn vi_sweep_through_a_resistor() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = ViSweepConfig::default();
    cfg.delay_s = 0.0;
    cfg.run.output_dir = dir.path().to_path_buf();
    cfg.run.file_suffix = Some("r100M".to_owned());
    cfg.run.live_every = 0;

    let mut smu = Keithley2400::new(SimulatedSmu::new(1.0e8)).unwrap();
    let summary = run_vi_sweep(&mut smu, &cfg, &AtomicBool::new(false)).unwrap();

    assert!(summary.completed);
    assert_eq!(summary.samples, 103);
    let name = summary.txt_path.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("current_sweep_data_") && name.ends_with("_r100M.txt"), "{}", name);

    let lines = header(&summary.txt_path);
    assert!(lines[0].starts_with("# V-I sweep | KEITHLEY INSTRUMENTS INC. MODEL 2400"), "{}", lines[0]);
    assert_eq!(lines[1], "# Current (A)\tVoltage (V)");

    let trace = read_tsv(&summary.txt_path).unwrap();
    assert_eq!(trace.len(), 103);
    assert_eq!(trace.x_bounds(), Some((-2.5e-9, 2.5e-9)));
    assert_eq!(trace.y_bounds(), Some((-0.25, 0.25)));
    assert_eq!(trace.last(), Some((0.0, 0.0)));
}

#[test]
fn compliance_clamps_the_sensed_voltage() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = ViSweepConfig::default();
    cfg.delay_s = 0.0;
    cfg.voltage_compliance = 10.0;
    cfg.run.output_dir = dir.path().to_path_buf();
    cfg.run.live_every = 0;

    let mut smu = Keithley2400::new(SimulatedSmu::new(1.0e10)).unwrap();
    let summary = run_vi_sweep(&mut smu, &cfg, &AtomicBool::new(false)).unwrap();

    let trace = read_tsv(&summary.txt_path).unwrap();
    assert_eq!(trace.y_bounds(), Some((-10.0, 10.0)));
}

#[test]
fn failure_mid_sweep_ramps_down_and_saves() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = IvSweepConfig::default();
    cfg.stop_voltage = 1.0;
    cfg.step_voltage = 0.5;
    cfg.delay_s = 0.0;
    cfg.run.output_dir = dir.path().to_path_buf();
    cfg.run.live_every = 0;

    let mut smu = Keithley2400::new(SimulatedSmu::new(1.0e6).fail_after_reads(4)).unwrap();
    let summary = run_iv_sweep(&mut smu, &cfg, &AtomicBool::new(false)).unwrap();

    assert!(!summary.completed);
    assert_eq!(summary.samples, 4);
    assert!(summary.error.as_deref().unwrap().contains("Simulated bus failure"));

    let history = smu.bus().history();
    let n = history.len();
    assert_eq!(&history[n-3..], &[":SOUR:VOLT:LEV 0", ":SOUR:VOLT:LEV 0", ":OUTP OFF"]);
    assert!(!smu.bus().output_enabled());
    assert_eq!(smu.bus().level(), 0.0);
    assert!(smu.bus().is_closed());

    let trace = read_tsv(&summary.txt_path).unwrap();
    assert_eq!(trace.rows().map(|(v, _)| v).collect::<Vec<_>>(), vec![0.0, -0.5, -1.0, -1.0]);
}

#[test]
fn stop_from_another_thread_ramps_down() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = IvSweepConfig::default();
    cfg.delay_s = 0.02;
    cfg.run.output_dir = dir.path().to_path_buf();
    cfg.run.live_every = 0;

    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        flag.store(true, Ordering::SeqCst);
    });

    let mut smu = Keithley2400::new(SimulatedSmu::new(1.0e6)).unwrap();
    let summary = run_iv_sweep(&mut smu, &cfg, &stop).unwrap();
    stopper.join().unwrap();

    assert!(!summary.completed);
    assert!(summary.error.is_none());
    assert!(summary.samples > 0 && summary.samples < 83, "{}", summary.samples);

    let history = smu.bus().history();
    let n = history.len();
    assert_eq!(history[n-1], ":OUTP OFF");
    assert_eq!(history[n-2], ":SOUR:VOLT:LEV 0");
    assert!(!smu.bus().output_enabled());
    assert_eq!(smu.bus().level(), 0.0);
    assert!(smu.bus().is_closed());

    assert_eq!(read_tsv(&summary.txt_path).unwrap().len(), summary.samples);
}

#[test]
fn plot_and_live_preview_are_written() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = IvSweepConfig::default();
    cfg.stop_voltage = 1.0;
    cfg.step_voltage = 0.5;
    cfg.delay_s = 0.0;
    cfg.run.output_dir = dir.path().to_path_buf();
    cfg.run.live_every = 2;

    let mut smu = Keithley2400::new(SimulatedSmu::new(1.0e6)).unwrap();
    let summary = run_iv_sweep(&mut smu, &cfg, &AtomicBool::new(false)).unwrap();
    assert!(summary.completed);
    assert_eq!(summary.samples, 11);

    let png = summary.png_path.as_ref().unwrap();
    assert_eq!(png, &summary.txt_path.with_extension("png"));
    assert!(fs::read(png).unwrap().starts_with(b"\x89PNG"));

    let stem = summary.txt_path.file_stem().unwrap().to_str().unwrap();
    let preview = dir.path().join(format!("{}_live.png", stem));
    assert!(fs::read(&preview).unwrap().starts_with(b"\x89PNG"));
}

#[test]
fn it_trace_follows_the_instrument_clock() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = ItTraceConfig::default();
    cfg.voltage = -1.0;
    cfg.v_ramp = 0.25;
    cfg.ramping_delay_s = 0.0;
    cfg.total_time_s = 5.0;
    cfg.run.output_dir = dir.path().to_path_buf();
    cfg.run.live_every = 0;

    let mut smu = Keithley2400::new(SimulatedSmu::new(1.0e7).with_sample_period(0.5)).unwrap();
    let summary = run_it_trace(&mut smu, &cfg, &AtomicBool::new(false)).unwrap();

    assert!(summary.completed);
    assert_eq!(summary.samples, 10);
    assert_eq!(summary.mean_interval, Some(0.5));

    let history = smu.bus().history();
    let reset = history.iter().position(|c| c == ":SYSTem:TIME:RESet").unwrap();
    assert_eq!(&history[reset-4..reset], &[":SOUR:VOLT:LEV -2.5e-1", ":SOUR:VOLT:LEV -5e-1", ":SOUR:VOLT:LEV -7.5e-1", ":SOUR:VOLT:LEV -1e0"]);
    assert_eq!(history.last().unwrap(), ":OUTP OFF");

    let lines = header(&summary.txt_path);
    assert!(lines[0].starts_with("# I-t trace"));
    assert_eq!(lines[1], "# Time (s)\tCurrent (A)");

    let trace = read_tsv(&summary.txt_path).unwrap();
    assert_eq!(trace.last(), Some((5.0, -1.0e-7)));
    assert!(trace.y().iter().all(|i| *i == -1.0e-7));
}
