//! Run parameters.  Every field has the bench default, so a JSON file only needs the values that change:
//!
//! ```json
//! { "stop_voltage": 2.0, "bus": { "kind": "prologix", "host": "192.168.0.20" } }
//! ```

use std::fs;
use std::io::{self, Error, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::bus::BusConfig;

// Shortest settling delay the instrument is characterized for
pub const MIN_DELAY_S:f64 = 0.05;

fn invalid(msg:String) -> io::Error { Error::new(ErrorKind::InvalidInput, msg) }

fn check_finite(name:&str, x:f64) -> io::Result<()> {
    if x.is_finite() { Ok(()) } else { Err(invalid(format!("{} must be finite, got {}", name, x))) }
}

fn check_positive(name:&str, x:f64) -> io::Result<()> {
    check_finite(name, x)?;
    if x > 0.0 { Ok(()) } else { Err(invalid(format!("{} must be positive, got {}", name, x))) }
}

fn check_delay(name:&str, seconds:f64) -> io::Result<()> {
    check_finite(name, seconds)?;
    if seconds < 0.0 {
        return Err(invalid(format!("{} can't be negative, got {}", name, seconds)));
    }
    if seconds < MIN_DELAY_S {
        warn!("{} of {} s is below the {} s minimum; readings may not settle", name, seconds, MIN_DELAY_S);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub bus: BusConfig,
    pub output_dir: PathBuf,
    pub file_suffix: Option<String>,
    pub verbose: bool,
    // Samples between live preview renders, 0 for none
    pub live_every: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self{ bus: BusConfig::default(), output_dir: PathBuf::from("."), file_suffix: None, verbose: false, live_every: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IvSweepConfig {
    #[serde(flatten)]
    pub run: RunConfig,
    pub stop_voltage: f64,
    pub step_voltage: f64,
    pub delay_s: f64,
    pub current_compliance: f64,
    pub current_range: f64,
    pub decimals: Option<u32>,
}

impl Default for IvSweepConfig {
    fn default() -> Self {
        Self{
            run: RunConfig::default(),
            stop_voltage: 5.0,
            step_voltage: 0.25,
            delay_s: 0.05,
            current_compliance: 1.05,
            current_range: 1e-6,
            decimals: Some(2),
        }
    }
}

impl IvSweepConfig {

    pub fn validate(&self) -> io::Result<()> {
        check_finite("stop_voltage", self.stop_voltage)?;
        check_positive("step_voltage", self.step_voltage)?;
        check_delay("delay_s", self.delay_s)?;
        check_positive("current_compliance", self.current_compliance)?;
        check_positive("current_range", self.current_range)
    }

    // The sweep runs symmetric about zero whichever sign `stop_voltage` has
    pub fn bounds(&self) -> (f64, f64) { (-self.stop_voltage.abs(), self.stop_voltage.abs()) }

    pub fn delay(&self) -> Duration { Duration::from_secs_f64(self.delay_s) }

}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViSweepConfig {
    #[serde(flatten)]
    pub run: RunConfig,
    pub min_current: f64,
    pub max_current: f64,
    pub step_current: f64,
    pub delay_s: f64,
    pub voltage_compliance: f64,
    pub voltage_range: f64,
}

impl Default for ViSweepConfig {
    fn default() -> Self {
        Self{
            run: RunConfig::default(),
            min_current: -2.5e-9,
            max_current: 2.5e-9,
            step_current: 1e-10,
            delay_s: 0.05,
            voltage_compliance: 80.0,
            voltage_range: 80.0,
        }
    }
}

impl ViSweepConfig {

    pub fn validate(&self) -> io::Result<()> {
        check_finite("min_current", self.min_current)?;
        check_finite("max_current", self.max_current)?;
        if self.min_current > 0.0 || self.max_current < 0.0 {
            return Err(invalid(format!("Current sweep must span zero, got {} to {}", self.min_current, self.max_current)));
        }
        check_positive("step_current", self.step_current)?;
        check_delay("delay_s", self.delay_s)?;
        check_positive("voltage_compliance", self.voltage_compliance)?;
        check_positive("voltage_range", self.voltage_range)
    }

    pub fn delay(&self) -> Duration { Duration::from_secs_f64(self.delay_s) }

}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItTraceConfig {
    #[serde(flatten)]
    pub run: RunConfig,
    pub voltage: f64,
    pub v_ramp: f64,
    pub ramping_delay_s: f64,
    pub current_compliance: f64,
    pub current_range: f64,
    pub total_time_s: f64,
    pub window_s: f64,
}

impl Default for ItTraceConfig {
    fn default() -> Self {
        Self{
            run: RunConfig::default(),
            voltage: -10.0,
            v_ramp: 0.1,
            ramping_delay_s: 0.1,
            current_compliance: 0.3,
            current_range: 1e-5,
            total_time_s: 75.0,
            window_s: 30.0,
        }
    }
}

impl ItTraceConfig {

    pub fn validate(&self) -> io::Result<()> {
        check_finite("voltage", self.voltage)?;
        check_positive("v_ramp", self.v_ramp)?;
        check_delay("ramping_delay_s", self.ramping_delay_s)?;
        check_positive("current_compliance", self.current_compliance)?;
        check_positive("current_range", self.current_range)?;
        check_positive("total_time_s", self.total_time_s)?;
        check_positive("window_s", self.window_s)
    }

    pub fn ramping_delay(&self) -> Duration { Duration::from_secs_f64(self.ramping_delay_s) }

}

/// Reads a config file, or the defaults when there's no path.
pub fn load<T: DeserializeOwned + Default>(path:Option<&Path>) -> io::Result<T> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path)?;
            let cfg = serde_json::from_str(&text)
                .map_err(|e| Error::new(ErrorKind::InvalidData, format!("{}: {}", path.display(), e)))?;
            info!("Loaded configuration from {}", path.display());
            Ok(cfg)
        },
        None => Ok(T::default()),
    }
}

pub fn to_json<T: Serialize>(cfg:&T) -> io::Result<String> {
    serde_json::to_string_pretty(cfg).map_err(|e| Error::new(ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_bench() {
        let iv = IvSweepConfig::default();
        assert_eq!(iv.bounds(), (-5.0, 5.0));
        assert_eq!(iv.decimals, Some(2));
        assert_eq!(iv.run.bus, BusConfig::default());
        assert_eq!(iv.run.live_every, 5);

        let vi = ViSweepConfig::default();
        assert_eq!((vi.min_current, vi.max_current, vi.step_current), (-2.5e-9, 2.5e-9, 1e-10));

        let it = ItTraceConfig::default();
        assert_eq!((it.voltage, it.total_time_s, it.window_s), (-10.0, 75.0, 30.0));

        assert!(iv.validate().is_ok() && vi.validate().is_ok() && it.validate().is_ok());
    }

    #[test]
    fn partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iv.json");
        fs::write(&path, r#"{
            "stop_voltage": 2.0,
            "decimals": null,
            "output_dir": "runs",
            "bus": { "kind": "simulated", "resistance_ohms": 1e6 }
        }"#).unwrap();

        let cfg:IvSweepConfig = load(Some(&path)).unwrap();
        assert_eq!(cfg.stop_voltage, 2.0);
        assert_eq!(cfg.step_voltage, 0.25);
        assert_eq!(cfg.decimals, None);
        assert_eq!(cfg.run.output_dir, PathBuf::from("runs"));
        assert_eq!(cfg.run.bus, BusConfig::Simulated{ resistance_ohms: 1e6, noise_floor: 0.0 });
    }

    #[test]
    fn dumped_config_loads_back() {
        let mut cfg = ItTraceConfig::default();
        cfg.run.file_suffix = Some("sample3".to_owned());
        let text = to_json(&cfg).unwrap();
        assert!(text.contains("\"ramping_delay_s\""));
        assert_eq!(serde_json::from_str::<ItTraceConfig>(&text).unwrap(), cfg);
    }

    #[test]
    fn bad_values_are_rejected() {
        let mut iv = IvSweepConfig::default();
        iv.step_voltage = 0.0;
        assert_eq!(iv.validate().unwrap_err().kind(), ErrorKind::InvalidInput);

        let mut vi = ViSweepConfig::default();
        vi.delay_s = -1.0;
        assert!(vi.validate().is_err());
        vi.delay_s = 0.01;
        assert!(vi.validate().is_ok());
        vi.min_current = 1e-9;
        assert!(vi.validate().is_err());

        let mut it = ItTraceConfig::default();
        it.voltage = f64::NAN;
        assert!(it.validate().is_err());

        assert!(load::<IvSweepConfig>(Some(Path::new("/nonexistent/iv.json"))).is_err());
    }
}
