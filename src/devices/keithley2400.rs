//! Keithley 2400-series SourceMeter driver.
//!
//! The driver is a thin layer over a [`Bus`]: each method sends the same SCPI strings the bench scripts
//! always used, and the driver remembers just enough state (source function, last commanded level) to bring
//! the source back to zero safely.

use std::fmt;
use std::io::{self, Error, ErrorKind};
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::bus::Bus;
use crate::sweep;
use crate::utils::format_level;

lazy_static! {
	static ref IDN_RE: Regex   = Regex::new(r"^\s*([^,]+),\s*([^,]+),\s*([^,]+),\s*(.*?)\s*$").unwrap();
	static ref MODEL_RE: Regex = Regex::new(r"24\d\d").unwrap();
	static ref ERR_RE: Regex   = Regex::new(r#"^\s*([+-]?\d+)\s*,\s*"?([^"]*)"?\s*$"#).unwrap();
}

// Status word bit set when the sensed quantity is clamped at the compliance limit
pub const STATUS_COMPLIANCE:u32 = 1 << 3;

// Placeholder the instrument reports for a quantity it isn't measuring
pub const NOT_A_NUMBER:f64 = 9.91e37;

// Compliance limits of the 2400 (current in A, voltage in V)
pub const CURRENT_COMPLIANCE_LIMITS:(f64, f64) = (1.0e-6, 1.05);
pub const VOLTAGE_COMPLIANCE_LIMITS:(f64, f64) = (200.0e-6, 210.0);

fn err(msg:&str) -> io::Error { Error::new(ErrorKind::Other, msg) }

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
	pub manufacturer: String,
	pub model: String,
	pub serial_num: String,
	pub fw_version: String,
}

impl Identity {

	pub fn parse(idn:&str) -> io::Result<Self> {
		let caps = IDN_RE.captures(idn)
			.ok_or_else(|| Error::new(ErrorKind::InvalidData, format!("Unrecognized *IDN? reply: {:?}", idn)))?;
		let field = |i:usize| caps.get(i).map(|m| m.as_str().trim().to_owned()).unwrap_or_default();
		Ok(Self{ manufacturer: field(1), model: field(2), serial_num: field(3), fw_version: field(4) })
	}

	pub fn is_2400_series(&self) -> bool {
		self.manufacturer.to_ascii_uppercase().contains("KEITHLEY") && MODEL_RE.is_match(&self.model)
	}

}

impl fmt::Display for Identity {
	fn fmt(&self, f:&mut fmt::Formatter) -> fmt::Result {
		write!(f, "{} {} (s/n {})", self.manufacturer, self.model, self.serial_num)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceFunction {
	Voltage,
	Current,
}

impl SourceFunction {

	pub fn mnemonic(&self) -> &'static str {
		match self {
			SourceFunction::Voltage => "VOLT",
			SourceFunction::Current => "CURR",
		}
	}

	pub fn unit(&self) -> &'static str {
		match self {
			SourceFunction::Voltage => "V",
			SourceFunction::Current => "A",
		}
	}

	// What the instrument measures while sourcing this
	pub fn sensed_unit(&self) -> &'static str {
		match self {
			SourceFunction::Voltage => "A",
			SourceFunction::Current => "V",
		}
	}

	fn compliance_limits(&self) -> (f64, f64) {
		match self {
			SourceFunction::Voltage => CURRENT_COMPLIANCE_LIMITS,
			SourceFunction::Current => VOLTAGE_COMPLIANCE_LIMITS,
		}
	}

}

/// One reply to `:READ?`.  With the default `:FORMat:ELEMents` the 2400 sends voltage, current, resistance,
/// timestamp and status in that order; only the first two are required here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
	pub voltage: f64,
	pub current: f64,
	pub resistance: Option<f64>,
	pub timestamp: Option<f64>,
	pub status: Option<u32>,
}

impl Reading {

	pub fn parse(reply:&str) -> io::Result<Self> {
		let fields:Vec<&str> = reply.trim().split(',').map(|f| f.trim()).collect();
		if fields.len() < 2 {
			return Err(Error::new(ErrorKind::InvalidData, format!("Expected at least voltage and current in reading {:?}", reply)));
		}

		let number = |idx:usize, name:&str| -> io::Result<f64> {
			fields[idx].parse::<f64>()
				.map_err(|_| Error::new(ErrorKind::InvalidData, format!("Unable to parse {} {:?} in reading {:?}", name, fields[idx], reply)))
		};
		let optional = |idx:usize, name:&str| -> io::Result<Option<f64>> {
			if idx < fields.len() { number(idx, name).map(Some) } else { Ok(None) }
		};

		let voltage    = number(0, "voltage")?;
		let current    = number(1, "current")?;
		let resistance = optional(2, "resistance")?.filter(|r| *r < NOT_A_NUMBER);
		let timestamp  = optional(3, "timestamp")?;
		let status     = optional(4, "status")?.map(|s| s as u32);

		Ok(Self{ voltage, current, resistance, timestamp, status })
	}

	pub fn sourced(&self, function:SourceFunction) -> f64 {
		match function {
			SourceFunction::Voltage => self.voltage,
			SourceFunction::Current => self.current,
		}
	}

	pub fn sensed(&self, function:SourceFunction) -> f64 {
		match function {
			SourceFunction::Voltage => self.current,
			SourceFunction::Current => self.voltage,
		}
	}

	pub fn in_compliance(&self) -> bool {
		self.status.map_or(false, |s| s & STATUS_COMPLIANCE != 0)
	}

}

pub struct Keithley2400<B: Bus> {
	bus: B,
	identity: Identity,
	function: Option<SourceFunction>,
	level: f64,
	output_on: bool,
}

impl<B: Bus> Keithley2400<B> {

	pub fn new(mut bus:B) -> io::Result<Self> {
		let idn = bus.ask("*IDN?")?;
		let identity = Identity::parse(&idn)?;

		if identity.is_2400_series() {
			info!("Connected to {}", identity);
		} else {
			warn!("{} doesn't look like a 2400-series SourceMeter, continuing anyway", identity);
		}

		Ok(Self{ bus, identity, function: None, level: 0.0, output_on: false })
	}

	pub fn identity(&self) -> &Identity { &self.identity }

	pub fn bus(&self) -> &B { &self.bus }

	pub fn bus_mut(&mut self) -> &mut B { &mut self.bus }

	pub fn into_bus(self) -> B { self.bus }

	pub fn function(&self) -> Option<SourceFunction> { self.function }

	// Last level commanded with `set_level`
	pub fn level(&self) -> f64 { self.level }

	pub fn output_enabled(&self) -> bool { self.output_on }

	fn send(&mut self, cmd:&str) -> io::Result<()> {
		debug!("> {}", cmd);
		self.bus.write(cmd)
	}

	pub fn reset(&mut self) -> io::Result<()> {
		self.send("*RST")?;
		self.function = None;
		self.level = 0.0;
		self.output_on = false;
		Ok(())
	}

	pub fn clear_buffer(&mut self) -> io::Result<()> { self.send(":TRACe:CLEar") }

	// Fixed-level source with compliance on, and a fixed range for, the sensed quantity
	pub fn configure(&mut self, function:SourceFunction, compliance:f64, sense_range:f64) -> io::Result<()> {
		if !compliance.is_finite() || compliance <= 0.0 || !sense_range.is_finite() || sense_range <= 0.0 {
			return Err(Error::new(ErrorKind::InvalidInput, "Compliance and sense range must be positive and finite"));
		}

		let (min, max) = function.compliance_limits();
		if compliance < min || compliance > max {
			warn!("Compliance {}{} is outside the instrument's {}{} to {}{} limits",
				compliance, function.sensed_unit(), min, function.sensed_unit(), max, function.sensed_unit());
		}

		let (compliance, sense_range) = (format_level(compliance), format_level(sense_range));
		let commands:Vec<String> = match function {
			SourceFunction::Voltage => vec![
				":SOUR:FUNC VOLT".to_owned(),
				":TRACe:CLEar".to_owned(),
				":SOUR:VOLT:MODE FIXED".to_owned(),
				format!(":SENSe:CURRent:PROTection {}", compliance),
				format!(":SENS:CURR:RANG {}", sense_range),
				":SENS:FUNC 'CURR'".to_owned(),
			],
			SourceFunction::Current => vec![
				":SOUR:FUNC CURR".to_owned(),
				":TRACe:CLEar".to_owned(),
				":SOUR:CURR:MODE FIXED".to_owned(),
				format!(":SENSe:VOLT:PROTection {}", compliance),
				format!(":SENS:VOLT:RANG {}", sense_range),
				":SENS:FUNC 'VOLT'".to_owned(),
			],
		};

		for cmd in commands.iter() {
			self.send(cmd)?;
		}

		self.function = Some(function);
		self.level = 0.0;
		Ok(())
	}

	pub fn output(&mut self, on:bool) -> io::Result<()> {
		self.send(if on { ":OUTP ON" } else { ":OUTP OFF" })?;
		self.output_on = on;
		Ok(())
	}

	pub fn set_level(&mut self, level:f64) -> io::Result<()> {
		let function = self.function.ok_or_else(|| err("Source function must be configured before setting a level"))?;
		if !level.is_finite() {
			return Err(Error::new(ErrorKind::InvalidInput, format!("Refusing to source a non-finite level {}", level)));
		}

		self.send(&format!(":SOUR:{}:LEV {}", function.mnemonic(), format_level(level)))?;
		self.level = level;
		Ok(())
	}

	// Zero the timestamp that makes up the fourth element of each reading
	pub fn reset_timestamp(&mut self) -> io::Result<()> { self.send(":SYSTem:TIME:RESet") }

	pub fn measure(&mut self) -> io::Result<Reading> {
		let reply = self.bus.ask(":READ?")?;
		debug!("< {}", reply);
		Reading::parse(&reply)
	}

	pub fn check_error(&mut self) -> io::Result<(i32, String)> {
		let reply = self.bus.ask(":SYSTem:ERRor?")?;
		let caps = ERR_RE.captures(&reply)
			.ok_or_else(|| Error::new(ErrorKind::InvalidData, format!("Unrecognized error queue reply: {:?}", reply)))?;
		let code:i32 = caps[1].parse().map_err(|_| Error::new(ErrorKind::InvalidData, "Error code out of range"))?;
		Ok((code, caps[2].to_owned()))
	}

	// Walk from the last commanded level to `target`, pausing `delay` after each step
	pub fn ramp_to(&mut self, target:f64, step:f64, delay:Duration) -> io::Result<()> {
		for level in sweep::ramp(self.level, target, step)? {
			self.set_level(level)?;
			thread::sleep(delay);
		}
		Ok(())
	}

	// Release the bus.  Call after `shutdown`; the driver can't be used afterwards.
	pub fn close(&mut self) -> io::Result<()> {
		self.bus.close()?;
		debug!("Bus to {} closed", self.identity);
		Ok(())
	}

	/// Leave the instrument safe: ramp the source to zero and switch the output off.
	///
	/// Never fails.  If the ramp breaks off, the output is still switched off; every error along the way is
	/// logged and dropped, since there's nothing better to do with it at this point.
	pub fn shutdown(&mut self, step:f64, delay:Duration) {
		if let Some(function) = self.function {
			info!("Ramping {} back to zero...", if function == SourceFunction::Voltage { "voltage" } else { "current" });

			let ramped = self.ramp_to(0.0, step, delay)
				.and_then(|_| self.set_level(0.0))
				.map(|_| thread::sleep(delay));

			match ramped {
				Ok(()) => info!("Source at zero"),
				Err(e) => error!("Error during ramp to zero: {}", e),
			}
		}

		match self.output(false) {
			Ok(()) => info!("Output off"),
			Err(e) => error!("Unable to switch the output off: {}", e),
		}
	}

}
