//! An in-process stand-in for a Keithley 2400 sourcing into a resistor.
//!
//! It understands the subset of SCPI the driver sends, honours compliance limits, and keeps a simulated
//! timestamp that advances by one sample period per reading. Every command is recorded, which is what
//! the tests use to check command sequences.

use std::collections::VecDeque;
use std::io::{self, Error, ErrorKind};

use log::debug;
use rand::Rng;

use crate::devices::keithley2400::{SourceFunction, STATUS_COMPLIANCE};
use crate::utils::format_sci;
use super::Bus;

pub const IDN:&str = "KEITHLEY INSTRUMENTS INC.,MODEL 2400,SIMULATED,C30   Mar 17 2006 09:29:29/A02  /K/J";

// Reported in the resistance field when resistance isn't being measured
pub const NOT_MEASURED:f64 = 9.91e37;

// *RST compliance limits
const RST_CURRENT_COMPLIANCE:f64 = 105e-6;
const RST_VOLTAGE_COMPLIANCE:f64 = 21.0;

#[derive(Debug)]
pub struct SimulatedSmu {
	resistance_ohms: f64,
	noise_floor: f64,
	sample_period_s: f64,
	source: SourceFunction,
	voltage_level: f64,
	current_level: f64,
	current_compliance: f64,
	voltage_compliance: f64,
	output_on: bool,
	clock_s: f64,
	replies: VecDeque<String>,
	errors: VecDeque<(i32, &'static str)>,
	history: Vec<String>,
	reads_before_failure: Option<usize>,
	closed: bool,
}

// SCPI short form of a node: the first four letters, or three when the fourth is a vowel ("LEVel", "CLEar")
fn short_form(node:&str) -> String {
	let upper = node.to_ascii_uppercase();
	if upper.len() <= 4 || !upper.is_ascii() {
		return upper;
	}
	let take = if matches!(upper.as_bytes()[3], b'A' | b'E' | b'I' | b'O' | b'U') { 3 } else { 4 };
	upper[..take].to_owned()
}

fn keithley_number(x:f64) -> String {
	let s = format_sci(x, 6, 'E');
	if s.starts_with('-') { s } else { format!("+{}", s) }
}

impl SimulatedSmu {

	pub fn new(resistance_ohms:f64) -> Self {
		Self{
			resistance_ohms,
			noise_floor: 0.0,
			sample_period_s: 0.05,
			source: SourceFunction::Voltage,
			voltage_level: 0.0,
			current_level: 0.0,
			current_compliance: RST_CURRENT_COMPLIANCE,
			voltage_compliance: RST_VOLTAGE_COMPLIANCE,
			output_on: false,
			clock_s: 0.0,
			replies: VecDeque::new(),
			errors: VecDeque::new(),
			history: vec![],
			reads_before_failure: None,
			closed: false,
		}
	}

	// Uniform noise of +/- `noise_floor` on the sensed quantity
	pub fn with_noise(mut self, noise_floor:f64) -> Self {
		self.noise_floor = noise_floor.abs();
		self
	}

	pub fn with_sample_period(mut self, seconds:f64) -> Self {
		self.sample_period_s = seconds;
		self
	}

	// After `n` successful `:READ?` replies, every further read fails as if the bus had dropped
	pub fn fail_after_reads(mut self, n:usize) -> Self {
		self.reads_before_failure = Some(n);
		self
	}

	pub fn history(&self) -> &[String] { &self.history }

	pub fn output_enabled(&self) -> bool { self.output_on }

	pub fn is_closed(&self) -> bool { self.closed }

	// Replies written by the instrument but not read yet
	pub fn pending_replies(&self) -> usize { self.replies.len() }

	pub fn source(&self) -> SourceFunction { self.source }

	pub fn level(&self) -> f64 {
		match self.source {
			SourceFunction::Voltage => self.voltage_level,
			SourceFunction::Current => self.current_level,
		}
	}

	fn check_open(&self) -> io::Result<()> {
		if self.closed { Err(Error::new(ErrorKind::NotConnected, "Simulated bus is closed")) } else { Ok(()) }
	}

	fn reset(&mut self) {
		let kept = (self.resistance_ohms, self.noise_floor, self.sample_period_s, self.reads_before_failure);
		let history = std::mem::take(&mut self.history);
		*self = Self::new(kept.0);
		self.noise_floor = kept.1;
		self.sample_period_s = kept.2;
		self.reads_before_failure = kept.3;
		self.history = history;
	}

	fn noise(&self) -> f64 {
		if self.noise_floor > 0.0 { rand::thread_rng().gen_range(-self.noise_floor..self.noise_floor) } else { 0.0 }
	}

	fn reading(&mut self) -> String {
		let mut status:u32 = 0;
		let (voltage, current) = match self.source {
			SourceFunction::Voltage => {
				let v = self.voltage_level;
				let mut i = v / self.resistance_ohms + self.noise();
				if i.abs() > self.current_compliance {
					i = self.current_compliance.copysign(i);
					status |= STATUS_COMPLIANCE;
				}
				(v, i)
			},
			SourceFunction::Current => {
				let i = self.current_level;
				let mut v = i * self.resistance_ohms + self.noise();
				if v.abs() > self.voltage_compliance {
					v = self.voltage_compliance.copysign(v);
					status |= STATUS_COMPLIANCE;
				}
				(v, i)
			},
		};

		self.clock_s += self.sample_period_s;
		[voltage, current, NOT_MEASURED, self.clock_s, status as f64].iter()
			.map(|x| keithley_number(*x))
			.collect::<Vec<String>>()
			.join(",")
	}

	fn number(&mut self, arg:&str) -> Option<f64> {
		match arg.trim().parse::<f64>() {
			Ok(x) if x.is_finite() => Some(x),
			_ => {
				self.errors.push_back((-104, "Data type error"));
				None
			},
		}
	}

	fn execute(&mut self, cmd:&str) {
		let cmd = cmd.trim();
		let (header, arg) = match cmd.find(char::is_whitespace) {
			Some(idx) => (&cmd[..idx], cmd[idx..].trim()),
			None => (cmd, ""),
		};
		let header = header.to_ascii_uppercase();
		let query = header.ends_with('?');

		if header.starts_with('*') {
			match header.as_str() {
				"*IDN?" => self.replies.push_back(IDN.to_owned()),
				"*RST"  => self.reset(),
				"*CLS"  => self.errors.clear(),
				_       => self.errors.push_back((-113, "Undefined header")),
			}
			return;
		}

		let nodes:Vec<String> = header.trim_start_matches(':').trim_end_matches('?')
			.split(':')
			.filter(|n| !n.is_empty())
			.map(short_form)
			.filter(|n| n != "IMM" && n != "AMPL")
			.collect();
		let nodes:Vec<&str> = nodes.iter().map(|n| n.as_str()).collect();
		let value = short_form(arg.trim_matches(|c| c == '\'' || c == '"'));

		match (nodes.as_slice(), query) {
			(["SOUR", "FUNC"], false) => match value.as_str() {
				"VOLT" => self.source = SourceFunction::Voltage,
				"CURR" => self.source = SourceFunction::Current,
				_ => self.errors.push_back((-224, "Illegal parameter value")),
			},
			(["SOUR", _, "MODE"], false) => { },
			(["SOUR", "VOLT", "LEV"], false) => if let Some(x) = self.number(arg) { self.voltage_level = x },
			(["SOUR", "CURR", "LEV"], false) => if let Some(x) = self.number(arg) { self.current_level = x },
			(["SENS", "CURR", "PROT"], false) => if let Some(x) = self.number(arg) { self.current_compliance = x.abs() },
			(["SENS", "VOLT", "PROT"], false) => if let Some(x) = self.number(arg) { self.voltage_compliance = x.abs() },
			(["SENS", _, "RANG"], false) => { self.number(arg); },
			(["SENS", "FUNC"], false) => { },
			(["TRAC", "CLE"], false) => { },
			(["OUTP"], false) | (["OUTP", "STAT"], false) => match value.as_str() {
				"ON" | "1" => self.output_on = true,
				"OFF" | "0" => self.output_on = false,
				_ => self.errors.push_back((-224, "Illegal parameter value")),
			},
			(["SYST", "TIME", "RES"], false) => self.clock_s = 0.0,
			(["SYST", "ERR"], true) => {
				let (code, msg) = self.errors.pop_front().unwrap_or((0, "No error"));
				self.replies.push_back(format!("{},\"{}\"", code, msg));
			},
			(["READ"], true) => {
				if self.output_on {
					let reading = self.reading();
					self.replies.push_back(reading);
				} else {
					self.errors.push_back((803, "Output disabled"));
				}
			},
			_ => self.errors.push_back((-113, "Undefined header")),
		}
	}

}

impl Bus for SimulatedSmu {

	fn write(&mut self, cmd:&str) -> io::Result<()> {
		self.check_open()?;
		debug!("sim > {}", cmd);
		self.history.push(cmd.to_owned());
		self.execute(cmd);
		Ok(())
	}

	fn read(&mut self) -> io::Result<String> {
		self.check_open()?;
		if let Some(n) = self.reads_before_failure {
			if n == 0 {
				// The reply is lost with the bus, it mustn't turn up on a later read
				self.replies.pop_front();
				return Err(Error::new(ErrorKind::BrokenPipe, "Simulated bus failure"));
			}
			if self.history.last().map_or(false, |c| c.eq_ignore_ascii_case(":READ?")) {
				self.reads_before_failure = Some(n - 1);
			}
		}

		self.replies.pop_front()
			.ok_or_else(|| Error::new(ErrorKind::TimedOut, "Read timed out: instrument has nothing to send"))
	}

	fn close(&mut self) -> io::Result<()> {
		self.check_open()?;
		debug!("sim closed");
		self.closed = true;
		Ok(())
	}

}
