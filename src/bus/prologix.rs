//! Prologix GPIB-ETHERNET controller.
//!
//! The controller listens on TCP 1234. Lines starting with `++` configure the controller itself, anything else is
//! forwarded to the instrument at the current GPIB address. With `++auto 0` the instrument is only addressed to
//! talk when we send `++read`.

use std::io::{self, BufRead, BufReader, Error, ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use log::{debug, info};

use crate::utils::connect_tcp;
use super::{decode_reply, Bus};

pub const DEFAULT_PORT:u16 = 1234;

// Largest read timeout the controller accepts
pub const MAX_READ_TIMEOUT_MS:u64 = 3000;

const ESC:char = '\x1b';

pub struct PrologixBus<S: Read + Write = TcpStream> {
	stream: BufReader<S>,
	address: u8,
}

// Characters the controller would otherwise interpret must be preceded by ESC
pub fn escape(cmd:&str) -> String {
	let mut out = String::with_capacity(cmd.len());
	for c in cmd.chars() {
		if c == '\n' || c == '\r' || c == ESC || c == '+' {
			out.push(ESC);
		}
		out.push(c);
	}
	out
}

impl PrologixBus<TcpStream> {

	pub fn connect(host:&str, port:u16, address:u8, timeout:Duration) -> io::Result<Self> {
		let stream = connect_tcp((host, port), timeout)?;
		let bus = Self::new(stream, address, timeout.as_millis() as u64)?;
		info!("Prologix controller at {}:{} addressing GPIB {}", host, port, address);
		Ok(bus)
	}

}

impl<S: Read + Write> PrologixBus<S> {

	pub fn new(stream:S, address:u8, read_timeout_ms:u64) -> io::Result<Self> {
		if address > 30 {
			return Err(Error::new(ErrorKind::InvalidInput, format!("GPIB primary address {} is outside 0-30", address)));
		}

		let mut bus = Self{ stream: BufReader::new(stream), address };
		bus.send_line("++mode 1")?;                        // controller, not device
		bus.send_line(&format!("++addr {}", address))?;
		bus.send_line("++auto 0")?;
		bus.send_line("++eoi 1")?;
		bus.send_line("++eos 2")?;                         // append LF to forwarded commands
		bus.send_line(&format!("++read_tmo_ms {}", read_timeout_ms.max(1).min(MAX_READ_TIMEOUT_MS)))?;
		Ok(bus)
	}

	pub fn address(&self) -> u8 { self.address }

	pub fn get_ref(&self) -> &S { self.stream.get_ref() }

	fn send_line(&mut self, line:&str) -> io::Result<()> {
		debug!("prologix > {}", line);
		let stream = self.stream.get_mut();
		stream.write_all(line.as_bytes())?;
		stream.write_all(b"\n")?;
		stream.flush()
	}

}

impl<S: Read + Write> Bus for PrologixBus<S> {

	fn write(&mut self, cmd:&str) -> io::Result<()> { self.send_line(&escape(cmd)) }

	fn read(&mut self) -> io::Result<String> {
		self.send_line("++read eoi")?;

		let mut line:Vec<u8> = vec![];
		self.stream.read_until(b'\n', &mut line)?;
		if line.is_empty() {
			return Err(Error::new(ErrorKind::UnexpectedEof, "Prologix controller closed the connection"));
		}
		Ok(decode_reply(&line))
	}

	fn clear(&mut self) -> io::Result<()> { self.send_line("++clr") }

	// Hand the front panel back to the operator
	fn close(&mut self) -> io::Result<()> { self.send_line("++loc") }

}
