
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use log::info;

use crate::vxi11::CoreClient;
use super::{decode_reply, Bus};

// Device name a LAN/GPIB gateway uses for a primary address on its first board
pub fn gpib_device(board:u8, address:u8) -> String { format!("gpib{},{}", board, address) }

// Extra time the socket waits beyond the device-side I/O timeout
const SOCKET_MARGIN:Duration = Duration::from_secs(1);

// Socket timeout and VXI-11 io_timeout for a requested timeout.  The gateway has to give up first, so a slow
// instrument comes back as a device error instead of a dead socket.
fn timeouts(timeout:Duration) -> (Duration, u32) {
	let io_timeout_ms = timeout.as_millis().min(u32::MAX as u128) as u32;
	(timeout + SOCKET_MARGIN, io_timeout_ms)
}

pub struct Vxi11Bus<S: Read + Write = TcpStream> {
	core: CoreClient<S>,
	device: String,
}

impl Vxi11Bus<TcpStream> {

	pub fn connect(host:&str, device:&str, timeout:Duration) -> io::Result<Self> {
		let (socket_timeout, io_timeout_ms) = timeouts(timeout);
		let mut core = CoreClient::connect(host, socket_timeout)?;
		core.io_timeout_ms = io_timeout_ms;
		let bus = Self::with_core(core, device)?;
		info!("Linked to {} on {}", device, host);
		Ok(bus)
	}

}

impl<S: Read + Write> Vxi11Bus<S> {

	pub fn with_core(mut core:CoreClient<S>, device:&str) -> io::Result<Self> {
		core.create_link(device)?;
		Ok(Self{ core, device: device.to_owned() })
	}

	pub fn device(&self) -> &str { &self.device }

}

impl<S: Read + Write> Bus for Vxi11Bus<S> {

	fn write(&mut self, cmd:&str) -> io::Result<()> {
		let mut line = String::with_capacity(cmd.len() + 1);
		line.push_str(cmd);
		line.push('\n');
		self.core.write(line.as_bytes())
	}

	fn read(&mut self) -> io::Result<String> { Ok(decode_reply(&self.core.read()?)) }

	fn clear(&mut self) -> io::Result<()> { self.core.clear() }

	// Destroys the link so the gateway can hand the address to another client
	fn close(&mut self) -> io::Result<()> {
		if self.core.link().is_none() {
			return Ok(());
		}
		self.core.destroy_link()?;
		info!("Closed link to {}", self.device);
		Ok(())
	}

}
