//! Transports that carry SCPI text to a GPIB instrument and bring replies back.
//!
//! GPIB is reached over the network: either through a VXI-11 LAN/GPIB gateway, which exposes the instrument
//! at address 24 as device `gpib0,24`, or through a Prologix GPIB-ETHERNET controller. [`SimulatedSmu`]
//! stands in for the instrument when no hardware is attached.

use std::io;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod vxi11_bus;
pub mod prologix;
pub mod simulated;

pub use self::prologix::PrologixBus;
pub use self::simulated::SimulatedSmu;
pub use self::vxi11_bus::Vxi11Bus;

/// A message-based connection to one instrument.
///
/// Commands are passed without a terminator; each implementation adds whatever its transport needs.
pub trait Bus {
    fn write(&mut self, cmd:&str) -> io::Result<()>;

    /// Reads one reply, decoded and stripped of its line terminator.
    fn read(&mut self) -> io::Result<String>;

    fn ask(&mut self, cmd:&str) -> io::Result<String> {
        self.write(cmd)?;
        self.read()
    }

    /// Selected device clear.  Transports without one treat this as a no-op.
    fn clear(&mut self) -> io::Result<()> { Ok(()) }

    /// Releases the instrument at the end of a run.  Nothing should be sent afterwards.
    fn close(&mut self) -> io::Result<()> { Ok(()) }
}

impl<B: Bus + ?Sized> Bus for Box<B> {
    fn write(&mut self, cmd:&str) -> io::Result<()> { (**self).write(cmd) }
    fn read(&mut self) -> io::Result<String> { (**self).read() }
    fn ask(&mut self, cmd:&str) -> io::Result<String> { (**self).ask(cmd) }
    fn clear(&mut self) -> io::Result<()> { (**self).clear() }
    fn close(&mut self) -> io::Result<()> { (**self).close() }
}

/// Turns raw reply bytes into text.  Anything that isn't valid UTF-8 keeps only its ASCII bytes, since line
/// noise on a long GPIB cable shouldn't cost the whole reading.
pub fn decode_reply(bytes:&[u8]) -> String {
    let text = match std::str::from_utf8(bytes) {
        Ok(s) => s.to_owned(),
        Err(_) => bytes.iter().filter(|b| b.is_ascii()).map(|b| *b as char).collect(),
    };
    text.trim_end_matches(|c| c == '\r' || c == '\n').to_owned()
}

fn default_device() -> String { "gpib0,24".to_owned() }
fn default_timeout_ms() -> u64 { 5000 }
fn default_prologix_port() -> u16 { prologix::DEFAULT_PORT }
fn default_address() -> u8 { 24 }
fn default_resistance() -> f64 { 1.0e8 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BusConfig {
    Vxi11 {
        host: String,
        #[serde(default = "default_device")]
        device: String,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
    Prologix {
        host: String,
        #[serde(default = "default_prologix_port")]
        port: u16,
        #[serde(default = "default_address")]
        address: u8,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
    Simulated {
        #[serde(default = "default_resistance")]
        resistance_ohms: f64,
        #[serde(default)]
        noise_floor: f64,
    },
}

impl Default for BusConfig {
    fn default() -> Self {
        BusConfig::Vxi11{ host: "192.168.0.10".to_owned(), device: default_device(), timeout_ms: default_timeout_ms() }
    }
}

impl BusConfig {

    pub fn simulated() -> Self {
        BusConfig::Simulated{ resistance_ohms: default_resistance(), noise_floor: 0.0 }
    }

    pub fn open(&self) -> io::Result<Box<dyn Bus>> {
        match self {
            BusConfig::Vxi11{ host, device, timeout_ms } => {
                Ok(Box::new(Vxi11Bus::connect(host, device, Duration::from_millis(*timeout_ms))?))
            },
            BusConfig::Prologix{ host, port, address, timeout_ms } => {
                Ok(Box::new(PrologixBus::connect(host, *port, *address, Duration::from_millis(*timeout_ms))?))
            },
            BusConfig::Simulated{ resistance_ohms, noise_floor } => {
                Ok(Box::new(SimulatedSmu::new(*resistance_ohms).with_noise(*noise_floor)))
            },
        }
    }

    pub fn describe(&self) -> String {
        match self {
            BusConfig::Vxi11{ host, device, .. } => format!("VXI-11 {} on {}", device, host),
            BusConfig::Prologix{ host, port, address, .. } => format!("Prologix {}:{} GPIB address {}", host, port, address),
            BusConfig::Simulated{ resistance_ohms, .. } => format!("simulated SMU into {:e} ohm", resistance_ohms),
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replies_lose_terminators_and_garbage() {
        assert_eq!(decode_reply(b"+1.000E+00,+2.000E-06\r\n"), "+1.000E+00,+2.000E-06");
        assert_eq!(decode_reply(&[b'1', 0xff, b'.', b'5', b'\n']), "1.5");
        assert_eq!(decode_reply(b""), "");
    }

    #[test]
    fn bus_config_fills_in_defaults() {
        let cfg:BusConfig = serde_json::from_str(r#"{"kind": "prologix", "host": "10.0.0.5"}"#).unwrap();
        assert_eq!(cfg, BusConfig::Prologix{ host: "10.0.0.5".to_owned(), port: 1234, address: 24, timeout_ms: 5000 });

        let cfg:BusConfig = serde_json::from_str(r#"{"kind": "vxi11", "host": "gw", "device": "gpib0,5"}"#).unwrap();
        assert_eq!(cfg.describe(), "VXI-11 gpib0,5 on gw");
    }

    #[test]
    fn simulated_bus_opens_without_hardware() {
        let mut bus = BusConfig::simulated().open().unwrap();
        assert!(bus.ask("*IDN?").unwrap().contains("MODEL 2400"));
    }
}
