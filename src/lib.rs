
#[macro_use]
extern crate lazy_static;

// External data representation, the serialization format underneath ONC RPC
pub mod xdr;

// Remote procedure call over TCP, the transport VXI-11 is built on
pub mod rpc;

// VXI-11 core channel.  LAN/GPIB gateways expose each GPIB address as a VXI-11 device such as "gpib0,24"
pub mod vxi11;

// Ways of getting SCPI text to an instrument and replies back
pub mod bus;

// Instrument drivers built on top of a bus
pub mod devices;

pub mod sweep;
pub mod trace;
pub mod output;
pub mod plot;
pub mod config;
pub mod experiment;
pub mod cli;

pub mod utils;

#[cfg(test)]
pub(crate) mod testing;
