
use std::io::{self, Error, ErrorKind, Read, Write};
use std::time::Duration;

use crate::utils::connect_tcp;
use super::IPPROTO_TCP;
use super::client::RpcClient;

pub const PMAP_PROG:u32 = 100000;
pub const PMAP_VERS:u32 = 2;
pub const PMAP_PORT:u16 = 111;

pub const PMAPPROC_GETPORT:u32 = 3;     // (mapping) -> unsigned int

// Ask the port mapper on `host` where the TCP server for (prog, vers) is listening
pub fn get_port(host:&str, prog:u32, vers:u32, timeout:Duration) -> io::Result<u16> {
	let stream = connect_tcp((host, PMAP_PORT), timeout)?;
	let mut client = RpcClient::new(stream, PMAP_PROG, PMAP_VERS);
	query_port(&mut client, prog, vers)
}

pub fn query_port<S: Read + Write>(client:&mut RpcClient<S>, prog:u32, vers:u32) -> io::Result<u16> {
	client.start_call(PMAPPROC_GETPORT)?;
	client.packer.pack_u32(prog)?;
	client.packer.pack_u32(vers)?;
	client.packer.pack_u32(IPPROTO_TCP)?;
	client.packer.pack_u32(0)?;          // port is ignored in a GETPORT query
	client.finish_call()?;

	let port:u32 = client.unpacker.unpack_u32()?;
	if !client.unpacker.all_data_consumed() {
		return Err(Error::new(ErrorKind::InvalidData, "Data unexpectedly left over after unpacking port"));
	}

	match port {
		0 => Err(Error::new(ErrorKind::NotFound, format!("Program {:#x} version {} is not registered with the port mapper", prog, vers))),
		p if p > u16::MAX as u32 => Err(Error::new(ErrorKind::InvalidData, "Port mapper returned a port outside the TCP range")),
		p => Ok(p as u16),
	}
}
