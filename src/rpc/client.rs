
use std::io::{self, Error, ErrorKind, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::debug;

use crate::xdr::{Packer, Unpacker};
use super::message::{self, CallHeader};

// Record marking (RFC 5531 section 11): each fragment is preceded by a u32 length with the top bit set on the last one
const LAST_FRAGMENT:u32 = 0x8000_0000;

// No instrument reply comes anywhere close; anything larger means the stream is out of sync
const MAX_RECORD_LEN:usize = 16 * 1024 * 1024;

pub fn write_record<W: Write>(w:&mut W, body:&[u8]) -> io::Result<()> {
	if body.len() >= LAST_FRAGMENT as usize {
		return Err(Error::new(ErrorKind::InvalidInput, "RPC call too large for a single fragment"));
	}

	let mut bytes:Vec<u8> = Vec::with_capacity(body.len() + 4);
	bytes.write_u32::<BigEndian>(body.len() as u32 | LAST_FRAGMENT)?;
	bytes.extend_from_slice(body);
	w.write_all(&bytes)?;
	w.flush()
}

pub fn read_record<R: Read>(r:&mut R) -> io::Result<Vec<u8>> {
	let mut record:Vec<u8> = vec![];

	loop {
		let marker:u32 = r.read_u32::<BigEndian>()?;
		let n = (marker & !LAST_FRAGMENT) as usize;

		if record.len() + n > MAX_RECORD_LEN {
			return Err(Error::new(ErrorKind::InvalidData, "RPC record exceeds the maximum accepted size"));
		}

		let start = record.len();
		record.resize(start + n, 0);
		r.read_exact(&mut record[start..])?;

		if marker & LAST_FRAGMENT != 0 {
			return Ok(record);
		}
	}
}

pub struct RpcClient<S: Read + Write> {
	stream: S,
	prog: u32,
	vers: u32,
	xid: u32,
	pub packer: Packer,
	pub unpacker: Unpacker,
}

impl<S: Read + Write> RpcClient<S> {

	// Random starting xid so that a reconnecting client doesn't pick up replies meant for an earlier session
	pub fn new(stream:S, prog:u32, vers:u32) -> Self {
		Self::with_xid(stream, prog, vers, rand::random::<u32>() >> 8)
	}

	pub fn with_xid(stream:S, prog:u32, vers:u32, xid:u32) -> Self {
		Self{ stream, prog, vers, xid, packer: Packer::new(), unpacker: Unpacker::new() }
	}

	pub fn xid(&self) -> u32 { self.xid }

	pub fn stream(&self) -> &S { &self.stream }

	// Resets the packer and writes a call header for `procedure`; the caller packs the arguments after this
	pub fn start_call(&mut self, procedure:u32) -> io::Result<()> {
		self.xid = self.xid.wrapping_add(1);
		self.packer.reset();
		CallHeader{ xid: self.xid, prog: self.prog, vers: self.vers, procedure }.pack(&mut self.packer)
	}

	// Sends the packed call and waits for its reply.  On success the unpacker holds the procedure's results.
	pub fn finish_call(&mut self) -> io::Result<()> {
		write_record(&mut self.stream, self.packer.as_bytes())?;

		loop {
			let reply = read_record(&mut self.stream)?;
			self.unpacker.reset(&reply);

			let xid:u32 = self.unpacker.unpack_u32()?;
			if xid == self.xid {
				return message::unpack_reply_status(&mut self.unpacker);
			} else if self.xid.wrapping_sub(xid) < LAST_FRAGMENT {
				// Reply to a call that already timed out on our side
				debug!("Discarding stale RPC reply with xid {} (waiting for {})", xid, self.xid);
				continue;
			} else {
				return Err(Error::new(ErrorKind::InvalidData, "Received an RPC reply for a call that was never made"));
			}
		}
	}

}
