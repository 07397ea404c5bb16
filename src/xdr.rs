
use std::io::{self, Error, ErrorKind};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

// Everything in XDR occupies a multiple of four bytes
const ALIGN:usize = 4;

fn padding(n:usize) -> usize { (ALIGN - n % ALIGN) % ALIGN }

#[derive(Debug, Default)]
pub struct Packer {
	buff: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct Unpacker {
	buff: Vec<u8>,
	pos: usize,
}

impl Packer {

	pub fn new() -> Self { Self::default() }

	pub fn reset(&mut self) { self.buff.clear(); }

	pub fn as_bytes(&self) -> &[u8] { &self.buff }

	pub fn len(&self) -> usize { self.buff.len() }

	pub fn is_empty(&self) -> bool { self.buff.is_empty() }

	pub fn pack_u32(&mut self, x:u32) -> io::Result<()> { self.buff.write_u32::<BigEndian>(x) }
	pub fn pack_i32(&mut self, x:i32) -> io::Result<()> { self.buff.write_i32::<BigEndian>(x) }

	pub fn pack_bool(&mut self, b:bool) -> io::Result<()> { self.pack_i32(if b { 1 } else { 0 }) }

	pub fn pack_enum(&mut self, x:i32) -> io::Result<()> { self.pack_i32(x) }

	pub fn pack_variable_len_opaque(&mut self, data:&[u8]) -> io::Result<()> {
		if data.len() > u32::MAX as usize {
			return Err(Error::new(ErrorKind::InvalidInput, "Opaque data too long for a 32-bit XDR length"));
		}
		self.pack_u32(data.len() as u32)?;
		self.buff.extend_from_slice(data);
		self.buff.extend(std::iter::repeat(0).take(padding(data.len())));
		Ok(())
	}

	pub fn pack_string(&mut self, s:&str) -> io::Result<()> { self.pack_variable_len_opaque(s.as_bytes()) }

}

impl Unpacker {

	pub fn new() -> Self { Self::default() }

	pub fn reset(&mut self, data:&[u8]) {
		self.buff.clear();
		self.buff.extend_from_slice(data);
		self.pos = 0;
	}

	pub fn remaining(&self) -> &[u8] { &self.buff[self.pos..] }

	pub fn all_data_consumed(&self) -> bool { self.pos >= self.buff.len() }

	fn take(&mut self, n:usize) -> io::Result<&[u8]> {
		if self.buff.len() - self.pos < n {
			return Err(Error::new(ErrorKind::UnexpectedEof, "Tried to read past the end of the XDR buffer"));
		}
		let start = self.pos;
		self.pos += n;
		Ok(&self.buff[start..self.pos])
	}

	pub fn unpack_u32(&mut self) -> io::Result<u32> {
		let mut bytes = self.take(4)?;
		bytes.read_u32::<BigEndian>()
	}

	pub fn unpack_i32(&mut self) -> io::Result<i32> {
		let mut bytes = self.take(4)?;
		bytes.read_i32::<BigEndian>()
	}

	// Whether the value is a legal member of the enum depends on the caller
	pub fn unpack_enum(&mut self) -> io::Result<i32> { self.unpack_i32() }

	pub fn unpack_bool(&mut self) -> io::Result<bool> {
		match self.unpack_i32()? {
			0 => Ok(false),
			1 => Ok(true),
			x => Err(Error::new(ErrorKind::InvalidData, format!("Expected 0 or 1 for an XDR bool but got {}", x))),
		}
	}

	pub fn unpack_variable_len_opaque(&mut self) -> io::Result<Vec<u8>> {
		let n = self.unpack_u32()? as usize;
		let data = self.take(n)?.to_vec();
		self.take(padding(n))?;
		Ok(data)
	}

}
