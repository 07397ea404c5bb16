// Call and reply headers (RFC 5531).  Only AUTH_NONE is supported, which is all instruments ask for.

use std::io::{self, Error, ErrorKind};

use crate::xdr::{Packer, Unpacker};
use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallHeader {
	pub xid: u32,
	pub prog: u32,
	pub vers: u32,
	pub procedure: u32,
}

fn pack_auth_none(packer:&mut Packer) -> io::Result<()> {
	packer.pack_enum(AUTH_NONE)?;
	packer.pack_variable_len_opaque(&[])
}

impl CallHeader {

	pub fn pack(&self, packer:&mut Packer) -> io::Result<()> {
		packer.pack_u32(self.xid)?;
		packer.pack_enum(CALL)?;
		packer.pack_u32(RPCVERSION)?;
		packer.pack_u32(self.prog)?;
		packer.pack_u32(self.vers)?;
		packer.pack_u32(self.procedure)?;
		pack_auth_none(packer)?;   // credentials
		pack_auth_none(packer)     // verifier
	}

}

fn rejected(msg:&str) -> io::Error { Error::new(ErrorKind::Other, msg) }

// Everything in a reply header after the xid.  On success the unpacker is left at the start of the procedure's results.
pub fn unpack_reply_status(unpacker:&mut Unpacker) -> io::Result<()> {
	if unpacker.unpack_enum()? != REPLY {
		return Err(Error::new(ErrorKind::InvalidData, "Expected REPLY message type"));
	}

	match unpacker.unpack_enum()? {
		MSG_ACCEPTED => { },
		MSG_DENIED => {
			return match unpacker.unpack_enum()? {
				RPC_MISMATCH => {
					let low  = unpacker.unpack_u32()?;
					let high = unpacker.unpack_u32()?;
					Err(Error::new(ErrorKind::Other, format!("Message denied: remote supports RPC versions {} to {}", low, high)))
				},
				AUTH_ERROR => {
					let stat = unpacker.unpack_u32()?;
					Err(Error::new(ErrorKind::PermissionDenied, format!("Message denied: authentication error {}", stat)))
				},
				_ => Err(rejected("Message denied for an unknown reason")),
			};
		},
		_ => return Err(Error::new(ErrorKind::InvalidData, "Neither MSG_ACCEPTED nor MSG_DENIED in reply")),
	}

	// Verifier, which carries nothing for AUTH_NONE
	unpacker.unpack_enum()?;
	unpacker.unpack_variable_len_opaque()?;

	match unpacker.unpack_enum()? {
		SUCCESS       => Ok(()),
		PROG_UNAVAIL  => Err(rejected("Program unavailable")),
		PROG_MISMATCH => {
			let low  = unpacker.unpack_u32()?;
			let high = unpacker.unpack_u32()?;
			Err(Error::new(ErrorKind::Other, format!("Program mismatch: remote supports versions {} to {}", low, high)))
		},
		PROC_UNAVAIL  => Err(rejected("Procedure unavailable")),
		GARBAGE_ARGS  => Err(rejected("Remote could not decode the call arguments")),
		SYSTEM_ERR    => Err(rejected("Remote system error")),
		_             => Err(rejected("Call failed for an unknown reason")),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn call_header_layout() {
		let mut packer = Packer::new();
		CallHeader{ xid: 7, prog: 0x0607af, vers: 1, procedure: 10 }.pack(&mut packer).unwrap();

		let mut unpacker = Unpacker::new();
		unpacker.reset(packer.as_bytes());
		let fields:Vec<u32> = (0..10).map(|_| unpacker.unpack_u32().unwrap()).collect();
		assert_eq!(fields, vec![7, 0, 2, 0x0607af, 1, 10, 0, 0, 0, 0]);
		assert!(unpacker.all_data_consumed());
	}

	#[test]
	fn denied_and_failed_replies_are_errors() {
		let mut packer = Packer::new();
		packer.pack_enum(REPLY).unwrap();
		packer.pack_enum(MSG_DENIED).unwrap();
		packer.pack_enum(RPC_MISMATCH).unwrap();
		packer.pack_u32(2).unwrap();
		packer.pack_u32(2).unwrap();
		let mut unpacker = Unpacker::new();
		unpacker.reset(packer.as_bytes());
		assert!(unpack_reply_status(&mut unpacker).unwrap_err().to_string().contains("RPC versions 2 to 2"));

		packer.reset();
		packer.pack_enum(REPLY).unwrap();
		packer.pack_enum(MSG_ACCEPTED).unwrap();
		packer.pack_enum(AUTH_NONE).unwrap();
		packer.pack_variable_len_opaque(&[]).unwrap();
		packer.pack_enum(PROC_UNAVAIL).unwrap();
		unpacker.reset(packer.as_bytes());
		assert!(unpack_reply_status(&mut unpacker).unwrap_err().to_string().contains("Procedure unavailable"));
	}
}
