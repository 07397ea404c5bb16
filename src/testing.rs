// Helpers shared by the unit tests of the wire-level modules

use std::io::{self, Cursor, Read, Write};

use crate::rpc::{MSG_ACCEPTED, REPLY, SUCCESS};
use crate::rpc::client::write_record;
use crate::xdr::Packer;

// A stream whose reads come from a canned script and whose writes are captured
pub struct Duplex {
    input: Cursor<Vec<u8>>,
    pub output: Vec<u8>,
}

impl Duplex {
    pub fn new(input:Vec<u8>) -> Self { Self{ input: Cursor::new(input), output: vec![] } }

    pub fn from_str(input:&str) -> Self { Self::new(input.as_bytes().to_vec()) }

    pub fn written(&self) -> String { String::from_utf8_lossy(&self.output).into_owned() }
}

impl Read for Duplex {
    fn read(&mut self, buf:&mut [u8]) -> io::Result<usize> { self.input.read(buf) }
}

impl Write for Duplex {
    fn write(&mut self, buf:&[u8]) -> io::Result<usize> {
        self.output.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> { Ok(()) }
}

// An accepted, successful RPC reply with AUTH_NONE verifier followed by `body`, framed as one record
pub fn reply_record(xid:u32, body:&[u8]) -> Vec<u8> {
    let mut packer = Packer::new();
    packer.pack_u32(xid).unwrap();
    packer.pack_enum(REPLY).unwrap();
    packer.pack_enum(MSG_ACCEPTED).unwrap();
    packer.pack_enum(0).unwrap();
    packer.pack_variable_len_opaque(&[]).unwrap();
    packer.pack_enum(SUCCESS).unwrap();
    let mut bytes = packer.as_bytes().to_vec();
    bytes.extend_from_slice(body);

    let mut framed = vec![];
    write_record(&mut framed, &bytes).unwrap();
    framed
}
