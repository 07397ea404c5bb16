
// Device core
pub const DEVICE_CORE_PROG:u32  = 0x0607af;
pub const DEVICE_CORE_VERS:u32  = 1;
pub const CREATE_LINK:u32       = 10;
pub const DEVICE_WRITE:u32      = 11;
pub const DEVICE_READ:u32       = 12;
pub const DEVICE_CLEAR:u32      = 15;
pub const DESTROY_LINK:u32      = 23;

pub const CLIENT_ID:i32 = 3333;
pub const DEFAULT_IO_TIMEOUT_MS:u32 = 10000;
pub const DEFAULT_LOCK_TIMEOUT_MS:u32 = 10000;

pub const OPERATION_FLAGS_END:i32 = 8;

// Reason bits in a device_read reply
pub const REASON_REQCNT:i32 = 1;
pub const REASON_CHR:i32    = 2;
pub const REASON_END:i32    = 4;

// Bytes requested per device_read; longer replies arrive over several calls
pub const READ_REQUEST_SIZE:u32 = 64 * 1024;

use std::io::{self, Error, ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use log::{debug, warn};

use crate::rpc::client::RpcClient;
use crate::rpc::port_mapping;
use crate::utils::connect_tcp;

fn err(msg:&str) -> io::Error { Error::new(ErrorKind::Other, msg) }

// Device_ErrorCode values defined by VXI-11
pub fn device_error(code:i32) -> io::Error {
    let msg = match code {
        1  => "Syntax error",
        3  => "Device not accessible",
        4  => "Invalid link identifier",
        5  => "Parameter error",
        6  => "Channel not established",
        8  => "Operation not supported",
        9  => "Out of resources",
        11 => "Device locked by another link",
        12 => "No lock held by this link",
        15 => return Error::new(ErrorKind::TimedOut, "I/O timeout"),
        17 => "I/O error",
        21 => "Invalid address",
        23 => "Abort",
        29 => "Channel already established",
        _  => return Error::new(ErrorKind::Other, format!("Unknown VXI-11 error code {}", code)),
    };
    err(msg)
}

fn check(code:i32) -> io::Result<()> {
    if code == 0 { Ok(()) } else { Err(device_error(code)) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub link_id: i32,
    pub abort_port: u32,
    pub max_recv_size: u32,
}

// One core channel with at most one open link.  A LAN/GPIB gateway accepts one link per GPIB address.
pub struct CoreClient<S: Read + Write = TcpStream> {
    client: RpcClient<S>,
    link: Option<Link>,
    pub io_timeout_ms: u32,
    pub lock_timeout_ms: u32,
}

impl CoreClient<TcpStream> {

    pub fn connect(host:&str, timeout:Duration) -> io::Result<Self> {
        // Find the port to use for the core program
        let port = port_mapping::get_port(host, DEVICE_CORE_PROG, DEVICE_CORE_VERS, timeout)?;
        debug!("VXI-11 core channel on {}:{}", host, port);

        let stream = connect_tcp((host, port), timeout)?;
        Ok(Self::new(RpcClient::new(stream, DEVICE_CORE_PROG, DEVICE_CORE_VERS)))
    }

}

impl<S: Read + Write> CoreClient<S> {

    pub fn new(client:RpcClient<S>) -> Self {
        Self{ client, link: None, io_timeout_ms: DEFAULT_IO_TIMEOUT_MS, lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS }
    }

    pub fn link(&self) -> Option<&Link> { self.link.as_ref() }

    fn link_id(&self) -> io::Result<i32> {
        match self.link {
            Some(Link{ link_id, .. }) => Ok(link_id),
            None => Err(err("No link")),
        }
    }

    // `device` is "inst0" for a LAN instrument, or "gpib0,<address>" behind a gateway
    pub fn create_link(&mut self, device:&str) -> io::Result<()> {
        if self.link.is_some() {
            return Err(err("Already connected to a link"));
        }
        if !device.is_ascii() {
            return Err(Error::new(ErrorKind::InvalidInput, "VXI-11 device names must be ASCII"));
        }

        self.client.start_call(CREATE_LINK)?;
        self.client.packer.pack_i32(CLIENT_ID)?;
        self.client.packer.pack_bool(false)?;                    // lockDevice
        self.client.packer.pack_u32(self.lock_timeout_ms)?;
        self.client.packer.pack_string(device)?;
        self.client.finish_call()?;

        let error:i32         = self.client.unpacker.unpack_i32()?;
        let link_id:i32       = self.client.unpacker.unpack_i32()?;
        let abort_port:u32    = self.client.unpacker.unpack_u32()?;
        let max_recv_size:u32 = self.client.unpacker.unpack_u32()?;
        check(error)?;

        debug!("Created VXI-11 link {} to {} (max_recv_size={})", link_id, device, max_recv_size);
        self.link = Some(Link{ link_id, abort_port, max_recv_size });
        Ok(())
    }

    pub fn ask(&mut self, data:&[u8]) -> io::Result<Vec<u8>> {
        self.write(data)?;
        self.read()
    }

    // Splits writes larger than the device's maxRecvSize; only the last piece carries END
    pub fn write(&mut self, data:&[u8]) -> io::Result<()> {
        let link_id:i32 = self.link_id()?;
        let max = match self.link {
            Some(Link{ max_recv_size, .. }) if max_recv_size > 0 => max_recv_size as usize,
            _ => data.len().max(1),
        };

        let chunks:Vec<&[u8]> = if data.is_empty() { vec![data] } else { data.chunks(max).collect() };
        let last = chunks.len() - 1;

        for (idx, chunk) in chunks.into_iter().enumerate() {
            let flags = if idx == last { OPERATION_FLAGS_END } else { 0 };

            self.client.start_call(DEVICE_WRITE)?;
            self.client.packer.pack_i32(link_id)?;
            self.client.packer.pack_u32(self.io_timeout_ms)?;
            self.client.packer.pack_u32(self.lock_timeout_ms)?;
            self.client.packer.pack_i32(flags)?;
            self.client.packer.pack_variable_len_opaque(chunk)?;
            self.client.finish_call()?;

            let error:i32 = self.client.unpacker.unpack_i32()?;
            let size:u32  = self.client.unpacker.unpack_u32()?;
            check(error)?;

            if size as usize != chunk.len() {
                return Err(err("Number of bytes in confirmation doesn't match number of bytes sent"));
            }
        }

        Ok(())
    }

    // Keeps reading until the device signals END, so replies longer than one request come back whole
    pub fn read(&mut self) -> io::Result<Vec<u8>> {
        let link_id:i32 = self.link_id()?;
        let mut data:Vec<u8> = vec![];

        loop {
            self.client.start_call(DEVICE_READ)?;
            self.client.packer.pack_i32(link_id)?;
            self.client.packer.pack_u32(READ_REQUEST_SIZE)?;
            self.client.packer.pack_u32(self.io_timeout_ms)?;
            self.client.packer.pack_u32(self.lock_timeout_ms)?;
            self.client.packer.pack_i32(0)?;                     // flags
            self.client.packer.pack_i32(0)?;                     // termChar, unused without the termchrset flag
            self.client.finish_call()?;

            let error:i32     = self.client.unpacker.unpack_i32()?;
            let reason:i32    = self.client.unpacker.unpack_i32()?;
            let chunk:Vec<u8> = self.client.unpacker.unpack_variable_len_opaque()?;
            check(error)?;

            data.extend_from_slice(&chunk);

            if reason & REASON_END != 0 {
                return Ok(data);
            }
            if reason & (REASON_REQCNT | REASON_CHR) == 0 {
                return Err(err("Device read ended without any reason bit set"));
            }
        }
    }

    // Selected device clear, which on GPIB is SDC to the linked address
    pub fn clear(&mut self) -> io::Result<()> {
        let link_id:i32 = self.link_id()?;

        self.client.start_call(DEVICE_CLEAR)?;
        self.client.packer.pack_i32(link_id)?;
        self.client.packer.pack_i32(0)?;                         // flags
        self.client.packer.pack_u32(self.lock_timeout_ms)?;
        self.client.packer.pack_u32(self.io_timeout_ms)?;
        self.client.finish_call()?;

        check(self.client.unpacker.unpack_i32()?)
    }

    pub fn destroy_link(&mut self) -> io::Result<()> {
        let link_id:i32 = match self.link.take() {
            Some(link) => link.link_id,
            None => return Err(err("No link to destroy")),
        };

        self.client.start_call(DESTROY_LINK)?;
        self.client.packer.pack_i32(link_id)?;
        self.client.finish_call()?;

        check(self.client.unpacker.unpack_i32()?)
    }

}

impl<S: Read + Write> Drop for CoreClient<S> {

    fn drop(&mut self) {
        if self.link.is_some() {
            if let Err(e) = self.destroy_link() {
                warn!("Unable to destroy VXI-11 link: {}", e);
            }
        }
    }

}
