
use std::io::{self, Error, ErrorKind};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::debug;

// Connect to the first address that answers within the timeout and apply the same timeout to reads and writes,
// so a powered-off instrument turns into an error instead of a hung measurement
pub fn connect_tcp<A: ToSocketAddrs>(addr:A, timeout:Duration) -> io::Result<TcpStream> {
    let mut last_err = Error::new(ErrorKind::AddrNotAvailable, "Address did not resolve to anything");

    for sock_addr in addr.to_socket_addrs()? {
        match TcpStream::connect_timeout(&sock_addr, timeout) {
            Ok(stream) => {
                debug!("Connected to {}", sock_addr);
                stream.set_read_timeout(Some(timeout))?;
                stream.set_write_timeout(Some(timeout))?;
                stream.set_nodelay(true)?;
                return Ok(stream);
            },
            Err(e) => last_err = e,
        }
    }

    Err(last_err)
}

/// Scientific notation with a signed, two-digit exponent (`1.500000e-03`), the layout numpy and SCPI
/// instruments use.  Rust's own `{:e}` writes `1.5e-3`.
pub fn format_sci(x:f64, precision:usize, exp_char:char) -> String {
    if !x.is_finite() {
        return format!("{}", x).to_lowercase();
    }

    let plain = format!("{:.*e}", precision, x);
    let (mantissa, exp) = match plain.split_once('e') {
        Some(parts) => parts,
        None => return plain,
    };
    let exp:i32 = exp.parse().unwrap_or(0);
    let exp_sign = if exp < 0 { '-' } else { '+' };

    format!("{}{}{}{:02}", mantissa, exp_char, exp_sign, exp.abs())
}

/// Numeric argument for a SCPI command.  Rounded to nine significant digits so that sweep arithmetic
/// like `-2.5e-9 + 3*1e-10` doesn't go out as `-2.1999999999999998e-9`.
pub fn format_level(x:f64) -> String {
    if x == 0.0 || !x.is_finite() {
        return format!("{}", if x == 0.0 { 0.0 } else { x });
    }
    let rounded:f64 = format!("{:.8e}", x).parse().unwrap_or(x);
    format!("{:e}", rounded)
}
