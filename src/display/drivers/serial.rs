/*
 *  display/drivers/serial.rs
 *
 *  qnaplcd - front panel, no fuss
 *  (c) 2020-26 Stuart Hunter
 *
 *  Serial (termios) link to the front panel
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::debug;

use crate::display::codec::FRAME_LEN;
use crate::display::traits::{Connector, LinkTransport, SharedLink};

/// Where the panel lives on QNAP boxes.
pub const DEFAULT_PORT: &str = "/dev/ttyS1";

/// The panel only talks at 1200 baud.
pub const DEFAULT_BAUD: u32 = 1200;

// how often a blocked read rechecks the closed flag
const POLL_SLICE_MS: libc::c_int = 100;

/// Map a numeric rate onto its termios constant.
pub fn baud_constant(baud: u32) -> Option<libc::speed_t> {
    let speed = match baud {
        1200 => libc::B1200,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115200 => libc::B115200,
        _ => return None,
    };
    Some(speed)
}

fn cvt(ret: libc::c_int) -> io::Result<()> {
    if ret < 0 { Err(io::Error::last_os_error()) } else { Ok(()) }
}

/// Raw 8N1 at `speed`, reads block until a whole frame is buffered.
fn configure(fd: RawFd, speed: libc::speed_t) -> io::Result<()> {
    // SAFETY: termios is plain data, filled in by tcgetattr before use
    let mut tio: libc::termios = unsafe { std::mem::zeroed() };
    cvt(unsafe { libc::tcgetattr(fd, &mut tio) })?;
    unsafe { libc::cfmakeraw(&mut tio) };

    tio.c_cflag &= !(libc::CSIZE | libc::CSTOPB | libc::PARENB);
    tio.c_cflag |= libc::CS8 | libc::CLOCAL | libc::CREAD;
    tio.c_cc[libc::VMIN] = FRAME_LEN as libc::cc_t;
    tio.c_cc[libc::VTIME] = 0;

    cvt(unsafe { libc::cfsetispeed(&mut tio, speed) })?;
    cvt(unsafe { libc::cfsetospeed(&mut tio, speed) })?;
    cvt(unsafe { libc::tcsetattr(fd, libc::TCSANOW, &tio) })?;
    cvt(unsafe { libc::tcflush(fd, libc::TCIOFLUSH) })
}

/// Open serial port
///
/// `close` only flags the link: a reader parked in `read` notices within one
/// poll slice and fails, the descriptor itself goes when the last handle
/// is dropped.
#[derive(Debug)]
pub struct SerialLink {
    port: File,
    closed: AtomicBool,
}

impl SerialLink {
    pub fn open(path: &Path, baud: u32) -> io::Result<Self> {
        let speed = baud_constant(baud).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("unsupported baud rate {}", baud))
        })?;

        // O_NONBLOCK so a missing carrier cannot hang the open itself
        let port = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(path)?;
        let fd = port.as_raw_fd();

        configure(fd, speed)?;

        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        cvt(flags)?;
        cvt(unsafe { libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK) })?;

        debug!("opened {} at {} baud", path.display(), baud);
        Ok(Self { port, closed: AtomicBool::new(false) })
    }

    fn closed_error() -> io::Error {
        io::Error::new(io::ErrorKind::NotConnected, "serial link closed")
    }

    /// poll(2) for input, `Ok(false)` when nothing arrived within `timeout_ms`.
    fn wait_input(&self, timeout_ms: libc::c_int) -> io::Result<bool> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Self::closed_error());
        }
        let mut pfd = libc::pollfd { fd: self.port.as_raw_fd(), events: libc::POLLIN, revents: 0 };
        let ready = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(err);
        }
        if ready == 0 {
            return Ok(false);
        }
        if pfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "serial line hung up"));
        }
        Ok(true)
    }
}

impl LinkTransport for SerialLink {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        while !self.wait_input(POLL_SLICE_MS)? {}
        (&self.port).read(buf)
    }

    fn poll_readable(&self, timeout: Duration) -> io::Result<bool> {
        let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
        self.wait_input(timeout_ms)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Self::closed_error());
        }
        (&self.port).write(buf)
    }

    fn close(&self) -> io::Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Opens [`SerialLink`]s on a fixed port.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    path: PathBuf,
    baud: u32,
}

impl SerialConnector {
    pub fn new(path: impl Into<PathBuf>, baud: u32) -> Self {
        Self { path: path.into(), baud }
    }
}

impl Default for SerialConnector {
    fn default() -> Self {
        Self::new(DEFAULT_PORT, DEFAULT_BAUD)
    }
}

impl Connector for SerialConnector {
    fn connect(&self) -> io::Result<SharedLink> {
        Ok(Arc::new(SerialLink::open(&self.path, self.baud)?))
    }

    fn endpoint(&self) -> String {
        self.path.display().to_string()
    }
}
