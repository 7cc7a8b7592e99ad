/*
 *  display/traits.rs
 *
 *  qnaplcd - front panel, no fuss
 *  (c) 2020-26 Stuart Hunter
 *
 *  Core trait definitions for the link and the panel contract
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

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use crate::display::buttons::Button;
use crate::display::codec::Line;
use crate::display::error::DisplayError;

/// Minimal byte link to the panel - the serial port, or a mock in tests
///
/// All methods take `&self` so a read can stay blocked on one thread while
/// another thread writes or closes. `close` must unblock a pending `read`,
/// which then fails, and must be safe to call more than once.
pub trait LinkTransport: Send + Sync {
    /// Blocking read of at most `buf.len()` bytes.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Wait up to `timeout` for input to arrive.
    ///
    /// Links that cannot tell report `true` straight away and let `read`
    /// block instead.
    fn poll_readable(&self, _timeout: Duration) -> io::Result<bool> {
        Ok(true)
    }

    /// Write `buf`, returning how many bytes the link accepted.
    fn write(&self, buf: &[u8]) -> io::Result<usize>;

    fn close(&self) -> io::Result<()>;
}

/// Shared handle to an open link.
pub type SharedLink = Arc<dyn LinkTransport>;

/// Acquires a fresh link each time the driver opens
pub trait Connector: Send + Sync {
    fn connect(&self) -> io::Result<SharedLink>;

    /// Human readable endpoint for logs (port path, mock name).
    fn endpoint(&self) -> String;
}

/// Everything a host application may do with the panel
///
/// Listening hands each transition to `handler(button, released)`; returning
/// `false` from the handler stops listening.
pub trait Lcd: Send + Sync {
    fn open(&self) -> impl Future<Output = Result<(), DisplayError>> + Send;

    fn write(&self, line: Line, text: &str) -> impl Future<Output = Result<(), DisplayError>> + Send;

    fn enable(&self, on: bool) -> impl Future<Output = Result<(), DisplayError>> + Send;

    fn listen<F>(&self, handler: F) -> impl Future<Output = ()> + Send
    where
        F: FnMut(Button, bool) -> bool + Send;

    fn close(&self) -> impl Future<Output = Result<(), DisplayError>> + Send;
}
