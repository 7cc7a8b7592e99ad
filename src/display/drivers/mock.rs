/*
 *  display/drivers/mock.rs
 *
 *  qnaplcd - front panel, no fuss
 *  (c) 2020-26 Stuart Hunter
 *
 *  Mock serial link for testing without hardware
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

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::display::codec;
use crate::display::traits::{Connector, LinkTransport, SharedLink};

/// One scripted outcome for a `read` call
#[derive(Debug)]
enum Scripted {
    Bytes(Vec<u8>),
    Error(io::ErrorKind),
}

/// Internal state for the mock link (shared for inspection in tests)
#[derive(Debug, Default)]
pub struct MockLinkState {
    /// Every buffer passed to write(), in order
    pub writes: Vec<Vec<u8>>,

    /// Number of times close() was called
    pub close_count: usize,

    /// Whether the link has been closed
    pub closed: bool,

    /// Accept only this many bytes per write (simulates a short write)
    pub accept_limit: Option<usize>,

    /// Fail every write with BrokenPipe
    pub simulate_write_failure: bool,

    reads: VecDeque<Scripted>,
}

/// Scripted link: reads are served from a queue and block while it is
/// empty, exactly like a quiet serial line. Closing wakes blocked readers.
#[derive(Debug, Default)]
pub struct MockLink {
    state: Mutex<MockLinkState>,
    readable: Condvar,
}

impl MockLink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A link that will answer the init handshake.
    pub fn responsive() -> Arc<Self> {
        let link = Self::new();
        link.push_read(&codec::init_ack_frame());
        link
    }

    /// Queue the bytes returned by one future read.
    pub fn push_read(&self, bytes: &[u8]) {
        self.push(Scripted::Bytes(bytes.to_vec()));
    }

    /// Queue a failing read.
    pub fn push_read_error(&self, kind: io::ErrorKind) {
        self.push(Scripted::Error(kind));
    }

    fn push(&self, item: Scripted) {
        self.state.lock().unwrap().reads.push_back(item);
        self.readable.notify_all();
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, MockLinkState> {
        self.state.lock().unwrap()
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state().writes.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Scripted reads not consumed yet.
    pub fn pending_reads(&self) -> usize {
        self.state().reads.len()
    }
}

impl LinkTransport for MockLink {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.closed {
                return Err(io::Error::new(io::ErrorKind::NotConnected, "mock link closed"));
            }
            match state.reads.pop_front() {
                Some(Scripted::Bytes(bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    return Ok(n);
                }
                Some(Scripted::Error(kind)) => return Err(io::Error::new(kind, "scripted read failure")),
                None => state = self.readable.wait(state).unwrap(),
            }
        }
    }

    fn poll_readable(&self, timeout: Duration) -> io::Result<bool> {
        let state = self.state.lock().unwrap();
        let (state, _) = self
            .readable
            .wait_timeout_while(state, timeout, |s| !s.closed && s.reads.is_empty())
            .unwrap();
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "mock link closed"));
        }
        Ok(!state.reads.is_empty())
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "mock link closed"));
        }
        if state.simulate_write_failure {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "simulated write failure"));
        }
        let n = state.accept_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        state.writes.push(buf[..n].to_vec());
        Ok(n)
    }

    fn close(&self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.close_count += 1;
        state.closed = true;
        self.readable.notify_all();
        Ok(())
    }
}

/// Hands out scripted links in order, then refuses
#[derive(Debug, Default)]
pub struct MockConnector {
    links: Mutex<VecDeque<Arc<MockLink>>>,
    connects: Mutex<usize>,
}

impl MockConnector {
    pub fn new(links: impl IntoIterator<Item = Arc<MockLink>>) -> Self {
        Self {
            links: Mutex::new(links.into_iter().collect()),
            connects: Mutex::new(0),
        }
    }

    /// Number of successful connects so far.
    pub fn connects(&self) -> usize {
        *self.connects.lock().unwrap()
    }
}

impl Connector for MockConnector {
    fn connect(&self) -> io::Result<SharedLink> {
        let link = self
            .links
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no mock link left"))?;
        *self.connects.lock().unwrap() += 1;
        Ok(link)
    }

    fn endpoint(&self) -> String {
        "mock".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_mock_link_serves_reads_in_order() {
        let link = MockLink::new();
        link.push_read(&[1, 2, 3, 4]);
        link.push_read(&[5, 6]);

        let mut buf = [0u8; 4];
        assert_eq!(link.read(&mut buf).unwrap(), 4);
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(link.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[5, 6]);
    }

    #[test]
    fn test_mock_link_close_unblocks_reader() {
        let link = MockLink::new();
        let reader = {
            let link = Arc::clone(&link);
            thread::spawn(move || {
                let mut buf = [0u8; 4];
                link.read(&mut buf)
            })
        };
        thread::sleep(Duration::from_millis(20));
        link.close().unwrap();
        assert!(reader.join().unwrap().is_err());
        assert_eq!(link.state().close_count, 1);
    }

    #[test]
    fn test_mock_link_poll_readable() {
        let link = MockLink::new();
        assert!(!link.poll_readable(Duration::from_millis(10)).unwrap());
        link.push_read(&[1]);
        assert!(link.poll_readable(Duration::from_millis(10)).unwrap());
        link.close().unwrap();
        assert!(link.poll_readable(Duration::from_millis(10)).is_err());
    }

    #[test]
    fn test_mock_link_short_write() {
        let link = MockLink::new();
        link.state().accept_limit = Some(3);
        assert_eq!(link.write(&[9; 10]).unwrap(), 3);
        assert_eq!(link.writes(), vec![vec![9, 9, 9]]);
    }

    #[test]
    fn test_mock_connector_runs_dry() {
        let connector = MockConnector::new([MockLink::new()]);
        assert!(connector.connect().is_ok());
        assert!(connector.connect().is_err());
        assert_eq!(connector.connects(), 1);
    }
}
