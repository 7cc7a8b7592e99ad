/*
 *  display/driver.rs
 *
 *  qnaplcd - front panel, no fuss
 *  (c) 2020-26 Stuart Hunter
 *
 *  Front panel driver - link lifecycle, throttled writes, button listener
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

use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use crate::display::buttons::{Button, ButtonDecoder, ButtonEvent};
use crate::display::codec::{self, Line, FRAME_LEN};
use crate::display::error::DisplayError;
use crate::display::handshake::{self, HANDSHAKE_TIMEOUT};
use crate::display::text::prepare;
use crate::display::traits::{Connector, Lcd, LinkTransport, SharedLink};
use crate::pacer::{FlushPacer, FLUSH_INTERVAL};

/// Decoded events waiting for the handler before the reader stalls.
pub const EVENT_QUEUE_DEPTH: usize = 100;

// reader recheck period while the line is quiet
const LISTEN_POLL: Duration = Duration::from_millis(100);

/// Link state as seen by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Open,
}

/// Timing knobs for the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// How long Open waits for the init reply
    pub handshake_timeout: Duration,

    /// Minimum spacing between writes, also the settle time after each one
    pub flush_interval: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            handshake_timeout: HANDSHAKE_TIMEOUT,
            flush_interval: FLUSH_INTERVAL,
        }
    }
}

/// Driver for the two line front panel.
///
/// All operations take `&self` so the driver can sit in an `Arc` and be
/// closed from one task while another is parked in [`Lcd::listen`].
/// Commands (open, write, enable) are serialized by one async lock which
/// also owns the write pacer. A listen session's reader thread holds the
/// decoder lock until it exits, so a later session cannot start reading
/// while a stale reader is still on the line.
pub struct DisplayDriver<C: Connector> {
    connector: C,
    timing: Timing,
    link: Mutex<Option<SharedLink>>,
    commands: tokio::sync::Mutex<FlushPacer>,
    decoder: Arc<tokio::sync::Mutex<ButtonDecoder>>,
    listening: Arc<AtomicBool>,
}

impl<C: Connector> DisplayDriver<C> {
    pub fn new(connector: C, timing: Timing) -> Self {
        Self {
            connector,
            timing,
            link: Mutex::new(None),
            commands: tokio::sync::Mutex::new(FlushPacer::new(timing.flush_interval)),
            decoder: Arc::new(tokio::sync::Mutex::new(ButtonDecoder::new())),
            listening: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> ConnectionState {
        if self.slot().is_some() { ConnectionState::Open } else { ConnectionState::Closed }
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn endpoint(&self) -> String {
        self.connector.endpoint()
    }

    fn slot(&self) -> MutexGuard<'_, Option<SharedLink>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_link(&self) -> Option<SharedLink> {
        self.slot().clone()
    }

    /// Tear down the session if `lost` is still the live link.
    fn drop_session(&self, lost: &SharedLink) {
        let taken = {
            let mut slot = self.slot();
            match slot.as_ref() {
                Some(live) if Arc::ptr_eq(live, lost) => slot.take(),
                _ => None,
            }
        };
        if let Some(link) = taken {
            self.listening.store(false, Ordering::SeqCst);
            if let Err(e) = link.close() {
                debug!("closing failed link: {}", e);
            }
        }
    }

    /// Close the session on errors that leave the link in an unknown state.
    fn check<T>(&self, link: &SharedLink, result: Result<T, DisplayError>) -> Result<T, DisplayError> {
        if let Err(err) = &result {
            if err.is_fatal() {
                error!("display session lost: {}", err);
                self.drop_session(link);
            }
        }
        result
    }

    async fn handshake(&self, link: &SharedLink) -> Result<(), DisplayError> {
        send(link, &codec::init_frame()).await?;

        match handshake::read_with_timeout(link, self.timing.handshake_timeout).await {
            Ok(reply) if reply.as_slice() == codec::init_ack_frame() => Ok(()),
            Ok(reply) => {
                warn!("unexpected handshake reply {:02x?}", reply.as_slice());
                Err(DisplayError::DisplayNotWorking)
            }
            Err(DisplayError::TimedOut) => Err(DisplayError::DisplayNotWorking),
            Err(err) => {
                warn!("handshake read failed: {}", err);
                Err(DisplayError::DisplayNotWorking)
            }
        }
    }
}

impl<C: Connector> Lcd for DisplayDriver<C> {
    async fn open(&self) -> Result<(), DisplayError> {
        let mut pacer = self.commands.lock().await;
        if self.is_open() {
            return Ok(());
        }

        let link = self.connector.connect()?;
        if let Err(err) = self.handshake(&link).await {
            if let Err(e) = link.close() {
                debug!("closing link after failed handshake: {}", e);
            }
            return Err(err);
        }

        self.decoder.lock().await.reset();
        pacer.reset();
        *self.slot() = Some(link);
        info!("display ready on {}", self.connector.endpoint());
        Ok(())
    }

    async fn write(&self, line: Line, text: &str) -> Result<(), DisplayError> {
        let mut pacer = self.commands.lock().await;
        let link = self.current_link().ok_or(DisplayError::Closed)?;

        let frame = codec::write_frame(line, &prepare(text));
        pacer.wait().await;

        let written = self.check(&link, send(&link, &frame).await)?;
        if written != frame.len() {
            return Err(DisplayError::MsgSizeMismatch { expected: frame.len(), actual: written });
        }

        // give the panel time to draw before anything else goes out
        tokio::time::sleep(pacer.interval()).await;
        Ok(())
    }

    async fn enable(&self, on: bool) -> Result<(), DisplayError> {
        let _commands = self.commands.lock().await;
        let link = self.current_link().ok_or(DisplayError::Closed)?;

        self.check(&link, send(&link, &codec::enable_frame(on)).await)?;
        debug!("display {}", if on { "enabled" } else { "disabled" });
        Ok(())
    }

    async fn listen<F>(&self, mut handler: F)
    where
        F: FnMut(Button, bool) -> bool + Send,
    {
        let Some(link) = self.current_link() else {
            debug!("listen ignored, display closed");
            return;
        };
        if self.listening.swap(true, Ordering::SeqCst) {
            warn!("display already has a listener");
            return;
        }
        // also covers the caller dropping this future mid session
        let session = ListenSession::new(&self.listening);

        // waits out a reader left behind by an abandoned session
        let mut decoder = Arc::clone(&self.decoder).lock_owned().await;

        let (events, mut queue) = mpsc::channel::<ButtonEvent>(EVENT_QUEUE_DEPTH);
        let reader = {
            let link = Arc::clone(&link);
            let active = Arc::clone(&session.active);
            tokio::task::spawn_blocking(move || {
                read_telemetry(link.as_ref(), &mut decoder, &active, &events)
            })
        };

        while let Some(event) = queue.recv().await {
            let keep = catch_unwind(AssertUnwindSafe(|| handler(event.button, event.released)))
                .unwrap_or_else(|_| {
                    error!("button handler panicked, listening stopped");
                    false
                });
            if !keep {
                session.stop();
                break;
            }
        }
        // the reader fails its next push once the queue is gone
        drop(queue);

        match reader.await {
            Ok(Ok(())) => debug!("button listener stopped"),
            Ok(Err(err)) => {
                if self.is_open() {
                    error!("button telemetry read failed: {}", err);
                    self.drop_session(&link);
                } else {
                    debug!("button listener stopped by close");
                }
            }
            Err(fault) => error!("button reader fault: {}", fault),
        }
    }

    async fn close(&self) -> Result<(), DisplayError> {
        let Some(link) = self.slot().take() else {
            return Ok(());
        };
        self.listening.store(false, Ordering::SeqCst);
        link.close()?;
        info!("display closed");
        Ok(())
    }
}

impl<C: Connector> Drop for DisplayDriver<C> {
    fn drop(&mut self) {
        if let Some(link) = self.slot().take() {
            let _ = link.close();
        }
    }
}

/// One listen call. Its reader runs only while `active` is set, and
/// dropping the session (however the call ends) stops it.
struct ListenSession<'a> {
    listening: &'a AtomicBool,
    active: Arc<AtomicBool>,
}

impl<'a> ListenSession<'a> {
    fn new(listening: &'a AtomicBool) -> Self {
        Self { listening, active: Arc::new(AtomicBool::new(true)) }
    }

    fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

impl Drop for ListenSession<'_> {
    fn drop(&mut self) {
        self.stop();
        self.listening.store(false, Ordering::SeqCst);
    }
}

/// Push a frame out on the blocking pool.
async fn send(link: &SharedLink, frame: &[u8]) -> Result<usize, DisplayError> {
    let link = Arc::clone(link);
    let frame = frame.to_vec();
    let written = tokio::task::spawn_blocking(move || link.write(&frame)).await??;
    Ok(written)
}

/// Reader side of a listen session, runs on the blocking pool.
///
/// Ends cleanly when the session is stopped or the queue is dropped, and
/// with an error when the link fails. A quiet line is polled so a stop
/// request is noticed without waiting for the next button frame, and a
/// stopped session leaves pending input for the next reader.
fn read_telemetry(
    link: &dyn LinkTransport,
    decoder: &mut ButtonDecoder,
    active: &AtomicBool,
    events: &mpsc::Sender<ButtonEvent>,
) -> io::Result<()> {
    while active.load(Ordering::SeqCst) {
        if !link.poll_readable(LISTEN_POLL)? {
            continue;
        }
        if !active.load(Ordering::SeqCst) {
            break;
        }
        let mut frame = [0u8; FRAME_LEN];
        let n = link.read(&mut frame)?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "display link returned no data"));
        }
        if n != FRAME_LEN {
            debug!("skipping short telemetry read ({} bytes)", n);
            continue;
        }

        if let Some(event) = decoder.decode(frame) {
            debug!("button {:?} {}", event.button, if event.released { "released" } else { "pressed" });
            if events.blocking_send(event).is_err() {
                break;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::codec::{both_frame, down_frame, released_frame, up_frame};
    use crate::display::drivers::mock::{MockConnector, MockLink};
    use std::time::Instant;

    fn quick() -> Timing {
        Timing {
            handshake_timeout: Duration::from_millis(80),
            flush_interval: Duration::from_millis(20),
        }
    }

    fn driver_with(links: Vec<Arc<MockLink>>) -> DisplayDriver<MockConnector> {
        DisplayDriver::new(MockConnector::new(links), quick())
    }

    async fn opened() -> (DisplayDriver<MockConnector>, Arc<MockLink>) {
        let link = MockLink::responsive();
        let driver = driver_with(vec![Arc::clone(&link)]);
        driver.open().await.unwrap();
        (driver, link)
    }

    #[tokio::test]
    async fn test_open_handshake_succeeds() {
        let (driver, link) = opened().await;
        assert_eq!(driver.state(), ConnectionState::Open);
        assert_eq!(link.writes(), vec![codec::init_frame().to_vec()]);
    }

    #[tokio::test]
    async fn test_open_is_noop_when_open() {
        let (driver, _link) = opened().await;
        driver.open().await.unwrap();
        assert_eq!(driver.connector.connects(), 1);
    }

    #[tokio::test]
    async fn test_open_times_out_on_silent_panel() {
        let link = MockLink::new();
        let driver = driver_with(vec![Arc::clone(&link)]);

        let started = Instant::now();
        let result = driver.open().await;
        assert!(matches!(result, Err(DisplayError::DisplayNotWorking)));
        assert!(started.elapsed() < Duration::from_millis(600));
        assert_eq!(driver.state(), ConnectionState::Closed);
        assert!(link.is_closed());
    }

    #[tokio::test]
    async fn test_open_rejects_wrong_reply() {
        let link = MockLink::new();
        link.push_read(&up_frame());
        let driver = driver_with(vec![Arc::clone(&link)]);

        assert!(matches!(driver.open().await, Err(DisplayError::DisplayNotWorking)));
        assert_eq!(driver.state(), ConnectionState::Closed);
        assert!(link.is_closed());
    }

    #[tokio::test]
    async fn test_open_without_port_is_io_error() {
        let driver = driver_with(vec![]);
        assert!(matches!(driver.open().await, Err(DisplayError::Io(_))));
        assert_eq!(driver.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_reopen_after_close_uses_fresh_link() {
        let first = MockLink::responsive();
        let second = MockLink::responsive();
        let driver = driver_with(vec![Arc::clone(&first), Arc::clone(&second)]);

        driver.open().await.unwrap();
        driver.close().await.unwrap();
        driver.open().await.unwrap();
        assert!(first.is_closed());
        assert!(!second.is_closed());
        assert_eq!(driver.connector.connects(), 2);
    }

    #[tokio::test]
    async fn test_write_while_closed_does_no_io() {
        let link = MockLink::responsive();
        let driver = driver_with(vec![Arc::clone(&link)]);

        assert!(matches!(driver.write(Line::First, "hello").await, Err(DisplayError::Closed)));
        assert!(matches!(driver.enable(true).await, Err(DisplayError::Closed)));
        assert!(link.writes().is_empty());
    }

    #[tokio::test]
    async fn test_write_sends_padded_line() {
        let (driver, link) = opened().await;
        driver.write(Line::Second, "10.0.0.7").await.unwrap();

        let writes = link.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[1].as_slice(), codec::write_frame(Line::Second, "10.0.0.7        ").as_slice());
    }

    #[tokio::test]
    async fn test_writes_are_throttled() {
        let (driver, _link) = opened().await;
        let started = Instant::now();
        driver.write(Line::First, "IP:").await.unwrap();
        driver.write(Line::Second, "-").await.unwrap();
        // two settles plus one throttle gap at 20ms each
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_short_write_reports_mismatch() {
        let (driver, link) = opened().await;
        link.state().accept_limit = Some(7);

        match driver.write(Line::First, "partial").await {
            Err(DisplayError::MsgSizeMismatch { expected, actual }) => {
                assert_eq!(expected, codec::WRITE_FRAME_LEN);
                assert_eq!(actual, 7);
            }
            other => panic!("expected size mismatch, got {:?}", other),
        }
        assert!(driver.is_open());
    }

    #[tokio::test]
    async fn test_write_failure_closes_session() {
        let (driver, link) = opened().await;
        link.state().simulate_write_failure = true;

        assert!(matches!(driver.write(Line::First, "x").await, Err(DisplayError::Io(_))));
        assert_eq!(driver.state(), ConnectionState::Closed);
        assert!(link.is_closed());
    }

    #[tokio::test]
    async fn test_enable_frames() {
        let (driver, link) = opened().await;
        driver.enable(false).await.unwrap();
        driver.enable(true).await.unwrap();

        let writes = link.writes();
        assert_eq!(writes[1], codec::enable_frame(false).to_vec());
        assert_eq!(writes[2], codec::enable_frame(true).to_vec());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (driver, link) = opened().await;
        driver.close().await.unwrap();
        assert_eq!(driver.state(), ConnectionState::Closed);
        driver.close().await.unwrap();
        assert_eq!(driver.state(), ConnectionState::Closed);
        assert_eq!(link.state().close_count, 1);
    }

    #[tokio::test]
    async fn test_listen_when_closed_returns() {
        let driver = driver_with(vec![]);
        let mut calls = 0;
        driver.listen(|_, _| { calls += 1; true }).await;
        assert_eq!(calls, 0);
        assert!(!driver.is_listening());
    }

    #[tokio::test]
    async fn test_listen_delivers_events_in_order() {
        let (driver, link) = opened().await;
        link.push_read(&up_frame());
        link.push_read(&released_frame());
        link.push_read(&[0x53, 0x05]); // short, skipped
        link.push_read(&both_frame());
        link.push_read(&down_frame()); // masked by both
        link.push_read(&released_frame());

        let seen = Mutex::new(Vec::new());
        driver
            .listen(|button, released| {
                let mut seen = seen.lock().unwrap();
                seen.push((button, released));
                seen.len() < 4
            })
            .await;

        assert_eq!(
            seen.into_inner().unwrap(),
            vec![
                (Button::Up, false),
                (Button::Up, true),
                (Button::Both, false),
                (Button::Both, true),
            ]
        );
        assert!(!driver.is_listening());
        assert!(driver.is_open());
    }

    #[tokio::test]
    async fn test_listen_stops_on_read_error_and_closes() {
        let (driver, link) = opened().await;
        link.push_read(&up_frame());
        link.push_read_error(io::ErrorKind::BrokenPipe);

        let mut seen = Vec::new();
        driver.listen(|b, r| { seen.push((b, r)); true }).await;

        assert_eq!(seen, vec![(Button::Up, false)]);
        assert_eq!(driver.state(), ConnectionState::Closed);
        assert!(link.is_closed());
    }

    #[tokio::test]
    async fn test_close_from_another_task_stops_listener() {
        let link = MockLink::responsive();
        let driver = Arc::new(driver_with(vec![Arc::clone(&link)]));
        driver.open().await.unwrap();

        let closer = {
            let driver = Arc::clone(&driver);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                driver.close().await
            })
        };

        let started = Instant::now();
        driver.listen(|_, _| true).await;
        assert!(started.elapsed() < Duration::from_secs(2));
        closer.await.unwrap().unwrap();
        assert_eq!(driver.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_panicking_handler_ends_listen() {
        let (driver, link) = opened().await;
        link.push_read(&up_frame());
        link.push_read(&released_frame());

        driver.listen(|_, _| panic!("handler blew up")).await;
        assert!(!driver.is_listening());
    }

    #[tokio::test]
    async fn test_dropped_listen_future_stops_listening() {
        let (driver, _link) = opened().await;
        let listen = driver.listen(|_, _| true);
        let timed_out = tokio::time::timeout(Duration::from_millis(50), listen).await;
        assert!(timed_out.is_err());
        assert!(!driver.is_listening());
        assert!(driver.is_open());
    }

    #[tokio::test]
    async fn test_abandoned_listener_does_not_steal_frames() {
        let (driver, link) = opened().await;
        let abandoned = driver.listen(|_, _| true);
        assert!(tokio::time::timeout(Duration::from_millis(50), abandoned).await.is_err());

        // the next listener starts straight away, the old reader may still be polling
        let mut seen = Vec::new();
        let next = driver.listen(|button, released| {
            seen.push((button, released));
            false
        });
        let feed = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            link.push_read(&up_frame());
        };
        let (delivered, ()) = tokio::join!(
            tokio::time::timeout(Duration::from_secs(2), next),
            feed
        );

        assert!(delivered.is_ok(), "frame was never delivered to the new listener");
        assert_eq!(seen, vec![(Button::Up, false)]);
        assert_eq!(link.pending_reads(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_holds_back_the_reader() {
        const PRESSES: usize = 75;
        let (driver, link) = opened().await;
        for _ in 0..PRESSES {
            link.push_read(&up_frame());
            link.push_read(&released_frame());
        }
        let total = PRESSES * 2;

        let mut seen = Vec::new();
        let mut backlog = None;
        driver
            .listen(|button, released| {
                if seen.is_empty() {
                    // stall long enough for the reader to fill the queue
                    std::thread::sleep(Duration::from_millis(300));
                    backlog = Some(link.pending_reads());
                }
                seen.push((button, released));
                seen.len() < total
            })
            .await;

        // one event in the handler, a full queue, one frame blocked on the push
        assert_eq!(backlog, Some(total - EVENT_QUEUE_DEPTH - 2));
        assert_eq!(seen.len(), total);
        for pair in seen.chunks(2) {
            assert_eq!(pair, &[(Button::Up, false), (Button::Up, true)]);
        }
        assert_eq!(link.pending_reads(), 0);
    }

    #[tokio::test]
    async fn test_second_listener_is_refused() {
        let (driver, link) = opened().await;
        let driver = Arc::new(driver);

        let first = {
            let driver = Arc::clone(&driver);
            tokio::spawn(async move { driver.listen(|_, _| true).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(driver.is_listening());

        let mut calls = 0;
        driver.listen(|_, _| { calls += 1; true }).await;
        assert_eq!(calls, 0);
        assert!(driver.is_listening());

        driver.close().await.unwrap();
        first.await.unwrap();
        assert!(link.is_closed());
    }

    #[tokio::test]
    async fn test_decoder_state_spans_listen_sessions() {
        let (driver, link) = opened().await;
        link.push_read(&down_frame());
        driver.listen(|_, _| false).await;

        link.push_read(&released_frame());
        let mut seen = Vec::new();
        driver.listen(|b, r| { seen.push((b, r)); false }).await;
        assert_eq!(seen, vec![(Button::Down, true)]);
    }
}
