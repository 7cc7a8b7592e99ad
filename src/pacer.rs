/*
 *  pacer.rs
 *
 *  qnaplcd - front panel, no fuss
 *	(c) 2020-26 Stuart Hunter
 *
 *	This program is free software: you can redistribute it and/or modify
 *	it under the terms of the GNU General Public License as published by
 *	the Free Software Foundation, either version 3 of the License, or
 *	(at your option) any later version.
 *
 *	This program is distributed in the hope that it will be useful,
 *	but WITHOUT ANY WARRANTY; without even the implied warranty of
 *	MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *	GNU General Public License for more details.
 *
 *	See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *	Public License.
 *
 */
use std::time::{Duration, Instant};

/// Panel needs ~135ms between text writes or it drops the second one.
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(135);

/// Spaces consecutive flushes at least `interval` apart.
pub struct FlushPacer {
    last_flush: Option<Instant>,
    interval: Duration,
}

impl FlushPacer {
    pub fn new(interval: Duration) -> Self {
        Self { last_flush: None, interval }
    }

    #[inline]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time still to wait at `now` before the next flush is allowed.
    #[inline]
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last_flush {
            Some(last) => (last + self.interval).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }

    /// Sleep out the remainder of the interval, then stamp the flush.
    pub async fn wait(&mut self) {
        let pending = self.remaining(Instant::now());
        if !pending.is_zero() {
            tokio::time::sleep(pending).await;
        }
        self.last_flush = Some(Instant::now());
    }

    /// Forget the last flush (fresh session).
    pub fn reset(&mut self) {
        self.last_flush = None;
    }
}
