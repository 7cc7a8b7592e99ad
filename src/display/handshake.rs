/*
 *  display/handshake.rs
 *
 *  qnaplcd - front panel, no fuss
 *  (c) 2020-26 Stuart Hunter
 *
 *  Time bounded read used while bringing the link up
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

use std::sync::Arc;
use std::time::Duration;

use arrayvec::ArrayVec;
use log::{debug, warn};

use crate::display::codec::FRAME_LEN;
use crate::display::error::DisplayError;
use crate::display::traits::SharedLink;

/// Default bound on the handshake reply.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(300);

/// Read one frame, giving up after `bound`.
///
/// The read runs on the blocking pool and races a timer. If the timer wins
/// the link is force closed so the stranded read returns, and whatever it
/// eventually produces is dropped with its task. Returns the bytes actually
/// read, which may be fewer than a frame.
pub async fn read_with_timeout(
    link: &SharedLink,
    bound: Duration,
) -> Result<ArrayVec<u8, FRAME_LEN>, DisplayError> {
    let reader = Arc::clone(link);
    let pending = tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; FRAME_LEN];
        reader
            .read(&mut buf)
            .map(|n| buf[..n].iter().copied().collect::<ArrayVec<u8, FRAME_LEN>>())
    });

    match tokio::time::timeout(bound, pending).await {
        Ok(joined) => Ok(joined??),
        Err(_) => {
            warn!("no reply from display within {:?}", bound);
            if let Err(e) = link.close() {
                debug!("closing stalled link: {}", e);
            }
            Err(DisplayError::TimedOut)
        }
    }
}
