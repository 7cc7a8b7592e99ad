/*
 *  display/codec.rs
 *
 *  qnaplcd - front panel, no fuss
 *  (c) 2020-26 Stuart Hunter
 *
 *  Wire frames for the QNAP front panel (A125 style serial LCD)
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

use crate::display::text::LINE_WIDTH;

/// Size of every frame the panel sends back (ack and button telemetry).
pub const FRAME_LEN: usize = 4;

/// One frame as read from the link.
pub type RawFrame = [u8; FRAME_LEN];

/// Total size of a text write command.
pub const WRITE_FRAME_LEN: usize = WRITE_HEADER_LEN + LINE_WIDTH;

const WRITE_HEADER_LEN: usize = 7;

// host -> panel
const CMD_INIT: [u8; 2] = [0x4D, 0x00];
const CMD_ENABLE: RawFrame = [0x4D, 0x5E, 0x01, 0x0A];
const CMD_DISABLE: RawFrame = [0x4D, 0x5E, 0x00, 0x0A];
const CMD_WRITE: [u8; 3] = [0x4D, 0x5E, 0x01];
const WRITE_TEXT: [u8; 2] = [0x4D, 0x0C];

// panel -> host
const RSP_READY: RawFrame = [0x53, 0x01, 0x00, 0x7D];
const RSP_BUTTON: [u8; 3] = [0x53, 0x05, 0x00];

const BTN_RELEASED: u8 = 0x00;
const BTN_UP: u8 = 0x01;
const BTN_DOWN: u8 = 0x02;
const BTN_BOTH: u8 = 0x03;

/// Physical row targeted by a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Line {
    First,
    Second,
}

impl Line {
    /// Row index as sent on the wire
    pub const fn index(self) -> u8 {
        match self {
            Line::First => 0,
            Line::Second => 1,
        }
    }
}

pub const fn init_frame() -> [u8; 2] {
    CMD_INIT
}

/// Reply the panel sends to [`init_frame`] when it is alive.
pub const fn init_ack_frame() -> RawFrame {
    RSP_READY
}

pub const fn enable_frame(on: bool) -> RawFrame {
    if on { CMD_ENABLE } else { CMD_DISABLE }
}

/// Build the command that writes one prepared line.
///
/// `text` is expected to come from [`prepare`](crate::display::text::prepare);
/// the payload is always exactly [`LINE_WIDTH`] cells, anything beyond is
/// dropped and a short line is space filled.
pub fn write_frame(line: Line, text: &str) -> [u8; WRITE_FRAME_LEN] {
    let mut frame = [b' '; WRITE_FRAME_LEN];
    frame[..3].copy_from_slice(&CMD_WRITE);
    frame[3..5].copy_from_slice(&WRITE_TEXT);
    frame[5] = line.index();
    frame[6] = LINE_WIDTH as u8;
    for (cell, c) in frame[WRITE_HEADER_LEN..].iter_mut().zip(text.chars()) {
        *cell = cell_byte(c);
    }
    frame
}

/// Leading bytes shared by all button telemetry.
pub const fn button_prefix() -> [u8; 3] {
    RSP_BUTTON
}

pub const fn released_frame() -> RawFrame {
    button_frame(BTN_RELEASED)
}

pub const fn up_frame() -> RawFrame {
    button_frame(BTN_UP)
}

pub const fn down_frame() -> RawFrame {
    button_frame(BTN_DOWN)
}

pub const fn both_frame() -> RawFrame {
    button_frame(BTN_BOTH)
}

const fn button_frame(discriminator: u8) -> RawFrame {
    [RSP_BUTTON[0], RSP_BUTTON[1], RSP_BUTTON[2], discriminator]
}

/// True when `frame` carries the button telemetry prefix in canonical order.
pub fn is_button_frame(frame: &[u8]) -> bool {
    frame.starts_with(&RSP_BUTTON)
}

/// Character ROM byte for `c`: Latin-1 code points map to themselves,
/// everything else becomes `?`.
pub fn cell_byte(c: char) -> u8 {
    u8::try_from(u32::from(c)).unwrap_or(b'?')
}
