/*
 *  display/buttons.rs
 *
 *  qnaplcd - front panel, no fuss
 *  (c) 2020-26 Stuart Hunter
 *
 *  Button telemetry decoding
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

use arrayvec::ArrayVec;

use crate::display::codec::{self, RawFrame, FRAME_LEN};

/// Button combination reported by the panel
///
/// `None` only ever shows up on a release that arrived while nothing was
/// tracked as held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Button {
    #[default]
    None,
    Up,
    Down,
    Both,
}

impl Button {
    /// Numeric id matching the telemetry discriminator (0 = none).
    pub const fn index(self) -> u8 {
        match self {
            Button::None => 0,
            Button::Up => 1,
            Button::Down => 2,
            Button::Both => 3,
        }
    }
}

/// A single press or release transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub button: Button,
    pub released: bool,
}

impl ButtonEvent {
    fn pressed(button: Button) -> Self {
        Self { button, released: false }
    }
}

/// Turns raw telemetry into press/release transitions.
///
/// The panel reports transitions rather than levels, and a two button press
/// usually arrives as a single-button frame followed by the combined one.
/// The decoder keeps the last held combination so that once `Both` is held
/// a stray `Up` or `Down` is ignored until the release.
#[derive(Debug, Default)]
pub struct ButtonDecoder {
    held: Button,
}

impl ButtonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Combination currently tracked as pressed.
    pub fn held(&self) -> Button {
        self.held
    }

    pub fn reset(&mut self) {
        self.held = Button::None;
    }

    /// Decode one frame, returning the transition it represents if any.
    pub fn decode(&mut self, frame: RawFrame) -> Option<ButtonEvent> {
        let frame = ensure_order(frame);

        if frame == codec::released_frame() {
            let event = ButtonEvent { button: self.held, released: true };
            self.held = Button::None;
            Some(event)
        } else if frame == codec::up_frame() {
            self.press_single(Button::Up)
        } else if frame == codec::down_frame() {
            self.press_single(Button::Down)
        } else if frame == codec::both_frame() {
            self.held = Button::Both;
            Some(ButtonEvent::pressed(Button::Both))
        } else {
            None
        }
    }

    fn press_single(&mut self, button: Button) -> Option<ButtonEvent> {
        if self.held == Button::Both {
            return None;
        }
        self.held = button;
        Some(ButtonEvent::pressed(button))
    }
}

/// Best effort repair of telemetry whose bytes arrive shuffled.
///
/// Each prefix byte is pulled out of the frame into its canonical slot, the
/// first byte left over becomes the discriminator. Prefix bytes that cannot
/// be found stay zero, so garbage decodes to a frame that matches nothing.
fn ensure_order(frame: RawFrame) -> RawFrame {
    if codec::is_button_frame(&frame) {
        return frame;
    }

    let mut pool: ArrayVec<u8, FRAME_LEN> = ArrayVec::from(frame);
    let mut ordered = [0u8; FRAME_LEN];
    for (slot, &wanted) in ordered.iter_mut().zip(codec::button_prefix().iter()) {
        if let Some(pos) = pool.iter().position(|&b| b == wanted) {
            *slot = wanted;
            pool.swap_remove(pos);
        }
    }
    if let Some(&rest) = pool.first() {
        ordered[FRAME_LEN - 1] = rest;
    }
    ordered
}
