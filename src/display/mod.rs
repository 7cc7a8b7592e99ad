/*
 *  display/mod.rs
 *
 *  qnaplcd - front panel, no fuss
 *  (c) 2020-26 Stuart Hunter
 *
 *  Display subsystem - QNAP two line front panel over serial
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

// Core trait definitions
pub mod traits;
pub mod error;

// Pure helpers: text layout, wire frames, button state
pub mod text;
pub mod codec;
pub mod buttons;

// Link lifecycle
pub mod handshake;
pub mod driver;

// Links (serial, mock)
pub mod drivers;

// Re-exports for convenience
pub use buttons::{Button, ButtonDecoder, ButtonEvent};
pub use codec::Line;
pub use driver::{ConnectionState, DisplayDriver, Timing};
pub use error::DisplayError;
pub use text::{prepare, progress, LINE_WIDTH};
pub use traits::{Connector, Lcd, LinkTransport, SharedLink};

pub use drivers::serial::{SerialConnector, SerialLink};

use log::{error, info};

use crate::config::DisplayConfig;

/// Look for the panel on the configured port.
///
/// A panel that cannot be opened is logged and reported as `None` so the
/// host can carry on without one.
pub async fn find(cfg: &DisplayConfig) -> Option<DisplayDriver<SerialConnector>> {
    let connector = SerialConnector::new(cfg.port(), cfg.baud_rate());
    let driver = DisplayDriver::new(connector, cfg.timing());

    info!("probing display on {}", driver.endpoint());
    match driver.open().await {
        Ok(()) => Some(driver),
        Err(e) => {
            error!("display on {}: {}", driver.endpoint(), e);
            None
        }
    }
}
