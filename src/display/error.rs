/*
 *  display/error.rs
 *
 *  qnaplcd - front panel, no fuss
 *  (c) 2020-26 Stuart Hunter
 *
 *  Unified error type for the panel driver
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

use std::fmt;
use std::error::Error;
use std::io;

/// Unified error type for all display operations
#[derive(Debug)]
pub enum DisplayError {
    /// Operation attempted while the link is not open
    Closed,

    /// Handshake failed or the panel never answered
    DisplayNotWorking,

    /// The link accepted fewer bytes than the frame holds
    MsgSizeMismatch { expected: usize, actual: usize },

    /// Handshake read lost the race against its timer
    TimedOut,

    /// Transport error, passed through untouched
    Io(io::Error),

    /// A blocking task died underneath us
    Fault(String),
}

impl DisplayError {
    /// Errors that mean the session can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DisplayError::Io(_) | DisplayError::Fault(_))
    }
}

impl fmt::Display for DisplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayError::Closed =>
                write!(f, "display closed"),
            DisplayError::DisplayNotWorking =>
                write!(f, "display not working"),
            DisplayError::MsgSizeMismatch { expected, actual } =>
                write!(f, "msg size mismatch: expected {} bytes, wrote {}", expected, actual),
            DisplayError::TimedOut =>
                write!(f, "display did not answer in time"),
            DisplayError::Io(err) =>
                write!(f, "display link error: {}", err),
            DisplayError::Fault(msg) =>
                write!(f, "display task fault: {}", msg),
        }
    }
}

impl Error for DisplayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DisplayError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for DisplayError {
    fn from(err: io::Error) -> Self {
        DisplayError::Io(err)
    }
}

impl From<tokio::task::JoinError> for DisplayError {
    fn from(err: tokio::task::JoinError) -> Self {
        DisplayError::Fault(err.to_string())
    }
}
