/*
 *  display/text.rs
 *
 *  qnaplcd - front panel, no fuss
 *  (c) 2020-26 Stuart Hunter
 *
 *  Fixed-width line preparation and progress bars
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

/// Number of character cells on each panel line.
pub const LINE_WIDTH: usize = 16;

/// Solid cell in the panel character ROM (wire byte 0xFF).
pub const FULL_BLOCK: char = '\u{FF}';

/// Unfilled progress cell.
pub const EMPTY_BLOCK: char = '-';

/// Pad or truncate `text` to exactly one panel line.
///
/// Longer input keeps its first [`LINE_WIDTH`] characters, shorter input is
/// right-padded with spaces. Width is counted in characters, one per cell.
pub fn prepare(text: &str) -> String {
    let mut line: String = text.chars().take(LINE_WIDTH).collect();
    let used = line.chars().count();
    line.extend(std::iter::repeat_n(' ', LINE_WIDTH - used));
    line
}

/// Render a bar of [`FULL_BLOCK`] cells proportional to `percent`.
///
/// The fill is `floor(LINE_WIDTH * percent / 100)`. Out of range values are
/// not rejected: the cell counts saturate so anything below zero draws an
/// empty bar and anything above 100 draws a full one.
pub fn progress(percent: i32) -> String {
    let filled = (LINE_WIDTH as i64 * percent as i64 / 100).clamp(0, LINE_WIDTH as i64) as usize;
    let mut bar = String::with_capacity(LINE_WIDTH * 2);
    bar.extend(std::iter::repeat_n(FULL_BLOCK, filled));
    bar.extend(std::iter::repeat_n(EMPTY_BLOCK, LINE_WIDTH - filled));
    bar
}
