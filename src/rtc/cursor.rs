//! Caret position conversion for the cursor broadcast.
//!
//! A flat character offset becomes a 1-indexed (line, column) pair by
//! counting newlines; rendering reverses the pair into a pixel position
//! using fixed line-height and character-width constants. That pixel
//! mapping is a monospace heuristic, not text-metrics measurement: it
//! drifts under proportional rendering or font-size changes, and that
//! limitation is part of the contract.

use serde::{Deserialize, Serialize};

/// Height of one rendered text line, in pixels
pub const LINE_HEIGHT_PX: f32 = 20.0;
/// Approximate width of one character, in pixels (monospace assumption)
pub const CHAR_WIDTH_PX: f32 = 8.0;
/// Horizontal offset of the text area past the line-number gutter
pub const GUTTER_PX: f32 = 48.0;

/// 1-indexed caret position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPoint {
    pub line: u32,
    pub column: u32,
}

/// Convert a flat character offset into a 1-indexed (line, column).
/// Offsets past the end of the text clamp to the final position.
pub fn offset_to_point(text: &str, offset: usize) -> CursorPoint {
    let mut line = 1u32;
    let mut column = 1u32;
    for (i, ch) in text.chars().enumerate() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    CursorPoint { line, column }
}

/// Reverse of `offset_to_point`, clamping the column to the line length
/// and the line to the text. The round trip recovers the same visual
/// position, not necessarily the same offset for out-of-range input.
pub fn point_to_offset(text: &str, point: CursorPoint) -> usize {
    let mut offset = 0usize;
    for (idx, line) in text.split('\n').enumerate() {
        let len = line.chars().count();
        if idx as u32 + 1 == point.line {
            let column = (point.column.saturating_sub(1) as usize).min(len);
            return offset + column;
        }
        offset += len + 1;
    }
    text.chars().count()
}

/// Approximate (top, left) pixel position for rendering a remote caret
pub fn approx_pixel_position(point: CursorPoint) -> (f32, f32) {
    let top = (point.line.saturating_sub(1)) as f32 * LINE_HEIGHT_PX;
    let left = (point.column.saturating_sub(1)) as f32 * CHAR_WIDTH_PX + GUTTER_PX;
    (top, left)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "fn main() {\n    println!(\"hi\");\n}\n";

    #[test]
    fn start_of_text() {
        assert_eq!(offset_to_point(TEXT, 0), CursorPoint { line: 1, column: 1 });
    }

    #[test]
    fn offset_round_trips_through_point() {
        for offset in 0..TEXT.chars().count() {
            let point = offset_to_point(TEXT, offset);
            assert_eq!(point_to_offset(TEXT, point), offset, "offset {}", offset);
        }
    }

    #[test]
    fn newline_boundaries() {
        // Just after the first newline: start of line 2
        let point = offset_to_point(TEXT, 12);
        assert_eq!(point, CursorPoint { line: 2, column: 1 });
    }

    #[test]
    fn out_of_range_clamps() {
        let point = offset_to_point(TEXT, 10_000);
        assert_eq!(point_to_offset(TEXT, point), TEXT.chars().count());

        // A column past the line end clamps to the line length: the
        // round trip preserves the visual position, not the input
        let offset = point_to_offset("ab\ncd", CursorPoint { line: 1, column: 99 });
        assert_eq!(offset, 2);
    }

    #[test]
    fn pixel_mapping_uses_fixed_metrics() {
        let (top, left) = approx_pixel_position(CursorPoint { line: 3, column: 5 });
        assert_eq!(top, 2.0 * LINE_HEIGHT_PX);
        assert_eq!(left, 4.0 * CHAR_WIDTH_PX + GUTTER_PX);
    }
}
