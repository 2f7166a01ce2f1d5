//! Source location types.
//!
//! Locations are self-contained: the file a location belongs to travels with
//! the diagnostic that carries it, not with every position.
//!
//! # Example
//!
//! ```rust
//! use mtm_compiler::location::{Location, Position};
//!
//! let start = Position::new(3, 1, 20);
//! let end_pos = Position::new(3, 9, 28);
//! let loc = Location::from_positions(start, end_pos);
//!
//! assert_eq!(loc.start_line(), 3);
//! assert_eq!(loc.to_string(), "3:1-9");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// A position in a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed, in characters).
    pub column: u32,
    /// Byte offset from the beginning of the file.
    pub offset: usize,
}

impl Default for Position {
    fn default() -> Self {
        Self::start()
    }
}

impl Position {
    /// Create a new position.
    pub fn new(line: u32, column: u32, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }

    /// The first character of a file.
    pub fn start() -> Self {
        Self {
            line: 1,
            column: 1,
            offset: 0,
        }
    }

    /// Position reached after consuming `text`, which starts at `self`.
    pub fn advance_over(self, text: &str) -> Self {
        let mut pos = self;
        for ch in text.chars() {
            pos.offset += ch.len_utf8();
            if ch == '\n' {
                pos.line += 1;
                pos.column = 1;
            } else {
                pos.column += 1;
            }
        }
        pos
    }
}

/// A location span in source code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Location {
    /// Start position.
    pub start: Position,
    /// End position (exclusive).
    pub end: Position,
}

impl Location {
    /// Create a new location from start and end positions.
    pub fn from_positions(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// A zero-width location at `pos`.
    pub fn at(pos: Position) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }

    /// Get the start line number.
    pub fn start_line(&self) -> u32 {
        self.start.line
    }

    /// Get the start column (1-indexed).
    pub fn start_column(&self) -> u32 {
        self.start.column
    }

    /// Merge two locations into a span covering both.
    pub fn merge(&self, other: &Location) -> Self {
        Self {
            start: self.start,
            end: other.end,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start.line == self.end.line {
            if self.start.column >= self.end.column {
                write!(f, "{}:{}", self.start.line, self.start.column)
            } else {
                write!(f, "{}:{}-{}", self.start.line, self.start.column, self.end.column)
            }
        } else {
            write!(
                f,
                "{}:{}-{}:{}",
                self.start.line, self.start.column, self.end.line, self.end.column
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_over() {
        let pos = Position::start().advance_over("ab\ncd");
        assert_eq!(pos.line, 2);
        assert_eq!(pos.column, 3);
        assert_eq!(pos.offset, 5);
    }

    #[test]
    fn test_location_merge() {
        let a = Location::from_positions(Position::new(1, 1, 0), Position::new(1, 5, 4));
        let b = Location::from_positions(Position::new(2, 1, 10), Position::new(2, 8, 17));

        let merged = a.merge(&b);
        assert_eq!(merged.start_line(), 1);
        assert_eq!(merged.end.line, 2);
    }

    #[test]
    fn test_location_display() {
        let loc = Location::from_positions(Position::new(5, 6, 45), Position::new(5, 10, 49));
        assert_eq!(format!("{}", loc), "5:6-10");

        let point = Location::at(Position::new(2, 4, 12));
        assert_eq!(point.to_string(), "2:4");

        let multi = Location::from_positions(Position::new(1, 2, 1), Position::new(3, 1, 30));
        assert_eq!(multi.to_string(), "1:2-3:1");
    }

    #[test]
    fn test_location_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Location>();
        assert_send_sync::<Position>();
    }
}
