// MIT License

// Copyright (c) 2016 Jerome Froelich

// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:

// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.

// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

use std::{fmt, ops::Range};

/// Number of distinct positions on the ring.
pub const RING_SIZE: u64 = 1 << 32;

/// A (half-open) arc of the ring, bounded inclusively below and exclusively
/// above (`start..end`).
///
/// If `start >= end`, the arc wraps past `u32::MAX` and is equivalent to
/// covering `(start..)` and `(..end)`. In particular `start == end` covers
/// the whole ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PositionRange {
    pub start: u32,
    pub end: u32,
}

impl PositionRange {
    /// Creates a `PositionRange`.
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Returns the arc owned by a virtual node at `position` whose
    /// predecessor on the ring sits at `previous`: every key hash in
    /// `(previous, position]`.
    pub(crate) fn owned(previous: u32, position: u32) -> Self {
        Self {
            start: previous.wrapping_add(1),
            end: position.wrapping_add(1),
        }
    }

    /// Returns `true` if the range wraps past the top of the ring.
    pub fn is_wrapping(&self) -> bool {
        self.start >= self.end
    }

    /// Returns `true` if `position` is contained in the range.
    pub fn contains(&self, position: u32) -> bool {
        if self.is_wrapping() {
            position >= self.start || position < self.end
        } else {
            position >= self.start && position < self.end
        }
    }

    /// Number of positions covered. A full ring is `RING_SIZE`.
    pub fn size(&self) -> u64 {
        if self.is_wrapping() {
            RING_SIZE - u64::from(self.start - self.end)
        } else {
            u64::from(self.end - self.start)
        }
    }
}

impl From<Range<u32>> for PositionRange {
    fn from(value: Range<u32>) -> Self {
        Self::new(value.start, value.end)
    }
}

impl fmt::Display for PositionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#010x}, {:#010x})", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic() {
        let range = PositionRange::new(10, 5);

        assert!(range.is_wrapping());
        assert!(range.contains(0));
        assert!(range.contains(4));
        assert!(!range.contains(5));
        assert!(!range.contains(9));
        assert!(range.contains(10));
        assert!(range.contains(u32::MAX));

        let range = PositionRange::from(5..10);

        assert!(!range.is_wrapping());
        assert!(!range.contains(0));
        assert!(range.contains(5));
        assert!(range.contains(9));
        assert!(!range.contains(10));
        assert!(!range.contains(u32::MAX));
    }

    #[test]
    fn full_ring() {
        let range = PositionRange::new(7, 7);

        assert!(range.is_wrapping());
        assert!(range.contains(0));
        assert!(range.contains(7));
        assert!(range.contains(u32::MAX));
        assert_eq!(range.size(), RING_SIZE);
    }

    #[test]
    fn owned() {
        // (10, 20]
        let range = PositionRange::owned(10, 20);
        assert_eq!(range, PositionRange::new(11, 21));
        assert!(!range.contains(10));
        assert!(range.contains(20));
        assert_eq!(range.size(), 10);

        // Predecessor at the top of the ring: [0, 20].
        let range = PositionRange::owned(u32::MAX, 20);
        assert!(!range.is_wrapping());
        assert!(range.contains(0));
        assert_eq!(range.size(), 21);

        // Position at the top of the ring: (10, MAX].
        let range = PositionRange::owned(10, u32::MAX);
        assert!(range.is_wrapping());
        assert!(range.contains(u32::MAX));
        assert!(!range.contains(0));
        assert_eq!(range.size(), u64::from(u32::MAX - 10));

        // Wrapping arc: (MAX - 5, 5].
        let range = PositionRange::owned(u32::MAX - 5, 5);
        assert!(range.contains(u32::MAX));
        assert!(range.contains(0));
        assert!(range.contains(5));
        assert!(!range.contains(6));
        assert_eq!(range.size(), 11);
    }

    #[test]
    fn size() {
        assert_eq!(PositionRange::new(5, 10).size(), 5);
        assert_eq!(PositionRange::new(10, 9).size(), RING_SIZE - 1);
        assert_eq!(PositionRange::new(0, 0).size(), RING_SIZE);
    }
}
