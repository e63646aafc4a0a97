//! Sorted, disjoint time intervals over real-valued seconds.
//!
//! Buffered media is reported as a set of half-open `[start, end)` ranges.
//! Appended frames rarely abut exactly, so the union operation accepts a
//! tolerance: ranges separated by no more than the tolerance are merged.

use std::fmt;

/// Gap tolerance used when merging frame-derived ranges, in seconds.
///
/// One frame at 60 fps; timestamp rounding keeps adjacent frames within it.
pub const RANGE_MERGE_TOLERANCE: f64 = 1.0 / 60.0;

/// A single half-open interval `[start, end)` in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Returns true if `t` falls inside `[start, end)`.
    pub fn contains(&self, t: f64) -> bool {
        self.start <= t && t < self.end
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// An ordered set of disjoint time ranges.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeRanges {
    ranges: Vec<TimeRange>,
}

impl TimeRanges {
    pub fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    /// Builds a set from a single range. Empty or inverted input yields an
    /// empty set.
    pub fn from_range(start: f64, end: f64) -> Self {
        if start < end {
            Self {
                ranges: vec![TimeRange::new(start, end)],
            }
        } else {
            Self::new()
        }
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Start of the `i`-th range.
    ///
    /// Panics if `i` is out of range; callers index only after checking
    /// `len()`.
    pub fn start(&self, i: usize) -> f64 {
        self.ranges[i].start
    }

    /// End of the `i`-th range. Panics if `i` is out of range.
    pub fn end(&self, i: usize) -> f64 {
        self.ranges[i].end
    }

    pub fn first(&self) -> Option<TimeRange> {
        self.ranges.first().copied()
    }

    pub fn last(&self) -> Option<TimeRange> {
        self.ranges.last().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimeRange> {
        self.ranges.iter()
    }

    /// Merges another set into this one.
    ///
    /// Ranges from both sets whose gap is at most `tolerance` are coalesced.
    pub fn union(&self, other: &TimeRanges, tolerance: f64) -> TimeRanges {
        let mut merged: Vec<TimeRange> =
            Vec::with_capacity(self.ranges.len() + other.ranges.len());
        merged.extend_from_slice(&self.ranges);
        merged.extend_from_slice(&other.ranges);
        merged.sort_by(|a, b| {
            a.start
                .partial_cmp(&b.start)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.end.partial_cmp(&b.end).unwrap_or(std::cmp::Ordering::Equal))
        });

        let mut out: Vec<TimeRange> = Vec::with_capacity(merged.len());
        for range in merged {
            match out.last_mut() {
                Some(active) if active.end + tolerance >= range.start => {
                    // Overlapping or within tolerance: extend, or drop if
                    // fully contained.
                    if range.end > active.end {
                        active.end = range.end;
                    }
                }
                _ => out.push(range),
            }
        }
        TimeRanges { ranges: out }
    }

    /// Adds a single range, merging with tolerance.
    pub fn add(&mut self, start: f64, end: f64, tolerance: f64) {
        *self = self.union(&TimeRanges::from_range(start, end), tolerance);
    }

    /// Pointwise intersection of two sets.
    pub fn intersect(&self, other: &TimeRanges) -> TimeRanges {
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.ranges.len() && j < other.ranges.len() {
            let a = self.ranges[i];
            let b = other.ranges[j];
            let start = a.start.max(b.start);
            let end = a.end.min(b.end);
            if start < end {
                out.push(TimeRange::new(start, end));
            }
            // Advance whichever interval ends first; both on a tie.
            if a.end <= b.end {
                i += 1;
            }
            if b.end <= a.end {
                j += 1;
            }
        }
        TimeRanges { ranges: out }
    }

    /// The complement over `(-inf, +inf)`.
    pub fn invert(&self) -> TimeRanges {
        let mut out = Vec::new();
        let mut cursor = f64::NEG_INFINITY;
        for range in &self.ranges {
            if cursor < range.start {
                out.push(TimeRange::new(cursor, range.start));
            }
            cursor = range.end;
        }
        if cursor < f64::INFINITY {
            out.push(TimeRange::new(cursor, f64::INFINITY));
        }
        TimeRanges { ranges: out }
    }

    /// Removes every point of `other` from this set.
    pub fn subtract(&self, other: &TimeRanges) -> TimeRanges {
        self.intersect(&other.invert())
    }

    /// Returns the range containing `t`, if any.
    ///
    /// Linear scan; sets stay small (tens of ranges at most).
    pub fn find(&self, t: f64) -> Option<TimeRange> {
        self.ranges.iter().copied().find(|r| r.contains(t))
    }

    /// True if a single range covers all of `[start, end]`.
    pub fn contains_range(&self, start: f64, end: f64) -> bool {
        self.ranges
            .iter()
            .any(|r| r.start <= start && end <= r.end)
    }
}

impl fmt::Display for TimeRanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, r) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{r}")?;
        }
        write!(f, "}}")
    }
}
