// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::collections::HashMap;
use std::fmt;
use std::fmt::Display;
use std::fmt::Formatter;

use crate::Error;
use crate::ErrorKind;
use crate::Result;

/// The baseline alphabet for range interpolation. Characters observed in
/// actual object names are merged in as listing progresses.
pub(crate) const DEFAULT_ALPHABET: &str = "0123456789abcdefghijklmnopqrstuvwxyz";

/// The smallest string strictly greater than `name`.
///
/// Appending `NUL` realizes "the last seen name plus an infinitesimal
/// successor": using it as an inclusive lower bound excludes `name` itself
/// while admitting every name after it.
pub(crate) fn successor(name: &str) -> String {
    let mut s = String::with_capacity(name.len() + 1);
    s.push_str(name);
    s.push('\u{0}');
    s
}

/// A half-open interval `[lower, upper)` over prefix-relative object names.
///
/// Ranges held by distinct active work items are pairwise disjoint at all
/// times; their union is the requested span minus work already completed.
/// `upper = None` means the range extends to the end of the prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRange {
    /// Inclusive lower bound.
    pub lower: String,
    /// Exclusive upper bound; `None` is unbounded.
    pub upper: Option<String>,
}

impl ListingRange {
    /// Create a range from its bounds.
    pub fn new(lower: impl Into<String>, upper: Option<String>) -> Self {
        Self {
            lower: lower.into(),
            upper,
        }
    }

    /// Whether no name can lie inside this range.
    pub fn is_empty(&self) -> bool {
        match &self.upper {
            Some(upper) => self.lower >= *upper,
            None => false,
        }
    }
}

impl Display for ListingRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.upper {
            Some(upper) => write!(f, "[{}, {})", self.lower, upper),
            None => write!(f, "[{}, ..)", self.lower),
        }
    }
}

/// Interpolates split points in the lexicographic key space.
///
/// Names are treated as digit sequences over a learned alphabet; a range's
/// bounds are mapped to the smallest integer interval wide enough to hold
/// the requested number of split points, evenly spaced fractions of that
/// interval are mapped back to strings. The same rule drives the initial
/// partition (`W - 1` points) and every steal (midpoint, one point).
#[derive(Debug)]
pub(crate) struct RangeSplitter {
    sorted_alphabet: Vec<char>,
    index: HashMap<char, usize>,
}

impl RangeSplitter {
    pub(crate) fn new(alphabet: &str) -> Result<Self> {
        if alphabet.is_empty() {
            return Err(
                Error::new(ErrorKind::ConfigInvalid, "cannot split with an empty alphabet")
                    .with_operation("RangeSplitter::new"),
            );
        }
        let mut sorted_alphabet: Vec<char> = alphabet.chars().collect();
        sorted_alphabet.sort_unstable();
        sorted_alphabet.dedup();
        let index = sorted_alphabet
            .iter()
            .enumerate()
            .map(|(i, c)| (*c, i))
            .collect();
        Ok(Self {
            sorted_alphabet,
            index,
        })
    }

    /// Merge characters seen in real names into the alphabet, so later
    /// interpolation stays inside the namespace actually in use.
    fn learn(&mut self, characters: &str) {
        let mut changed = false;
        for c in characters.chars() {
            if !self.index.contains_key(&c) {
                self.sorted_alphabet.push(c);
                changed = true;
            }
        }
        if changed {
            self.sorted_alphabet.sort_unstable();
            self.index = self
                .sorted_alphabet
                .iter()
                .enumerate()
                .map(|(i, c)| (*c, i))
                .collect();
        }
    }

    /// Compute up to `num_splits` split points strictly inside
    /// `[lower, upper)`, evenly spaced, in ascending order.
    ///
    /// An empty result means the range cannot be split (bounds equal or too
    /// close); callers treat such a range as atomic.
    pub(crate) fn split_range(
        &mut self,
        lower: &str,
        upper: Option<&str>,
        num_splits: usize,
    ) -> Result<Vec<String>> {
        if num_splits < 1 {
            return Err(
                Error::new(ErrorKind::ConfigInvalid, "need at least one split point")
                    .with_operation("RangeSplitter::split_range")
                    .with_context("num_splits", num_splits),
            );
        }
        if let Some(upper) = upper {
            if lower >= upper {
                return Ok(Vec::new());
            }
        }

        self.learn(lower);
        if let Some(upper) = upper {
            self.learn(upper);
        }

        if self.is_equal_with_padding(lower, upper) {
            return Ok(Vec::new());
        }

        let (head, lower, upper) = self.strip_head(lower, upper);
        let Some((start, end, min_len)) = self.minimal_int_range(lower, upper, num_splits) else {
            // The bounds share so deep a run of digits that the interval
            // doesn't fit machine integers; such a range is far too narrow
            // to be worth splitting.
            return Ok(Vec::new());
        };

        let diff = end - start;
        let interval = num_splits as u128 + 1;
        let mut points = Vec::new();
        for i in 1..=num_splits as u128 {
            let point = start + diff * i / interval;
            let s = self.int_to_string(point, min_len);

            let above_lower = !s.is_empty() && s.as_str() > lower;
            let below_upper = match upper {
                Some(upper) => !s.is_empty() && s.as_str() < upper,
                None => !s.is_empty(),
            };
            if above_lower && below_upper {
                points.push(format!("{head}{s}"));
            }
        }
        Ok(points)
    }

    /// A coarse measure of how much of the namespace a range still covers,
    /// as a fraction in `[0, 1]`. Only comparisons matter: thieves use it to
    /// pick the victim with the most remaining work.
    pub(crate) fn estimated_span(&mut self, range: &ListingRange) -> f64 {
        if range.is_empty() {
            return 0.0;
        }
        self.learn(&range.lower);
        if let Some(upper) = &range.upper {
            self.learn(upper);
        }
        if self.is_equal_with_padding(&range.lower, range.upper.as_deref()) {
            return 0.0;
        }

        let (head, lower, upper) = self.strip_head(&range.lower, range.upper.as_deref());
        let head_len = head.chars().count();
        match self.minimal_int_range(lower, upper, 1) {
            None => 0.0,
            Some((start, end, min_len)) => {
                let alpha = self.sorted_alphabet.len() as f64;
                ((end - start) as f64 / alpha.powi(min_len as i32)) * alpha.powi(-(head_len as i32))
            }
        }
    }

    /// Split the bounds into a shared head and the tails that actually
    /// differ, so integer conversion only sees the differing digits. For an
    /// unbounded range the head is the lower bound's leading run of maximal
    /// digits, which plays the same role against an infinite upper bound.
    fn strip_head<'a>(
        &self,
        lower: &'a str,
        upper: Option<&'a str>,
    ) -> (&'a str, &'a str, Option<&'a str>) {
        match upper {
            Some(upper) => {
                let head_bytes = lower
                    .char_indices()
                    .zip(upper.chars())
                    .find(|((_, lc), uc)| lc != uc)
                    .map(|((i, _), _)| i)
                    .unwrap_or_else(|| lower.len().min(upper.len()));
                (
                    &lower[..head_bytes],
                    &lower[head_bytes..],
                    Some(&upper[head_bytes..]),
                )
            }
            None => {
                let max_char = *self.sorted_alphabet.last().expect("alphabet is never empty");
                let head_bytes = lower
                    .char_indices()
                    .find(|(_, c)| *c != max_char)
                    .map(|(i, _)| i)
                    .unwrap_or(lower.len());
                (&lower[..head_bytes], &lower[head_bytes..], None)
            }
        }
    }

    /// Convert a string range to the smallest integer range wide enough for
    /// `num_splits` interior points. Returns `(start, end, digits)`, or
    /// `None` if the interval cannot be represented.
    fn minimal_int_range(
        &self,
        lower: &str,
        upper: Option<&str>,
        num_splits: usize,
    ) -> Option<(u128, u128, usize)> {
        let alpha = self.sorted_alphabet.len() as u128;
        let min_char = self.sorted_alphabet[0];
        let max_char = *self.sorted_alphabet.last().expect("alphabet is never empty");
        let end_default = if upper.is_none() { max_char } else { min_char };

        let lower: Vec<char> = lower.chars().collect();
        let upper: Vec<char> = upper.map(|u| u.chars().collect()).unwrap_or_default();

        let mut start = 0u128;
        let mut end = 0u128;
        for i in 0.. {
            let lc = lower.get(i).copied().unwrap_or(min_char);
            let uc = upper.get(i).copied().unwrap_or(end_default);

            start = start.checked_mul(alpha)?.checked_add(self.index[&lc] as u128)?;
            end = end.checked_mul(alpha)?.checked_add(self.index[&uc] as u128)?;

            if end - start > num_splits as u128 {
                // Zero indexing: position i means i + 1 digits.
                return Some((start, end, i + 1));
            }
        }
        unreachable!()
    }

    /// Convert a base-`alphabet` integer back into a string of exactly
    /// `len` digits.
    fn int_to_string(&self, mut point: u128, len: usize) -> String {
        let alpha = self.sorted_alphabet.len() as u128;
        let mut digits = Vec::with_capacity(len);
        for _ in 0..len {
            digits.push(self.sorted_alphabet[(point % alpha) as usize]);
            point /= alpha;
        }
        // Assembled via division, least significant digit first.
        digits.iter().rev().collect()
    }

    /// Whether the bounds denote the same point once the shorter one is
    /// padded with minimal digits; such a range contains nothing.
    fn is_equal_with_padding(&self, lower: &str, upper: Option<&str>) -> bool {
        let Some(upper) = upper else {
            return false;
        };
        let min_char = self.sorted_alphabet[0];
        let lower: Vec<char> = lower.chars().collect();
        let upper: Vec<char> = upper.chars().collect();
        for i in 0..lower.len().max(upper.len()) {
            let lc = lower.get(i).copied().unwrap_or(min_char);
            let uc = upper.get(i).copied().unwrap_or(min_char);
            if lc != uc {
                return false;
            }
        }
        true
    }
}

/// Divide the whole prefix span into up to `workers` disjoint ranges whose
/// union is the span, ascending. Absent skew, each worker's share is an
/// approximately equal slice of the namespace.
pub(crate) fn partition(splitter: &mut RangeSplitter, workers: usize) -> Result<Vec<ListingRange>> {
    if workers == 0 {
        return Err(
            Error::new(ErrorKind::ConfigInvalid, "worker count must be at least one")
                .with_operation("partition"),
        );
    }
    if workers == 1 {
        return Ok(vec![ListingRange::new("", None)]);
    }

    let points = splitter.split_range("", None, workers - 1)?;
    let mut ranges = Vec::with_capacity(points.len() + 1);
    let mut lower = String::new();
    for point in points {
        ranges.push(ListingRange::new(lower.clone(), Some(point.clone())));
        lower = point;
    }
    ranges.push(ListingRange::new(lower, None));
    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn splitter() -> RangeSplitter {
        RangeSplitter::new(DEFAULT_ALPHABET).unwrap()
    }

    #[test]
    fn test_empty_alphabet_is_rejected() {
        let err = RangeSplitter::new("").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_zero_splits_is_rejected() {
        let err = splitter().split_range("a", Some("b"), 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_inverted_and_equal_ranges_yield_nothing() {
        let mut s = splitter();
        assert_eq!(s.split_range("b", Some("a"), 1).unwrap(), Vec::<String>::new());
        assert_eq!(s.split_range("a", Some("a"), 1).unwrap(), Vec::<String>::new());
        // "ab" and "ab" + minimal padding denote the same point.
        assert_eq!(
            s.split_range("ab", Some("ab\u{0}\u{0}"), 1).unwrap(),
            Vec::<String>::new()
        );
    }

    #[test]
    fn test_single_digit_midpoint() {
        let mut s = splitter();
        assert_eq!(s.split_range("1", Some("3"), 1).unwrap(), vec!["2"]);
        assert_eq!(s.split_range("", Some("8"), 1).unwrap(), vec!["4"]);
    }

    #[test]
    fn test_unbounded_midpoint() {
        let mut s = splitter();
        // 'x' to the end of the namespace; the midpoint lands between
        // 'x' and 'z'.
        assert_eq!(s.split_range("x", None, 1).unwrap(), vec!["y"]);
    }

    #[test]
    fn test_split_points_lie_strictly_inside() {
        let mut s = splitter();
        for splits in [1, 3, 7] {
            let points = s.split_range("d", Some("t"), splits).unwrap();
            assert!(!points.is_empty());
            assert!(points.len() <= splits);
            let mut previous = "d".to_string();
            for p in &points {
                assert!(p.as_str() > previous.as_str(), "{p} <= {previous}");
                assert!(p.as_str() < "t");
                previous = p.clone();
            }
        }
    }

    #[test]
    fn test_shared_prefix_splits() {
        let mut s = splitter();
        let points = s
            .split_range("data/train/0000", Some("data/train/9999"), 3)
            .unwrap();
        assert!(!points.is_empty());
        for p in &points {
            assert!(p.starts_with("data/train/"));
            assert!(p.as_str() > "data/train/0000");
            assert!(p.as_str() < "data/train/9999");
        }
    }

    #[test]
    fn test_alphabet_learns_new_characters() {
        let mut s = RangeSplitter::new("ab").unwrap();
        // 'x' and 'z' are outside the initial alphabet; splitting still
        // works because the bounds' characters are merged in first. Over
        // the learned alphabet {a, b, x, z} the interval (x, z) needs two
        // digits, and its midpoint is "xx".
        let points = s.split_range("x", Some("z"), 1).unwrap();
        assert_eq!(points, vec!["xx"]);
    }

    #[test]
    fn test_successor_orders_between_names() {
        let s = successor("abc");
        assert!(s.as_str() > "abc");
        assert!(s.as_str() < "abd");
        assert!(s.as_str() < "abca");
    }

    #[test]
    fn test_partition_zero_workers() {
        let err = partition(&mut splitter(), 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_partition_covers_span_disjointly() {
        for workers in [1, 2, 4, 8, 16] {
            let ranges = partition(&mut splitter(), workers).unwrap();
            assert!(!ranges.is_empty());
            assert!(ranges.len() <= workers);

            // Half-open coverage: starts at the span's start, ends
            // unbounded, and each range begins where the previous ended.
            assert_eq!(ranges.first().unwrap().lower, "");
            assert_eq!(ranges.last().unwrap().upper, None);
            for pair in ranges.windows(2) {
                assert_eq!(pair[0].upper.as_deref(), Some(pair[1].lower.as_str()));
                assert!(!pair[0].is_empty());
            }
        }
    }

    #[test]
    fn test_estimated_span_ranks_ranges() {
        let mut s = splitter();
        let whole = s.estimated_span(&ListingRange::new("", None));
        let half = s.estimated_span(&ListingRange::new("m", None));
        let sliver = s.estimated_span(&ListingRange::new("m", Some("n".to_string())));
        let empty = s.estimated_span(&ListingRange::new("n", Some("n".to_string())));

        assert!(whole > half);
        assert!(half > sliver);
        assert!(sliver > empty);
        assert_eq!(empty, 0.0);
    }
}
