//! This module implements the nearest-time lookup used when entities
//! report observations at different times.
//!
//! Given the time-sorted observations of an entity and a requested time `T`,
//! the [ToleranceMatcher] looks at the nearest observation at or before `T`
//! and the nearest observation at or after `T`, and picks the one closer to `T`.
//! If both are equally far away, the earlier one wins.
//! Candidates further away than the tolerance are rejected.

use hashbrown::HashSet;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::datavalues::{CellValue, MissingReason, Time};

/// Direction in which an observation may be substituted for a missing one.
#[derive(
    Debug, Display, EnumString, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ToleranceStrategy {
    /// Use earlier or later observations, whichever is closer
    #[default]
    Closest,
    /// Only use earlier observations
    Backwards,
    /// Only use later observations
    Forwards,
}

/// Resolves a requested time to the closest available time within a tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToleranceMatcher {
    backwards: u64,
    forwards: u64,
}

impl ToleranceMatcher {
    /// Create a [ToleranceMatcher] that searches `tolerance` time units in both directions.
    ///
    /// Negative tolerances are treated as zero, i.e. only exact matches are accepted.
    pub fn new(tolerance: Time) -> Self {
        Self::with_strategy(tolerance, ToleranceStrategy::Closest)
    }

    /// Create a [ToleranceMatcher] that searches only in the directions allowed by `strategy`.
    pub fn with_strategy(tolerance: Time, strategy: ToleranceStrategy) -> Self {
        let tolerance = u64::try_from(tolerance).unwrap_or(0);
        let (backwards, forwards) = match strategy {
            ToleranceStrategy::Closest => (tolerance, tolerance),
            ToleranceStrategy::Backwards => (tolerance, 0),
            ToleranceStrategy::Forwards => (0, tolerance),
        };

        Self {
            backwards,
            forwards,
        }
    }

    /// Create a [ToleranceMatcher] that only accepts exact matches.
    pub fn exact() -> Self {
        Self::new(0)
    }

    /// Return the position in `sorted_times` of the time closest to `target`,
    /// or `None` if no time lies within the tolerance.
    ///
    /// `sorted_times` must be sorted ascending.
    /// On a tie between an earlier and a later time, the earlier one is returned.
    pub fn find(&self, sorted_times: &[Time], target: Time) -> Option<usize> {
        debug_assert!(sorted_times.windows(2).all(|pair| pair[0] <= pair[1]));

        let insertion = sorted_times.partition_point(|&time| time < target);

        let later = sorted_times
            .get(insertion)
            .map(|&time| (insertion, time.abs_diff(target)))
            .filter(|&(_, distance)| distance <= self.forwards);
        let earlier = insertion
            .checked_sub(1)
            .map(|index| (index, sorted_times[index].abs_diff(target)))
            .filter(|&(_, distance)| distance <= self.backwards);

        match (earlier, later) {
            (Some(earlier), Some(later)) if later.1 < earlier.1 => Some(later.0),
            (Some(earlier), _) => Some(earlier.0),
            (None, later) => later.map(|(index, _)| index),
        }
    }

    /// Fill the missing cells of one entity's observations from nearby observations.
    ///
    /// `values` and `times` describe the rows of a single entity, sorted by time.
    /// Returns, for every row, the resolved cell and the time of the observation it was taken from.
    /// Rows without an observation within the tolerance become
    /// [MissingReason::NoValueWithinTolerance].
    pub fn fill(&self, values: &[CellValue], times: &[Option<Time>]) -> Vec<(CellValue, Option<Time>)> {
        debug_assert_eq!(values.len(), times.len());

        let available = values
            .iter()
            .zip(times)
            .enumerate()
            .filter_map(|(index, (value, time))| match (value.is_present(), time) {
                (true, Some(time)) => Some((index, *time)),
                _ => None,
            })
            .collect::<Vec<_>>();
        let available_times = available.iter().map(|&(_, time)| time).collect::<Vec<_>>();

        values
            .iter()
            .zip(times)
            .map(|(value, time)| match (value.is_present(), time) {
                (true, _) => (value.clone(), *time),
                (false, Some(time)) => match self.find(&available_times, *time) {
                    Some(position) => {
                        let (source, source_time) = available[position];
                        (values[source].clone(), Some(source_time))
                    }
                    None => (
                        CellValue::Missing(MissingReason::NoValueWithinTolerance),
                        None,
                    ),
                },
                (false, None) => (
                    CellValue::Missing(MissingReason::NoValueWithinTolerance),
                    None,
                ),
            })
            .collect()
    }
}

/// Return the position in `sorted_times` of the time closest to `target` within `tolerance`.
///
/// See [ToleranceMatcher::find].
pub fn find_closest_time_index(sorted_times: &[Time], target: Time, tolerance: Time) -> Option<usize> {
    ToleranceMatcher::new(tolerance).find(sorted_times, target)
}

/// Pair up the times of two series so that each pair is as close as possible.
///
/// Every time of `sorted_a` proposes its closest time in `sorted_b` within `max_distance`.
/// Proposals are accepted by increasing distance, and each time is used in at most one pair.
/// Returns the pairs sorted by the time of `sorted_a`.
pub fn closest_time_pairs(sorted_a: &[Time], sorted_b: &[Time], max_distance: Time) -> Vec<(Time, Time)> {
    let matcher = ToleranceMatcher::new(max_distance);

    let proposals = sorted_a
        .iter()
        .filter_map(|&a| matcher.find(sorted_b, a).map(|position| (a, sorted_b[position])))
        .sorted_by_key(|&(a, b)| a.abs_diff(b))
        .collect::<Vec<_>>();

    let mut used_a = HashSet::new();
    let mut used_b = HashSet::new();
    let mut pairs = Vec::new();
    for (a, b) in proposals {
        if !used_a.contains(&a) && !used_b.contains(&b) {
            used_a.insert(a);
            used_b.insert(b);
            pairs.push((a, b));
        }
    }
    pairs.sort_unstable();
    pairs
}
