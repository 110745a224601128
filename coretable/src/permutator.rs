//! Holds the [Permutator] struct, which allows one to define a logical permutation of the rows of a table

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::{datavalues::CellValue, error::Error};

/// Direction of a sort
#[derive(
    Debug, Display, EnumString, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SortOrder {
    /// Smallest value first
    #[default]
    Asc,
    /// Largest value first
    Desc,
}

/// Allows one to define a logical permutation of content of index-based data structures
///
/// All sorts are stable: entries with equal keys keep their relative order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permutator {
    sort_vec: Vec<usize>,
}

impl Permutator {
    /// Create a [`Permutator`] that sorts rows lexicographically by the given columns.
    ///
    /// Missing cells sort last regardless of the [SortOrder].
    /// Returns [`Error::InvalidTransform`] if the given columns differ in length.
    pub fn sort_from_columns(columns: &[(&[CellValue], SortOrder)]) -> Result<Permutator, Error> {
        let len = match columns.first() {
            Some((first, _)) => {
                let len = first.len();
                if columns.iter().any(|(column, _)| column.len() != len) {
                    return Err(Error::InvalidTransform(format!(
                        "sort keys have different lengths: {:?}",
                        columns
                            .iter()
                            .map(|(column, _)| column.len())
                            .collect::<Vec<_>>()
                    )));
                }
                len
            }
            None => 0,
        };

        let mut vec = (0..len).collect::<Vec<usize>>();
        vec.sort_by(|&a, &b| Self::compare_rows(a, b, columns));
        Ok(Permutator { sort_vec: vec })
    }

    fn compare_rows(a: usize, b: usize, columns: &[(&[CellValue], SortOrder)]) -> Ordering {
        columns
            .iter()
            .map(|(column, order)| {
                let (left, right) = (&column[a], &column[b]);
                match (left.is_missing(), right.is_missing(), order) {
                    (false, false, SortOrder::Desc) => right.sort_cmp(left),
                    _ => left.sort_cmp(right),
                }
            })
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }

    /// Returns the vector which contains the sorted indices
    pub fn sort_vec(&self) -> &[usize] {
        &self.sort_vec
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::datavalues::MissingReason;
    use quickcheck_macros::quickcheck;
    use test_log::test;

    #[quickcheck]
    fn sort_is_stable(keys: Vec<u8>) -> bool {
        let keys = keys.into_iter().map(|key| key % 4).collect::<Vec<_>>();
        let cells = keys
            .iter()
            .map(|&key| CellValue::Number(f64::from(key)))
            .collect::<Vec<_>>();

        let permutator = Permutator::sort_from_columns(&[(cells.as_slice(), SortOrder::Asc)])
            .expect("single column");
        let sorted = permutator.sort_vec();

        sorted
            .windows(2)
            .all(|pair| keys[pair[0]] < keys[pair[1]] || (keys[pair[0]] == keys[pair[1]] && pair[0] < pair[1]))
    }

    #[test]
    fn sort_multiple_columns() {
        let entities: Vec<CellValue> = vec!["b".into(), "a".into(), "b".into(), "a".into()];
        let years = vec![
            CellValue::Number(2000.0),
            CellValue::Number(2001.0),
            CellValue::Number(2001.0),
            CellValue::Number(2000.0),
        ];

        let permutator = Permutator::sort_from_columns(&[
            (entities.as_slice(), SortOrder::Asc),
            (years.as_slice(), SortOrder::Desc),
        ])
        .expect("same length");
        assert_eq!(permutator.sort_vec(), &[1, 3, 2, 0]);
    }

    #[test]
    fn missing_sorts_last_in_both_directions() {
        let values = vec![
            CellValue::Missing(MissingReason::BlankButShouldBeNumber),
            CellValue::Number(1.0),
            CellValue::Number(2.0),
        ];

        let asc = Permutator::sort_from_columns(&[(values.as_slice(), SortOrder::Asc)]).expect("ok");
        let desc = Permutator::sort_from_columns(&[(values.as_slice(), SortOrder::Desc)]).expect("ok");
        assert_eq!(asc.sort_vec(), &[1, 2, 0]);
        assert_eq!(desc.sort_vec(), &[2, 1, 0]);
    }

    #[test]
    fn keys_of_different_length() {
        let short = vec![CellValue::Number(1.0)];
        let long = vec![CellValue::Number(1.0), CellValue::Number(2.0)];

        let result = Permutator::sort_from_columns(&[
            (short.as_slice(), SortOrder::Asc),
            (long.as_slice(), SortOrder::Asc),
        ]);
        assert!(matches!(result, Err(Error::InvalidTransform(_))));
    }
}
