//! This module defines [EntityTimeIndex], the lookup structure answering
//! entity- and time-scoped queries on a table.

use hashbrown::HashMap;

use crate::{
    datavalues::{CellValue, Time},
    tolerance::ToleranceMatcher,
};

/// Rows of a single entity.
#[derive(Debug, Clone, Default)]
struct EntityRows {
    /// Row positions; rows with a valid time come first, sorted by time ascending,
    /// followed by rows without valid time in original order.
    rows: Vec<usize>,
    /// Times of the leading timed rows, parallel to `rows[..times.len()]`.
    times: Vec<Time>,
}

/// Index from entity to its rows, and from (entity, time) to a row.
///
/// The rows of an entity are always enumerated in time order,
/// regardless of the order of the rows in the table.
/// Ties between rows with equal time keep their original relative order.
#[derive(Debug, Clone, Default)]
pub struct EntityTimeIndex {
    entity_names: Vec<String>,
    entities: HashMap<String, EntityRows>,
}

impl EntityTimeIndex {
    /// Build the index from the cells of the entity column and, if present, the time column.
    ///
    /// Rows with a missing entity are not indexed.
    pub fn build(entities: &[CellValue], times: Option<&[CellValue]>) -> Self {
        let mut entity_names = Vec::new();
        let mut grouped: HashMap<String, Vec<usize>> = HashMap::new();
        let mut skipped = 0usize;

        for (row, entity) in entities.iter().enumerate() {
            let Some(name) = entity.group_key() else {
                skipped += 1;
                continue;
            };
            grouped
                .entry_ref(name.as_str())
                .or_insert_with(|| {
                    entity_names.push(name.clone());
                    Vec::new()
                })
                .push(row);
        }

        if skipped > 0 {
            log::debug!("{skipped} rows without entity are not indexed");
        }

        let entities = grouped
            .into_iter()
            .map(|(name, rows)| {
                let rows = match times {
                    Some(times) => Self::sort_by_time(rows, times),
                    None => EntityRows {
                        rows,
                        times: Vec::new(),
                    },
                };
                (name, rows)
            })
            .collect();

        Self {
            entity_names,
            entities,
        }
    }

    fn sort_by_time(rows: Vec<usize>, times: &[CellValue]) -> EntityRows {
        let (mut timed, untimed): (Vec<_>, Vec<_>) = rows
            .into_iter()
            .map(|row| (row, times[row].as_time()))
            .partition(|(_, time)| time.is_some());

        // stable, so rows with equal times keep their order
        timed.sort_by_key(|&(_, time)| time);

        EntityRows {
            times: timed.iter().filter_map(|&(_, time)| time).collect(),
            rows: timed
                .into_iter()
                .chain(untimed)
                .map(|(row, _)| row)
                .collect(),
        }
    }

    /// Names of all indexed entities, in order of first appearance.
    pub fn entity_names(&self) -> &[String] {
        &self.entity_names
    }

    /// Number of distinct entities.
    pub fn num_entities(&self) -> usize {
        self.entity_names.len()
    }

    /// Return `true` if the entity has at least one row.
    pub fn contains_entity(&self, entity_name: &str) -> bool {
        self.entities.contains_key(entity_name)
    }

    /// Row positions of the given entity, in time order.
    ///
    /// Unknown entities have no rows.
    pub fn rows_for_entity(&self, entity_name: &str) -> &[usize] {
        self.entities
            .get(entity_name)
            .map(|entity| entity.rows.as_slice())
            .unwrap_or_default()
    }

    /// Valid times of the given entity, ascending.
    pub fn times_for_entity(&self, entity_name: &str) -> &[Time] {
        self.entities
            .get(entity_name)
            .map(|entity| entity.times.as_slice())
            .unwrap_or_default()
    }

    /// Row holding exactly the given (entity, time) pair.
    ///
    /// If several rows share the pair, the first one in table order is returned.
    pub fn row_at(&self, entity_name: &str, time: Time) -> Option<usize> {
        let entity = self.entities.get(entity_name)?;
        let position = entity.times.partition_point(|&other| other < time);

        (entity.times.get(position) == Some(&time)).then(|| entity.rows[position])
    }

    /// Row of the given entity closest to `time`, as resolved by `matcher`.
    pub fn closest_row(&self, entity_name: &str, time: Time, matcher: &ToleranceMatcher) -> Option<usize> {
        let entity = self.entities.get(entity_name)?;
        matcher
            .find(&entity.times, time)
            .map(|position| entity.rows[position])
    }

    /// Iterate over all entities and their rows, in order of first appearance.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.entity_names
            .iter()
            .map(|name| (name.as_str(), self.rows_for_entity(name)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::datavalues::MissingReason;
    use test_log::test;

    fn index() -> EntityTimeIndex {
        let entities: Vec<CellValue> = vec![
            "France".into(),
            "Germany".into(),
            "France".into(),
            CellValue::Missing(MissingReason::BlankButShouldBeString),
            "France".into(),
            "France".into(),
        ];
        let times = vec![
            CellValue::Number(2010.0),
            CellValue::Number(2000.0),
            CellValue::Number(2000.0),
            CellValue::Number(2000.0),
            CellValue::Missing(MissingReason::BlankButShouldBeNumber),
            CellValue::Number(2005.0),
        ];
        EntityTimeIndex::build(&entities, Some(&times))
    }

    #[test]
    fn rows_in_time_order() {
        let index = index();
        assert_eq!(index.entity_names(), &["France", "Germany"]);
        assert_eq!(index.rows_for_entity("France"), &[2, 5, 0, 4]);
        assert_eq!(index.times_for_entity("France"), &[2000, 2005, 2010]);
        assert_eq!(index.rows_for_entity("Germany"), &[1]);
    }

    #[test]
    fn unknown_entity_is_empty() {
        let index = index();
        assert!(index.rows_for_entity("Atlantis").is_empty());
        assert_eq!(index.row_at("Atlantis", 2000), None);
        assert!(!index.contains_entity("Atlantis"));
    }

    #[test]
    fn exact_lookup() {
        let index = index();
        assert_eq!(index.row_at("France", 2005), Some(5));
        assert_eq!(index.row_at("France", 2006), None);
        assert_eq!(index.row_at("Germany", 2000), Some(1));
    }

    #[test]
    fn closest_lookup() {
        let index = index();
        let matcher = ToleranceMatcher::new(3);
        assert_eq!(index.closest_row("France", 2008, &matcher), Some(0));
        assert_eq!(index.closest_row("Germany", 2004, &matcher), None);
    }

    #[test]
    fn without_time_column() {
        let entities: Vec<CellValue> = vec!["a".into(), "b".into(), "a".into()];
        let index = EntityTimeIndex::build(&entities, None);
        assert_eq!(index.rows_for_entity("a"), &[0, 2]);
        assert_eq!(index.row_at("a", 0), None);
    }
}
