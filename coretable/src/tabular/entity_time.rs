//! Entity- and time-scoped operations on [Table].
//!
//! All operations in this module need an entity column; the ones dealing with time
//! also need a time column. Both are resolved when the table is built, see
//! [TableOptions][super::options::TableOptions].

use hashbrown::HashSet;
use itertools::Itertools;
use serde::Serialize;

use crate::{
    columnar::column_type::ColumnType,
    datavalues::{CellValue, MissingReason, Time},
    error::Error,
    permutator::SortOrder,
    tolerance::ToleranceMatcher,
};

use super::{
    options::{ENTITY_CODE_SLUG, ENTITY_ID_SLUG},
    provenance::TransformType,
    table::Table,
};

/// An entity of a table with its optional code and numeric id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Entity {
    /// Name of the entity, as found in the entity column
    pub name: String,
    /// Short code, e.g. an ISO country code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Numeric identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

fn describe_bound(bound: Option<Time>) -> String {
    bound.map_or_else(|| "..".to_string(), |time| time.to_string())
}

impl Table {
    /// Names of all entities, in order of first appearance.
    ///
    /// Tables without entity column have no entities.
    pub fn available_entity_names(&self) -> &[String] {
        match self.index() {
            Ok(index) => index.entity_names(),
            Err(_) => &[],
        }
    }

    /// All entities with their code and id, taken from the `entityCode` and `entityId` columns if present.
    pub fn available_entities(&self) -> Vec<Entity> {
        let Ok(index) = self.index() else {
            return Vec::new();
        };
        let codes = self.get_values(ENTITY_CODE_SLUG).ok();
        let ids = self.get_values(ENTITY_ID_SLUG).ok();

        index
            .iter()
            .map(|(name, rows)| Entity {
                name: name.to_string(),
                code: codes
                    .as_ref()
                    .and_then(|codes| rows.iter().find_map(|&row| codes[row].group_key())),
                id: ids
                    .as_ref()
                    .and_then(|ids| rows.iter().find_map(|&row| ids[row].as_time())),
            })
            .collect()
    }

    /// Rows of the given entity, in time order; empty if the entity is unknown.
    pub fn rows_for_entity(&self, entity_name: &str) -> &[usize] {
        match self.index() {
            Ok(index) => index.rows_for_entity(entity_name),
            Err(_) => &[],
        }
    }

    /// Row holding exactly the given entity and time.
    pub fn row_at(&self, entity_name: &str, time: Time) -> Option<usize> {
        self.index().ok()?.row_at(entity_name, time)
    }

    /// Resolve the value of column `slug` for an entity at a requested time.
    ///
    /// If there is no valid value at exactly that time, the closest valid value within the
    /// tolerance is used; the tolerance defaults to the one declared for the column.
    /// Returns [MissingReason::NoValueWithinTolerance] if there is none.
    pub fn value_for_entity_at(
        &self,
        entity_name: &str,
        slug: &str,
        time: Time,
        tolerance: Option<Time>,
    ) -> Result<CellValue, Error> {
        let column = self.get(slug)?;
        let values = column.values();
        let times = self.get_values(self.require_time_slug()?)?;
        let tolerance = tolerance.or(column.def().tolerance).unwrap_or(0);
        let strategy = column.def().tolerance_strategy.unwrap_or_default();

        let (rows, row_times): (Vec<usize>, Vec<Time>) = self
            .index()?
            .rows_for_entity(entity_name)
            .iter()
            .filter(|&&row| values[row].is_present())
            .filter_map(|&row| Some((row, times[row].as_time()?)))
            .unzip();

        Ok(
            match ToleranceMatcher::with_strategy(tolerance, strategy).find(&row_times, time) {
                Some(position) => values[rows[position]].clone(),
                None => CellValue::Missing(MissingReason::NoValueWithinTolerance),
            },
        )
    }

    fn valid_times(&self) -> Vec<Time> {
        self.time_slug()
            .and_then(|slug| self.get_values(slug).ok())
            .map(|times| times.iter().filter_map(CellValue::as_time).collect())
            .unwrap_or_default()
    }

    /// All distinct times, ascending; empty for tables without time column.
    pub fn all_times(&self) -> Vec<Time> {
        self.valid_times()
            .into_iter()
            .sorted_unstable()
            .dedup()
            .collect()
    }

    /// Earliest time of the table.
    pub fn min_time(&self) -> Option<Time> {
        self.valid_times().into_iter().min()
    }

    /// Latest time of the table.
    pub fn max_time(&self) -> Option<Time> {
        self.valid_times().into_iter().max()
    }

    /// Keep only the rows of the given entities, in their original order.
    pub fn filter_by_entity_names(&self, entity_names: &[&str]) -> Result<Table, Error> {
        let entity_slug = self.require_entity_slug()?;
        let keep = self.rows_where(entity_slug, |entity| {
            entity
                .group_key()
                .is_some_and(|key| entity_names.contains(&key.as_str()))
        })?;

        Ok(self.take_rows(
            &keep,
            TransformType::FilterRows,
            format!("keep entities {}", entity_names.join(", ")),
        ))
    }

    /// Keep only the rows whose time lies within `start..=end`, sorted by time.
    ///
    /// `None` leaves the corresponding side of the range open.
    /// Rows with equal time keep their relative order.
    pub fn filter_by_time_range(&self, start: Option<Time>, end: Option<Time>) -> Result<Table, Error> {
        let times = self.get_values(self.require_time_slug()?)?;

        let keep = times
            .iter()
            .enumerate()
            .filter_map(|(row, time)| {
                let time = time.as_time()?;
                let within = start.map_or(true, |start| time >= start)
                    && end.map_or(true, |end| time <= end);
                within.then_some((row, time))
            })
            .sorted_by_key(|&(_, time)| time)
            .map(|(row, _)| row)
            .collect::<Vec<_>>();

        Ok(self.take_rows(
            &keep,
            TransformType::FilterRows,
            format!(
                "keep times {} to {}",
                describe_bound(start),
                describe_bound(end)
            ),
        ))
    }

    /// For every entity and every target time, keep the row closest to the target
    /// within `tolerance`. Rows stay in their original order.
    pub fn filter_by_target_times(&self, targets: &[Time], tolerance: Time) -> Result<Table, Error> {
        self.require_time_slug()?;
        let index = self.index()?;
        let matcher = ToleranceMatcher::new(tolerance);

        let mut matching = HashSet::new();
        for entity_name in index.entity_names() {
            matching.extend(
                targets
                    .iter()
                    .filter_map(|&target| index.closest_row(entity_name, target, &matcher)),
            );
        }
        let keep = (0..self.num_rows())
            .filter(|row| matching.contains(row))
            .collect::<Vec<_>>();

        Ok(self.take_rows(
            &keep,
            TransformType::FilterRows,
            format!(
                "keep the closest row to each of {} within {tolerance} for each entity",
                targets.iter().join(", ")
            ),
        ))
    }

    /// Drop rows with a missing cell in column `slug`.
    pub fn drop_rows_with_missing_values_for_column(&self, slug: &str) -> Result<Table, Error> {
        let keep = self.rows_where(slug, CellValue::is_present)?;
        Ok(self.take_rows(
            &keep,
            TransformType::FilterRows,
            format!("drop rows with missing values in `{slug}`"),
        ))
    }

    fn rows_by_presence<F>(&self, slugs: &[&str], keep_row: F) -> Result<Vec<usize>, Error>
    where
        F: Fn(&[bool]) -> bool,
    {
        let columns = slugs
            .iter()
            .map(|slug| self.get_values(slug))
            .collect::<Result<Vec<_>, _>>()?;

        let mut present = Vec::with_capacity(columns.len());
        Ok((0..self.num_rows())
            .filter(|&row| {
                present.clear();
                present.extend(columns.iter().map(|values| values[row].is_present()));
                keep_row(&present)
            })
            .collect())
    }

    /// Drop rows that have a missing cell in any of the given columns.
    pub fn drop_rows_with_missing_values_for_any_column(&self, slugs: &[&str]) -> Result<Table, Error> {
        let keep = self.rows_by_presence(slugs, |present| present.iter().all(|&present| present))?;
        Ok(self.take_rows(
            &keep,
            TransformType::FilterRows,
            format!("drop rows with missing values in any of {}", slugs.join(", ")),
        ))
    }

    /// Drop rows whose cells are missing in every one of the given columns.
    pub fn drop_rows_with_missing_values_for_all_columns(&self, slugs: &[&str]) -> Result<Table, Error> {
        let keep = self.rows_by_presence(slugs, |present| present.iter().any(|&present| present))?;
        Ok(self.take_rows(
            &keep,
            TransformType::FilterRows,
            format!("drop rows with missing values in all of {}", slugs.join(", ")),
        ))
    }

    /// Drop all rows of entities that have no valid value at all in one of the given columns.
    pub fn drop_entities_without_data_in_some_column(&self, slugs: &[&str]) -> Result<Table, Error> {
        let entities = self.entities_with(slugs)?;
        let entities = entities.iter().map(String::as_str).collect::<Vec<_>>();

        let keep = if slugs.is_empty() {
            (0..self.num_rows()).collect()
        } else {
            self.rows_where(self.require_entity_slug()?, |entity| {
                entity
                    .group_key()
                    .is_some_and(|key| entities.contains(&key.as_str()))
            })?
        };

        Ok(self.take_rows(
            &keep,
            TransformType::FilterRows,
            format!("drop entities without data in some of {}", slugs.join(", ")),
        ))
    }

    /// Keep only the earliest and the latest row of every entity.
    pub fn keep_min_time_and_max_time_for_each_entity_only(&self) -> Result<Table, Error> {
        self.require_time_slug()?;
        let index = self.index()?;

        let mut matching = HashSet::new();
        for (entity_name, rows) in index.iter() {
            let times = index.times_for_entity(entity_name);
            let (Some(_), Some(&max)) = (times.first(), times.last()) else {
                continue;
            };
            matching.insert(rows[0]);
            matching.insert(rows[times.partition_point(|&time| time < max)]);
        }
        let keep = (0..self.num_rows())
            .filter(|row| matching.contains(row))
            .collect::<Vec<_>>();

        Ok(self.take_rows(
            &keep,
            TransformType::FilterRows,
            "keep min time and max time rows only for each entity".to_string(),
        ))
    }

    /// Valid value of column `slug` at the latest time of the entity.
    pub fn latest_value_for_entity(&self, entity_name: &str, slug: &str) -> Result<Option<CellValue>, Error> {
        let values = self.get_values(slug)?;
        let index = self.index()?;

        let rows = index.rows_for_entity(entity_name);
        let timed = match self.time_slug() {
            Some(_) => &rows[..index.times_for_entity(entity_name).len()],
            None => rows,
        };

        Ok(timed
            .iter()
            .rev()
            .map(|&row| &values[row])
            .find(|value| value.is_present())
            .cloned())
    }

    /// For each of the given entities, the row closest to `time` within `tolerance`.
    ///
    /// Entities without such a row are skipped.
    pub fn closest_row_for_each_entity(
        &self,
        entity_names: &[&str],
        time: Time,
        tolerance: Time,
    ) -> Result<Vec<usize>, Error> {
        self.require_time_slug()?;
        let index = self.index()?;
        let matcher = ToleranceMatcher::new(tolerance);

        Ok(entity_names
            .iter()
            .filter_map(|entity_name| index.closest_row(entity_name, time, &matcher))
            .collect())
    }

    /// Entities that have at least one valid value in each of the given columns.
    pub fn entities_with(&self, slugs: &[&str]) -> Result<Vec<String>, Error> {
        let columns = slugs
            .iter()
            .map(|slug| self.get_values(slug))
            .collect::<Result<Vec<_>, _>>()?;
        if columns.is_empty() {
            return Ok(Vec::new());
        }

        Ok(self
            .index()?
            .iter()
            .filter(|(_, rows)| {
                columns
                    .iter()
                    .all(|values| rows.iter().any(|&row| values[row].is_present()))
            })
            .map(|(entity_name, _)| entity_name.to_string())
            .collect())
    }

    /// Distinct times, ascending, at which any of the given columns has a valid value.
    pub fn times_uniq_sorted_asc(&self, slugs: &[&str]) -> Result<Vec<Time>, Error> {
        let times = self.get_values(self.require_time_slug()?)?;
        let rows = self.rows_by_presence(slugs, |present| present.iter().any(|&present| present))?;

        Ok(rows
            .into_iter()
            .filter_map(|row| times[row].as_time())
            .sorted_unstable()
            .dedup()
            .collect())
    }

    /// Earliest and latest time at which any of the given columns has a valid value.
    pub fn time_domain_for(&self, slugs: &[&str]) -> Result<(Option<Time>, Option<Time>), Error> {
        let times = self.times_uniq_sorted_asc(slugs)?;
        Ok((times.first().copied(), times.last().copied()))
    }

    /// Add placeholder rows so that every entity has a row for every time of the table.
    ///
    /// Placeholder rows carry the entity, its code and id, and the time;
    /// all other cells are [MissingReason::MissingValuePlaceholder].
    /// The result is sorted by entity and time.
    pub fn complete_entity_time(&self) -> Result<Table, Error> {
        let entity_slug = self.require_entity_slug()?;
        let time_slug = self.require_time_slug()?;
        let index = self.index()?;
        let all_times = self.all_times();

        let mut placeholders: Vec<(usize, Time)> = Vec::new();
        for (entity_name, rows) in index.iter() {
            let present = index.times_for_entity(entity_name);
            placeholders.extend(
                all_times
                    .iter()
                    .filter(|time| present.binary_search(time).is_err())
                    .map(|&time| (rows[0], time)),
            );
        }
        log::trace!(
            "completing {} entities over {} times with {} rows",
            index.num_entities(),
            all_times.len(),
            placeholders.len()
        );

        let num_rows = self.num_rows() + placeholders.len();
        let store = self.column_store().rebuild(num_rows, |column| {
            let values = column.values();
            let copies_entity = column.slug() == entity_slug
                || matches!(
                    column.column_type(),
                    ColumnType::EntityName | ColumnType::EntityCode | ColumnType::EntityId
                );

            values
                .iter()
                .cloned()
                .chain(placeholders.iter().map(|&(template, time)| {
                    if column.slug() == time_slug {
                        CellValue::from(time)
                    } else if copies_entity {
                        values[template].clone()
                    } else {
                        CellValue::Missing(MissingReason::MissingValuePlaceholder)
                    }
                }))
                .collect()
        })?;

        let completed = self.derive(
            store,
            TransformType::AppendRows,
            format!("add {} placeholder rows", placeholders.len()),
        );
        completed.sort_by_columns(&[(entity_slug, SortOrder::Asc), (time_slug, SortOrder::Asc)])
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    fn table() -> Table {
        Table::from_delimited(
            "entityName,entityCode,year,gdp,pop\n\
             France,FRA,2010,3,\n\
             Germany,DEU,2000,10,80\n\
             France,FRA,2000,1,60\n\
             Italy,ITA,2005,,\n\
             France,FRA,2005,,62\n",
        )
        .expect("valid input")
    }

    fn numbers(table: &Table, slug: &str) -> Vec<Option<f64>> {
        table
            .get_values(slug)
            .expect("exists")
            .iter()
            .map(CellValue::as_number)
            .collect()
    }

    #[test]
    fn entities() {
        let table = table();
        assert_eq!(table.available_entity_names(), &["France", "Germany", "Italy"]);
        assert_eq!(
            table.available_entities()[1],
            Entity {
                name: "Germany".to_string(),
                code: Some("DEU".to_string()),
                id: None
            }
        );
        assert_eq!(table.rows_for_entity("France"), &[2, 4, 0]);
        assert!(table.rows_for_entity("Spain").is_empty());
        assert_eq!(table.row_at("France", 2005), Some(4));
        assert_eq!(table.row_at("France", 2004), None);
    }

    #[test]
    fn times() {
        let table = table();
        assert_eq!(table.all_times(), vec![2000, 2005, 2010]);
        assert_eq!(table.min_time(), Some(2000));
        assert_eq!(table.max_time(), Some(2010));
        assert_eq!(table.times_uniq_sorted_asc(&["pop"]).expect("ok"), vec![2000, 2005]);
        assert_eq!(
            table.time_domain_for(&["gdp"]).expect("ok"),
            (Some(2000), Some(2010))
        );
        assert_eq!(table.time_domain_for(&[]).expect("ok"), (None, None));
    }

    #[test]
    fn tolerance_lookup() {
        let table = Table::from_delimited("entity,year,gdp\nFrance,2000,1\nFrance,2010,2")
            .expect("valid input");

        assert_eq!(
            table
                .value_for_entity_at("France", "gdp", 2005, Some(5))
                .expect("ok"),
            CellValue::Number(1.0)
        );
        assert_eq!(
            table
                .value_for_entity_at("France", "gdp", 2005, Some(3))
                .expect("ok"),
            CellValue::Missing(MissingReason::NoValueWithinTolerance)
        );
        assert_eq!(
            table
                .value_for_entity_at("Spain", "gdp", 2005, Some(3))
                .expect("ok"),
            CellValue::Missing(MissingReason::NoValueWithinTolerance)
        );
        assert!(matches!(
            table.value_for_entity_at("France", "nope", 2005, None),
            Err(Error::UnknownColumn(_))
        ));
    }

    #[test]
    fn entity_and_time_filters() {
        let table = table();

        let filtered = table.filter_by_entity_names(&["Germany", "Italy"]).expect("ok");
        assert_eq!(filtered.available_entity_names(), &["Germany", "Italy"]);

        let ranged = table.filter_by_time_range(Some(2005), None).expect("ok");
        assert_eq!(numbers(&ranged, "year"), vec![Some(2005.0), Some(2005.0), Some(2010.0)]);
        assert_eq!(ranged.available_entity_names(), &["Italy", "France"]);

        let targeted = table.filter_by_target_times(&[2009], 2).expect("ok");
        assert_eq!(targeted.num_rows(), 1);
        assert_eq!(targeted.row_at("France", 2010), Some(0));

        let closest = table
            .closest_row_for_each_entity(&["France", "Germany", "Spain"], 2004, 4)
            .expect("ok");
        assert_eq!(closest, vec![4, 1]);
    }

    #[test]
    fn missing_value_filters() {
        let table = table();

        let gdp = table.drop_rows_with_missing_values_for_column("gdp").expect("ok");
        assert_eq!(gdp.num_rows(), 3);

        let any = table
            .drop_rows_with_missing_values_for_any_column(&["gdp", "pop"])
            .expect("ok");
        assert_eq!(numbers(&any, "pop"), vec![Some(80.0), Some(60.0)]);

        let all = table
            .drop_rows_with_missing_values_for_all_columns(&["gdp", "pop"])
            .expect("ok");
        assert_eq!(all.num_rows(), 4);

        assert_eq!(
            table.entities_with(&["gdp", "pop"]).expect("ok"),
            vec!["France", "Germany"]
        );
        let dropped = table
            .drop_entities_without_data_in_some_column(&["pop"])
            .expect("ok");
        assert_eq!(dropped.available_entity_names(), &["France", "Germany"]);
        assert!(matches!(
            table.drop_rows_with_missing_values_for_any_column(&["nope"]),
            Err(Error::UnknownColumn(_))
        ));
    }

    #[test]
    fn min_and_max_time_and_latest_value() {
        let table = table();

        let extremes = table.keep_min_time_and_max_time_for_each_entity_only().expect("ok");
        assert_eq!(extremes.num_rows(), 4);
        assert_eq!(extremes.row_at("France", 2005), None);

        assert_eq!(
            table.latest_value_for_entity("France", "pop").expect("ok"),
            Some(CellValue::Number(62.0))
        );
        assert_eq!(
            table.latest_value_for_entity("Italy", "gdp").expect("ok"),
            None
        );
    }

    #[test]
    fn completion() {
        let table = Table::from_delimited("entity,year,gdp\nGermany,2001,3\nFrance,2000,1\nFrance,2001,2")
            .expect("valid input");

        let completed = table.complete_entity_time().expect("ok");
        assert_eq!(completed.num_rows(), 4);
        assert_eq!(
            completed.row(2),
            Some(vec![
                CellValue::from("Germany"),
                CellValue::from(2000_i64),
                CellValue::Missing(MissingReason::MissingValuePlaceholder),
            ])
        );
        assert_eq!(completed.row(3).map(|row| row[2].clone()), Some(CellValue::Number(3.0)));

        let without_time = Table::from_delimited("entity,gdp\nFrance,1").expect("valid input");
        assert!(matches!(
            without_time.complete_entity_time(),
            Err(Error::MissingTimeColumn)
        ));
        assert!(without_time.all_times().is_empty());
    }

    #[test]
    fn without_entity_column() {
        let table = Table::from_delimited("gdp\n1").expect("valid input");
        assert!(table.available_entity_names().is_empty());
        assert!(matches!(
            table.filter_by_entity_names(&["France"]),
            Err(Error::MissingEntityColumn)
        ));
    }
}
