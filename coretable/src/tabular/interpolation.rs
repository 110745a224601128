//! Filling of missing observations from other observations of the same entity.

use crate::{
    columnar::{column::Column, column_def::ColumnDef},
    datavalues::{time_to_number, CellValue, MissingReason, Time},
    error::Error,
    tolerance::{ToleranceMatcher, ToleranceStrategy},
};

use super::{provenance::TransformType, table::Table};

/// Suffix of the column recording the time a tolerance-filled value was taken from.
pub const ORIGINAL_TIME_SUFFIX: &str = "-originalTime";

/// Suffix of the column recording the cells before linear interpolation.
pub const ORIGINAL_VALUE_SUFFIX: &str = "-originalValue";

impl Table {
    /// Fill missing cells of column `slug` from the closest valid observation
    /// of the same entity within `tolerance` time units.
    ///
    /// Tolerance and strategy default to the ones declared for the column.
    /// With a positive tolerance, the table is first completed so that every entity has
    /// a row for every time. A column `<slug>-originalTime` records the time each value
    /// was taken from. With a zero tolerance nothing is filled and that column is a copy
    /// of the time column.
    pub fn interpolate_column_with_tolerance(
        &self,
        slug: &str,
        tolerance: Option<Time>,
        strategy: Option<ToleranceStrategy>,
    ) -> Result<Table, Error> {
        let def = self.get(slug)?.def();
        let tolerance = tolerance.or(def.tolerance).unwrap_or(0);
        let strategy = strategy.or(def.tolerance_strategy).unwrap_or_default();
        let time_slug = self.require_time_slug()?;

        let table = if tolerance > 0 {
            self.complete_entity_time()?
        } else {
            self.clone()
        };
        let column = table.get(slug)?;
        let time_column = table.get(time_slug)?;
        let values = column.values();
        let times = time_column.values();

        let mut filled = values.to_vec();
        let mut original_times = times.to_vec();

        if tolerance > 0 {
            let matcher = ToleranceMatcher::with_strategy(tolerance, strategy);
            for (_, rows) in table.index()?.iter() {
                let group_values = rows.iter().map(|&row| values[row].clone()).collect::<Vec<_>>();
                let group_times = rows.iter().map(|&row| times[row].as_time()).collect::<Vec<_>>();

                for (&row, (value, time)) in rows.iter().zip(matcher.fill(&group_values, &group_times)) {
                    filled[row] = value;
                    original_times[row] = time
                        .map(CellValue::from)
                        .unwrap_or(CellValue::Missing(MissingReason::NoValueWithinTolerance));
                }
            }
        }

        let original_time_def = ColumnDef::typed(
            format!("{slug}{ORIGINAL_TIME_SUFFIX}"),
            time_column.column_type(),
        );

        let mut store = table.column_store().clone();
        store.insert_column(column.with_values(filled))?;
        store.insert_column(Column::stored(
            original_time_def,
            time_column.column_type(),
            original_times,
        ))?;

        Ok(table.derive(
            store,
            TransformType::UpdateRows,
            format!("interpolate `{slug}` with tolerance {tolerance} ({strategy})"),
        ))
    }

    /// Fill missing cells of the numeric column `slug` by linear interpolation between
    /// the valid observations of the same entity.
    ///
    /// The table is first completed so that every entity has a row for every time.
    /// Cells before the first or after the last observation are filled with that
    /// observation if `extrapolate` is set, and stay missing otherwise.
    /// A column `<slug>-originalValue` keeps the cells as they were.
    pub fn interpolate_column_linearly(&self, slug: &str, extrapolate: bool) -> Result<Table, Error> {
        if !self.get(slug)?.column_type().is_numeric() {
            return Err(Error::InvalidTransform(format!(
                "cannot interpolate non-numeric column `{slug}`"
            )));
        }
        let time_slug = self.require_time_slug()?;

        let table = self.complete_entity_time()?;
        let column = table.get(slug)?;
        let values = column.values();
        let times = table.get_values(time_slug)?;

        let mut filled = values.to_vec();
        for (_, rows) in table.index()?.iter() {
            let observations = rows
                .iter()
                .filter_map(|&row| Some((times[row].as_time()?, values[row].as_number()?)))
                .collect::<Vec<_>>();

            for &row in rows {
                let Some(time) = times[row].as_time() else {
                    continue;
                };
                if values[row].is_present() {
                    continue;
                }

                let next = observations.partition_point(|&(observed, _)| observed < time);
                let before = next.checked_sub(1).map(|position| observations[position]);
                let after = observations.get(next).copied();

                let interpolated = match (before, after) {
                    (Some((start_time, start)), Some((end_time, end))) => {
                        let progress = time_to_number(time - start_time)
                            / time_to_number(end_time - start_time);
                        start + (end - start) * progress
                    }
                    (Some((_, start)), None) if extrapolate => start,
                    (None, Some((_, end))) if extrapolate => end,
                    _ => continue,
                };
                filled[row] = CellValue::from(interpolated);
            }
        }

        let mut original_def = column.def().clone();
        original_def.slug = format!("{slug}{ORIGINAL_VALUE_SUFFIX}");

        let mut store = table.column_store().clone();
        store.insert_column(column.with_values(filled))?;
        store.insert_column(Column::stored(
            original_def,
            column.column_type(),
            values.to_vec(),
        ))?;

        Ok(table.derive(
            store,
            TransformType::UpdateRows,
            format!("interpolate `{slug}` linearly"),
        ))
    }
}
