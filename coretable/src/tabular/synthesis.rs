//! Columns recomputed from other cells of the table: shares of a total,
//! growth relative to a start time, and time matching between two columns.
//!
//! Shares and growth rates are percentages; the resulting columns are
//! [ColumnType::Numeric] with unit `%`.

use std::sync::Arc;

use hashbrown::HashMap;

use crate::{
    columnar::{column::Column, column_def::ColumnDef, column_type::ColumnType},
    datavalues::{time_to_number, CellValue, MissingReason, Time},
    error::Error,
    tolerance::{closest_time_pairs, ToleranceMatcher},
};

use super::{interpolation::ORIGINAL_TIME_SUFFIX, provenance::TransformType, table::Table};

const PERCENT: &str = "%";

fn percentage_column(column: &Column, values: Vec<CellValue>) -> Column {
    let mut def = column.def().clone();
    def.unit = Some(PERCENT.to_string());
    def.short_unit = Some(PERCENT.to_string());
    Column::stored(def, ColumnType::Numeric, values)
}

fn share(value: f64, total: f64) -> CellValue {
    if total == 0.0 {
        CellValue::Missing(MissingReason::DivideByZero)
    } else {
        CellValue::from(100.0 * value / total)
    }
}

/// Compound annual growth rate in percent, for a change from `start` to `end` over `years`.
pub fn cagr(start: f64, end: f64, years: f64) -> f64 {
    let ratio = end / start;
    ratio.signum() * (ratio.abs().powf(1.0 / years) - 1.0) * 100.0
}

impl Table {
    fn numeric_column(&self, slug: &str) -> Result<&Arc<Column>, Error> {
        let column = self.get(slug)?;
        if column.column_type().is_numeric() {
            Ok(column)
        } else {
            Err(Error::InvalidTransform(format!(
                "column `{slug}` of type {} is not numeric",
                column.column_type()
            )))
        }
    }

    fn numeric_columns(&self, slugs: &[&str]) -> Result<Vec<&Arc<Column>>, Error> {
        slugs.iter().map(|slug| self.numeric_column(slug)).collect()
    }

    /// Replace each cell of column `slug` by its share, in percent, of the
    /// total of all entities at the same time.
    ///
    /// Times whose total is zero yield [MissingReason::DivideByZero].
    pub fn to_percentage_from_each_entity_for_each_time(&self, slug: &str) -> Result<Table, Error> {
        let column = self.numeric_column(slug)?;
        let times = self.get_values(self.require_time_slug()?)?;
        let values = column.values();

        let mut totals: HashMap<Time, f64> = HashMap::new();
        for (value, time) in values.iter().zip(times.iter()) {
            if let (Some(number), Some(time)) = (value.as_number(), time.as_time()) {
                *totals.entry(time).or_default() += number;
            }
        }

        let shares = values
            .iter()
            .zip(times.iter())
            .map(|(value, time)| match (value.as_number(), time.as_time()) {
                (Some(number), Some(time)) => {
                    share(number, totals.get(&time).copied().unwrap_or_default())
                }
                (Some(_), None) => CellValue::Missing(MissingReason::InvalidComputation),
                (None, _) => value.clone(),
            })
            .collect();

        let mut store = self.column_store().clone();
        store.insert_column(percentage_column(column, shares))?;
        Ok(self.derive(
            store,
            TransformType::UpdateColumnDefs,
            format!("`{slug}` as % contribution of each entity for each time"),
        ))
    }

    /// Replace the cells of the given columns by their share, in percent,
    /// of the sum of absolute values of these columns in the same row.
    ///
    /// Rows whose sum is zero yield [MissingReason::DivideByZero].
    pub fn to_percentage_from_each_column_for_each_entity_and_time(
        &self,
        slugs: &[&str],
    ) -> Result<Table, Error> {
        let columns = self.numeric_columns(slugs)?;
        let values = columns.iter().map(|column| column.values()).collect::<Vec<_>>();
        let totals = (0..self.num_rows())
            .map(|row| {
                values
                    .iter()
                    .filter_map(|values| values[row].as_number())
                    .map(f64::abs)
                    .sum::<f64>()
            })
            .collect::<Vec<_>>();

        let mut store = self.column_store().clone();
        for (column, values) in columns.iter().zip(&values) {
            let shares = values
                .iter()
                .zip(&totals)
                .map(|(value, &total)| match value.as_number() {
                    Some(number) => share(number.abs(), total),
                    None => value.clone(),
                })
                .collect();
            store.insert_column(percentage_column(column, shares))?;
        }

        Ok(self.derive(
            store,
            TransformType::UpdateColumnDefs,
            format!("{} as % of their absolute sum", slugs.join(", ")),
        ))
    }

    /// Replace the cells of the given columns by their growth, in percent,
    /// relative to the first usable value of the same entity at or after `start`.
    ///
    /// Cells before `start`, and zero cells before the first usable value, become
    /// [MissingReason::MissingValuePlaceholder], as do rows without entity or time.
    /// The first usable value itself becomes `0`.
    pub fn to_total_growth_for_each_column_compared_to_start_time(
        &self,
        start: Time,
        slugs: &[&str],
    ) -> Result<Table, Error> {
        self.require_time_slug()?;
        let columns = self.numeric_columns(slugs)?;
        let index = self.index()?;
        let placeholder = CellValue::Missing(MissingReason::MissingValuePlaceholder);

        let mut store = self.column_store().clone();
        for column in columns {
            let values = column.values();
            let mut growth = vec![placeholder.clone(); values.len()];

            for (entity_name, rows) in index.iter() {
                let mut comparison = None;
                for (&row, &time) in rows.iter().zip(index.times_for_entity(entity_name)) {
                    growth[row] = match (values[row].as_number(), comparison) {
                        _ if time < start => placeholder.clone(),
                        (None, _) => values[row].clone(),
                        (Some(value), Some(base)) => {
                            CellValue::from(100.0 * (value - base) / f64::abs(base))
                        }
                        (Some(value), None) if value == 0.0 => placeholder.clone(),
                        (Some(value), None) => {
                            comparison = Some(value);
                            CellValue::Number(0.0)
                        }
                    };
                }
            }

            store.insert_column(percentage_column(column, growth))?;
        }

        Ok(self.derive(
            store,
            TransformType::UpdateColumnDefs,
            format!("{} as % growth since {start}", slugs.join(", ")),
        ))
    }

    /// Reduce the table to one row per entity holding the average annual change,
    /// in percent, of each of the given columns.
    ///
    /// The change is measured from the earliest row in which all columns are non-zero
    /// numbers to the latest row of the entity, see [cagr]. Value times are taken from
    /// `<slug>-originalTime` where present. Entities for which both rows have the same
    /// time are dropped. The time column must be of type [ColumnType::Year].
    pub fn to_average_annual_change_for_each_entity(&self, slugs: &[&str]) -> Result<Table, Error> {
        let time_slug = self.require_time_slug()?;
        let time_type = self.get(time_slug)?.column_type();
        if time_type != ColumnType::Year {
            return Err(Error::InvalidTransform(format!(
                "average annual change needs years, but `{time_slug}` is of type {time_type}"
            )));
        }

        let columns = self.numeric_columns(slugs)?;
        let values = columns.iter().map(|column| column.values()).collect::<Vec<_>>();
        let value_times = columns
            .iter()
            .map(|column| {
                let original_time_slug = format!("{}{ORIGINAL_TIME_SUFFIX}", column.slug());
                if self.has(&original_time_slug) {
                    self.get_values(&original_time_slug)
                } else {
                    self.get_values(time_slug)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        let index = self.index()?;

        let mut spans = Vec::new();
        for (entity_name, rows) in index.iter() {
            let timed = &rows[..index.times_for_entity(entity_name).len()];
            let first = timed.iter().copied().find(|&row| {
                values
                    .iter()
                    .all(|values| values[row].as_number().is_some_and(|number| number != 0.0))
            });
            let (Some(first), Some(&last)) = (first, timed.last()) else {
                continue;
            };
            if value_times.iter().all(|times| times[first] != times[last]) {
                spans.push((first, last));
            }
        }
        log::debug!(
            "average annual change over {} of {} entities",
            spans.len(),
            index.num_entities()
        );

        let last_rows = spans.iter().map(|&(_, last)| last).collect::<Vec<_>>();
        let mut store = self.column_store().take_rows(&last_rows);
        for ((column, values), times) in columns.iter().zip(&values).zip(&value_times) {
            let changes = spans
                .iter()
                .map(|&(first, last)| {
                    match (
                        values[first].as_number(),
                        values[last].as_number(),
                        times[first].as_time(),
                        times[last].as_time(),
                    ) {
                        (Some(start), Some(end), Some(from), Some(to)) => {
                            CellValue::from(cagr(start, end, time_to_number(to - from)))
                        }
                        _ => CellValue::Missing(MissingReason::InvalidComputation),
                    }
                })
                .collect();
            store.insert_column(percentage_column(column, changes))?;
        }

        Ok(self.derive(
            store,
            TransformType::UpdateRows,
            format!("average annual change of {}", slugs.join(", ")),
        ))
    }

    /// Fill columns `slug_a` and `slug_b` so that, in every row, both values come from
    /// a matched pair of observations of the same entity.
    ///
    /// Observations are paired with [closest_time_pairs] within the larger of the
    /// tolerances declared for the two columns. A row takes the pair whose time in
    /// `slug_a` is closest to its own time, provided both times lie within the
    /// tolerance of their column; otherwise both cells are
    /// [MissingReason::NoValueWithinTolerance]. The table is completed first, and
    /// `<slug>-originalTime` columns record the times used. If neither column declares
    /// a tolerance, nothing is matched.
    pub fn interpolate_columns_by_closest_time_match(
        &self,
        slug_a: &str,
        slug_b: &str,
    ) -> Result<Table, Error> {
        let tolerance_a = self.get(slug_a)?.def().tolerance.unwrap_or(0).max(0);
        let tolerance_b = self.get(slug_b)?.def().tolerance.unwrap_or(0).max(0);
        let time_slug = self.require_time_slug()?;
        let description = format!("match closest times of `{slug_a}` and `{slug_b}`");

        if tolerance_a == 0 && tolerance_b == 0 {
            log::debug!("`{slug_a}` and `{slug_b}` have no tolerance, nothing to match");
            return Ok(self.derive(
                self.column_store().clone(),
                TransformType::UpdateRows,
                description,
            ));
        }

        let table = self.complete_entity_time()?;
        let column_a = table.get(slug_a)?;
        let column_b = table.get(slug_b)?;
        let values_a = column_a.values();
        let values_b = column_b.values();
        let index = table.index()?;

        let no_value = CellValue::Missing(MissingReason::NoValueWithinTolerance);
        let mut matched_a = vec![no_value.clone(); table.num_rows()];
        let mut matched_b = matched_a.clone();
        let mut times_a = matched_a.clone();
        let mut times_b = matched_a.clone();

        let matcher_a = ToleranceMatcher::new(tolerance_a);
        for (entity_name, rows) in index.iter() {
            let times = index.times_for_entity(entity_name);
            let available = |values: &[CellValue]| {
                rows.iter()
                    .zip(times)
                    .filter(|&(&row, _)| values[row].is_present())
                    .map(|(_, &time)| time)
                    .collect::<Vec<_>>()
            };
            let pairs = closest_time_pairs(
                &available(&values_a),
                &available(&values_b),
                tolerance_a.max(tolerance_b),
            );
            let paired_a = pairs.iter().map(|&(time_a, _)| time_a).collect::<Vec<_>>();

            for (&row, &time) in rows.iter().zip(times) {
                let Some(position) = matcher_a.find(&paired_a, time) else {
                    continue;
                };
                let (time_a, time_b) = pairs[position];
                if time.abs_diff(time_b) > tolerance_b.unsigned_abs() {
                    continue;
                }
                let (Some(row_a), Some(row_b)) = (
                    index.row_at(entity_name, time_a),
                    index.row_at(entity_name, time_b),
                ) else {
                    continue;
                };

                matched_a[row] = values_a[row_a].clone();
                matched_b[row] = values_b[row_b].clone();
                times_a[row] = CellValue::from(time_a);
                times_b[row] = CellValue::from(time_b);
            }
        }

        let time_type = table.get(time_slug)?.column_type();
        let mut store = table.column_store().clone();
        store.insert_column(column_a.with_values(matched_a))?;
        store.insert_column(column_b.with_values(matched_b))?;
        for (slug, times) in [(slug_a, times_a), (slug_b, times_b)] {
            let def = ColumnDef::typed(format!("{slug}{ORIGINAL_TIME_SUFFIX}"), time_type);
            store.insert_column(Column::stored(def, time_type, times))?;
        }

        Ok(table.derive(store, TransformType::UpdateRows, description))
    }
}
