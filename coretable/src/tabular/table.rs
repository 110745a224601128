//! This module defines [Table], the immutable handle consumers hold on tabular data.

use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use itertools::Itertools;
use once_cell::sync::OnceCell;

use crate::{
    columnar::{
        column::{Column, ColumnSource},
        column_def::ColumnDef,
        column_store::ColumnStore,
    },
    datavalues::{CellValue, MissingReason, Time},
    error::Error,
    index::EntityTimeIndex,
    io::{
        dsv,
        json::{self, RowObject},
    },
    permutator::{Permutator, SortOrder},
};

use super::{
    options::TableOptions,
    provenance::{Explanation, Provenance, TransformType},
    row::Rows,
};

/// Immutable table of typed columns.
///
/// Every operation returns a new [Table]; the receiver is never modified.
/// Columns that an operation does not change are shared with the new table.
/// The entity/time index is built on first use and cached for the lifetime of the table.
#[derive(Debug, Clone)]
pub struct Table {
    store: ColumnStore,
    options: Arc<TableOptions>,
    entity_slug: Option<String>,
    time_slug: Option<String>,
    index: Arc<OnceCell<EntityTimeIndex>>,
    provenance: Option<Arc<Provenance>>,
}

impl PartialEq for Table {
    /// Tables are equal if they have the same columns, types and cells.
    /// Provenance and metadata other than the type are ignored.
    fn eq(&self, other: &Self) -> bool {
        self.num_rows() == other.num_rows()
            && self.num_columns() == other.num_columns()
            && self
                .store
                .columns()
                .zip(other.store.columns())
                .all(|(left, right)| {
                    left.slug() == right.slug()
                        && left.column_type() == right.column_type()
                        && left.values() == right.values()
                })
    }
}

fn is_malformed(reason: MissingReason) -> bool {
    matches!(
        reason,
        MissingReason::NotAParseableNumberButShouldBeNumber
            | MissingReason::NaNButShouldBeNumber
            | MissingReason::NotAParseableBoolean
            | MissingReason::NotAParseableDate
    )
}

impl Table {
    fn assemble(store: ColumnStore, options: Arc<TableOptions>, provenance: Provenance) -> Self {
        let entity_slug = options.resolve_entity_slug(&store);
        let time_slug = options.resolve_time_slug(&store);

        Self {
            store,
            options,
            entity_slug,
            time_slug,
            index: Arc::default(),
            provenance: Some(Arc::new(provenance)),
        }
    }

    fn load(store: ColumnStore, options: TableOptions, source: &str) -> Self {
        log::debug!(
            "loaded {} rows from {source}: {}",
            store.num_rows(),
            store
                .columns()
                .map(|column| format!("{} ({})", column.slug(), column.column_type()))
                .join(", ")
        );

        for column in store.columns() {
            let malformed = column
                .missing_by_reason()
                .into_iter()
                .filter(|(reason, _)| is_malformed(*reason))
                .map(|(_, count)| count)
                .sum::<usize>();
            if malformed > 0 {
                log::warn!(
                    "{malformed} values of column `{}` are not valid {} values and are treated as missing",
                    column.slug(),
                    column.column_type()
                );
            }
        }

        let description = format!("read from {source}");
        Self::assemble(
            store,
            Arc::new(options),
            Provenance::new(TransformType::Load, description, Vec::new()),
        )
    }

    /// Create a table without columns and rows.
    pub fn blank() -> Self {
        Self::load(ColumnStore::new(), TableOptions::default(), "nothing")
    }

    /// Create a table from a [ColumnStore].
    pub fn from_store(store: ColumnStore, options: TableOptions) -> Self {
        Self::load(store, options, "column store")
    }

    /// Create a table from pairs of slug and cells; column types are inferred from the cells.
    ///
    /// Returns [Error::DimensionMismatch] if the columns differ in length.
    pub fn from_column_store<I, S>(columns: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (S, Vec<CellValue>)>,
        S: Into<String>,
    {
        let mut store = ColumnStore::new();
        for (slug, values) in columns {
            store.add_column(ColumnDef::new(slug), ColumnSource::Values(values))?;
        }
        Ok(Self::from_store(store, TableOptions::default()))
    }

    /// Parse delimited text with a header row; the delimiter is detected from the header.
    pub fn from_delimited(text: &str) -> Result<Self, Error> {
        Self::from_delimited_with_options(text, TableOptions::default())
    }

    /// Parse delimited text with a header row, using the given [TableOptions].
    pub fn from_delimited_with_options(text: &str, options: TableOptions) -> Result<Self, Error> {
        let store = dsv::read_store(text, &options)?;
        Ok(Self::load(store, options, "delimited text"))
    }

    /// Create a table from row objects.
    pub fn from_rows(rows: &[RowObject]) -> Result<Self, Error> {
        Self::from_rows_with_options(rows, TableOptions::default())
    }

    /// Create a table from row objects, using the given [TableOptions].
    pub fn from_rows_with_options(rows: &[RowObject], options: TableOptions) -> Result<Self, Error> {
        let store = json::store_from_rows(rows, &options)?;
        Ok(Self::load(store, options, "row objects"))
    }

    /// Parse JSON text holding an array of row objects or an object of column arrays.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        Self::from_json_with_options(text, TableOptions::default())
    }

    /// Parse JSON text, using the given [TableOptions].
    pub fn from_json_with_options(text: &str, options: TableOptions) -> Result<Self, Error> {
        let store = json::read_store(text, &options)?;
        Ok(Self::load(store, options, "json"))
    }

    /// Build a new table from `store`, recording `self` as its input.
    pub(crate) fn derive(&self, store: ColumnStore, kind: TransformType, description: String) -> Table {
        self.derive_from(store, kind, description, &[])
    }

    /// Build a new table from `store`, recording `self` and `others` as its inputs.
    pub(crate) fn derive_from(
        &self,
        store: ColumnStore,
        kind: TransformType,
        description: String,
        others: &[&Table],
    ) -> Table {
        log::trace!(
            "{kind}: {description} ({} -> {} rows)",
            self.num_rows(),
            store.num_rows()
        );

        let inputs = std::iter::once(self)
            .chain(others.iter().copied())
            .cloned()
            .collect();
        Table::assemble(
            store,
            self.options.clone(),
            Provenance::new(kind, description, inputs),
        )
    }

    /// Attach the name of the pipeline step that produced this table.
    pub(crate) fn with_step_name(mut self, step_name: &str) -> Table {
        if let Some(provenance) = self.provenance.take() {
            let provenance = Provenance::clone(&provenance).with_step_name(step_name.to_string());
            self.provenance = Some(Arc::new(provenance));
        }
        self
    }

    /// Return a table containing the given rows, in the given order.
    pub(crate) fn take_rows(&self, indices: &[usize], kind: TransformType, description: String) -> Table {
        self.derive(self.store.take_rows(indices), kind, description)
    }

    /// The [TableOptions] this table was created with.
    pub fn options(&self) -> &TableOptions {
        &self.options
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.store.num_rows()
    }

    /// Number of columns.
    pub fn num_columns(&self) -> usize {
        self.store.num_columns()
    }

    /// Return `true` if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Slugs of all columns, in order.
    pub fn column_slugs(&self) -> Vec<&str> {
        self.store.slugs().collect()
    }

    /// All columns, in order.
    pub fn columns(&self) -> impl Iterator<Item = &Arc<Column>> {
        self.store.columns()
    }

    /// The columns of this table, by slug.
    pub fn column_store(&self) -> &ColumnStore {
        &self.store
    }

    /// Return `true` if the table has a column with the given slug.
    pub fn has(&self, slug: &str) -> bool {
        self.store.has(slug)
    }

    /// Return the column with the given slug, or [Error::UnknownColumn].
    pub fn get(&self, slug: &str) -> Result<&Arc<Column>, Error> {
        self.store.get_column(slug)
    }

    /// Return the cells of the column with the given slug, or [Error::UnknownColumn].
    pub fn get_values(&self, slug: &str) -> Result<Arc<[CellValue]>, Error> {
        self.store.get_values(slug)
    }

    /// Row-wise view of all cells.
    pub fn rows(&self) -> Rows {
        Rows::new(&self.store)
    }

    /// Cells of the row at the given position, in column order.
    pub fn row(&self, index: usize) -> Option<Vec<CellValue>> {
        (index < self.num_rows()).then(|| {
            self.store
                .columns()
                .filter_map(|column| column.value(index))
                .collect()
        })
    }

    /// Slug of the entity column, if the table has one.
    pub fn entity_slug(&self) -> Option<&str> {
        self.entity_slug.as_deref()
    }

    /// Slug of the time column, if the table has one.
    pub fn time_slug(&self) -> Option<&str> {
        self.time_slug.as_deref()
    }

    pub(crate) fn require_entity_slug(&self) -> Result<&str, Error> {
        self.entity_slug().ok_or(Error::MissingEntityColumn)
    }

    pub(crate) fn require_time_slug(&self) -> Result<&str, Error> {
        self.time_slug().ok_or(Error::MissingTimeColumn)
    }

    /// The entity/time index of this table, built on first use.
    ///
    /// Returns [Error::MissingEntityColumn] if the table has no entity column.
    pub fn index(&self) -> Result<&EntityTimeIndex, Error> {
        let entity_slug = self.require_entity_slug()?;
        self.index.get_or_try_init(|| {
            let entities = self.store.get_values(entity_slug)?;
            let times = self
                .time_slug()
                .map(|slug| self.store.get_values(slug))
                .transpose()?;

            let index = EntityTimeIndex::build(&entities, times.as_deref());
            log::debug!(
                "indexed {} entities over {} rows",
                index.num_entities(),
                self.num_rows()
            );
            Ok(index)
        })
    }

    /// The operation that produced this table.
    pub fn provenance(&self) -> Option<&Provenance> {
        self.provenance.as_deref()
    }

    /// This table followed by the tables it was derived from, newest first.
    ///
    /// Only the first input of each operation is followed.
    pub fn ancestry(&self) -> Vec<&Table> {
        let mut result = vec![self];
        let mut current = self;
        while let Some(parent) = current
            .provenance()
            .and_then(|provenance| provenance.inputs().first())
        {
            result.push(parent);
            current = parent;
        }
        result
    }

    /// Render the provenance of this table as a tree.
    pub fn explain(&self) -> Explanation<'_> {
        Explanation::new(self)
    }

    /// Return a table containing only the rows for which `predicate` holds,
    /// in their original order.
    pub fn select_rows<P>(&self, predicate: P) -> Table
    where
        P: Fn(&super::row::Row<'_>) -> bool,
    {
        let rows = self.rows();
        let keep = rows
            .iter()
            .filter(|row| predicate(row))
            .map(|row| row.index())
            .collect::<Vec<_>>();

        self.take_rows(
            &keep,
            TransformType::FilterRows,
            "keep rows matching a predicate".to_string(),
        )
    }

    /// Return a table containing only the rows whose cell in column `slug` satisfies `predicate`.
    pub fn filter_by_column<P>(&self, slug: &str, predicate: P) -> Result<Table, Error>
    where
        P: Fn(&CellValue) -> bool,
    {
        let keep = self.rows_where(slug, predicate)?;
        Ok(self.take_rows(
            &keep,
            TransformType::FilterRows,
            format!("keep rows by `{slug}`"),
        ))
    }

    pub(crate) fn rows_where<P>(&self, slug: &str, predicate: P) -> Result<Vec<usize>, Error>
    where
        P: Fn(&CellValue) -> bool,
    {
        Ok(self
            .get_values(slug)?
            .iter()
            .positions(predicate)
            .collect())
    }

    /// Return a table with rows sorted by the given column.
    ///
    /// The sort is stable; missing cells come last.
    pub fn sort_by(&self, slug: &str, order: SortOrder) -> Result<Table, Error> {
        self.sort_by_columns(&[(slug, order)])
    }

    /// Return a table with rows sorted lexicographically by the given columns.
    pub fn sort_by_columns(&self, keys: &[(&str, SortOrder)]) -> Result<Table, Error> {
        let values = keys
            .iter()
            .map(|(slug, _)| self.get_values(slug))
            .collect::<Result<Vec<_>, _>>()?;
        let columns = values
            .iter()
            .zip(keys)
            .map(|(values, (_, order))| (&values[..], *order))
            .collect::<Vec<_>>();
        let permutator = Permutator::sort_from_columns(&columns)?;

        let description = format!(
            "sort by {}",
            keys.iter()
                .map(|(slug, order)| format!("{slug} {order}"))
                .join(", ")
        );
        Ok(self.take_rows(permutator.sort_vec(), TransformType::SortRows, description))
    }

    /// Return a table with an additional column, or with the column of the same slug replaced.
    ///
    /// Returns [Error::DimensionMismatch] if the number of values differs from the number of rows,
    /// and [Error::UnknownColumn] if a rule depends on a column that does not exist.
    pub fn with_column<S>(&self, def: ColumnDef, source: S) -> Result<Table, Error>
    where
        S: Into<ColumnSource>,
    {
        let slug = def.slug.clone();
        let action = if self.has(&slug) { "replace" } else { "add" };

        let mut store = self.store.clone();
        store.add_column(def, source.into())?;

        Ok(self.derive(
            store,
            TransformType::AppendColumns,
            format!("{action} column `{slug}`"),
        ))
    }

    /// Return a table in which the metadata of a column is replaced by `def`.
    ///
    /// If `def` declares a different type, the cells are converted to it.
    pub fn with_column_def(&self, def: ColumnDef) -> Result<Table, Error> {
        let column = self.get(&def.slug)?;
        let slug = def.slug.clone();
        let column = match def.column_type {
            Some(column_type) if column_type != column.column_type() => {
                Column::stored(def, column_type, column.values().to_vec())
            }
            _ => column.with_def(def),
        };

        let mut store = self.store.clone();
        store.insert_column(column)?;
        Ok(self.derive(
            store,
            TransformType::UpdateColumnDefs,
            format!("update definition of `{slug}`"),
        ))
    }

    /// Return a table with only the given columns, in the given order.
    pub fn select_columns(&self, slugs: &[&str]) -> Result<Table, Error> {
        let store = self.store.select(slugs)?;
        Ok(self.derive(
            store,
            TransformType::FilterColumns,
            format!("keep columns {}", slugs.join(", ")),
        ))
    }

    /// Return a table without the given columns; slugs that do not exist are ignored.
    pub fn drop_columns(&self, slugs: &[&str]) -> Result<Table, Error> {
        let keep = self
            .store
            .slugs()
            .filter(|slug| !slugs.contains(slug))
            .collect::<Vec<_>>();
        let store = self.store.select(&keep)?;
        Ok(self.derive(
            store,
            TransformType::FilterColumns,
            format!("drop columns {}", slugs.join(", ")),
        ))
    }

    /// Return a table with columns renamed; each pair maps an old slug to a new one.
    pub fn rename_columns(&self, renames: &[(&str, &str)]) -> Result<Table, Error> {
        let mut store = self.store.clone();
        for (from, to) in renames {
            store = store.rename(from, to)?;
        }

        Ok(self.derive(
            store,
            TransformType::RenameColumns,
            renames
                .iter()
                .map(|(from, to)| format!("{from} -> {to}"))
                .join(", "),
        ))
    }

    /// Return a table with the rows of `other` appended.
    ///
    /// Columns are matched by slug; cells of `other` are converted to the types of this table.
    /// Columns present on only one side are filled with placeholders on the other.
    pub fn append_rows(&self, other: &Table) -> Result<Table, Error> {
        let num_rows = self.num_rows() + other.num_rows();
        let placeholder = CellValue::Missing(MissingReason::MissingValuePlaceholder);

        let mut store = self.store.rebuild(num_rows, |column| {
            let mut values = column.values().to_vec();
            match other.get_values(column.slug()) {
                Ok(appended) => values.extend(appended.iter().cloned()),
                Err(_) => values.resize(num_rows, placeholder.clone()),
            }
            values
        })?;

        for column in other.columns().filter(|column| !self.has(column.slug())) {
            let values = std::iter::repeat(placeholder.clone())
                .take(self.num_rows())
                .chain(column.values().iter().cloned())
                .collect();
            store.insert_column(column.with_values(values))?;
        }

        Ok(self.derive_from(
            store,
            TransformType::AppendRows,
            format!("append {} rows", other.num_rows()),
            &[other],
        ))
    }

    /// Return a table with the same columns and no rows.
    pub fn drop_all_rows(&self) -> Table {
        self.take_rows(&[], TransformType::FilterRows, "drop all rows".to_string())
    }

    /// Merge two tables by their (entity, time) key.
    ///
    /// The result contains all rows of `self`, followed by the rows of `other`
    /// whose key does not occur in `self`. Each row of `self` is matched with the first
    /// row of `other` having the same key. Columns present on only one side are
    /// [MissingReason::NoMatchingRowInJoin] in rows without a match; cells missing in `self`
    /// are taken from the matching row of `other`.
    ///
    /// Both tables need an entity and a time column.
    pub fn join(&self, other: &Table) -> Result<Table, Error> {
        let (entity_slug, time_slug) = (self.require_entity_slug()?, self.require_time_slug()?);
        let (other_entity_slug, other_time_slug) =
            (other.require_entity_slug()?, other.require_time_slug()?);

        let keys = self.keys(entity_slug, time_slug)?;
        let other_keys = other.keys(other_entity_slug, other_time_slug)?;

        let mut first_other_row: HashMap<&(String, Time), usize> = HashMap::new();
        for (row, key) in other_keys.iter().enumerate() {
            if let Some(key) = key {
                first_other_row.entry(key).or_insert(row);
            }
        }
        let own_keys = keys.iter().flatten().collect::<HashSet<_>>();

        let matches = keys
            .iter()
            .map(|key| key.as_ref().and_then(|key| first_other_row.get(key).copied()))
            .collect::<Vec<_>>();
        let extra = other_keys
            .iter()
            .enumerate()
            .filter(|(_, key)| key.as_ref().map_or(true, |key| !own_keys.contains(key)))
            .map(|(row, _)| row)
            .collect::<Vec<_>>();

        let num_rows = self.num_rows() + extra.len();
        let no_match = CellValue::Missing(MissingReason::NoMatchingRowInJoin);
        let mut store = ColumnStore::with_num_rows(num_rows);

        for column in self.columns() {
            let source_slug = match column.slug() {
                slug if slug == entity_slug => other_entity_slug,
                slug if slug == time_slug => other_time_slug,
                slug => slug,
            };
            let own = column.values();
            let theirs = other.get_values(source_slug).ok();

            let mut values = Vec::with_capacity(num_rows);
            for (value, matched) in own.iter().zip(&matches) {
                let substitute = match (&theirs, matched) {
                    (Some(theirs), Some(matched)) if value.is_missing() => Some(&theirs[*matched]),
                    _ => None,
                };
                values.push(substitute.unwrap_or(value).clone());
            }
            values.extend(extra.iter().map(|&row| match &theirs {
                Some(theirs) => theirs[row].clone(),
                None => no_match.clone(),
            }));

            store.insert_column(column.with_values(values))?;
        }

        for column in other.columns().filter(|column| {
            let slug = column.slug();
            !self.has(slug) && slug != other_entity_slug && slug != other_time_slug
        }) {
            let theirs = column.values();
            let values = matches
                .iter()
                .map(|matched| match matched {
                    Some(row) => theirs[*row].clone(),
                    None => no_match.clone(),
                })
                .chain(extra.iter().map(|&row| theirs[row].clone()))
                .collect();

            store.insert_column(column.with_values(values))?;
        }

        Ok(self.derive_from(
            store,
            TransformType::Concat,
            format!("join by ({entity_slug}, {time_slug})"),
            &[other],
        ))
    }

    /// (entity, time) key of every row; `None` if either is missing.
    fn keys(&self, entity_slug: &str, time_slug: &str) -> Result<Vec<Option<(String, Time)>>, Error> {
        let entities = self.get_values(entity_slug)?;
        let times = self.get_values(time_slug)?;

        Ok(entities
            .iter()
            .zip(times.iter())
            .map(|(entity, time)| Some((entity.group_key()?, time.as_time()?)))
            .collect())
    }

    /// Header row followed by one row of rendered cells per table row.
    ///
    /// Missing cells are rendered as empty strings.
    pub fn to_matrix(&self) -> Vec<Vec<String>> {
        let columns = self
            .columns()
            .map(|column| (column, column.values()))
            .collect::<Vec<_>>();

        let header = self
            .column_slugs()
            .into_iter()
            .map(str::to_string)
            .collect();
        std::iter::once(header)
            .chain((0..self.num_rows()).map(|row| {
                columns
                    .iter()
                    .map(|(column, values)| column.format_value(&values[row]))
                    .collect()
            }))
            .collect()
    }

    /// Serialize this table as delimited text with a header row.
    pub fn to_delimited(&self, delimiter: u8) -> Result<String, Error> {
        dsv::write_table(self, delimiter)
    }

    /// Serialize this table as comma separated values.
    pub fn to_csv(&self) -> Result<String, Error> {
        self.to_delimited(b',')
    }

    /// Serialize this table as tab separated values.
    pub fn to_tsv(&self) -> Result<String, Error> {
        self.to_delimited(b'\t')
    }

    /// Serialize this table as an array of row objects; missing cells become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        json::table_to_json(self)
    }

    /// Number of missing cells per column, in column order.
    pub fn missing_value_counts(&self) -> Vec<(String, usize)> {
        self.columns()
            .map(|column| (column.slug().to_string(), column.num_missing()))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        columnar::{column::ComputeRule, column_type::ColumnType},
        datavalues::MissingReason,
    };
    use quickcheck_macros::quickcheck;
    use test_log::test;

    fn numbers(values: &[f64]) -> Vec<CellValue> {
        values.iter().copied().map(CellValue::from).collect()
    }

    fn table_from(rows: &[(u8, Option<i16>)]) -> Table {
        Table::from_column_store([
            (
                "entity",
                rows.iter()
                    .map(|(entity, _)| CellValue::from(format!("e{}", entity % 3)))
                    .collect::<Vec<_>>(),
            ),
            (
                "value",
                rows.iter()
                    .map(|(_, value)| CellValue::from(value.map(f64::from)))
                    .collect(),
            ),
        ])
        .expect("columns have the same length")
    }

    #[quickcheck]
    fn selecting_all_rows_is_identity(rows: Vec<(u8, Option<i16>)>) -> bool {
        let table = table_from(&rows);
        table.select_rows(|_| true) == table
    }

    #[quickcheck]
    fn with_column_round_trip(rows: Vec<(u8, Option<i16>)>) -> bool {
        let table = table_from(&rows);
        let values = table.get_values("value").expect("exists");
        let column_type = table.get("value").expect("exists").column_type();

        let replaced = table
            .with_column(ColumnDef::typed("value", column_type), values.to_vec())
            .expect("same length");
        replaced.get_values("value").expect("exists") == values
    }

    #[quickcheck]
    fn sort_is_stable(keys: Vec<u8>) -> bool {
        let table = Table::from_column_store([
            (
                "key",
                keys.iter()
                    .map(|key| CellValue::from(f64::from(key % 4)))
                    .collect::<Vec<_>>(),
            ),
            (
                "position",
                (0..keys.len())
                    .map(|position| CellValue::from(position as i64))
                    .collect(),
            ),
        ])
        .expect("same length");

        let sorted = table.sort_by("key", SortOrder::Desc).expect("key exists");
        let sorted_keys = sorted.get_values("key").expect("exists");
        let positions = sorted.get_values("position").expect("exists");

        (1..sorted.num_rows()).all(|row| {
            let ordered = sorted_keys[row - 1].sort_cmp(&sorted_keys[row]).is_ge();
            let stable = sorted_keys[row - 1] != sorted_keys[row]
                || positions[row - 1].sort_cmp(&positions[row]).is_lt();
            ordered && stable
        })
    }

    #[test]
    fn parse_delimited() {
        let table = Table::from_delimited("entity,year,gdp\nFrance,2000,100\nGermany,2000,200")
            .expect("valid input");

        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.available_entity_names(), &["France", "Germany"]);
        assert_eq!(
            &*table.get_values("gdp").expect("exists"),
            numbers(&[100.0, 200.0]).as_slice()
        );
        assert_eq!(table.entity_slug(), Some("entity"));
        assert_eq!(table.time_slug(), Some("year"));
    }

    #[test]
    fn blank_values_do_not_force_strings() {
        let table = Table::from_delimited("entity,gdp\nFrance,\nGermany,3\nItaly,abc")
            .expect("valid input");
        let gdp = table.get("gdp").expect("exists");
        assert_eq!(gdp.column_type(), ColumnType::String);

        let table = Table::from_delimited("entity,gdp\nFrance,\nGermany,3").expect("valid input");
        let gdp = table.get("gdp").expect("exists");
        assert_eq!(gdp.column_type(), ColumnType::Numeric);
        assert_eq!(
            gdp.values()[0],
            CellValue::Missing(MissingReason::BlankButShouldBeNumber)
        );
    }

    #[test]
    fn dimension_mismatch_leaves_table_unchanged() {
        let table = table_from(&[(0, Some(1)), (1, Some(2)), (2, None)]);
        let result = table.with_column(ColumnDef::new("short"), numbers(&[1.0, 2.0]));

        assert!(matches!(
            result,
            Err(Error::DimensionMismatch {
                expected: 3,
                actual: 2,
                ..
            })
        ));
        assert!(!table.has("short"));
        assert_eq!(table.num_columns(), 2);
    }

    #[test]
    fn derived_columns_of_old_table_are_unaffected() {
        let table = Table::from_column_store([("a", numbers(&[1.0, 2.0]))]).expect("ok");
        let table = table
            .with_column(
                ColumnDef::new("b"),
                ComputeRule::numeric(["a"], |inputs| inputs[0] * 10.0),
            )
            .expect("a exists");
        assert_eq!(
            &*table.get_values("b").expect("ok"),
            numbers(&[10.0, 20.0]).as_slice()
        );

        let changed = table
            .with_column(ColumnDef::new("a"), numbers(&[5.0, 6.0]))
            .expect("same length");
        assert_eq!(
            &*changed.get_values("b").expect("ok"),
            numbers(&[50.0, 60.0]).as_slice()
        );
        assert_eq!(
            &*table.get_values("b").expect("ok"),
            numbers(&[10.0, 20.0]).as_slice()
        );
    }

    #[test]
    fn derived_columns_follow_renamed_dependencies() {
        let table = Table::from_column_store([("a", numbers(&[1.0, 2.0]))])
            .expect("ok")
            .with_column(
                ColumnDef::new("b"),
                ComputeRule::numeric(["a"], |inputs| inputs[0] * 10.0),
            )
            .expect("a exists")
            .rename_columns(&[("a", "x")])
            .expect("a exists")
            .with_column(ColumnDef::new("a"), numbers(&[5.0, 6.0]))
            .expect("same length")
            .select_columns(&["a", "x", "b"])
            .expect("columns exist");
        assert_eq!(
            &*table.get_values("b").expect("ok"),
            numbers(&[10.0, 20.0]).as_slice()
        );

        let appended = table.append_rows(&table).expect("same columns");
        assert_eq!(
            appended.get("b").expect("exists").dependencies(),
            Some(["x".to_string()].as_slice())
        );
        assert_eq!(
            &*appended.get_values("b").expect("ok"),
            numbers(&[10.0, 20.0, 10.0, 20.0]).as_slice()
        );
    }

    #[test]
    fn rule_with_unknown_dependency() {
        let table = table_from(&[(0, Some(1))]);
        let result = table.with_column(
            ColumnDef::new("b"),
            ComputeRule::numeric(["nope"], |inputs| inputs[0]),
        );
        assert!(matches!(result, Err(Error::UnknownColumn(slug)) if slug == "nope"));
    }

    #[test]
    fn derived_columns_survive_filtering() {
        let table = Table::from_column_store([("a", numbers(&[1.0, 2.0, 3.0]))])
            .expect("ok")
            .with_column(
                ColumnDef::new("b"),
                ComputeRule::numeric(["a"], |inputs| inputs[0] + 1.0),
            )
            .expect("a exists");

        let filtered = table
            .filter_by_column("a", |value| value.as_number().is_some_and(|a| a >= 2.0))
            .expect("a exists");
        assert!(filtered.get("b").expect("exists").is_derived());
        assert_eq!(
            &*filtered.get_values("b").expect("ok"),
            numbers(&[3.0, 4.0]).as_slice()
        );
    }

    #[test]
    fn column_operations() {
        let table = Table::from_delimited("entity,year,gdp,pop\nFrance,2000,1,2").expect("valid");

        let selected = table.select_columns(&["gdp", "entity"]).expect("exist");
        assert_eq!(selected.column_slugs(), vec!["gdp", "entity"]);
        assert_eq!(selected.time_slug(), None);
        assert!(matches!(
            table.select_columns(&["nope"]),
            Err(Error::UnknownColumn(_))
        ));

        let dropped = table.drop_columns(&["pop", "nope"]).expect("valid");
        assert_eq!(dropped.column_slugs(), vec!["entity", "year", "gdp"]);

        let renamed = table.rename_columns(&[("gdp", "income")]).expect("valid");
        assert_eq!(renamed.column_slugs(), vec!["entity", "year", "income", "pop"]);
        assert!(matches!(
            table.rename_columns(&[("gdp", "pop")]),
            Err(Error::DuplicateColumn(_))
        ));
    }

    #[test]
    fn update_column_def() {
        let table = Table::from_delimited("entity,code\nFrance,1\nGermany,2").expect("valid");
        assert_eq!(
            table.get("code").expect("exists").column_type(),
            ColumnType::Numeric
        );

        let updated = table
            .with_column_def(
                ColumnDef::typed("code", ColumnType::String).with_name("Country code"),
            )
            .expect("code exists");
        let code = updated.get("code").expect("exists");
        assert_eq!(code.column_type(), ColumnType::String);
        assert_eq!(code.display_name(), "Country code");
        assert_eq!(code.values()[0], CellValue::from("1"));
    }

    #[test]
    fn append_rows_with_different_columns() {
        let first = Table::from_delimited("entity,gdp\nFrance,1").expect("valid");
        let second = Table::from_delimited("entity,pop\nGermany,2").expect("valid");

        let appended = first.append_rows(&second).expect("valid");
        assert_eq!(appended.num_rows(), 2);
        assert_eq!(appended.column_slugs(), vec!["entity", "gdp", "pop"]);
        assert_eq!(
            appended.row(1),
            Some(vec![
                CellValue::from("Germany"),
                CellValue::Missing(MissingReason::MissingValuePlaceholder),
                CellValue::Number(2.0),
            ])
        );
        assert_eq!(appended.available_entity_names(), &["France", "Germany"]);
        assert_eq!(first.num_rows(), 1);

        let from_blank = Table::blank().append_rows(&first).expect("valid");
        assert_eq!(from_blank, first);
    }

    #[test]
    fn join_by_entity_and_time() {
        let gdp = Table::from_delimited("entity,year,gdp\nFrance,2000,1\nFrance,2001,2\nItaly,2000,")
            .expect("valid");
        let pop = Table::from_delimited("entity,year,pop,gdp\nFrance,2001,20,\nItaly,2000,30,3\nSpain,2000,40,4")
            .expect("valid");

        let joined = gdp.join(&pop).expect("both have keys");
        assert_eq!(joined.column_slugs(), vec!["entity", "year", "gdp", "pop"]);
        assert_eq!(joined.num_rows(), 4);

        let no_match = CellValue::Missing(MissingReason::NoMatchingRowInJoin);
        assert_eq!(
            &*joined.get_values("pop").expect("exists"),
            &[
                no_match,
                CellValue::Number(20.0),
                CellValue::Number(30.0),
                CellValue::Number(40.0)
            ]
        );
        assert_eq!(
            &*joined.get_values("gdp").expect("exists"),
            numbers(&[1.0, 2.0, 3.0, 4.0]).as_slice()
        );
        assert_eq!(
            joined.available_entity_names(),
            &["France", "Italy", "Spain"]
        );
        assert_eq!(
            joined.provenance().map(|provenance| provenance.inputs().len()),
            Some(2)
        );

        let without_time = Table::from_delimited("entity,gdp\nFrance,1").expect("valid");
        assert!(matches!(
            without_time.join(&pop),
            Err(Error::MissingTimeColumn)
        ));
    }

    #[test]
    fn output() {
        let table = Table::from_delimited("entity,year,gdp\nFrance,2000,1.5\nGermany,2000,")
            .expect("valid");

        assert_eq!(
            table.to_matrix(),
            vec![
                vec!["entity", "year", "gdp"],
                vec!["France", "2000", "1.5"],
                vec!["Germany", "2000", ""],
            ]
        );
        assert_eq!(
            table.to_csv().expect("writable"),
            "entity,year,gdp\nFrance,2000,1.5\nGermany,2000,\n"
        );
        assert_eq!(
            table.to_json(),
            serde_json::json!([
                {"entity": "France", "year": 2000, "gdp": 1.5},
                {"entity": "Germany", "year": 2000, "gdp": null},
            ])
        );
        assert_eq!(
            table.missing_value_counts(),
            vec![
                ("entity".to_string(), 0),
                ("year".to_string(), 0),
                ("gdp".to_string(), 1)
            ]
        );
    }

    #[test]
    fn rows_view() {
        let table = Table::from_delimited("entity,gdp\nFrance,1\nGermany,2").expect("valid");
        let filtered = table.select_rows(|row| row.text("entity") == Some("Germany"));
        assert_eq!(filtered.num_rows(), 1);
        assert_eq!(filtered.rows().get(0).and_then(|row| row.number("gdp")), Some(2.0));
        assert!(table.row(2).is_none());
        assert!(table.drop_all_rows().is_empty());
        assert_eq!(table.drop_all_rows().num_columns(), 2);
    }
}
