//! This module defines [ColumnStore], the set of columns owned by a table.

use std::sync::Arc;

use linked_hash_map::LinkedHashMap;

use crate::{
    columnar::{
        column::{Column, ColumnSource},
        column_def::ColumnDef,
        column_type::ColumnType,
    },
    datavalues::CellValue,
    error::Error,
};

/// Ordered collection of columns that all have the same number of cells.
///
/// Columns are shared by reference; cloning a store and then changing
/// a few columns leaves all other columns shared with the original.
#[derive(Debug, Clone, Default)]
pub struct ColumnStore {
    columns: LinkedHashMap<String, Arc<Column>>,
    num_rows: usize,
}

impl ColumnStore {
    /// Create an empty [ColumnStore].
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty [ColumnStore] whose columns will have `num_rows` cells.
    pub(crate) fn with_num_rows(num_rows: usize) -> Self {
        Self {
            columns: LinkedHashMap::new(),
            num_rows,
        }
    }

    /// Number of rows, i.e. number of cells of every column.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Number of columns.
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Return `true` if the store has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Slugs of all columns, in order.
    pub fn slugs(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// All columns, in order.
    pub fn columns(&self) -> impl Iterator<Item = &Arc<Column>> {
        self.columns.values()
    }

    /// Return `true` if a column with the given slug exists.
    pub fn has(&self, slug: &str) -> bool {
        self.columns.contains_key(slug)
    }

    /// Return the column with the given slug.
    ///
    /// Returns [Error::UnknownColumn] if there is no such column.
    pub fn get_column(&self, slug: &str) -> Result<&Arc<Column>, Error> {
        self.columns
            .get(slug)
            .ok_or_else(|| Error::UnknownColumn(slug.to_string()))
    }

    /// Return the cells of the column with the given slug.
    ///
    /// Derived columns are computed on first access.
    pub fn get_values(&self, slug: &str) -> Result<Arc<[CellValue]>, Error> {
        Ok(self.get_column(slug)?.values())
    }

    /// Add a column of raw strings, parsed according to `def`
    /// or to the inferred type if `def` does not declare one.
    pub fn add_raw_column(&mut self, def: ColumnDef, raw_values: &[&str]) -> Result<(), Error> {
        let column_type = def
            .column_type
            .unwrap_or_else(|| ColumnType::infer(&def.slug, raw_values.iter().copied()));
        let values = raw_values
            .iter()
            .map(|raw| column_type.parse(raw))
            .collect::<Vec<_>>();

        self.add_column(def.with_type(column_type), ColumnSource::Values(values))
    }

    /// Add a column, or replace the column with the same slug.
    ///
    /// Returns [Error::DimensionMismatch] if the number of values does not match
    /// the number of rows, unless the store has no columns yet,
    /// and [Error::UnknownColumn] if a rule depends on a column that does not exist.
    /// On error, the store is left unchanged.
    pub fn add_column(&mut self, def: ColumnDef, source: ColumnSource) -> Result<(), Error> {
        let column = match source {
            ColumnSource::Values(values) => {
                self.check_dimension(&def.slug, values.len())?;
                let column_type = def
                    .column_type
                    .unwrap_or_else(|| ColumnType::infer_from_cells(&def.slug, &values));

                Column::stored(def, column_type, values)
            }
            ColumnSource::Rule(rule) => {
                let inputs = rule
                    .dependencies()
                    .iter()
                    .map(|slug| self.get_column(slug).cloned())
                    .collect::<Result<Vec<_>, _>>()?;
                let column_type = def.column_type.unwrap_or_default();

                Column::derived(def, column_type, rule, inputs, self.num_rows)
            }
        };

        self.insert_column(column)
    }

    /// Insert an already constructed column, replacing the column with the same slug.
    pub(crate) fn insert_column(&mut self, column: Column) -> Result<(), Error> {
        self.check_dimension(column.slug(), column.len())?;
        if self.columns.is_empty() {
            self.num_rows = column.len();
        }

        let slug = column.slug().to_string();
        let column = Arc::new(column);

        match self.columns.get_mut(&slug) {
            Some(existing) => {
                let replaced = std::mem::replace(existing, column.clone());
                self.rebind_dependents(&replaced, &column);
            }
            None => {
                self.columns.insert(slug, column);
            }
        }

        Ok(())
    }

    fn check_dimension(&self, slug: &str, len: usize) -> Result<(), Error> {
        if !self.columns.is_empty() && len != self.num_rows {
            return Err(Error::DimensionMismatch {
                slug: slug.to_string(),
                expected: self.num_rows,
                actual: len,
            });
        }

        Ok(())
    }

    /// Bind derived columns that are bound to `replaced` to its `replacement`.
    ///
    /// Columns are visited in order, so that columns derived from rebound columns are rebound as well.
    /// Columns that merely read from the same slug, but were bound to another column, are left alone.
    fn rebind_dependents(&mut self, replaced: &Arc<Column>, replacement: &Arc<Column>) {
        let mut rebinding = Rebinding::default();
        rebinding.record(replaced, replacement);

        let slugs = self.columns.keys().cloned().collect::<Vec<_>>();
        for slug in slugs {
            let Some(column) = self.columns.get(&slug) else {
                continue;
            };
            if Arc::ptr_eq(column, replacement) {
                continue;
            }
            let Some(inputs) = rebinding.partial(column) else {
                continue;
            };

            log::trace!("rebinding derived column `{slug}`");
            let rebound = Arc::new(column.rebind(inputs, self.num_rows));
            rebinding.record(column, &rebound);
            if let Some(existing) = self.columns.get_mut(&slug) {
                *existing = rebound;
            }
        }
    }

    /// Remove the column with the given slug.
    pub fn remove_column(&mut self, slug: &str) -> Result<Arc<Column>, Error> {
        self.columns
            .remove(slug)
            .ok_or_else(|| Error::UnknownColumn(slug.to_string()))
    }

    /// Return a store with the given rows of every column, in the given order.
    ///
    /// Derived columns bound to columns of this store are bound to the restricted columns.
    pub(crate) fn take_rows(&self, indices: &[usize]) -> ColumnStore {
        let mut result = ColumnStore::with_num_rows(indices.len());
        let mut rebinding = Rebinding::default();
        for (slug, column) in self.columns.iter() {
            let taken = Arc::new(match rebinding.complete(column) {
                Some(inputs) => column.take_bound(indices, inputs),
                None => column.take(indices),
            });
            rebinding.record(column, &taken);
            result.columns.insert(slug.clone(), taken);
        }
        result
    }

    /// Return a store with `num_rows` rows and the same columns.
    ///
    /// Stored columns receive the cells produced by `values_of`.
    /// Derived columns bound to columns of this store that precede them are rebound
    /// to the rebuilt columns and stay lazy; all others are materialized through `values_of` as well.
    pub(crate) fn rebuild<F>(&self, num_rows: usize, mut values_of: F) -> Result<ColumnStore, Error>
    where
        F: FnMut(&Column) -> Vec<CellValue>,
    {
        let mut result = ColumnStore::with_num_rows(num_rows);
        let mut rebinding = Rebinding::default();
        for column in self.columns.values() {
            let rebuilt = match rebinding.complete(column) {
                Some(inputs) => column.rebind(inputs, num_rows),
                None => column.with_values(values_of(column)),
            };
            if rebuilt.len() != num_rows {
                return Err(Error::DimensionMismatch {
                    slug: rebuilt.slug().to_string(),
                    expected: num_rows,
                    actual: rebuilt.len(),
                });
            }

            let rebuilt = Arc::new(rebuilt);
            rebinding.record(column, &rebuilt);
            result
                .columns
                .insert(rebuilt.slug().to_string(), rebuilt);
        }
        Ok(result)
    }

    /// Return a store with the columns in the given order; all other columns are dropped.
    pub(crate) fn select(&self, slugs: &[&str]) -> Result<ColumnStore, Error> {
        let mut result = ColumnStore::with_num_rows(self.num_rows);
        for slug in slugs {
            if result.has(slug) {
                return Err(Error::DuplicateColumn(slug.to_string()));
            }
            let column = self.get_column(slug)?.clone();
            result.columns.insert(slug.to_string(), column);
        }
        Ok(result)
    }

    /// Return a store in which the column `from` is called `to`, keeping its position.
    ///
    /// Derived columns bound to the renamed column read from `to` afterwards.
    pub(crate) fn rename(&self, from: &str, to: &str) -> Result<ColumnStore, Error> {
        if from != to && self.has(to) {
            return Err(Error::DuplicateColumn(to.to_string()));
        }
        self.get_column(from)?;

        let mut result = ColumnStore::with_num_rows(self.num_rows);
        let mut rebinding = Rebinding::default();
        for (slug, column) in self.columns.iter() {
            let renamed = if slug == from {
                let mut def = column.def().clone();
                def.slug = to.to_string();
                Arc::new(column.with_def(def))
            } else if let Some(inputs) = rebinding.partial(column) {
                Arc::new(column.rebind(inputs, self.num_rows))
            } else {
                result.columns.insert(slug.clone(), column.clone());
                continue;
            };

            rebinding.record(column, &renamed);
            result
                .columns
                .insert(renamed.slug().to_string(), renamed);
        }
        Ok(result)
    }
}

/// Columns of a store paired with the columns replacing them in a derived store.
///
/// Derived columns are matched to their inputs by identity, not by slug,
/// so a column that later takes over the slug of a dependency never becomes an input.
#[derive(Debug, Default)]
struct Rebinding {
    replaced: Vec<(Arc<Column>, Arc<Column>)>,
}

impl Rebinding {
    fn record(&mut self, original: &Arc<Column>, replacement: &Arc<Column>) {
        self.replaced.push((original.clone(), replacement.clone()));
    }

    fn replacement(&self, original: &Arc<Column>) -> Option<&Arc<Column>> {
        self.replaced
            .iter()
            .find(|(candidate, _)| Arc::ptr_eq(candidate, original))
            .map(|(_, replacement)| replacement)
    }

    /// New inputs of a derived column, if every one of its inputs was replaced.
    fn complete(&self, column: &Column) -> Option<Vec<Arc<Column>>> {
        column
            .inputs()?
            .iter()
            .map(|input| self.replacement(input).cloned())
            .collect()
    }

    /// New inputs of a derived column, if at least one of its inputs was replaced.
    fn partial(&self, column: &Column) -> Option<Vec<Arc<Column>>> {
        let inputs = column.inputs()?;
        if !inputs.iter().any(|input| self.replacement(input).is_some()) {
            return None;
        }

        Some(
            inputs
                .iter()
                .map(|input| self.replacement(input).unwrap_or(input).clone())
                .collect(),
        )
    }
}
