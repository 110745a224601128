//! Row views over the column-major storage of a table.

use std::sync::Arc;

use crate::{columnar::column_store::ColumnStore, datavalues::CellValue};

/// The cells of all columns of a table, fetched once for row-wise access.
#[derive(Debug, Clone)]
pub struct Rows {
    columns: Vec<(String, Arc<[CellValue]>)>,
    num_rows: usize,
}

impl Rows {
    pub(crate) fn new(store: &ColumnStore) -> Self {
        Self {
            columns: store
                .columns()
                .map(|column| (column.slug().to_string(), column.values()))
                .collect(),
            num_rows: store.num_rows(),
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.num_rows
    }

    /// Return `true` if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    /// Return the row at the given position.
    pub fn get(&self, index: usize) -> Option<Row<'_>> {
        (index < self.num_rows).then_some(Row { rows: self, index })
    }

    /// Iterate over all rows in order.
    pub fn iter(&self) -> impl Iterator<Item = Row<'_>> {
        (0..self.num_rows).map(move |index| Row { rows: self, index })
    }
}

/// A row of a table: one cell per column, at a shared position.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    rows: &'a Rows,
    index: usize,
}

impl<'a> Row<'a> {
    /// Position of this row in its table.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Cell of the column with the given slug.
    pub fn get(&self, slug: &str) -> Option<&'a CellValue> {
        self.rows
            .columns
            .iter()
            .find(|(column, _)| column == slug)
            .map(|(_, values)| &values[self.index])
    }

    /// Numeric content of the given column, if present.
    pub fn number(&self, slug: &str) -> Option<f64> {
        self.get(slug).and_then(CellValue::as_number)
    }

    /// String content of the given column, if present.
    pub fn text(&self, slug: &str) -> Option<&'a str> {
        self.get(slug).and_then(CellValue::as_text)
    }

    /// Pairs of slug and cell, in column order.
    pub fn cells(&self) -> impl Iterator<Item = (&'a str, &'a CellValue)> + 'a {
        let index = self.index;
        self.rows
            .columns
            .iter()
            .map(move |(slug, values)| (slug.as_str(), &values[index]))
    }

    /// All cells of this row, in column order.
    pub fn to_vec(&self) -> Vec<CellValue> {
        self.cells().map(|(_, value)| value.clone()).collect()
    }
}
