//! This module records how a [Table] was derived from other tables.

use std::fmt;

use ascii_tree::{write_tree, Tree};
use strum_macros::{Display, EnumString};

use super::table::Table;

/// Kind of operation that produced a table.
#[derive(Debug, Display, EnumString, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformType {
    /// Table was read from input
    Load,
    /// Table combines the rows of two tables by key
    Concat,
    /// Rows were removed
    FilterRows,
    /// Rows were reordered
    SortRows,
    /// Rows were added
    AppendRows,
    /// Cells of existing rows were replaced
    UpdateRows,
    /// Columns were removed or reordered
    FilterColumns,
    /// Columns were added or replaced
    AppendColumns,
    /// Column metadata changed
    UpdateColumnDefs,
    /// Columns were renamed
    RenameColumns,
}

/// Diagnostic record attached to a derived [Table].
///
/// Provenance is informational only; no operation reads it.
#[derive(Clone)]
pub struct Provenance {
    kind: TransformType,
    description: String,
    step_name: Option<String>,
    inputs: Vec<Table>,
}

impl Provenance {
    pub(crate) fn new(kind: TransformType, description: String, inputs: Vec<Table>) -> Self {
        Self {
            kind,
            description,
            step_name: None,
            inputs,
        }
    }

    pub(crate) fn with_step_name(mut self, step_name: String) -> Self {
        self.step_name = Some(step_name);
        self
    }

    /// Kind of the operation.
    pub fn kind(&self) -> TransformType {
        self.kind
    }

    /// Human readable description of the operation.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Name of the pipeline step that ran the operation, if any.
    pub fn step_name(&self) -> Option<&str> {
        self.step_name.as_deref()
    }

    /// Tables the operation was applied to.
    /// The first one is the receiver; joins list the other side as second input.
    pub fn inputs(&self) -> &[Table] {
        &self.inputs
    }
}

impl fmt::Debug for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provenance")
            .field("kind", &self.kind)
            .field("description", &self.description)
            .field("step_name", &self.step_name)
            .field("inputs", &self.inputs.len())
            .finish()
    }
}

/// Rendering of the provenance of a table as a tree, newest operation at the root.
#[derive(Debug, Clone, Copy)]
pub struct Explanation<'a> {
    table: &'a Table,
}

impl<'a> Explanation<'a> {
    pub(crate) fn new(table: &'a Table) -> Self {
        Self { table }
    }
}

fn label(table: &Table) -> String {
    let shape = format!("{} rows, {} columns", table.num_rows(), table.num_columns());
    let Some(provenance) = table.provenance() else {
        return format!("Table ({shape})");
    };

    let mut result = match provenance.step_name() {
        Some(step) => format!("{} [{step}]", provenance.kind()),
        None => provenance.kind().to_string(),
    };
    if !provenance.description().is_empty() {
        result.push_str(": ");
        result.push_str(provenance.description());
    }
    result.push_str(&format!(" ({shape}"));

    if let Some(input) = provenance.inputs().first() {
        let dropped = input.num_rows().saturating_sub(table.num_rows());
        if dropped > 0 {
            result.push_str(&format!(", {dropped} rows dropped"));
        }
    }
    result.push(')');

    result
}

fn provenance_tree(table: &Table) -> Tree {
    let children = table
        .provenance()
        .map(|provenance| provenance.inputs().iter().map(provenance_tree).collect())
        .unwrap_or_default();

    Tree::Node(label(table), children)
}

impl fmt::Display for Explanation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut output = String::new();
        write_tree(&mut output, &provenance_tree(self.table))?;
        write!(f, "{output}")
    }
}
