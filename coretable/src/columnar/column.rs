//! This module defines [Column], the typed sequence of cells of one column,
//! and [ComputeRule], which describes derived columns.

use std::{fmt::Debug, sync::Arc};

use hashbrown::{HashMap, HashSet};
use once_cell::sync::OnceCell;

use crate::{
    columnar::{column_def::ColumnDef, column_type::ColumnType},
    datavalues::{CellValue, MissingReason},
};

/// Signature of the function computing one cell of a derived column
/// from the same-row cells of its dependencies.
pub type ComputeFn = dyn Fn(&[&CellValue]) -> CellValue + Send + Sync;

/// Pure function of other columns' same-row values.
#[derive(Clone)]
pub struct ComputeRule {
    dependencies: Vec<String>,
    function: Arc<ComputeFn>,
}

impl ComputeRule {
    /// Create a new [ComputeRule].
    ///
    /// `function` receives the cells of the `dependencies`, in the given order.
    pub fn new<I, S, F>(dependencies: I, function: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&[&CellValue]) -> CellValue + Send + Sync + 'static,
    {
        Self {
            dependencies: dependencies.into_iter().map(Into::into).collect(),
            function: Arc::new(function),
        }
    }

    /// Create a [ComputeRule] over numeric dependencies.
    ///
    /// Rows in which any dependency is not a number yield a missing cell.
    pub fn numeric<I, S, F>(dependencies: I, function: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        Self::new(dependencies, move |inputs| {
            let numbers = inputs
                .iter()
                .map(|value| value.as_number())
                .collect::<Option<Vec<f64>>>();

            match numbers {
                Some(numbers) => CellValue::from(function(&numbers)),
                None => CellValue::Missing(MissingReason::InvalidComputation),
            }
        })
    }

    /// Slugs of the columns this rule reads.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// The same function, reading its inputs from the given slugs.
    fn with_dependencies(&self, dependencies: Vec<String>) -> Self {
        Self {
            dependencies,
            function: self.function.clone(),
        }
    }

    fn evaluate(&self, inputs: &[&CellValue]) -> CellValue {
        (self.function)(inputs)
    }
}

impl Debug for ComputeRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeRule")
            .field("dependencies", &self.dependencies)
            .field("function", &"<fn>")
            .finish()
    }
}

/// Where the cells of a new column come from.
#[derive(Debug, Clone)]
pub enum ColumnSource {
    /// One cell per row
    Values(Vec<CellValue>),
    /// Cells are derived from other columns
    Rule(ComputeRule),
}

impl From<Vec<CellValue>> for ColumnSource {
    fn from(values: Vec<CellValue>) -> Self {
        Self::Values(values)
    }
}

impl From<ComputeRule> for ColumnSource {
    fn from(rule: ComputeRule) -> Self {
        Self::Rule(rule)
    }
}

/// Derived column bound to the columns it was computed from.
#[derive(Debug, Clone)]
struct DerivedData {
    rule: ComputeRule,
    inputs: Vec<Arc<Column>>,
    len: usize,
    memo: OnceCell<Arc<[CellValue]>>,
}

#[derive(Debug, Clone)]
enum ColumnData {
    Stored(Arc<[CellValue]>),
    Derived(DerivedData),
}

/// A column of a table.
///
/// Columns are never modified after construction.
/// Stored cells are shared between tables; derived cells are computed on first access
/// and cached for the lifetime of this column.
#[derive(Debug, Clone)]
pub struct Column {
    def: ColumnDef,
    column_type: ColumnType,
    data: ColumnData,
}

impl Column {
    /// Create a column from cells that are brought into the representation of `column_type`.
    pub(crate) fn stored(mut def: ColumnDef, column_type: ColumnType, values: Vec<CellValue>) -> Self {
        def.column_type = Some(column_type);
        let values = values
            .into_iter()
            .map(|value| column_type.coerce(value))
            .collect::<Arc<[CellValue]>>();

        Self {
            def,
            column_type,
            data: ColumnData::Stored(values),
        }
    }

    /// Create a column from cells that are already known to match `column_type`.
    pub(crate) fn from_shared(mut def: ColumnDef, column_type: ColumnType, values: Arc<[CellValue]>) -> Self {
        def.column_type = Some(column_type);
        Self {
            def,
            column_type,
            data: ColumnData::Stored(values),
        }
    }

    /// Create a derived column bound to the given input columns.
    ///
    /// `inputs` must correspond to the dependencies of `rule`.
    pub(crate) fn derived(
        mut def: ColumnDef,
        column_type: ColumnType,
        rule: ComputeRule,
        inputs: Vec<Arc<Column>>,
        len: usize,
    ) -> Self {
        debug_assert_eq!(rule.dependencies().len(), inputs.len());
        def.column_type = Some(column_type);
        Self {
            def,
            column_type,
            data: ColumnData::Derived(DerivedData {
                rule,
                inputs,
                len,
                memo: OnceCell::new(),
            }),
        }
    }

    /// Return the slug of this column.
    pub fn slug(&self) -> &str {
        &self.def.slug
    }

    /// Return the metadata of this column.
    pub fn def(&self) -> &ColumnDef {
        &self.def
    }

    /// Return the declared type of this column.
    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    /// Name used for display.
    pub fn display_name(&self) -> &str {
        self.def.display_name()
    }

    /// Returns the number of cells in the column.
    pub fn len(&self) -> usize {
        match &self.data {
            ColumnData::Stored(values) => values.len(),
            ColumnData::Derived(derived) => derived.len,
        }
    }

    /// Returns true iff the column is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return `true` if this column is computed from other columns.
    pub fn is_derived(&self) -> bool {
        matches!(self.data, ColumnData::Derived(_))
    }

    /// Return the slugs this column is computed from, if it is derived.
    pub fn dependencies(&self) -> Option<&[String]> {
        match &self.data {
            ColumnData::Stored(_) => None,
            ColumnData::Derived(derived) => Some(derived.rule.dependencies()),
        }
    }

    /// Return the [ComputeRule] of a derived column.
    pub fn rule(&self) -> Option<&ComputeRule> {
        match &self.data {
            ColumnData::Stored(_) => None,
            ColumnData::Derived(derived) => Some(&derived.rule),
        }
    }

    /// Return all cells of this column, including missing ones.
    ///
    /// For derived columns, the first call evaluates the rule for every row;
    /// later calls return the cached cells.
    pub fn values(&self) -> Arc<[CellValue]> {
        match &self.data {
            ColumnData::Stored(values) => values.clone(),
            ColumnData::Derived(derived) => derived
                .memo
                .get_or_init(|| self.compute(derived))
                .clone(),
        }
    }

    fn compute(&self, derived: &DerivedData) -> Arc<[CellValue]> {
        log::trace!(
            "computing derived column `{}` from {:?}",
            self.slug(),
            derived.rule.dependencies()
        );

        let inputs = derived
            .inputs
            .iter()
            .map(|column| column.values())
            .collect::<Vec<_>>();
        let mut row = Vec::with_capacity(inputs.len());

        (0..derived.len)
            .map(|index| {
                row.clear();
                row.extend(inputs.iter().map(|values| &values[index]));
                self.column_type.coerce(derived.rule.evaluate(&row))
            })
            .collect()
    }

    /// Return the cell at the given row, if it exists.
    pub fn value(&self, index: usize) -> Option<CellValue> {
        self.values().get(index).cloned()
    }

    /// Return all cells that are not missing.
    pub fn valid_values(&self) -> Vec<CellValue> {
        self.values()
            .iter()
            .filter(|value| value.is_present())
            .cloned()
            .collect()
    }

    /// Return all numeric cells.
    pub fn numbers(&self) -> Vec<f64> {
        self.values().iter().filter_map(CellValue::as_number).collect()
    }

    /// Number of cells that are not missing.
    pub fn num_values(&self) -> usize {
        self.values().iter().filter(|value| value.is_present()).count()
    }

    /// Number of missing cells.
    pub fn num_missing(&self) -> usize {
        self.len() - self.num_values()
    }

    /// Number of missing cells, per reason.
    pub fn missing_by_reason(&self) -> HashMap<MissingReason, usize> {
        let mut result = HashMap::new();
        for reason in self.values().iter().filter_map(CellValue::missing_reason) {
            *result.entry(reason).or_insert(0) += 1;
        }
        result
    }

    /// Smallest number in this column.
    pub fn min(&self) -> Option<f64> {
        self.numbers().into_iter().reduce(f64::min)
    }

    /// Largest number in this column.
    pub fn max(&self) -> Option<f64> {
        self.numbers().into_iter().reduce(f64::max)
    }

    /// Sum of all numbers in this column; missing cells are skipped.
    pub fn sum(&self) -> f64 {
        self.numbers().into_iter().sum()
    }

    /// Mean of all numbers in this column; missing cells are skipped.
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> Option<f64> {
        let numbers = self.numbers();
        if numbers.is_empty() {
            None
        } else {
            Some(numbers.iter().sum::<f64>() / numbers.len() as f64)
        }
    }

    /// Distinct valid cells, in order of first appearance.
    pub fn uniq_values(&self) -> Vec<CellValue> {
        let mut seen = HashSet::new();
        self.values()
            .iter()
            .filter(|value| value.group_key().is_some_and(|key| seen.insert(key)))
            .cloned()
            .collect()
    }

    /// Render the cell at the given row for delimited output.
    pub fn format_value(&self, value: &CellValue) -> String {
        self.column_type.format(value)
    }

    /// Return the columns a derived column is bound to.
    pub(crate) fn inputs(&self) -> Option<&[Arc<Column>]> {
        match &self.data {
            ColumnData::Stored(_) => None,
            ColumnData::Derived(derived) => Some(derived.inputs.as_slice()),
        }
    }

    /// Return a column containing only the given rows, in the given order.
    ///
    /// Derived columns stay derived; their inputs are restricted in the same way.
    pub(crate) fn take(&self, indices: &[usize]) -> Column {
        let inputs: Vec<Arc<Column>> = self
            .inputs()
            .map(|inputs| {
                inputs
                    .iter()
                    .map(|input| Arc::new(input.take(indices)))
                    .collect()
            })
            .unwrap_or_default();
        self.take_bound(indices, inputs)
    }

    /// Like [Column::take], but a derived column is bound to `inputs`,
    /// which must already be restricted to `indices`. Stored columns ignore `inputs`.
    pub(crate) fn take_bound(&self, indices: &[usize], inputs: Vec<Arc<Column>>) -> Column {
        let data = match &self.data {
            ColumnData::Stored(values) => {
                ColumnData::Stored(indices.iter().map(|&index| values[index].clone()).collect())
            }
            ColumnData::Derived(derived) => {
                let memo = match derived.memo.get() {
                    Some(values) => OnceCell::with_value(
                        indices
                            .iter()
                            .map(|&index| values[index].clone())
                            .collect::<Arc<[CellValue]>>(),
                    ),
                    None => OnceCell::new(),
                };

                ColumnData::Derived(DerivedData {
                    rule: derived.rule.with_dependencies(slugs_of(&inputs)),
                    inputs,
                    len: indices.len(),
                    memo,
                })
            }
        };

        Column {
            def: self.def.clone(),
            column_type: self.column_type,
            data,
        }
    }

    /// Return a copy of this column with different metadata.
    pub(crate) fn with_def(&self, mut def: ColumnDef) -> Column {
        def.column_type = Some(self.column_type);
        Column {
            def,
            column_type: self.column_type,
            data: self.data.clone(),
        }
    }

    /// Return a derived column with the same rule, bound to new inputs.
    ///
    /// The rule reads from the slugs of the new inputs.
    /// Stored columns are returned unchanged.
    pub(crate) fn rebind(&self, inputs: Vec<Arc<Column>>, len: usize) -> Column {
        match &self.data {
            ColumnData::Stored(_) => self.clone(),
            ColumnData::Derived(derived) => Column::derived(
                self.def.clone(),
                self.column_type,
                derived.rule.with_dependencies(slugs_of(&inputs)),
                inputs,
                len,
            ),
        }
    }

    /// Return a stored column with the same metadata but different cells.
    pub(crate) fn with_values(&self, values: Vec<CellValue>) -> Column {
        Column::stored(self.def.clone(), self.column_type, values)
    }
}

fn slugs_of(columns: &[Arc<Column>]) -> Vec<String> {
    columns.iter().map(|column| column.slug().to_string()).collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use test_log::test;

    fn numbers(values: &[f64]) -> Vec<CellValue> {
        values.iter().copied().map(CellValue::from).collect()
    }

    #[test]
    fn aggregates_skip_missing() {
        let mut values = numbers(&[1.0, 2.0, 6.0]);
        values.push(CellValue::Missing(MissingReason::BlankButShouldBeNumber));
        let column = Column::stored(ColumnDef::new("gdp"), ColumnType::Numeric, values);

        assert_eq!(column.len(), 4);
        assert_eq!(column.num_values(), 3);
        assert_eq!(column.num_missing(), 1);
        assert_eq!(column.valid_values(), numbers(&[1.0, 2.0, 6.0]));
        assert_eq!(column.sum(), 9.0);
        assert_eq!(column.mean(), Some(3.0));
        assert_eq!(column.min(), Some(1.0));
        assert_eq!(column.max(), Some(6.0));
        assert_eq!(
            column
                .missing_by_reason()
                .get(&MissingReason::BlankButShouldBeNumber),
            Some(&1)
        );
    }

    #[test]
    fn derived_values_are_memoized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let input = Arc::new(Column::stored(
            ColumnDef::new("a"),
            ColumnType::Numeric,
            numbers(&[1.0, 2.0, 3.0]),
        ));
        let rule = ComputeRule::numeric(["a"], move |inputs| {
            counter.fetch_add(1, Ordering::SeqCst);
            inputs[0] * 10.0
        });
        let column = Column::derived(
            ColumnDef::new("b"),
            ColumnType::Numeric,
            rule,
            vec![input],
            3,
        );

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(&*column.values(), numbers(&[10.0, 20.0, 30.0]).as_slice());
        assert_eq!(&*column.values(), numbers(&[10.0, 20.0, 30.0]).as_slice());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn taking_rows_of_derived_column() {
        let input = Arc::new(Column::stored(
            ColumnDef::new("a"),
            ColumnType::Numeric,
            numbers(&[1.0, 2.0, 3.0]),
        ));
        let rule = ComputeRule::numeric(["a"], |inputs| inputs[0] + 1.0);
        let column = Column::derived(
            ColumnDef::new("b"),
            ColumnType::Numeric,
            rule,
            vec![input],
            3,
        );

        let taken = column.take(&[2, 0]);
        assert!(taken.is_derived());
        assert_eq!(&*taken.values(), numbers(&[4.0, 2.0]).as_slice());
    }

    #[test]
    fn rule_with_missing_input() {
        let input = Arc::new(Column::stored(
            ColumnDef::new("a"),
            ColumnType::Numeric,
            vec![
                CellValue::Number(1.0),
                CellValue::Missing(MissingReason::BlankButShouldBeNumber),
            ],
        ));
        let rule = ComputeRule::numeric(["a"], |inputs| inputs[0] * 2.0);
        let column = Column::derived(
            ColumnDef::new("b"),
            ColumnType::Numeric,
            rule,
            vec![input],
            2,
        );

        assert_eq!(
            &*column.values(),
            &[
                CellValue::Number(2.0),
                CellValue::Missing(MissingReason::InvalidComputation)
            ]
        );
    }

    #[test]
    fn uniq_values_in_order() {
        let column = Column::stored(
            ColumnDef::new("entity"),
            ColumnType::String,
            vec!["France".into(), "Germany".into(), "France".into()],
        );
        assert_eq!(
            column.uniq_values(),
            vec![CellValue::from("France"), CellValue::from("Germany")]
        );
    }
}
