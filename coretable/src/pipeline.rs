//! This module defines the [Pipeline], a named sequence of table transformations,
//! and [TransformSpec], a serializable description of a single transformation.

use std::fmt::Debug;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::{
    columnar::{column::ComputeRule, column_def::ColumnDef, column_type::ColumnType},
    datavalues::{CellValue, MissingReason, Time},
    error::{Error, ReadingError},
    permutator::SortOrder,
    tabular::table::Table,
    tolerance::ToleranceStrategy,
};

/// Function implementing a single step of a [Pipeline].
pub type StepFn = dyn Fn(&Table) -> Result<Table, Error> + Send + Sync;

struct Step {
    name: String,
    function: Box<StepFn>,
}

impl Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step").field("name", &self.name).finish()
    }
}

/// A sequence of named steps, each turning a table into a new table.
///
/// Steps are applied strictly left to right.
/// The first failing step aborts the pipeline and its error is returned unchanged.
#[derive(Debug, Default)]
pub struct Pipeline {
    steps: Vec<Step>,
}

impl Pipeline {
    /// Create an empty [Pipeline], which returns its input unchanged.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step with the given name.
    pub fn step<S, F>(mut self, name: S, function: F) -> Self
    where
        S: Into<String>,
        F: Fn(&Table) -> Result<Table, Error> + Send + Sync + 'static,
    {
        self.steps.push(Step {
            name: name.into(),
            function: Box::new(function),
        });
        self
    }

    /// Append the transformation described by `spec`.
    pub fn transform(self, spec: TransformSpec) -> Self {
        let name = spec.to_string();
        self.step(name, move |table| spec.apply(table))
    }

    /// Create a [Pipeline] from transformation descriptions.
    pub fn from_specs<I: IntoIterator<Item = TransformSpec>>(specs: I) -> Self {
        specs.into_iter().fold(Self::new(), Self::transform)
    }

    /// Create a [Pipeline] from a JSON array of transformation descriptions.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let specs: Vec<TransformSpec> =
            serde_json::from_str(json).map_err(ReadingError::Json)?;
        Ok(Self::from_specs(specs))
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Return `true` if the pipeline has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Names of the steps, in order of application.
    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|step| step.name.as_str())
    }

    /// Apply all steps to `table`.
    pub fn run(&self, table: &Table) -> Result<Table, Error> {
        let mut current = table.clone();

        for (number, step) in self.steps.iter().enumerate() {
            log::info!("step {}/{}: {}", number + 1, self.steps.len(), step.name);

            let rows_before = current.num_rows();
            current = match (step.function)(&current) {
                Ok(result) => result.with_step_name(&step.name),
                Err(err) => {
                    log::warn!("step `{}` failed: {err}", step.name);
                    return Err(err);
                }
            };
            log::debug!(
                "step `{}`: {rows_before} -> {} rows",
                step.name,
                current.num_rows()
            );
        }

        Ok(current)
    }
}

/// Serializable description of a table transformation.
///
/// In JSON, the transformation is selected by the `op` field, e.g.
/// `{"op": "timeRange", "start": 2000, "end": 2010}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TransformSpec {
    /// Keep only the rows of the given entities
    FilterEntities {
        /// Names of the entities to keep
        entities: Vec<String>,
    },
    /// Keep only the rows within a time range, sorted by time
    TimeRange {
        /// First time to keep
        #[serde(default)]
        start: Option<Time>,
        /// Last time to keep
        #[serde(default)]
        end: Option<Time>,
    },
    /// Keep, per entity and target time, the closest row within the tolerance
    TargetTimes {
        /// Requested times
        times: Vec<Time>,
        /// Maximal distance between a requested and an available time
        #[serde(default)]
        tolerance: Time,
    },
    /// Fill missing cells from nearby observations of the same entity
    Interpolate {
        /// Column to fill
        column: String,
        /// Maximal distance to the observation that is used;
        /// defaults to the tolerance declared for the column
        #[serde(default)]
        tolerance: Option<Time>,
        /// Directions in which observations may be used
        #[serde(default)]
        strategy: Option<ToleranceStrategy>,
    },
    /// Fill missing cells by linear interpolation
    InterpolateLinear {
        /// Column to fill
        column: String,
        /// Whether cells outside the observed range are filled with the closest observation
        #[serde(default)]
        extrapolate: bool,
    },
    /// Sort the rows by a column
    Sort {
        /// Column to sort by
        column: String,
        /// Direction of the sort
        #[serde(default)]
        order: SortOrder,
    },
    /// Keep only the given columns, in the given order
    SelectColumns {
        /// Columns to keep
        columns: Vec<String>,
    },
    /// Remove the given columns
    DropColumns {
        /// Columns to remove
        columns: Vec<String>,
    },
    /// Rename a column
    RenameColumn {
        /// Current slug
        from: String,
        /// New slug
        to: String,
    },
    /// Drop rows that are missing a value in any of the given columns
    DropMissing {
        /// Columns that must have a value
        columns: Vec<String>,
    },
    /// Drop entities that have no value at all in one of the given columns
    DropEntitiesWithoutData {
        /// Columns in which every kept entity has at least one value
        columns: Vec<String>,
    },
    /// Keep only the first and the last row of each entity
    KeepMinAndMaxTime,
    /// Add placeholder rows so that every entity has a row for every time
    CompleteEntityTime,
    /// Replace a column by each entity's share of the total at the same time
    PercentageOfTime {
        /// Column to convert
        column: String,
    },
    /// Replace columns by their share of the absolute sum of these columns in the same row
    PercentageOfRow {
        /// Columns to convert
        columns: Vec<String>,
    },
    /// Replace columns by their growth since a start time
    TotalGrowth {
        /// Time of the values growth is measured against
        start_time: Time,
        /// Columns to convert
        columns: Vec<String>,
    },
    /// Reduce the table to one row per entity with the average annual change of the columns
    AverageAnnualChange {
        /// Columns to convert
        columns: Vec<String>,
    },
    /// Pair the observations of two columns by closest time, within their tolerances
    MatchClosestTimes {
        /// Column whose times are matched to the rows
        first: String,
        /// Column paired with the first
        second: String,
    },
    /// Add, or replace, a column computed row-wise from numeric columns
    Synthesize {
        /// Slug of the new column
        column: String,
        /// How the inputs of a row are combined
        operation: Operation,
        /// Columns read by the operation, in order
        inputs: Vec<String>,
    },
}

/// Row-wise arithmetic of a synthesized column.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Operation {
    /// Sum of all inputs
    Sum,
    /// First input minus all others
    Difference,
    /// Product of all inputs
    Product,
    /// First input divided by the product of all others
    Ratio,
}

impl Operation {
    /// Combine the numeric inputs of one row.
    pub fn evaluate(&self, inputs: &[f64]) -> CellValue {
        let Some((&first, rest)) = inputs.split_first() else {
            return CellValue::Missing(MissingReason::InvalidComputation);
        };

        match self {
            Operation::Sum => CellValue::from(inputs.iter().sum::<f64>()),
            Operation::Difference => CellValue::from(first - rest.iter().sum::<f64>()),
            Operation::Product => CellValue::from(inputs.iter().product::<f64>()),
            Operation::Ratio => match rest.iter().product::<f64>() {
                divisor if divisor == 0.0 => CellValue::Missing(MissingReason::DivideByZero),
                divisor => CellValue::from(first / divisor),
            },
        }
    }

    fn rule(self, inputs: &[String]) -> ComputeRule {
        ComputeRule::new(inputs.to_vec(), move |cells| {
            match cells.iter().map(|cell| cell.as_number()).collect::<Option<Vec<_>>>() {
                Some(numbers) => self.evaluate(&numbers),
                None => CellValue::Missing(MissingReason::InvalidComputation),
            }
        })
    }
}

impl TransformSpec {
    /// Apply the described transformation to `table`.
    pub fn apply(&self, table: &Table) -> Result<Table, Error> {
        match self {
            TransformSpec::FilterEntities { entities } => {
                table.filter_by_entity_names(&as_strs(entities))
            }
            TransformSpec::TimeRange { start, end } => table.filter_by_time_range(*start, *end),
            TransformSpec::TargetTimes { times, tolerance } => {
                table.filter_by_target_times(times, *tolerance)
            }
            TransformSpec::Interpolate {
                column,
                tolerance,
                strategy,
            } => table.interpolate_column_with_tolerance(column, *tolerance, *strategy),
            TransformSpec::InterpolateLinear {
                column,
                extrapolate,
            } => table.interpolate_column_linearly(column, *extrapolate),
            TransformSpec::Sort { column, order } => table.sort_by(column, *order),
            TransformSpec::SelectColumns { columns } => table.select_columns(&as_strs(columns)),
            TransformSpec::DropColumns { columns } => table.drop_columns(&as_strs(columns)),
            TransformSpec::RenameColumn { from, to } => {
                table.rename_columns(&[(from.as_str(), to.as_str())])
            }
            TransformSpec::DropMissing { columns } => {
                table.drop_rows_with_missing_values_for_any_column(&as_strs(columns))
            }
            TransformSpec::DropEntitiesWithoutData { columns } => {
                table.drop_entities_without_data_in_some_column(&as_strs(columns))
            }
            TransformSpec::KeepMinAndMaxTime => table.keep_min_time_and_max_time_for_each_entity_only(),
            TransformSpec::CompleteEntityTime => table.complete_entity_time(),
            TransformSpec::PercentageOfTime { column } => {
                table.to_percentage_from_each_entity_for_each_time(column)
            }
            TransformSpec::PercentageOfRow { columns } => {
                table.to_percentage_from_each_column_for_each_entity_and_time(&as_strs(columns))
            }
            TransformSpec::TotalGrowth {
                start_time,
                columns,
            } => table.to_total_growth_for_each_column_compared_to_start_time(
                *start_time,
                &as_strs(columns),
            ),
            TransformSpec::AverageAnnualChange { columns } => {
                table.to_average_annual_change_for_each_entity(&as_strs(columns))
            }
            TransformSpec::MatchClosestTimes { first, second } => {
                table.interpolate_columns_by_closest_time_match(first, second)
            }
            TransformSpec::Synthesize {
                column,
                operation,
                inputs,
            } => {
                if inputs.is_empty() {
                    return Err(Error::InvalidTransform(format!(
                        "no inputs to synthesize `{column}` from"
                    )));
                }
                table.with_column(
                    ColumnDef::typed(column.clone(), ColumnType::Numeric),
                    operation.rule(inputs),
                )
            }
        }
    }
}

impl std::fmt::Display for TransformSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransformSpec::FilterEntities { entities } => {
                write!(f, "filter entities {}", entities.iter().join(", "))
            }
            TransformSpec::TimeRange { start, end } => write!(
                f,
                "time range {}..{}",
                start.map(|time| time.to_string()).unwrap_or_default(),
                end.map(|time| time.to_string()).unwrap_or_default()
            ),
            TransformSpec::TargetTimes { times, tolerance } => write!(
                f,
                "target times {} (tolerance {tolerance})",
                times.iter().join(", ")
            ),
            TransformSpec::Interpolate { column, .. } => write!(f, "interpolate {column}"),
            TransformSpec::InterpolateLinear { column, .. } => {
                write!(f, "interpolate {column} linearly")
            }
            TransformSpec::Sort { column, order } => write!(f, "sort by {column} {order}"),
            TransformSpec::SelectColumns { columns } => {
                write!(f, "select columns {}", columns.iter().join(", "))
            }
            TransformSpec::DropColumns { columns } => {
                write!(f, "drop columns {}", columns.iter().join(", "))
            }
            TransformSpec::RenameColumn { from, to } => write!(f, "rename {from} to {to}"),
            TransformSpec::DropMissing { columns } => {
                write!(f, "drop rows missing {}", columns.iter().join(", "))
            }
            TransformSpec::DropEntitiesWithoutData { columns } => {
                write!(f, "drop entities without {}", columns.iter().join(", "))
            }
            TransformSpec::KeepMinAndMaxTime => write!(f, "keep min and max time"),
            TransformSpec::CompleteEntityTime => write!(f, "complete entity time"),
            TransformSpec::PercentageOfTime { column } => {
                write!(f, "percentage of time total of {column}")
            }
            TransformSpec::PercentageOfRow { columns } => {
                write!(f, "percentage of row total of {}", columns.iter().join(", "))
            }
            TransformSpec::TotalGrowth {
                start_time,
                columns,
            } => write!(f, "growth of {} since {start_time}", columns.iter().join(", ")),
            TransformSpec::AverageAnnualChange { columns } => {
                write!(f, "average annual change of {}", columns.iter().join(", "))
            }
            TransformSpec::MatchClosestTimes { first, second } => {
                write!(f, "match closest times of {first} and {second}")
            }
            TransformSpec::Synthesize {
                column,
                operation,
                inputs,
            } => write!(
                f,
                "synthesize {column} as {operation} of {}",
                inputs.iter().join(", ")
            ),
        }
    }
}

fn as_strs(strings: &[String]) -> Vec<&str> {
    strings.iter().map(String::as_str).collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tabular::provenance::TransformType;
    use test_log::test;

    fn table() -> Table {
        Table::from_delimited(
            "entity,year,gdp\n\
             France,2000,100\n\
             Germany,2000,200\n\
             France,2001,\n\
             Germany,2001,210\n\
             Italy,2001,50\n",
        )
        .expect("valid input")
    }

    #[test]
    fn empty_pipeline_is_identity() {
        let table = table();
        assert_eq!(Pipeline::new().run(&table).expect("ok"), table);
    }

    #[test]
    fn steps_run_left_to_right() {
        let pipeline = Pipeline::new()
            .step("germany and france", |table| {
                table.filter_by_entity_names(&["France", "Germany"])
            })
            .step("drop missing gdp", |table| {
                table.drop_rows_with_missing_values_for_column("gdp")
            })
            .step("by gdp", |table| table.sort_by("gdp", SortOrder::Desc));

        let result = pipeline.run(&table()).expect("ok");
        assert_eq!(
            &*result.get_values("gdp").expect("exists"),
            &[
                CellValue::Number(210.0),
                CellValue::Number(200.0),
                CellValue::Number(100.0)
            ]
        );

        let provenance = result.provenance().expect("derived");
        assert_eq!(provenance.kind(), TransformType::SortRows);
        assert_eq!(provenance.step_name(), Some("by gdp"));
        assert_eq!(result.ancestry().len(), 4);
        assert!(result.explain().to_string().contains("1 rows dropped"));
    }

    #[test]
    fn failing_step_aborts() {
        let pipeline = Pipeline::new()
            .step("unknown", |table| table.select_columns(&["population"]))
            .step("unreachable", |_| {
                panic!("steps after a failing step must not run")
            });

        assert!(matches!(
            pipeline.run(&table()),
            Err(Error::UnknownColumn(slug)) if slug == "population"
        ));
    }

    #[test]
    fn pipeline_from_json() {
        let pipeline = Pipeline::from_json(
            r#"[
                {"op": "timeRange", "start": 2001},
                {"op": "dropMissing", "columns": ["gdp"]},
                {"op": "sort", "column": "gdp", "order": "desc"},
                {"op": "renameColumn", "from": "gdp", "to": "output"},
                {"op": "keepMinAndMaxTime"}
            ]"#,
        )
        .expect("valid pipeline");

        assert_eq!(pipeline.len(), 5);
        assert_eq!(
            pipeline.step_names().collect::<Vec<_>>(),
            vec![
                "time range 2001..",
                "drop rows missing gdp",
                "sort by gdp desc",
                "rename gdp to output",
                "keep min and max time",
            ]
        );

        let result = pipeline.run(&table()).expect("ok");
        assert_eq!(result.column_slugs(), vec!["entity", "year", "output"]);
        assert_eq!(result.available_entity_names(), ["Germany", "Italy"]);
    }

    #[test]
    fn specs_round_trip_through_json() {
        let spec = TransformSpec::Interpolate {
            column: "gdp".to_string(),
            tolerance: Some(2),
            strategy: Some(ToleranceStrategy::Backwards),
        };
        let json = serde_json::to_string(&spec).expect("serializable");
        assert_eq!(
            json,
            r#"{"op":"interpolate","column":"gdp","tolerance":2,"strategy":"backwards"}"#
        );
        assert_eq!(
            serde_json::from_str::<TransformSpec>(&json).expect("valid"),
            spec
        );
    }

    #[test]
    fn synthesis_steps_from_json() {
        let pipeline = Pipeline::from_json(
            r#"[
                {"op": "percentageOfTime", "column": "gdp"},
                {"op": "percentageOfRow", "columns": ["gdp"]},
                {"op": "totalGrowth", "startTime": 2000, "columns": ["gdp"]},
                {"op": "averageAnnualChange", "columns": ["gdp"]},
                {"op": "matchClosestTimes", "first": "gdp", "second": "pop"},
                {"op": "synthesize", "column": "total", "operation": "sum", "inputs": ["gdp", "pop"]}
            ]"#,
        )
        .expect("valid pipeline");

        assert_eq!(
            pipeline.step_names().collect::<Vec<_>>(),
            vec![
                "percentage of time total of gdp",
                "percentage of row total of gdp",
                "growth of gdp since 2000",
                "average annual change of gdp",
                "match closest times of gdp and pop",
                "synthesize total as sum of gdp, pop",
            ]
        );
    }

    #[test]
    fn shares_of_time_total() {
        let pipeline = Pipeline::from_specs([
            TransformSpec::PercentageOfTime {
                column: "gdp".to_string(),
            },
            TransformSpec::DropMissing {
                columns: vec!["gdp".to_string()],
            },
        ]);

        let result = pipeline.run(&table()).expect("ok");
        let gdp = result.get("gdp").expect("exists").numbers();
        assert_eq!(gdp.len(), 4);
        // 2000: France and Germany, 2001: Germany and Italy
        assert!((gdp[0] + gdp[1] - 100.0).abs() < 1e-9);
        assert!((gdp[2] + gdp[3] - 100.0).abs() < 1e-9);
        assert!((gdp[0] - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn synthesized_column() {
        let table = Table::from_delimited(
            "entity,year,gdp,pop\n\
             France,2000,100,4\n\
             Germany,2000,200,0\n\
             Italy,2000,,5\n",
        )
        .expect("valid input");
        let spec: TransformSpec = serde_json::from_str(
            r#"{"op": "synthesize", "column": "gdpPerCapita", "operation": "ratio", "inputs": ["gdp", "pop"]}"#,
        )
        .expect("valid spec");
        assert_eq!(spec.to_string(), "synthesize gdpPerCapita as ratio of gdp, pop");

        let result = spec.apply(&table).expect("inputs exist");
        let column = result.get("gdpPerCapita").expect("added");
        assert!(column.is_derived());
        assert_eq!(column.column_type(), ColumnType::Numeric);
        assert_eq!(
            &*column.values(),
            &[
                CellValue::Number(25.0),
                CellValue::Missing(MissingReason::DivideByZero),
                CellValue::Missing(MissingReason::InvalidComputation),
            ]
        );

        let without_inputs = TransformSpec::Synthesize {
            column: "nothing".to_string(),
            operation: Operation::Sum,
            inputs: Vec::new(),
        };
        assert!(matches!(
            without_inputs.apply(&table),
            Err(Error::InvalidTransform(_))
        ));
    }

    #[test]
    fn operations() {
        assert_eq!(Operation::Sum.evaluate(&[1.0, 2.0, 3.0]), CellValue::Number(6.0));
        assert_eq!(Operation::Difference.evaluate(&[10.0, 2.0, 3.0]), CellValue::Number(5.0));
        assert_eq!(Operation::Product.evaluate(&[2.0, 3.0]), CellValue::Number(6.0));
        assert_eq!(Operation::Ratio.evaluate(&[9.0, 3.0]), CellValue::Number(3.0));
        assert_eq!(
            Operation::Ratio.evaluate(&[9.0, 0.0]),
            CellValue::Missing(MissingReason::DivideByZero)
        );
        assert_eq!(Operation::Ratio.evaluate(&[9.0]), CellValue::Number(9.0));
    }

    #[test]
    fn invalid_pipeline_json() {
        assert!(matches!(
            Pipeline::from_json(r#"[{"op": "explode"}]"#),
            Err(Error::Reading(ReadingError::Json(_)))
        ));
    }
}
