//! Reading and writing of tables as JSON.
//!
//! Two shapes are accepted on input: an array of row objects
//! (`[{"entity": "France", "gdp": 100}, ...]`) and an object of column arrays
//! (`{"entity": ["France"], "gdp": [100]}`).
//! Output is always an array of row objects.

use serde_json::{Map, Number, Value};

use crate::{
    columnar::{column_store::ColumnStore, column_type::ColumnType},
    datavalues::{number_to_time, CellValue, MissingReason},
    error::{Error, ReadingError},
    tabular::{options::TableOptions, table::Table},
};

/// A row given as mapping from column slug to value.
pub type RowObject = Map<String, Value>;

/// Parse JSON text of either accepted shape into a [ColumnStore].
pub fn read_store(text: &str, options: &TableOptions) -> Result<ColumnStore, Error> {
    match serde_json::from_str::<Value>(text)? {
        Value::Array(rows) => {
            let rows = rows
                .into_iter()
                .enumerate()
                .map(|(index, row)| match row {
                    Value::Object(object) => Ok(object),
                    _ => Err(ReadingError::NotARowObject(index)),
                })
                .collect::<Result<Vec<_>, _>>()?;
            store_from_rows(&rows, options)
        }
        Value::Object(columns) => store_from_columns(&columns, options),
        _ => Err(ReadingError::UnsupportedJsonShape.into()),
    }
}

/// Build a [ColumnStore] from row objects.
///
/// Columns are ordered by first appearance. Keys absent from a row
/// yield [MissingReason::MissingValuePlaceholder].
pub fn store_from_rows(rows: &[RowObject], options: &TableOptions) -> Result<ColumnStore, Error> {
    let mut slugs: Vec<&str> = Vec::new();
    for row in rows {
        for slug in row.keys() {
            if !slugs.contains(&slug.as_str()) {
                slugs.push(slug);
            }
        }
    }

    let mut store = ColumnStore::with_num_rows(rows.len());
    for slug in slugs {
        let values = rows.iter().map(|row| row.get(slug)).collect::<Vec<_>>();
        add_json_column(&mut store, slug, &values, options)?;
    }
    Ok(store)
}

/// Build a [ColumnStore] from an object mapping slugs to arrays of values.
pub fn store_from_columns(columns: &Map<String, Value>, options: &TableOptions) -> Result<ColumnStore, Error> {
    let mut store = ColumnStore::new();
    for (slug, values) in columns {
        let Value::Array(values) = values else {
            return Err(ReadingError::UnsupportedJsonShape.into());
        };
        let values = values.iter().map(Some).collect::<Vec<_>>();
        add_json_column(&mut store, slug, &values, options)?;
    }
    Ok(store)
}

fn add_json_column(
    store: &mut ColumnStore,
    slug: &str,
    values: &[Option<&Value>],
    options: &TableOptions,
) -> Result<(), Error> {
    let def = options.def_for(slug);
    let column_type = def.column_type.unwrap_or_else(|| infer_json_type(slug, values));

    let cells = values
        .iter()
        .map(|value| json_to_cell(*value, column_type))
        .collect::<Vec<_>>();

    store.add_column(def.with_type(column_type), cells.into())
}

fn infer_json_type(slug: &str, values: &[Option<&Value>]) -> ColumnType {
    let present = values
        .iter()
        .flatten()
        .filter(|value| !value.is_null())
        .collect::<Vec<_>>();

    if ColumnType::from_well_known_slug(slug).is_none()
        && !present.is_empty()
        && present.iter().all(|value| value.is_boolean())
    {
        return ColumnType::Boolean;
    }

    let raw = present.iter().map(|value| raw_string(value)).collect::<Vec<_>>();
    ColumnType::infer(slug, raw.iter().map(String::as_str))
}

fn raw_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn json_to_cell(value: Option<&Value>, column_type: ColumnType) -> CellValue {
    match value {
        None => CellValue::Missing(MissingReason::MissingValuePlaceholder),
        Some(Value::Null) if column_type.is_numeric() => {
            CellValue::Missing(MissingReason::NullButShouldBeNumber)
        }
        Some(Value::Null) => CellValue::Missing(MissingReason::NullButShouldBeString),
        Some(Value::Number(number)) => match number.as_f64() {
            Some(number) => column_type.coerce(CellValue::from(number)),
            None => column_type.parse(&number.to_string()),
        },
        Some(Value::Bool(value)) => column_type.coerce(CellValue::Boolean(*value)),
        Some(other) => column_type.parse(&raw_string(other)),
    }
}

/// Convert a cell into a JSON value; missing cells become `null`.
pub fn cell_to_json(value: &CellValue, column_type: ColumnType) -> Value {
    match value {
        CellValue::Missing(_) => Value::Null,
        CellValue::Number(_) if column_type == ColumnType::Date => {
            Value::String(column_type.format(value))
        }
        CellValue::Number(number) => match number_to_time(*number) {
            Some(integer) if number.fract() == 0.0 => Value::Number(integer.into()),
            _ => Number::from_f64(*number).map_or(Value::Null, Value::Number),
        },
        CellValue::Text(text) => Value::String(text.clone()),
        CellValue::Boolean(value) => Value::Bool(*value),
    }
}

/// Serialize `table` as an array of row objects.
pub fn table_to_json(table: &Table) -> Value {
    let columns = table
        .columns()
        .map(|column| (column.slug(), column.column_type(), column.values()))
        .collect::<Vec<_>>();

    Value::Array(
        (0..table.num_rows())
            .map(|row| {
                Value::Object(
                    columns
                        .iter()
                        .map(|(slug, column_type, values)| {
                            (slug.to_string(), cell_to_json(&values[row], *column_type))
                        })
                        .collect(),
                )
            })
            .collect(),
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;
    use test_log::test;

    #[test]
    fn rows_with_absent_keys() {
        let store = read_store(
            r#"[{"entity": "France", "gdp": 100}, {"entity": "Germany", "pop": 5}]"#,
            &TableOptions::new(),
        )
        .expect("valid json");

        assert_eq!(store.slugs().collect::<Vec<_>>(), vec!["entity", "gdp", "pop"]);
        assert_eq!(store.num_rows(), 2);
        assert_eq!(
            store.get_values("gdp").expect("exists")[1],
            CellValue::Missing(MissingReason::MissingValuePlaceholder)
        );
        assert_eq!(
            store.get_values("pop").expect("exists")[1],
            CellValue::Number(5.0)
        );
    }

    #[test]
    fn column_object() {
        let store = read_store(
            r#"{"entity": ["France", "Germany"], "gdp": [100, null], "ok": [true, false]}"#,
            &TableOptions::new(),
        )
        .expect("valid json");

        assert_eq!(
            store.get_values("gdp").expect("exists")[1],
            CellValue::Missing(MissingReason::NullButShouldBeNumber)
        );
        assert_eq!(
            store.get_column("ok").expect("exists").column_type(),
            ColumnType::Boolean
        );
    }

    #[test]
    fn column_object_with_unequal_lengths() {
        let result = read_store(r#"{"a": [1, 2], "b": [1]}"#, &TableOptions::new());
        assert!(matches!(result, Err(Error::DimensionMismatch { .. })));
    }

    #[test]
    fn unsupported_shapes() {
        assert!(matches!(
            read_store("[1, 2]", &TableOptions::new()),
            Err(Error::Reading(ReadingError::NotARowObject(0)))
        ));
        assert!(matches!(
            read_store("42", &TableOptions::new()),
            Err(Error::Reading(ReadingError::UnsupportedJsonShape))
        ));
        assert!(matches!(
            read_store("[{", &TableOptions::new()),
            Err(Error::Reading(ReadingError::Json(_)))
        ));
    }

    #[test]
    fn cells_to_json() {
        assert_eq!(
            cell_to_json(&CellValue::Number(2000.0), ColumnType::Year),
            json!(2000)
        );
        assert_eq!(
            cell_to_json(&CellValue::Number(2.5), ColumnType::Numeric),
            json!(2.5)
        );
        assert_eq!(
            cell_to_json(&CellValue::Number(0.0), ColumnType::Date),
            json!("1970-01-01")
        );
        assert_eq!(
            cell_to_json(
                &CellValue::Missing(MissingReason::BlankButShouldBeNumber),
                ColumnType::Numeric
            ),
            Value::Null
        );
    }
}
