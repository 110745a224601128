//! Reading and writing of [DSV](https://en.wikipedia.org/wiki/Delimiter-separated_values)
//! (delimiter separated values) text.
//!
//! The first record is always the header naming the columns.
//! Double quotes are allowed for string escaping.

use csv::{ReaderBuilder, StringRecord, WriterBuilder};

use crate::{
    columnar::column_store::ColumnStore,
    error::{Error, ReadingError},
    tabular::{options::TableOptions, table::Table},
};

/// Guess the delimiter from the header line: tab if it contains tabs but no commas,
/// comma otherwise.
pub fn detect_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or_default();
    if header.contains('\t') && !header.contains(',') {
        b'\t'
    } else {
        b','
    }
}

fn header_slugs(headers: &StringRecord) -> Result<Vec<String>, Error> {
    let mut slugs: Vec<String> = Vec::with_capacity(headers.len());
    for header in headers.iter() {
        let slug = header.trim();
        if slugs.iter().any(|existing| existing == slug) {
            return Err(Error::DuplicateColumn(slug.to_string()));
        }
        slugs.push(slug.to_string());
    }
    Ok(slugs)
}

/// Parse delimited text into a [ColumnStore].
///
/// Column types are taken from `options` where declared and inferred otherwise.
/// Records with a different number of fields than the header are rejected.
pub fn read_store(text: &str, options: &TableOptions) -> Result<ColumnStore, Error> {
    let delimiter = options
        .delimiter
        .unwrap_or_else(|| detect_delimiter(text));

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .double_quote(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    if headers.is_empty() || headers.iter().all(|header| header.trim().is_empty()) {
        return Err(ReadingError::MissingHeaders.into());
    }
    let slugs = header_slugs(&headers)?;

    let mut raw_columns: Vec<Vec<String>> = vec![Vec::new(); slugs.len()];
    for record in reader.records() {
        let record = record?;
        if record.len() != slugs.len() {
            // csv reports a blank line as a single empty field
            if record.len() == 1 && record.get(0).is_some_and(str::is_empty) {
                continue;
            }
            return Err(ReadingError::RaggedRecord {
                line: record.position().map(|position| position.line()).unwrap_or_default(),
                expected: slugs.len(),
                actual: record.len(),
            }
            .into());
        }

        for (column, field) in raw_columns.iter_mut().zip(record.iter()) {
            column.push(field.to_string());
        }
    }

    let mut store = ColumnStore::new();
    for (slug, raw_values) in slugs.iter().zip(raw_columns) {
        let raw_values = raw_values.iter().map(String::as_str).collect::<Vec<_>>();
        store.add_raw_column(options.def_for(slug), &raw_values)?;
    }

    Ok(store)
}

/// Serialize `table` as delimited text with a header record.
///
/// Missing cells are written as empty fields.
pub fn write_table(table: &Table, delimiter: u8) -> Result<String, Error> {
    let mut writer = WriterBuilder::new()
        .delimiter(delimiter)
        .double_quote(true)
        .from_writer(Vec::new());

    writer.write_record(table.column_slugs())?;
    for record in table.to_matrix().into_iter().skip(1) {
        writer.write_record(record)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|error| csv::Error::from(error.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{columnar::column_type::ColumnType, datavalues::CellValue};
    use test_log::test;

    #[test]
    fn tab_separated() {
        let text = "entity\tyear\tgdp\nFrance\t2000\t100\n";
        assert_eq!(detect_delimiter(text), b'\t');

        let store = read_store(text, &TableOptions::new()).expect("valid tsv");
        assert_eq!(store.num_rows(), 1);
        assert_eq!(store.slugs().collect::<Vec<_>>(), vec!["entity", "year", "gdp"]);
        assert_eq!(
            store.get_column("year").expect("exists").column_type(),
            ColumnType::Year
        );
    }

    #[test]
    fn quoted_fields() {
        let text = "entity,note\n\"Korea, South\",\"said \"\"hi\"\"\"\n";
        let store = read_store(text, &TableOptions::new()).expect("valid csv");
        assert_eq!(
            store.get_values("entity").expect("exists")[0],
            CellValue::from("Korea, South")
        );
        assert_eq!(
            store.get_values("note").expect("exists")[0],
            CellValue::from("said \"hi\"")
        );
    }

    #[test]
    fn ragged_record() {
        let text = "entity,year\nFrance,2000\nGermany\n";
        let result = read_store(text, &TableOptions::new());
        assert!(matches!(
            result,
            Err(Error::Reading(ReadingError::RaggedRecord {
                line: 3,
                expected: 2,
                actual: 1
            }))
        ));
    }

    #[test]
    fn header_only() {
        let store = read_store("entity,year,gdp\n", &TableOptions::new()).expect("valid csv");
        assert_eq!(store.num_rows(), 0);
        assert_eq!(store.num_columns(), 3);
    }

    #[test]
    fn errors_on_headers() {
        assert!(matches!(
            read_store("", &TableOptions::new()),
            Err(Error::Reading(ReadingError::MissingHeaders))
        ));
        assert!(matches!(
            read_store("a,b,a\n1,2,3", &TableOptions::new()),
            Err(Error::DuplicateColumn(slug)) if slug == "a"
        ));
    }

    #[test]
    fn declared_types_win() {
        let options = TableOptions::new()
            .with_column_defs(vec![crate::columnar::column_def::ColumnDef::typed(
                "code",
                ColumnType::String,
            )]);
        let store = read_store("code\n001\n002", &options).expect("valid csv");
        assert_eq!(
            store.get_values("code").expect("exists")[0],
            CellValue::from("001")
        );
    }
}
