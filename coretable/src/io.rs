//! This module collects the readers and writers that move tables
//! in and out of delimited text and JSON.

pub mod dsv;
pub mod json;

use std::path::Path;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::{
    error::{Error, ReadingError},
    tabular::{options::TableOptions, table::Table},
};

/// Formats in which tables can be read and written.
#[derive(
    Debug, Display, EnumString, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TableFormat {
    /// Comma separated values
    #[default]
    Csv,
    /// Tab separated values
    Tsv,
    /// JSON, as array of row objects or object of column arrays
    Json,
}

impl TableFormat {
    /// Guess the format from the extension of a file.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "tsv" | "tab" => Some(Self::Tsv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Delimiter of delimited formats.
    pub fn delimiter(&self) -> Option<u8> {
        match self {
            Self::Csv => Some(b','),
            Self::Tsv => Some(b'\t'),
            Self::Json => None,
        }
    }

    /// Parse `text` in this format.
    pub fn read(&self, text: &str, options: TableOptions) -> Result<Table, Error> {
        match self {
            Self::Json => Table::from_json_with_options(text, options),
            Self::Csv | Self::Tsv => {
                let options = match (options.delimiter, self.delimiter()) {
                    (None, Some(delimiter)) => options.with_delimiter(delimiter),
                    _ => options,
                };
                Table::from_delimited_with_options(text, options)
            }
        }
    }

    /// Serialize `table` in this format.
    pub fn write(&self, table: &Table) -> Result<String, Error> {
        match self.delimiter() {
            Some(delimiter) => table.to_delimited(delimiter),
            None => Ok(serde_json::to_string_pretty(&table.to_json())?),
        }
    }
}

/// Read the whole content of a file.
pub fn read_file(path: &Path) -> Result<String, ReadingError> {
    std::fs::read_to_string(path).map_err(|error| ReadingError::IOReading {
        error,
        filename: path.display().to_string(),
    })
}

/// Read a table from a file whose format is given by its extension.
///
/// Files with unknown extensions are read as delimited text.
pub fn load_table(path: &Path, options: TableOptions) -> Result<Table, Error> {
    let text = read_file(path)?;
    match TableFormat::from_path(path) {
        Some(format) => {
            log::debug!("reading {} as {format}", path.display());
            format.read(&text, options)
        }
        None => Table::from_delimited_with_options(&text, options),
    }
}
