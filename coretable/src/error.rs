//! Error-handling module for the crate

use thiserror::Error;

/// Error-Collection for errors related to reading input tables.
///
/// Malformed individual cells are not reported here;
/// they are turned into [missing values][crate::datavalues::CellValue::Missing].
#[allow(variant_size_differences)]
#[derive(Error, Debug)]
pub enum ReadingError {
    /// Error in the underlying csv reader or writer
    #[error(transparent)]
    Csv(#[from] csv::Error),
    /// Error while parsing json input
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Errors on reading a file
    #[error("Failed to read \"{filename}\": {error}.")]
    IOReading {
        /// Contains the wrapped error
        error: std::io::Error,
        /// Filename which caused the error
        filename: String,
    },
    /// Could not read the dsv headers
    #[error("cannot read headers in csv/tsv input")]
    MissingHeaders,
    /// A record has a different number of fields than the header
    #[error("record on line {line} has {actual} fields, but the header has {expected}")]
    RaggedRecord {
        /// Line of the offending record
        line: u64,
        /// Number of header fields
        expected: usize,
        /// Number of fields in the record
        actual: usize,
    },
    /// Json input contained something other than an object where a row was expected
    #[error("json row {0} is not an object")]
    NotARowObject(usize),
    /// Json input was neither an array of rows nor an object of columns
    #[error("json input must be an array of row objects or an object of column arrays")]
    UnsupportedJsonShape,
}

/// Error-Collection for all the possible Errors occurring in this crate
#[derive(Error, Debug)]
pub enum Error {
    /// A column does not have the same number of values as the table has rows
    #[error("column `{slug}` has {actual} values, but the table has {expected} rows")]
    DimensionMismatch {
        /// Slug of the offending column
        slug: String,
        /// Number of rows of the table
        expected: usize,
        /// Number of values that were supplied
        actual: usize,
    },
    /// A column slug was referenced that is not part of the table
    #[error("unknown column `{0}`")]
    UnknownColumn(String),
    /// The same slug was supplied for two different columns
    #[error("column `{0}` was given more than once")]
    DuplicateColumn(String),
    /// An entity-based operation was called on a table without entity column
    #[error("the table has no entity column")]
    MissingEntityColumn,
    /// A time-based operation was called on a table without time column
    #[error("the table has no time column")]
    MissingTimeColumn,
    /// A transformation was configured with arguments that cannot be applied
    #[error("invalid transformation: {0}")]
    InvalidTransform(String),
    /// Error that happened while reading a table
    #[error(transparent)]
    Reading(#[from] ReadingError),
}

impl From<csv::Error> for Error {
    fn from(value: csv::Error) -> Self {
        Self::Reading(value.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Reading(value.into())
    }
}
