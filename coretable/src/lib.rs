//! This crate implements an immutable, columnar data table for
//! observations of entities (countries, regions, ...) over time.
//! It is the data layer behind interactive charts: tables are built
//! from delimited text or row objects, transformed through pure operations
//! that each return a new [Table][tabular::table::Table],
//! and read back by renderers and spreadsheet-like editors.

#![deny(
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts
)]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_qualifications,
    unused_extern_crates,
    variant_size_differences
)]

pub mod columnar;
pub mod datavalues;
pub mod error;
pub mod index;
pub mod io;
pub mod permutator;
pub mod pipeline;
pub mod tabular;
pub mod tolerance;

pub use columnar::{
    column::{Column, ColumnSource, ComputeRule},
    column_def::ColumnDef,
    column_type::ColumnType,
};
pub use datavalues::{CellValue, MissingReason, Time};
pub use error::{Error, ReadingError};
pub use permutator::SortOrder;
pub use pipeline::{Operation, Pipeline, TransformSpec};
pub use tabular::{
    options::TableOptions,
    provenance::{Provenance, TransformType},
    row::Row,
    table::Table,
};
pub use tolerance::ToleranceStrategy;
