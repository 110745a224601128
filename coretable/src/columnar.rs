//! This module collects the column-level building blocks of a table:
//! column types and metadata, stored and derived columns,
//! and the [ColumnStore][column_store::ColumnStore] owning them.

pub mod column;
pub mod column_def;
pub mod column_store;
pub mod column_type;
