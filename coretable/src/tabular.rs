//! This module defines the immutable [Table][table::Table] and its operations.
//!
//! Operations are split by concern: the core row and column transformations
//! live in [table], entity and time aware queries in [entity_time],
//! the filling of missing observations in [interpolation], and columns
//! recomputed from shares and growth rates in [synthesis].

pub mod entity_time;
pub mod interpolation;
pub mod options;
pub mod provenance;
pub mod row;
pub mod synthesis;
pub mod table;
