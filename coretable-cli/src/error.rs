//! This module defines all the errors that can occur while executing coretable-cli.

use thiserror::Error;

/// Error that occur during execution of the CLI app
#[derive(Error, Debug)]
pub enum CliError {
    /// Error if the output file exists and may not be replaced
    #[error("output file `{filename}` already exists; use --overwrite to replace it")]
    OutputExists {
        /// Name of the existing file
        filename: String,
    },
    /// Invalid paramater
    #[error("invalid parameter: {parameter}")]
    InvalidParameter {
        /// Invalid paramater
        parameter: String,
    },
    /// Error resulting from io operations
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    /// Error originating from coretable
    #[error(transparent)]
    CoretableError(#[from] coretable::error::Error),
}
