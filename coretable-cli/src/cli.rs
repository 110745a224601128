//! Contains structures and functionality for the binary
use std::{path::PathBuf, str::FromStr};

use clap::ArgAction;
use coretable::{
    io::TableFormat, ColumnDef, Pipeline, SortOrder, TableOptions, Time, TransformSpec,
};

use crate::error::CliError;

/// Names of the supported table formats.
const FORMATS: [&str; 3] = ["csv", "tsv", "json"];

/// Cli Arguments related to logging
#[derive(clap::Args, Debug)]
pub(crate) struct LoggingArgs {
    /// Increase log verbosity (multiple uses increase verbosity further)
    #[arg(short, long, action = clap::builder::ArgAction::Count, group = "verbosity")]
    verbose: u8,
    /// Reduce log verbosity to show only errors (equivalent to --log error)
    #[arg(short, long, group = "verbosity")]
    quiet: bool,
    /// Set log verbosity (default is "warn")
    #[arg(long = "log", value_parser=clap::builder::PossibleValuesParser::new(["error", "warn", "info", "debug", "trace"]), group = "verbosity")]
    log_level: Option<String>,
}

impl LoggingArgs {
    /// Initialising Logging
    ///
    /// Sets the logging verbosity to the given log-level in the following order:
    ///  * `Info`, `Debug`, `Trace`; depending on the count of `-v`
    ///  * `Error` when `-q` is used
    ///  * The `CTBL_LOG` environment variable value
    ///  * `Warn` otherwise
    pub(crate) fn initialize_logging(&self) {
        let mut builder = env_logger::Builder::new();

        // Default log level
        builder.filter_level(log::LevelFilter::Warn);

        builder.parse_env("CTBL_LOG");
        if let Some(ref level) = self.log_level {
            builder.parse_filters(level);
        } else if self.quiet {
            builder.filter_level(log::LevelFilter::Error);
        } else if self.verbose > 0 {
            builder.filter_level(match self.verbose {
                1 => log::LevelFilter::Info,
                2 => log::LevelFilter::Debug,
                3 => log::LevelFilter::Trace,
                _ => log::LevelFilter::Warn,
            });
        }
        builder.init();
    }
}

/// Cli arguments related to reading the input table
#[derive(Debug, clap::Args)]
pub(crate) struct InputArgs {
    /// Input table (.csv, .tsv or .json); use "-" to read from stdin
    #[arg(value_parser)]
    pub(crate) input: PathBuf,
    /// Format of the input; guessed from the file extension or content if not given
    #[arg(long = "input-format", value_parser = clap::builder::PossibleValuesParser::new(FORMATS))]
    input_format: Option<String>,
    /// Column naming the entity of each row
    #[arg(long = "entity-column")]
    entity_column: Option<String>,
    /// Column holding the time of each row
    #[arg(long = "time-column")]
    time_column: Option<String>,
    /// JSON file with a list of column definitions
    #[arg(long = "column-defs")]
    column_defs: Option<PathBuf>,
}

impl InputArgs {
    /// Whether the input is read from stdin
    pub(crate) fn is_stdin(&self) -> bool {
        self.input.as_os_str() == "-"
    }

    /// Format of the input, if it was given or can be derived from the file name
    pub(crate) fn format(&self) -> Option<TableFormat> {
        self.input_format
            .as_deref()
            .and_then(|format| TableFormat::from_str(format).ok())
            .or_else(|| TableFormat::from_path(&self.input))
    }

    /// Construct the [TableOptions] described by the arguments
    pub(crate) fn table_options(&self) -> Result<TableOptions, CliError> {
        let mut options = TableOptions::new();
        if let Some(slug) = &self.entity_column {
            options = options.with_entity_slug(slug);
        }
        if let Some(slug) = &self.time_column {
            options = options.with_time_slug(slug);
        }
        if let Some(path) = &self.column_defs {
            let json = coretable::io::read_file(path).map_err(coretable::Error::from)?;
            let defs = ColumnDef::list_from_json(&json).map_err(|err| CliError::InvalidParameter {
                parameter: format!("--column-defs {}: {err}", path.display()),
            })?;
            options = options.with_column_defs(defs);
        }

        Ok(options)
    }
}

/// Range of times given as `start..end`, where either side may be omitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TimeRange {
    start: Option<Time>,
    end: Option<Time>,
}

/// Parse a time range; a single time selects exactly that time.
fn parse_time_range(s: &str) -> Result<TimeRange, String> {
    let parse_bound = |bound: &str| -> Result<Option<Time>, String> {
        let bound = bound.trim();
        if bound.is_empty() {
            return Ok(None);
        }
        bound
            .parse::<Time>()
            .map(Some)
            .map_err(|err| format!("invalid time `{bound}`: {err}"))
    };

    match s.split_once("..") {
        Some((start, end)) => Ok(TimeRange {
            start: parse_bound(start)?,
            end: parse_bound(end)?,
        }),
        None => {
            let time = parse_bound(s)?;
            Ok(TimeRange {
                start: time,
                end: time,
            })
        }
    }
}

/// Column and direction to sort by
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SortKey {
    column: String,
    order: SortOrder,
}

/// Parse `slug` or `slug:asc` or `slug:desc`.
fn parse_sort_key(s: &str) -> Result<SortKey, String> {
    match s.rsplit_once(':') {
        Some((column, order)) => Ok(SortKey {
            column: column.to_string(),
            order: SortOrder::from_str(order)
                .map_err(|_| format!("invalid sort order `{order}`, expected asc or desc"))?,
        }),
        None => Ok(SortKey {
            column: s.to_string(),
            order: SortOrder::Asc,
        }),
    }
}

/// Cli arguments describing transformations of the table
///
/// Transformations given by flags are applied in the order in which they are listed here,
/// followed by the steps of the pipeline file.
#[derive(Debug, clap::Args)]
pub(crate) struct TransformArgs {
    /// Keep only the given entities
    #[arg(long = "entities", value_delimiter = ',')]
    entities: Vec<String>,
    /// Keep only rows with time in the range, e.g. "2000..2010", "2000.." or "2005"
    #[arg(long = "time-range", value_parser = parse_time_range)]
    time_range: Option<TimeRange>,
    /// Keep, per entity and target time, the closest row within the tolerance
    #[arg(long = "target-times", value_delimiter = ',')]
    target_times: Vec<Time>,
    /// Maximal distance between a requested and an available time
    #[arg(long = "tolerance", allow_negative_numbers = true)]
    tolerance: Option<Time>,
    /// Fill missing values of the given columns from nearby observations
    #[arg(long = "interpolate", action = ArgAction::Append)]
    interpolate: Vec<String>,
    /// Drop rows with missing values in any of the given columns
    #[arg(long = "drop-missing", value_delimiter = ',')]
    drop_missing: Vec<String>,
    /// Keep only the given columns, in the given order
    #[arg(long = "columns", value_delimiter = ',')]
    columns: Vec<String>,
    /// Sort by a column, optionally followed by ":desc"
    #[arg(long = "sort", value_parser = parse_sort_key)]
    sort: Option<SortKey>,
    /// JSON file with a list of transformations to apply afterwards
    #[arg(long = "pipeline")]
    pipeline: Option<PathBuf>,
}

impl TransformArgs {
    /// Transformation descriptions given by flags
    fn specs(&self) -> Vec<TransformSpec> {
        let mut specs = Vec::new();

        if !self.entities.is_empty() {
            specs.push(TransformSpec::FilterEntities {
                entities: self.entities.clone(),
            });
        }
        if let Some(TimeRange { start, end }) = self.time_range {
            specs.push(TransformSpec::TimeRange { start, end });
        }
        if !self.target_times.is_empty() {
            specs.push(TransformSpec::TargetTimes {
                times: self.target_times.clone(),
                tolerance: self.tolerance.unwrap_or_default(),
            });
        }
        specs.extend(
            self.interpolate
                .iter()
                .map(|column| TransformSpec::Interpolate {
                    column: column.clone(),
                    tolerance: self.tolerance,
                    strategy: None,
                }),
        );
        if !self.drop_missing.is_empty() {
            specs.push(TransformSpec::DropMissing {
                columns: self.drop_missing.clone(),
            });
        }
        if !self.columns.is_empty() {
            specs.push(TransformSpec::SelectColumns {
                columns: self.columns.clone(),
            });
        }
        if let Some(SortKey { column, order }) = &self.sort {
            specs.push(TransformSpec::Sort {
                column: column.clone(),
                order: *order,
            });
        }

        specs
    }

    /// Construct the [Pipeline] described by the arguments
    pub(crate) fn pipeline(&self) -> Result<Pipeline, CliError> {
        let mut specs = self.specs();

        if let Some(path) = &self.pipeline {
            let json = coretable::io::read_file(path).map_err(coretable::Error::from)?;
            let steps: Vec<TransformSpec> =
                serde_json::from_str(&json).map_err(|err| CliError::InvalidParameter {
                    parameter: format!("--pipeline {}: {err}", path.display()),
                })?;
            specs.extend(steps);
        }

        Ok(Pipeline::from_specs(specs))
    }
}

/// Cli arguments related to the output
#[derive(Debug, clap::Args)]
pub(crate) struct OutputArgs {
    /// Format of the output; defaults to the format of the output file or the input
    #[arg(short, long = "format", value_parser = clap::builder::PossibleValuesParser::new(FORMATS))]
    format: Option<String>,
    /// File to write the result to (default is stdout)
    #[arg(short, long = "output")]
    pub(crate) output: Option<PathBuf>,
    /// Replace the output file if it exists
    #[arg(long = "overwrite", default_value = "false", requires = "output")]
    pub(crate) overwrite: bool,
    /// Print how the result was derived from the input to stderr
    #[arg(long = "explain")]
    pub(crate) explain: bool,
}

impl OutputArgs {
    /// Format of the output
    pub(crate) fn format(&self, input_format: Option<TableFormat>) -> TableFormat {
        self.format
            .as_deref()
            .and_then(|format| TableFormat::from_str(format).ok())
            .or_else(|| self.output.as_deref().and_then(TableFormat::from_path))
            .or(input_format)
            .unwrap_or_default()
    }
}

/// Coretable CLI
#[derive(clap::Parser, Debug)]
#[command(name = "ctbl", author, version, about)]
pub struct CliApp {
    /// Arguments related to the input
    #[command(flatten)]
    pub(crate) input: InputArgs,
    /// Arguments describing transformations
    #[command(flatten)]
    pub(crate) transforms: TransformArgs,
    /// Arguments related to the output
    #[command(flatten)]
    pub(crate) output: OutputArgs,
    /// Arguments related to logging
    #[command(flatten)]
    pub(crate) logging: LoggingArgs,
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::Parser;

    #[test]
    fn time_ranges() {
        assert_eq!(
            parse_time_range("2000..2010"),
            Ok(TimeRange {
                start: Some(2000),
                end: Some(2010)
            })
        );
        assert_eq!(
            parse_time_range("..-5"),
            Ok(TimeRange {
                start: None,
                end: Some(-5)
            })
        );
        assert_eq!(
            parse_time_range("2005"),
            Ok(TimeRange {
                start: Some(2005),
                end: Some(2005)
            })
        );
        assert!(parse_time_range("20x0..").is_err());
    }

    #[test]
    fn sort_keys() {
        assert_eq!(
            parse_sort_key("gdp:desc"),
            Ok(SortKey {
                column: "gdp".to_string(),
                order: SortOrder::Desc
            })
        );
        assert_eq!(parse_sort_key("gdp").map(|key| key.order), Ok(SortOrder::Asc));
        assert!(parse_sort_key("gdp:sideways").is_err());
    }

    #[test]
    fn flags_become_specs_in_order() {
        let cli = CliApp::parse_from([
            "ctbl",
            "gdp.csv",
            "--sort",
            "gdp:desc",
            "--entities",
            "France,Germany",
            "--interpolate",
            "gdp",
            "--tolerance",
            "2",
        ]);

        assert_eq!(
            cli.transforms.specs(),
            vec![
                TransformSpec::FilterEntities {
                    entities: vec!["France".to_string(), "Germany".to_string()]
                },
                TransformSpec::Interpolate {
                    column: "gdp".to_string(),
                    tolerance: Some(2),
                    strategy: None
                },
                TransformSpec::Sort {
                    column: "gdp".to_string(),
                    order: SortOrder::Desc
                },
            ]
        );
        assert_eq!(cli.input.format(), Some(TableFormat::Csv));
        assert_eq!(cli.output.format(cli.input.format()), TableFormat::Csv);
    }

    #[test]
    fn output_format_precedence() {
        let cli = CliApp::parse_from(["ctbl", "-", "--output", "out.tsv"]);
        assert!(cli.input.is_stdin());
        assert_eq!(cli.output.format(None), TableFormat::Tsv);

        let cli = CliApp::parse_from(["ctbl", "in.csv", "--format", "json", "-o", "out.tsv"]);
        assert_eq!(cli.output.format(cli.input.format()), TableFormat::Json);
    }
}
