/*!
  Binary for the CLI of coretable: ctbl
*/

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

pub mod cli;
pub mod error;

use std::io::Write;

use clap::Parser;
use cli::CliApp;
use colored::Colorize;
use coretable::{io::TableFormat, Table, TableOptions};
use error::CliError;

/// Read the input table from the file or stdin given on the command line.
fn read_input(cli: &CliApp, options: TableOptions) -> Result<Table, CliError> {
    let text = if cli.input.is_stdin() {
        log::info!("reading table from stdin");
        std::io::read_to_string(std::io::stdin())?
    } else {
        log::info!("reading table from {}", cli.input.input.display());
        coretable::io::read_file(&cli.input.input).map_err(coretable::Error::from)?
    };

    let table = match cli.input.format() {
        Some(format) => format.read(&text, options)?,
        None if text.trim_start().starts_with(['[', '{']) => {
            TableFormat::Json.read(&text, options)?
        }
        None => Table::from_delimited_with_options(&text, options)?,
    };
    Ok(table)
}

/// Write `content` to the output file, or to stdout if none was given.
fn write_output(cli: &CliApp, content: &str) -> Result<(), CliError> {
    match &cli.output.output {
        Some(path) => {
            if path.exists() && !cli.output.overwrite {
                return Err(CliError::OutputExists {
                    filename: path.display().to_string(),
                });
            }
            log::info!("writing result to {}", path.display());
            std::fs::write(path, content)?;
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(content.as_bytes())?;
            if !content.ends_with('\n') {
                stdout.write_all(b"\n")?;
            }
        }
    }

    Ok(())
}

fn run(cli: CliApp) -> Result<(), CliError> {
    let options = cli.input.table_options()?;
    let pipeline = cli.transforms.pipeline()?;

    let table = read_input(&cli, options)?;
    log::info!(
        "read {} rows and {} columns",
        table.num_rows(),
        table.num_columns()
    );

    let result = pipeline.run(&table)?;
    log::info!(
        "applied {} steps, {} rows remain",
        pipeline.len(),
        result.num_rows()
    );

    if cli.output.explain {
        eprint!("{}", result.explain());
    }

    let format = cli.output.format(cli.input.format());
    write_output(&cli, &format.write(&result)?)
}

fn main() {
    let cli = cli::CliApp::parse();

    cli.logging.initialize_logging();
    log::info!("Version: {}", clap::crate_version!());
    log::debug!("Input: {}", cli.input.input.display());

    run(cli).unwrap_or_else(|err| {
        log::error!("{} {err}", "error:".red().bold());
        std::process::exit(1)
    })
}
