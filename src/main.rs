// celchp: Microarray CEL and CHP file conversion between formats.
//
// Copyright 2025 Tommi Mäklin [tommi@maklin.fi].
//
// Copyrights in this project are retained by contributors. No copyright assignment
// is required to contribute to this project.
//
// Except as otherwise noted (below and/or in individual files), this
// project is licensed under the Apache License, Version 2.0
// <LICENSE-APACHE> or <http://www.apache.org/licenses/LICENSE-2.0> or
// the MIT license, <LICENSE-MIT> or <http://opensource.org/licenses/MIT>,
// at your option.
//
use std::path::Path;

use clap::{CommandFactory, Parser};

use celchp::converter::config::ConverterConfig;
use celchp::converter::options::CelConversionOptions;
use celchp::converter::options::ChpConversionOptions;
use celchp::converter::ConversionError;
use celchp::converter::{CelFileConverter, CelFileVersion};
use celchp::converter::{ChpFileConverter, ChpFileVersion};

mod cli;

const EXIT_FAILURE: i32 = -1;
const EXIT_DIFFERENT: i32 = -2;

/// Initializes the logger with verbosity given in `log_max_level`.
fn init_log(log_max_level: usize) {
    let res = stderrlog::new()
    .module(module_path!())
    .quiet(false)
    .verbosity(log_max_level)
    .timestamp(stderrlog::Timestamp::Off)
    .init();
    if let Err(e) = res {
        eprintln!("Unable to initialize logging: {}", e);
    }
}

/// Input file name without the extension.
fn dat_name(
    path: &Path,
) -> String {
    path.file_stem().map(|x| x.to_string_lossy().to_string()).unwrap_or_default()
}

fn report(
    input_file: &Path,
    res: Result<(), ConversionError>,
) -> i32 {
    match res {
        Ok(()) => 0,
        Err(e) => {
            log::error!("Could not convert {}: {}", input_file.display(), e);
            EXIT_FAILURE
        },
    }
}

fn report_differences(
    res: Result<Vec<String>, Box<dyn std::error::Error>>,
) -> i32 {
    match res {
        Ok(diffs) if diffs.is_empty() => {
            log::info!("Files are identical");
            0
        },
        Ok(diffs) => {
            diffs.iter().for_each(|diff| println!("{}", diff));
            EXIT_DIFFERENT
        },
        Err(e) => {
            log::error!("Could not compare the files: {}", e);
            EXIT_FAILURE
        },
    }
}

/// Parses the command line in `args`.
///
/// Returns the exit code on failure, 0 if help or the version was printed.
fn parse_args<I, T>(
    args: I,
) -> Result<cli::Cli, i32>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    cli::Cli::try_parse_from(args).map_err(|e| {
        if let Err(print_err) = e.print() {
            eprintln!("Unable to print the usage: {}", print_err);
        }
        if e.use_stderr() { EXIT_FAILURE } else { 0 }
    })
}

fn main() {
    let cli = match parse_args(std::env::args_os()) {
        Ok(cli) => cli,
        Err(code) => std::process::exit(code),
    };

    // Subcommands:
    let code = match &cli.command {
        // Convert CEL
        Some(cli::Commands::CelConvert {
            input_file,
            version,
            out_file,
            chip_type,
            set_dat_name,
            parent_file,
            array_id,
            array_barcode,
            keep_backup,
            verbose,
        }) => {
            init_log(if *verbose { 2 } else { 1 });

            match CelFileVersion::from_i32(*version) {
                Some(to) => {
                    let config = ConverterConfig {
                        parent_file: parent_file.clone(),
                        array_id: array_id.clone(),
                        array_barcode: array_barcode.clone(),
                        keep_backup: *keep_backup,
                        ..Default::default()
                    };
                    // Options are only passed when something is overridden.
                    let options = CelConversionOptions {
                        chip_type: chip_type.clone(),
                        dat_file_name: if *set_dat_name { Some(dat_name(input_file)) } else { None },
                    };
                    let options = if options == CelConversionOptions::default() { None } else { Some(options) };

                    let mut converter = CelFileConverter::new(config);
                    let res = match out_file {
                        Some(out_file) => converter.convert_file_to(input_file, out_file, to, options.as_ref()),
                        None => converter.convert_file(input_file, to, options.as_ref()),
                    };
                    report(input_file, res)
                },
                None => {
                    log::error!("Invalid CEL file version: {}", version);
                    EXIT_FAILURE
                },
            }
        },

        // Convert CHP
        Some(cli::Commands::ChpConvert {
            input_file,
            version,
            out_file,
            chip_type,
            library,
            parent_cel,
            keep_backup,
            verbose,
        }) => {
            init_log(if *verbose { 2 } else { 1 });

            match ChpFileVersion::from_i32(*version) {
                Some(to) => {
                    let config = ConverterConfig {
                        library_path: library.clone(),
                        parent_cel: parent_cel.clone(),
                        keep_backup: *keep_backup,
                        ..Default::default()
                    };
                    let options = chip_type.as_ref().map(|x| ChpConversionOptions { chip_type: Some(x.clone()) });

                    let mut converter = ChpFileConverter::new(config);
                    let res = match out_file {
                        Some(out_file) => converter.convert_file_to(input_file, out_file, to, options.as_ref()),
                        None => converter.convert_file(input_file, to, options.as_ref()),
                    };
                    report(input_file, res)
                },
                None => {
                    log::error!("Invalid CHP file version: {}", version);
                    EXIT_FAILURE
                },
            }
        },

        // Compare CEL
        Some(cli::Commands::CelCompare {
            input_1,
            input_2,
            tolerance,
            verbose,
        }) => {
            init_log(if *verbose { 2 } else { 1 });
            report_differences(celchp::compare::compare_cel_files(input_1, input_2, *tolerance))
        },

        // Compare CHP
        Some(cli::Commands::ChpCompare {
            input_1,
            input_2,
            tolerance,
            verbose,
        }) => {
            init_log(if *verbose { 2 } else { 1 });
            report_differences(celchp::compare::compare_chp_files(input_1, input_2, *tolerance))
        },

        // Info
        Some(cli::Commands::Info {
            input_file,
            verbose,
        }) => {
            init_log(if *verbose { 2 } else { 1 });
            match celchp::describe_file(input_file) {
                Ok(text) => {
                    print!("{}", text);
                    0
                },
                Err(e) => {
                    log::error!("Could not read {}: {}", input_file.display(), e);
                    EXIT_FAILURE
                },
            }
        },

        None => {
            if let Err(e) = cli::Cli::command().print_help() {
                eprintln!("Unable to print the usage: {}", e);
            }
            EXIT_FAILURE
        },
    };
    std::process::exit(code);
}

// Tests
#[cfg(test)]
mod tests {

    #[test]
    fn dat_name_drops_extension() {
        use super::dat_name;
        use std::path::PathBuf;

        assert_eq!(dat_name(&PathBuf::from("/data/sample_01.CEL")), "sample_01");
        assert_eq!(dat_name(&PathBuf::from("sample")), "sample");
    }

    #[test]
    fn cli_parses_subcommands() {
        use clap::Parser;
        use crate::cli::{Cli, Commands};

        let cli = Cli::try_parse_from(["celchp", "cel-convert", "-i", "a.CEL", "-v", "4", "--set-dat-name"]).unwrap();
        match cli.command {
            Some(Commands::CelConvert { version, set_dat_name, out_file, .. }) => {
                assert_eq!(version, 4);
                assert!(set_dat_name);
                assert!(out_file.is_none());
            },
            _ => panic!("expected cel-convert"),
        }

        let cli = Cli::try_parse_from(["celchp", "chp-compare", "--i1", "a.CHP", "--i2", "b.CHP"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::ChpCompare { tolerance, .. }) if tolerance == 0.0001));
    }

    #[test]
    fn bad_arguments_exit_with_failure() {
        use super::{parse_args, EXIT_FAILURE};

        assert_eq!(parse_args(["celchp", "cel-convert", "-i", "a.CEL"]).err(), Some(EXIT_FAILURE));
        assert_eq!(parse_args(["celchp", "cel-convert", "-i", "a.CEL", "-v", "four"]).err(), Some(EXIT_FAILURE));
        assert_eq!(parse_args(["celchp", "no-such-command"]).err(), Some(EXIT_FAILURE));
        assert_eq!(parse_args(["celchp", "--help"]).err(), Some(0));
        assert!(parse_args(["celchp", "info", "-i", "a.CEL"]).is_ok());
    }
}
