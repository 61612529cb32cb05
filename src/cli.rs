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
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    // Convert a CEL file to another version
    CelConvert {
        // Input file, converted in place unless --output is given
        #[arg(short = 'i', long = "input", required = true)]
        input_file: PathBuf,

        // Output version
        #[arg(short = 'v', long = "version", required = true, help = "Output version: 1 container, 3 text, 4 XDA")]
        version: i32,

        // Output file path
        #[arg(short = 'o', long = "output", required = false)]
        out_file: Option<PathBuf>,

        // Override the chip type
        #[arg(long = "chip-type", required = false)]
        chip_type: Option<String>,

        // Set the DAT file name to the name of the input file
        #[arg(long = "set-dat-name", default_value_t = false)]
        set_dat_name: bool,

        // Container file whose header is recorded as the parent
        #[arg(long = "parent-file", required = false)]
        parent_file: Option<PathBuf>,

        // Array id and barcode recorded in the parent header
        #[arg(long = "array-id", required = false)]
        array_id: Option<String>,
        #[arg(long = "array-barcode", required = false)]
        array_barcode: Option<String>,

        // Keep <input>.bak after an in-place conversion
        #[arg(long = "keep-backup", default_value_t = false)]
        keep_backup: bool,

        // Verbosity
        #[arg(long = "verbose", default_value_t = false)]
        verbose: bool,
    },

    // Convert a CHP file to another version
    ChpConvert {
        // Input file, converted in place unless --output is given
        #[arg(short = 'i', long = "input", required = true)]
        input_file: PathBuf,

        // Output version
        #[arg(short = 'v', long = "version", required = true, help = "Output version: 1 GCOS, 2 container, 3 MAS5")]
        version: i32,

        // Output file path
        #[arg(short = 'o', long = "output", required = false)]
        out_file: Option<PathBuf>,

        // Override the chip type
        #[arg(long = "chip-type", required = false)]
        chip_type: Option<String>,

        // Directory with the PSI and CDF files
        #[arg(long = "library", default_value = ".")]
        library: PathBuf,

        // CEL file the results were computed from
        #[arg(long = "parent-cel", required = false)]
        parent_cel: Option<PathBuf>,

        // Keep <input>.bak after an in-place conversion
        #[arg(long = "keep-backup", default_value_t = false)]
        keep_backup: bool,

        // Verbosity
        #[arg(long = "verbose", default_value_t = false)]
        verbose: bool,
    },

    // Compare two CEL files
    CelCompare {
        #[arg(long = "i1", required = true, help = "First input file")]
        input_1: PathBuf,

        #[arg(long = "i2", required = true, help = "Second input file")]
        input_2: PathBuf,

        // Largest difference between equal floats
        #[arg(long = "tolerance", default_value_t = celchp::compare::DEFAULT_TOLERANCE)]
        tolerance: f32,

        // Verbosity
        #[arg(long = "verbose", default_value_t = false)]
        verbose: bool,
    },

    // Compare two CHP files
    ChpCompare {
        #[arg(long = "i1", required = true, help = "First input file")]
        input_1: PathBuf,

        #[arg(long = "i2", required = true, help = "Second input file")]
        input_2: PathBuf,

        // Largest difference between equal floats
        #[arg(long = "tolerance", default_value_t = celchp::compare::DEFAULT_TOLERANCE)]
        tolerance: f32,

        // Verbosity
        #[arg(long = "verbose", default_value_t = false)]
        verbose: bool,
    },

    // Print the version and header of a CEL or CHP file
    Info {
        #[arg(short = 'i', long = "input", required = true)]
        input_file: PathBuf,

        // Verbosity
        #[arg(long = "verbose", default_value_t = false)]
        verbose: bool,
    },
}
