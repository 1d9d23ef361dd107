/*
 * shae: analyse GPU shader ISA dumps.
 * Copyright (C) 2022  Ruifeng Xie
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Command line interface support.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use displaydoc::Display as DisplayDoc;
use thiserror::Error;
use clap::{AppSettings, Args, Parser, Subcommand};

use crate::analysis::control_flow::InstrGraph;
use crate::analysis::liveness::solve;
use crate::program::{self, read_program};
use crate::reader::IsaFormat;
use crate::report::{self, Grouping};

/// Entry to the command line interface.
#[derive(Debug, Parser)]
#[clap(global_setting(AppSettings::PropagateVersion))]
#[clap(global_setting(AppSettings::UseLongFormatForHelpSubcommand))]
#[clap(setting(AppSettings::SubcommandRequiredElseHelp))]
#[clap(author, version, about)]
pub struct Cli {
    /// The input format: HSAIL, ShaderAnalyzer, ShaderDump, raw, or auto.
    #[clap(short, long, default_value = "auto")]
    format: IsaFormat,
    /// The subcommand to execute.
    #[clap(subcommand)]
    command: Command,
}

/// Input and output of a subcommand.
#[derive(Debug, Args)]
pub struct Streams {
    /// The input file, or `-` for standard input.
    #[clap(parse(from_os_str))]
    input: PathBuf,
    /// The output file, or `-` for standard output.
    #[clap(parse(from_os_str))]
    output: PathBuf,
}

/// Supported subcommands.
#[derive(Debug, Subcommand)]
#[allow(missing_docs)]
pub enum Command {
    /// Dump the basic-block CFG to a dot file.
    DumpBbCfg {
        #[clap(flatten)]
        streams: Streams,
        /// Only show the number of instructions in each block.
        #[clap(short, long)]
        compact: bool,
    },
    /// Dump the per-instruction CFG to a dot file.
    DumpPiCfg {
        #[clap(flatten)]
        streams: Streams,
    },
    /// Dump per-basic-block VGPR usage.
    DumpBbVgpr {
        #[clap(flatten)]
        streams: Streams,
    },
    /// Write per-instruction VGPR liveness and usage.
    #[clap(alias = "analyze-liveness")]
    AnalyseLiveness {
        #[clap(flatten)]
        streams: Streams,
        /// Write only the summary line.
        #[clap(short, long)]
        summary: bool,
    },
    /// Write a histogram showing how often each opcode has been used.
    OpcodeHistogram {
        #[clap(flatten)]
        streams: Streams,
        /// Group instructions by mnemonic, operand-size, or instruction-class.
        #[clap(short, long, default_value = "mnemonic")]
        group: Grouping,
    },
}

/// All kinds of errors that might happen during command line execution.
#[derive(Debug, DisplayDoc, Error)]
pub enum Error {
    /// "errors" from [`clap`], including requests such as `--version` or `--help`.
    #[displaydoc("{0}")]
    InvalidArguments(#[from] clap::Error),
    /// {0}
    InvalidInput(#[from] program::Error),
    /// I/O error: {0}
    Io(#[from] std::io::Error),
    /// cannot format the output: {0}
    CannotFormat(#[from] std::fmt::Error),
}

/// Result type for the command line interface.
pub type Result<T = ()> = std::result::Result<T, Error>;

const STANDARD_STREAM: &str = "-";

fn read_input(path: &Path) -> Result<String> {
    let mut contents = String::new();
    if path == Path::new(STANDARD_STREAM) {
        std::io::stdin().read_to_string(&mut contents)?;
    } else {
        contents = std::fs::read_to_string(path)?;
    }
    Ok(contents)
}

fn write_output(path: &Path, report: &str) -> Result {
    if path == Path::new(STANDARD_STREAM) {
        let stdout = std::io::stdout();
        let mut stdout = stdout.lock();
        stdout.write_all(report.as_bytes())?;
        stdout.flush()?;
    } else {
        std::fs::write(path, report)?;
    }
    Ok(())
}

/// Install the logger: everything goes to standard error, filtered by `RUST_LOG` (`warn` by
/// default).
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // a subscriber might already be installed (e.g. by an embedding application)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

impl Command {
    /// The input and output of this subcommand.
    pub fn streams(&self) -> &Streams {
        match self {
            Command::DumpBbCfg { streams, .. }
            | Command::DumpPiCfg { streams }
            | Command::DumpBbVgpr { streams }
            | Command::AnalyseLiveness { streams, .. }
            | Command::OpcodeHistogram { streams, .. } => streams,
        }
    }

    /// Produce the report for this subcommand from the input text.
    pub fn render(&self, text: &str, format: IsaFormat) -> Result<String> {
        let blocks = read_program(text, format)?;
        let report = match self {
            Command::DumpBbCfg { compact, .. } => report::dump_block_cfg(&blocks, *compact)?,
            Command::DumpPiCfg { .. } => {
                let graph = InstrGraph::lower(&blocks);
                report::dump_instr_cfg(&blocks, &graph)?
            }
            Command::DumpBbVgpr { .. } => report::dump_block_vgpr(&blocks)?,
            Command::AnalyseLiveness { summary, .. } => {
                let mut graph = InstrGraph::lower(&blocks);
                let liveness = solve(&mut graph, &blocks);
                report::dump_liveness(&blocks, &graph, &liveness, *summary)?
            }
            Command::OpcodeHistogram { group, .. } => report::dump_opcode_histogram(&blocks, *group)?,
        };
        Ok(report)
    }
}

impl Cli {
    /// Run the command line interface.
    pub fn run() -> Result {
        let options: Cli = Cli::try_parse()?;
        init_logging();
        options.execute()
    }

    /// Execute already parsed options.
    pub fn execute(&self) -> Result {
        let streams = self.command.streams();
        let contents = read_input(&streams.input)?;
        let format = self.format.detect(&contents);
        tracing::debug!(%format, input = %streams.input.display(), "reading shader");
        let report = self.command.render(&contents, format)?;
        write_output(&streams.output, &report)
    }
}
