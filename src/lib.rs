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

//! Analyse GPU shader ISA dumps.
//!
//! Disassembly in one of several textual formats (see [`reader::IsaFormat`]) is read into
//! [`instr::Instruction`]s, partitioned into [`block::BasicBlock`]s, lowered to a
//! per-instruction control flow graph, and analysed for VGPR liveness. The [`report`] module
//! renders the results: control flow graphs in GraphViz format, register usage, and opcode
//! histograms.

#![warn(missing_docs)]

pub mod opcode;
pub mod reader;
pub mod instr;
pub mod block;
pub mod program;
pub mod analysis;
pub mod report;

#[cfg(feature = "cli")]
pub mod cli;

#[cfg(feature = "cli")]
pub use cli::Cli;

#[cfg(test)]
mod samples;

pub use opcode::{OpcodeMetadata, OpcodeTable};
pub use reader::IsaFormat;
pub use instr::Instruction;
pub use block::{BasicBlock, Blocks};
pub use program::{read_program, read_program_with};
pub use analysis::control_flow::InstrGraph;
