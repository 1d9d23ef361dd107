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

//! Reports on analysed programs.
//!
//! All the reports are rendered to a [`String`], and are deterministic: the same input always
//! yields byte-identical reports.

pub mod dot;
pub mod vgpr;
pub mod histogram;

pub use dot::{dump_block_cfg, dump_instr_cfg};
pub use vgpr::{dump_block_vgpr, dump_liveness, liveness_summary, LivenessSummary};
pub use histogram::{dump_opcode_histogram, opcode_histogram, Grouping};
