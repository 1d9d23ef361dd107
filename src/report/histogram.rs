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

//! Opcode histograms.

use std::collections::BTreeMap;
use std::fmt::Write;

use parse_display::{Display, FromStr};

use crate::block::Blocks;
use crate::instr::Instruction;

/// How instructions are grouped in a histogram.
#[derive(Debug, Display, FromStr, Copy, Clone, Eq, PartialEq)]
#[display(style = "kebab-case")]
pub enum Grouping {
    /// By mnemonic, e.g. `v_add_f32`.
    Mnemonic,
    /// By the operand type suffix of the mnemonic, e.g. `f32`.
    OperandSize,
    /// By instruction class, e.g. `VOP2`.
    InstructionClass,
}

impl Default for Grouping {
    fn default() -> Self { Grouping::Mnemonic }
}

/// Operand type suffix of a mnemonic, e.g. `f32` for `v_add_f32`, or `unknown` if the last
/// `_`-separated part is not a type (as in `s_load_dwordx4`).
pub fn operand_size(mnemonic: &str) -> &str {
    let suffix = match mnemonic.rfind('_') {
        Some(k) => &mnemonic[k + 1..],
        None => return "unknown",
    };
    let mut chars = suffix.chars();
    match (chars.next(), chars.next()) {
        (Some('i' | 'u' | 'f' | 'b'), Some(c)) if c.is_ascii_digit() => suffix,
        _ => "unknown",
    }
}

fn group_key(instr: &Instruction, grouping: Grouping) -> String {
    let name = &instr.opcode().name;
    match grouping {
        Grouping::Mnemonic => name.to_string(),
        Grouping::OperandSize => operand_size(name).to_string(),
        Grouping::InstructionClass => instr.opcode().class.to_string(),
    }
}

/// Count instructions per group, most frequent first. Groups with the same count are ordered by
/// key.
pub fn opcode_histogram(blocks: &Blocks, grouping: Grouping) -> Vec<(String, usize)> {
    let mut usage = BTreeMap::new();
    for instr in blocks.instructions() {
        *usage.entry(group_key(instr, grouping)).or_insert(0) += 1;
    }
    let mut usage: Vec<_> = usage.into_iter().collect();
    usage.sort_by(|(_, x), (_, y)| y.cmp(x));
    usage
}

/// Number of decimal digits reserved for a count, given the total count.
fn count_width(total: usize) -> usize {
    // ceil(log10(total)) + 1
    let mut k = 0;
    let mut power = 1usize;
    while power < total {
        power = power.saturating_mul(10);
        k += 1;
    }
    k + 1
}

/// Histogram of instructions, one line per group: key, count and share of all instructions.
pub fn dump_opcode_histogram(blocks: &Blocks, grouping: Grouping) -> Result<String, std::fmt::Error> {
    let usage = opcode_histogram(blocks, grouping);
    let mut res = String::new();
    let key_width = match usage.iter().map(|(key, _)| key.len()).max() {
        Some(longest) => longest + 2,
        None => return Ok(res),
    };
    let total: usize = usage.iter().map(|(_, count)| count).sum();
    let count_width = count_width(total);
    for (key, count) in usage {
        let share = count as f64 / total as f64 * 100.0;
        writeln!(res, "{:key_width$} {:>count_width$} ({:6.2} %)", key, count, share,
                 key_width = key_width, count_width = count_width)?;
    }
    Ok(res)
}
