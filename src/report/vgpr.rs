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

//! Register usage reports: per basic block, and per instruction (with liveness).

use std::fmt::Write;

use crate::analysis::control_flow::InstrGraph;
use crate::analysis::liveness::Liveness;
use crate::block::Blocks;
use crate::instr::{Reg, RegisterSet, RegSet};

/// Registers read and written by each basic block, one line per block.
///
/// This only looks at the instructions inside each block, and does not take control flow into
/// account.
pub fn dump_block_vgpr(blocks: &Blocks) -> Result<String, std::fmt::Error> {
    let mut res = String::new();
    for block in blocks.blocks() {
        let vgprs = block.used_vgprs();
        writeln!(res, "Block: {:>16} | Read: {:>4} | Written: {:>4}",
                 block.label, vgprs.read.len(), vgprs.written.len())?;
    }
    Ok(res)
}

/// Summary of register pressure over a set of nodes.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct LivenessSummary {
    /// Maximum number of registers live at any node.
    pub max_live: usize,
    /// Highest register referenced, if any.
    pub highest: Option<Reg>,
}

impl LivenessSummary {
    /// Number of registers to allocate: registers are numbered from 0, so using only `v0`
    /// requires one register.
    pub fn allocated(&self) -> u32 {
        self.highest.map_or(0, |highest| highest.saturating_add(1))
    }
}

/// Summarise register pressure over `nodes`, after liveness analysis.
pub fn liveness_summary(blocks: &Blocks, graph: &InstrGraph, nodes: &[usize]) -> LivenessSummary {
    let mut summary = LivenessSummary::default();
    for &n in nodes {
        let node = &graph.nodes()[n];
        let live = node.live();
        summary.max_live = summary.max_live.max(live.len());
        let used = node.instruction(blocks).map(|instr| instr.registers());
        let highest = live.iter()
            .chain(used.into_iter().flat_map(|regs| regs.read.iter().chain(regs.written.iter())))
            .max()
            .copied();
        summary.highest = summary.highest.max(highest);
    }
    summary
}

fn register_state(regs: &RegisterSet, live: &RegSet, count: u32) -> String {
    (0..count).map(|r| match (regs.read.contains(&r), regs.written.contains(&r)) {
        (true, true) => 'x',
        (true, false) => 'v',
        (false, true) => '^',
        (false, false) if live.contains(&r) => ':',
        (false, false) => ' ',
    }).collect()
}

const LEGEND: &str = "\
Legend:
  ':' means that the register is kept alive, while it is not actively being used by the current instruction
  '^' means that the current instruction writes to the register
  'v' means that the current instruction reads from the register
  'x' means that the current instruction both reads from the register and writes to it
 'Rn': Number of live registers
";

/// Liveness report: one row per instruction, in program order, showing the state of every
/// register, followed by a summary line. With `summary_only`, the rows are omitted.
///
/// The graph must have been analysed already, and `liveness` is the result of that analysis.
pub fn dump_liveness(blocks: &Blocks, graph: &InstrGraph, liveness: &Liveness, summary_only: bool)
                     -> Result<String, std::fmt::Error> {
    let nodes = liveness.program_order(graph, blocks);
    let summary = liveness_summary(blocks, graph, &nodes);
    let count = summary.allocated();

    let mut res = String::new();
    writeln!(res, "{}", LEGEND)?;
    writeln!(res, " Line | Rn  | {:width$} | Instruction", "Reg State", width = count as usize)?;
    writeln!(res, "{}", "-".repeat(122))?;
    if !summary_only {
        for (line, &n) in nodes.iter().enumerate() {
            let node = &graph.nodes()[n];
            // entry and exit placeholders still take up a line number
            let instr = match node.instruction(blocks) {
                Some(instr) => instr,
                None => continue,
            };
            let live = node.live();
            let state = register_state(instr.registers(), &live, count);
            writeln!(res, "{:>5} | {:>3} | {:<9} | {}", line, live.len(), state, instr)?;
        }
        writeln!(res)?;
    }
    writeln!(res, "Maximum # VGPR used {:>3}, # VGPR allocated: {:>3}", summary.max_live, count)?;
    Ok(res)
}
