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

//! Control flow graphs in GraphViz `dot` format.

use std::borrow::Cow;
use std::fmt::Write;

use crate::analysis::control_flow::{GatherOrder, InstrGraph};
use crate::block::{BasicBlock, Blocks};

fn escape(text: &str) -> Cow<str> {
    if text.contains('"') {
        Cow::Owned(text.replace('"', "\\\""))
    } else {
        Cow::Borrowed(text)
    }
}

fn shape_of(block: &BasicBlock) -> &'static str {
    if block.is_entry() || block.is_exit() { "style=rounded" } else { "" }
}

fn block_content(block: &BasicBlock, compact: bool) -> Result<String, std::fmt::Error> {
    let mut res = String::new();
    if compact {
        write!(res, "{} instructions\\l", block.instructions.len())?;
    } else {
        for instr in &block.instructions {
            write!(res, "{}\\l", escape(&instr.without_label().to_string()))?;
        }
    }
    Ok(res)
}

/// Control flow graph with one node per basic block.
///
/// With `compact` set, nodes only show the number of instructions in the block.
pub fn dump_block_cfg(blocks: &Blocks, compact: bool) -> Result<String, std::fmt::Error> {
    let mut res = String::new();
    let mut links = Vec::new();
    writeln!(res, "digraph {{\nnode [shape=box]")?;
    for block in blocks.blocks() {
        writeln!(res, "\"n_{0}\" [ label= \"{0}\\n{1}\" {2}]",
                 escape(&block.label), block_content(block, compact)?, shape_of(block))?;
        links.extend(block.successors.iter().map(|&s| (&block.label, &blocks[s].label)));
    }
    for (from, to) in links {
        writeln!(res, "\"n_{}\":s -> \"n_{}\";", escape(from), escape(to))?;
    }
    writeln!(res, "}}")?;
    Ok(res)
}

/// Control flow graph with one node per instruction.
pub fn dump_instr_cfg(blocks: &Blocks, graph: &InstrGraph) -> Result<String, std::fmt::Error> {
    let mut res = String::new();
    let mut links = Vec::new();
    writeln!(res, "digraph {{\nnode [shape=box]")?;
    for n in graph.gather(graph.entry(), GatherOrder::Successors) {
        let node = &graph.nodes()[n];
        let block = &blocks[node.block];
        let (label, shape) = match node.instruction(blocks) {
            Some(instr) => (instr.without_label().to_string(), ""),
            None if block.is_entry() => ("Entry".to_string(), shape_of(block)),
            None if block.is_exit() => ("Exit".to_string(), shape_of(block)),
            None => (block.label.clone(), ""),
        };
        writeln!(res, "\"n{}\" [ label= \"{}\\l\" {}]", n, escape(&label), shape)?;
        links.extend(node.successors.iter().map(|&s| (n, s)));
    }
    for (from, to) in links {
        writeln!(res, "\"n{}\":s -> \"n{}\";", from, to)?;
    }
    writeln!(res, "}}")?;
    Ok(res)
}
