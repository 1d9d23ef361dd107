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

//! Live variable analysis for VGPRs, on the per-instruction control flow graph.
//!
//! The usual backward equations are iterated until a fixpoint:
//! - `OUT[n] = ⋃ IN[s]` for all successors `s` of `n`;
//! - `IN[n] = USE[n] ∪ (OUT[n] - DEF[n])`.
//!
//! Both sets only ever grow, and are bounded by the (finite) set of registers in the program, so
//! the iteration always terminates.

use crate::analysis::control_flow::{GatherOrder, InstrGraph};
use crate::analysis::lattice::JoinSemiLattice;
use crate::block::Blocks;
use crate::instr::{Instruction, RegSet, RegisterSet};

/// Result of the liveness analysis. The live sets themselves are stored in the graph nodes.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Liveness {
    /// Nodes taking part in the analysis, in the order they were processed.
    pub order: Vec<usize>,
    /// Number of sweeps until the fixpoint, including the final sweep without changes.
    pub sweeps: usize,
}

/// Processing order: depth-first from the exit node, following predecessor edges. Without an
/// exit node (i.e. the program never terminates), depth-first from the entry node instead.
pub fn processing_order(graph: &InstrGraph) -> Vec<usize> {
    match graph.exit() {
        Some(exit) => graph.gather(exit, GatherOrder::Predecessors),
        None => graph.gather(graph.entry(), GatherOrder::Successors),
    }
}

/// Update `OUT` and then `IN` once for each node in `order`, returning whether or not anything
/// changed.
pub fn sweep(graph: &mut InstrGraph, blocks: &Blocks, order: &[usize]) -> bool {
    let no_registers = RegisterSet::default();
    let mut changed = false;
    for &n in order {
        let node = &graph.nodes()[n];
        let mut live_out = node.live_out.clone();
        changed |= live_out.join_assign_many(
            node.successors.iter().map(|&s| &graph.nodes()[s].live_in));

        let regs = node.instruction(blocks).map_or(&no_registers, Instruction::registers);
        let transferred: RegSet = regs.read.iter()
            .chain(live_out.difference(&regs.written))
            .copied()
            .collect();
        let mut live_in = node.live_in.clone();
        changed |= live_in.join_assign(&transferred);

        let node = &mut graph.nodes_mut()[n];
        node.live_out = live_out;
        node.live_in = live_in;
    }
    changed
}

/// Run the analysis to its fixpoint.
pub fn solve(graph: &mut InstrGraph, blocks: &Blocks) -> Liveness {
    let order = processing_order(graph);
    let mut sweeps = 1;
    while sweep(graph, blocks, &order) {
        sweeps += 1;
    }
    tracing::debug!(nodes = order.len(), sweeps, "liveness fixpoint reached");
    Liveness { order, sweeps }
}

impl Liveness {
    /// Nodes in program order: by basic block, and then by position within the block.
    pub fn program_order(&self, graph: &InstrGraph, blocks: &Blocks) -> Vec<usize> {
        let mut nodes = self.order.clone();
        nodes.sort_by_key(|&n| {
            let node = &graph.nodes()[n];
            (blocks[node.block].order, node.order)
        });
        nodes
    }
}

#[cfg(test)]
mod tests {
    use itertools::assert_equal;

    use crate::analysis::control_flow::InstrGraph;
    use crate::block::Blocks;
    use crate::instr::RegSet;
    use crate::program::read_program;
    use crate::reader::IsaFormat;
    use crate::samples;
    use super::{processing_order, solve, sweep};

    fn analysed(text: &str) -> (Blocks, InstrGraph) {
        let blocks = read_program(text, IsaFormat::Auto).unwrap();
        let mut graph = InstrGraph::lower(&blocks);
        solve(&mut graph, &blocks);
        (blocks, graph)
    }

    fn live_in_of(blocks: &Blocks, graph: &InstrGraph, mnemonic: &str) -> RegSet {
        graph.nodes().iter()
            .find(|n| n.instruction(blocks).map_or(false, |i| i.opcode().name == mnemonic))
            .unwrap()
            .live_in.clone()
    }

    #[test]
    fn test_loop_liveness() {
        let (blocks, graph) = analysed(samples::LOOP);
        // v4 is read in the loop, but never written
        assert_equal(graph.nodes()[graph.entry()].live_in.iter().copied(), [0u32, 1, 4]);
        assert_equal(live_in_of(&blocks, &graph, "v_add_f32").iter().copied(), [2u32, 3, 4]);
        assert_equal(live_in_of(&blocks, &graph, "s_cbranch_vccnz").iter().copied(), [2u32, 3, 4]);
        assert_equal(live_in_of(&blocks, &graph, "v_mul_f32").iter().copied(), [2u32, 3]);
        assert_equal(live_in_of(&blocks, &graph, "exp").iter().copied(), [5u32]);
        assert!(live_in_of(&blocks, &graph, "s_endpgm").is_empty());
        let exit = graph.exit().unwrap();
        assert!(graph.nodes()[exit].live_in.is_empty());
        assert!(graph.nodes()[exit].live_out.is_empty());
    }

    #[test]
    fn test_monotone_and_bounded() {
        let blocks = read_program(samples::LOOP, IsaFormat::Auto).unwrap();
        let mut graph = InstrGraph::lower(&blocks);
        let order = processing_order(&graph);
        let universe: RegSet = blocks.instructions()
            .flat_map(|i| i.registers().read.iter().chain(i.registers().written.iter()))
            .copied()
            .collect();
        let bound = universe.len() * graph.nodes().len() + 1;
        let snapshot = |graph: &InstrGraph| graph.nodes().iter()
            .map(|n| (n.live_in.clone(), n.live_out.clone()))
            .collect::<Vec<_>>();

        let mut sweeps = 0;
        let mut before = snapshot(&graph);
        loop {
            sweeps += 1;
            assert!(sweeps <= bound);
            let changed = sweep(&mut graph, &blocks, &order);
            let after = snapshot(&graph);
            for ((in0, out0), (in1, out1)) in before.iter().zip(after.iter()) {
                assert!(in0.is_subset(in1));
                assert!(out0.is_subset(out1));
                assert!(in1.is_subset(&universe) && out1.is_subset(&universe));
            }
            assert_eq!(changed, before != after);
            if !changed { break; }
            before = after;
        }
    }

    #[test]
    fn test_unknown_opcode_is_transparent() {
        let (blocks, graph) = analysed(indoc::indoc! {"
            shader
              v_mov_b32 v1, v0
              xyz_foo v0, v1
              v_mov_b32 v2, v1
              s_endpgm
            end
        "});
        // `xyz_foo` neither kills nor uses anything
        assert_equal(live_in_of(&blocks, &graph, "xyz_foo").iter().copied(), [1u32]);
    }

    #[test]
    fn test_idempotent() {
        let (_, first) = analysed(samples::LOOP);
        let (_, second) = analysed(samples::LOOP);
        assert_eq!(first, second);
    }

    #[test]
    fn test_endless_loop() {
        let (blocks, graph) = analysed(indoc::indoc! {"
            shader
            label_0:
              v_add_f32 v0, v0, v1
              s_branch label_0
            end
        "});
        let add = live_in_of(&blocks, &graph, "v_add_f32");
        assert_equal(add.iter().copied(), [0u32, 1]);
    }
}
