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

//! Per-instruction control flow graph.
//!
//! The basic block graph is lowered to a graph with one node per instruction. Nodes refer back to
//! their enclosing [`BasicBlock`](crate::block::BasicBlock) by index, and never own it.

use std::collections::{HashMap, HashSet};
use itertools::Itertools;
use smallvec::SmallVec;

use crate::block::Blocks;
use crate::instr::{Instruction, RegSet};

/// A node in the per-instruction control flow graph, holding at most one instruction.
///
/// Empty blocks (notably the entry and exit blocks) are lowered to a single placeholder node.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Node {
    /// Index of the enclosing basic block.
    pub block: usize,
    /// Position within the enclosing basic block.
    pub order: usize,
    /// Successor nodes.
    pub successors: SmallVec<[usize; 2]>,
    /// Predecessor nodes.
    pub predecessors: SmallVec<[usize; 2]>,
    /// Registers live at the incoming edges of this node.
    pub live_in: RegSet,
    /// Registers live at the outgoing edges of this node.
    pub live_out: RegSet,
}

impl Node {
    fn new(block: usize, order: usize) -> Node {
        Node {
            block,
            order,
            successors: SmallVec::new(),
            predecessors: SmallVec::new(),
            live_in: RegSet::new(),
            live_out: RegSet::new(),
        }
    }

    /// The instruction in this node, or [`None`] for placeholders.
    pub fn instruction<'a>(&self, blocks: &'a Blocks) -> Option<&'a Instruction> {
        blocks[self.block].instructions.get(self.order)
    }

    /// Registers live before or after this node.
    pub fn live(&self) -> RegSet {
        self.live_in.union(&self.live_out).copied().collect()
    }
}

/// Direction for depth-first gathering.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum GatherOrder {
    /// Follow successor edges.
    Successors,
    /// Follow predecessor edges.
    Predecessors,
}

/// Per-instruction control flow graph.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct InstrGraph {
    nodes: Vec<Node>,
    entry: usize,
}

impl InstrGraph {
    /// Lower the basic blocks reachable from the entry block.
    pub fn lower(blocks: &Blocks) -> InstrGraph {
        InstrGraph::lower_from(blocks, blocks.entry())
    }

    /// Lower the basic blocks reachable from `start`.
    ///
    /// Each block is lowered exactly once, even if it is reachable from several predecessors or
    /// part of a loop.
    pub fn lower_from(blocks: &Blocks, start: usize) -> InstrGraph {
        let mut graph = InstrGraph { nodes: Vec::new(), entry: 0 };
        // first and last node of each lowered block
        let mut spans: HashMap<&str, (usize, usize)> = HashMap::new();
        let mut lowered = Vec::new();
        let mut stack = vec![start];
        while let Some(block_idx) = stack.pop() {
            let block = &blocks[block_idx];
            if spans.contains_key(block.label.as_str()) { continue; }
            let first = graph.nodes.len();
            for order in 0..block.instructions.len().max(1) {
                graph.nodes.push(Node::new(block_idx, order));
            }
            let last = graph.nodes.len() - 1;
            for (x, y) in (first..=last).tuple_windows() {
                graph.link(x, y);
            }
            spans.insert(&block.label, (first, last));
            lowered.push(block_idx);
            stack.extend(block.successors.iter().rev());
        }
        for block_idx in lowered {
            let block = &blocks[block_idx];
            let (_, last) = spans[block.label.as_str()];
            for &succ in &block.successors {
                let (first, _) = spans[blocks[succ].label.as_str()];
                graph.link(last, first);
            }
        }
        tracing::debug!(nodes = graph.nodes.len(), "per-instruction graph lowered");
        graph
    }

    fn link(&mut self, from: usize, to: usize) {
        if !self.nodes[from].successors.contains(&to) {
            self.nodes[from].successors.push(to);
            self.nodes[to].predecessors.push(from);
        }
    }

    /// All the nodes.
    pub fn nodes(&self) -> &[Node] { &self.nodes }
    pub(crate) fn nodes_mut(&mut self) -> &mut [Node] { &mut self.nodes }
    /// The entry node.
    pub fn entry(&self) -> usize { self.entry }

    /// The exit node: the first node without successors, in depth-first order from the entry.
    pub fn exit(&self) -> Option<usize> {
        self.gather(self.entry, GatherOrder::Successors)
            .into_iter()
            .find(|&n| self.nodes[n].successors.is_empty())
    }

    /// Gather nodes depth-first from `start`, without recursion (the graphs can be really deep).
    pub fn gather(&self, start: usize, order: GatherOrder) -> Vec<usize> {
        let mut stack = vec![start];
        let mut visited = HashSet::new();
        let mut result = Vec::new();
        while let Some(n) = stack.pop() {
            if !visited.insert(n) { continue; }
            result.push(n);
            let node = &self.nodes[n];
            match order {
                GatherOrder::Successors => stack.extend(node.successors.iter().copied()),
                GatherOrder::Predecessors => stack.extend(node.predecessors.iter().copied()),
            }
        }
        result
    }
}
