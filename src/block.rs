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

//! Basic blocks, and the control flow graph between them.

use std::collections::HashMap;
use displaydoc::Display;
use smallvec::SmallVec;
use thiserror::Error;

use crate::instr::{Instruction, RegisterSet};

/// Label of the synthetic entry block.
pub const ENTRY: &str = "entry";

/// Label of the synthetic exit block.
pub const EXIT: &str = "exit";

/// Basic block.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BasicBlock {
    /// Label of this block, unique among all the blocks of a program.
    pub label: String,
    /// All the instructions in this basic block.
    pub instructions: Vec<Instruction>,
    /// Position of this block, in order of creation.
    pub order: usize,
    /// Successor blocks, without duplicates.
    pub successors: SmallVec<[usize; 2]>,
    /// Predecessor blocks, without duplicates.
    pub predecessors: Vec<usize>,
}

impl BasicBlock {
    fn new(label: String, instructions: Vec<Instruction>, order: usize) -> BasicBlock {
        BasicBlock {
            label,
            instructions,
            order,
            successors: SmallVec::new(),
            predecessors: Vec::new(),
        }
    }

    /// Whether or not this block has no instructions.
    pub fn is_empty(&self) -> bool { self.instructions.is_empty() }
    /// Is this the synthetic entry block?
    pub fn is_entry(&self) -> bool { self.label == ENTRY }
    /// Is this the synthetic exit block?
    pub fn is_exit(&self) -> bool { self.label == EXIT }
    /// The last instruction in this block.
    pub fn last_instr(&self) -> Option<&Instruction> { self.instructions.last() }

    /// VGPRs read and written within this block, regardless of liveness across blocks.
    pub fn used_vgprs(&self) -> RegisterSet {
        RegisterSet::merge(self.instructions.iter().map(Instruction::registers))
    }
}

/// Program validation error during conversion to a series of basic blocks.
#[derive(Debug, Display, Error, Eq, PartialEq)]
pub enum Error {
    /// the branch ending block `{block}` targets an unknown label `{target}`
    UnresolvedTarget {
        /// The block ending with the offending branch.
        block: String,
        /// The unknown label.
        target: String,
    },
    /// the branch ending block `{block}` has no target
    MissingTarget {
        /// The block ending with the offending branch.
        block: String,
    },
    /// label `{0}` names more than one basic block
    DuplicateLabel(String),
}

/// Where the control flow goes after a block.
enum Exit {
    Fallthrough,
    Branch(usize),
    Jump(usize),
}

/// Collection of basic blocks for an instruction stream, starting with an empty [`ENTRY`] block,
/// and ending with an empty [`EXIT`] block.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Blocks {
    blocks: Vec<BasicBlock>,
    by_label: HashMap<String, usize>,
}

impl Blocks {
    /// Partition the instructions into basic blocks, and link them into a control flow graph.
    pub fn build(instructions: Vec<Instruction>) -> Result<Blocks, Error> {
        let mut blocks = Blocks::default();
        let mut current_label = ENTRY.to_string();
        let mut current = Vec::new();
        let mut start_on_next = true;

        for instr in instructions {
            if instr.label().is_some() || start_on_next {
                let next_label = match instr.label() {
                    Some(label) => label.to_string(),
                    None => format!("basic_block_{}", blocks.len() + 1),
                };
                let label = std::mem::replace(&mut current_label, next_label);
                blocks.push(label, std::mem::take(&mut current))?;
                start_on_next = false;
            }
            if instr.is_branch() || instr.is_jump() {
                start_on_next = true;
            }
            current.push(instr);
        }
        // an empty instruction stream still gets its entry block
        if !current.is_empty() || blocks.is_empty() {
            blocks.push(current_label, current)?;
        }
        blocks.push(EXIT.to_string(), Vec::new())?;

        blocks.link_all()?;
        tracing::debug!(count = blocks.len(), "basic blocks built");
        Ok(blocks)
    }

    fn push(&mut self, label: String, instructions: Vec<Instruction>) -> Result<(), Error> {
        let order = self.blocks.len();
        if self.by_label.insert(label.clone(), order).is_some() {
            return Err(Error::DuplicateLabel(label));
        }
        self.blocks.push(BasicBlock::new(label, instructions, order));
        Ok(())
    }

    fn link(&mut self, from: usize, to: usize) {
        if !self.blocks[from].successors.contains(&to) {
            self.blocks[from].successors.push(to);
            self.blocks[to].predecessors.push(from);
        }
    }

    fn resolve(&self, block: &BasicBlock, instr: &Instruction) -> Result<usize, Error> {
        let target = instr.target()
            .ok_or_else(|| Error::MissingTarget { block: block.label.clone() })?;
        self.index_of(target).ok_or_else(|| Error::UnresolvedTarget {
            block: block.label.clone(),
            target: target.to_string(),
        })
    }

    fn link_all(&mut self) -> Result<(), Error> {
        for k in 0..self.blocks.len() - 1 {
            let block = &mut self.blocks[k];
            let label = block.label.clone();
            if let Some(first) = block.instructions.first_mut() {
                if first.label() != Some(label.as_str()) {
                    first.set_label(label);
                }
            }
            let block = &self.blocks[k];
            let exit = match block.last_instr() {
                Some(instr) if instr.is_branch() => Exit::Branch(self.resolve(block, instr)?),
                Some(instr) if instr.is_jump() => Exit::Jump(self.resolve(block, instr)?),
                _ => Exit::Fallthrough,
            };
            match exit {
                Exit::Branch(target) => {
                    self.link(k, target);
                    self.link(k, k + 1);
                }
                Exit::Jump(target) => self.link(k, target),
                Exit::Fallthrough => self.link(k, k + 1),
            }
        }
        Ok(())
    }

    /// All the blocks, in order of creation.
    pub fn blocks(&self) -> &[BasicBlock] { &self.blocks }
    /// Number of blocks.
    pub fn len(&self) -> usize { self.blocks.len() }
    /// Always `false` for blocks obtained from [`Blocks::build`].
    pub fn is_empty(&self) -> bool { self.blocks.is_empty() }
    /// Index of the block with this label.
    pub fn index_of(&self, label: &str) -> Option<usize> { self.by_label.get(label).copied() }
    /// The block with this label.
    pub fn get(&self, label: &str) -> Option<&BasicBlock> {
        self.index_of(label).map(|k| &self.blocks[k])
    }
    /// Index of the entry block.
    pub fn entry(&self) -> usize { 0 }
    /// Index of the exit block.
    pub fn exit(&self) -> usize { self.blocks.len() - 1 }
    /// All the instructions, in program order.
    pub fn instructions(&self) -> impl Iterator<Item=&Instruction> {
        self.blocks.iter().flat_map(|block| block.instructions.iter())
    }
}

impl std::ops::Index<usize> for Blocks {
    type Output = BasicBlock;
    fn index(&self, index: usize) -> &BasicBlock { &self.blocks[index] }
}
