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

//! Static opcode metadata.
//!
//! The analyser never derives this information itself: every mnemonic is looked up in an
//! [`OpcodeTable`], and mnemonics missing from the table get a zero-effect default (see
//! [`OpcodeMetadata::unknown`]), so that unknown opcodes never abort an analysis.

use std::borrow::Cow;
use std::collections::HashMap;
use once_cell::sync::Lazy;
use parse_display::{Display, FromStr};

/// Instruction encoding families.
#[derive(Debug, Display, FromStr, Copy, Clone, Hash, Ord, PartialOrd, Eq, PartialEq)]
#[display(style = "UPPERCASE")]
#[allow(missing_docs)]
pub enum InstrClass {
    Unknown,
    Sop1,
    Sop2,
    Sopk,
    Sopc,
    Sopp,
    Smem,
    Vop1,
    Vop2,
    Vop3,
    Vopc,
    Vintrp,
    Ds,
    Mubuf,
    Mtbuf,
    Mimg,
    Exp,
    Flat,
}

impl InstrClass {
    /// Vector ALU families sharing their textual mnemonics, told apart by the binary encoding.
    pub fn is_dual_encoded(self) -> bool {
        matches!(self, InstrClass::Vop2 | InstrClass::Vop3)
    }

    /// Resolve a dual-encoded class from the leading 32-bit word of the binary encoding.
    pub fn from_encoding(word: u32) -> InstrClass {
        if word & 0x8000_0000 == 0 { InstrClass::Vop2 } else { InstrClass::Vop3 }
    }
}

/// Control flow behaviour of an opcode.
#[derive(Debug, Display, FromStr, Copy, Clone, Hash, Eq, PartialEq)]
#[display(style = "lowercase")]
pub enum FlowKind {
    /// Control flow always falls through to the next instruction.
    Default,
    /// Conditional branch: both the target and the next instruction are successors.
    Branch,
    /// Unconditional jump: only the target is a successor.
    Jump,
}

/// How an instruction accesses one of its operands.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Access {
    /// The operand is only read.
    Read,
    /// The operand is only written.
    Write,
    /// The operand is read, and then written.
    ReadWrite,
    /// The operand is neither read nor written (e.g. any operand of an unknown opcode).
    Ignored,
}

/// Metadata for one opcode.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct OpcodeMetadata {
    /// The mnemonic.
    pub name: Cow<'static, str>,
    /// Positions of operands written by this opcode.
    pub written: Cow<'static, [usize]>,
    /// Positions of operands read by this opcode.
    pub read: Cow<'static, [usize]>,
    /// Encoding family.
    pub class: InstrClass,
    /// Branching behaviour.
    pub flow: FlowKind,
    /// Issue cost in cycles, if known. Not used by any analysis.
    pub cycles: Option<u32>,
}

impl OpcodeMetadata {
    /// Default metadata for mnemonics absent from the table: no reads, no writes.
    pub fn unknown(name: &str) -> OpcodeMetadata {
        OpcodeMetadata {
            name: Cow::Owned(name.to_string()),
            written: Cow::Borrowed(&[]),
            read: Cow::Borrowed(&[]),
            class: InstrClass::Unknown,
            flow: FlowKind::Default,
            cycles: None,
        }
    }

    /// Classify the operand at `position`.
    pub fn access(&self, position: usize) -> Access {
        match (self.read.contains(&position), self.written.contains(&position)) {
            (true, true) => Access::ReadWrite,
            (false, true) => Access::Write,
            (true, false) => Access::Read,
            (false, false) => Access::Ignored,
        }
    }

    /// Positions both read and written.
    pub fn read_written(&self) -> impl Iterator<Item=usize> + '_ {
        self.read.iter().copied().filter(|k| self.written.contains(k))
    }

    /// Conditional branch?
    pub fn is_branch(&self) -> bool { self.flow == FlowKind::Branch }

    /// Unconditional jump?
    pub fn is_jump(&self) -> bool { self.flow == FlowKind::Jump }
}

/// Lookup table from mnemonics to [`OpcodeMetadata`].
#[derive(Debug, Clone, Default)]
pub struct OpcodeTable {
    opcodes: HashMap<Cow<'static, str>, OpcodeMetadata>,
}

impl OpcodeTable {
    /// An empty table: every mnemonic resolves to [`OpcodeMetadata::unknown`].
    pub fn new() -> OpcodeTable { OpcodeTable::default() }

    /// The built-in table for GCN shader ISA.
    pub fn gcn() -> &'static OpcodeTable {
        static GCN: Lazy<OpcodeTable> = Lazy::new(|| gcn_opcodes().into_iter().collect());
        &GCN
    }

    /// Add or replace an entry, returning the replaced one.
    pub fn insert(&mut self, opcode: OpcodeMetadata) -> Option<OpcodeMetadata> {
        self.opcodes.insert(opcode.name.clone(), opcode)
    }

    /// Exact lookup.
    pub fn get(&self, name: &str) -> Option<&OpcodeMetadata> {
        self.opcodes.get(name)
    }

    /// Lookup with the zero-effect default for unknown mnemonics.
    pub fn lookup(&self, name: &str) -> OpcodeMetadata {
        match self.get(name) {
            Some(opcode) => opcode.clone(),
            None => {
                tracing::trace!(mnemonic = name, "unknown opcode, assuming no register effects");
                OpcodeMetadata::unknown(name)
            }
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize { self.opcodes.len() }

    /// Whether or not the table is empty.
    pub fn is_empty(&self) -> bool { self.opcodes.is_empty() }
}

impl FromIterator<OpcodeMetadata> for OpcodeTable {
    fn from_iter<I: IntoIterator<Item=OpcodeMetadata>>(iter: I) -> Self {
        let mut table = OpcodeTable::new();
        for opcode in iter {
            table.insert(opcode);
        }
        table
    }
}

macro_rules! opcodes {
    (@flow) => { FlowKind::Default };
    (@flow $flow: ident) => { FlowKind::$flow };
    (@cycles) => { None };
    (@cycles $cycles: literal) => { Some($cycles) };
    ($($name: literal => $class: ident [$($w: literal),*] <- [$($r: literal),*]
       $($flow: ident)? $(@ $cycles: literal)?;)*) => {
        vec![$(OpcodeMetadata {
            name: Cow::Borrowed($name),
            written: Cow::Borrowed(&[$($w),*]),
            read: Cow::Borrowed(&[$($r),*]),
            class: InstrClass::$class,
            flow: opcodes!(@flow $($flow)?),
            cycles: opcodes!(@cycles $($cycles)?),
        }),*]
    };
}

// operand positions follow the textual order in disassembly, destination(s) first
fn gcn_opcodes() -> Vec<OpcodeMetadata> {
    opcodes! {
        // scalar ALU
        "s_mov_b32" => Sop1 [0] <- [1];
        "s_mov_b64" => Sop1 [0] <- [1];
        "s_not_b32" => Sop1 [0] <- [1];
        "s_getpc_b64" => Sop1 [0] <- [];
        "s_setpc_b64" => Sop1 [] <- [0];
        "s_swappc_b64" => Sop1 [0] <- [1];
        "s_and_saveexec_b64" => Sop1 [0] <- [1];
        "s_or_saveexec_b64" => Sop1 [0] <- [1];
        "s_add_u32" => Sop2 [0] <- [1, 2];
        "s_sub_u32" => Sop2 [0] <- [1, 2];
        "s_add_i32" => Sop2 [0] <- [1, 2];
        "s_sub_i32" => Sop2 [0] <- [1, 2];
        "s_mul_i32" => Sop2 [0] <- [1, 2];
        "s_and_b32" => Sop2 [0] <- [1, 2];
        "s_and_b64" => Sop2 [0] <- [1, 2];
        "s_or_b32" => Sop2 [0] <- [1, 2];
        "s_or_b64" => Sop2 [0] <- [1, 2];
        "s_xor_b64" => Sop2 [0] <- [1, 2];
        "s_andn2_b64" => Sop2 [0] <- [1, 2];
        "s_lshl_b32" => Sop2 [0] <- [1, 2];
        "s_lshr_b32" => Sop2 [0] <- [1, 2];
        "s_bfe_u32" => Sop2 [0] <- [1, 2];
        "s_cselect_b32" => Sop2 [0] <- [1, 2];
        "s_cselect_b64" => Sop2 [0] <- [1, 2];
        "s_movk_i32" => Sopk [0] <- [1];
        "s_cmpk_eq_i32" => Sopk [] <- [0, 1];
        "s_cmp_eq_u32" => Sopc [] <- [0, 1];
        "s_cmp_lg_u32" => Sopc [] <- [0, 1];
        "s_cmp_lt_u32" => Sopc [] <- [0, 1];
        "s_cmp_gt_i32" => Sopc [] <- [0, 1];
        // program control
        "s_nop" => Sopp [] <- [];
        "s_endpgm" => Sopp [] <- [];
        "s_barrier" => Sopp [] <- [];
        "s_waitcnt" => Sopp [] <- [];
        "s_sleep" => Sopp [] <- [];
        "s_sendmsg" => Sopp [] <- [];
        "s_branch" => Sopp [] <- [] Jump;
        "s_cbranch_scc0" => Sopp [] <- [] Branch;
        "s_cbranch_scc1" => Sopp [] <- [] Branch;
        "s_cbranch_vccz" => Sopp [] <- [] Branch;
        "s_cbranch_vccnz" => Sopp [] <- [] Branch;
        "s_cbranch_execz" => Sopp [] <- [] Branch;
        "s_cbranch_execnz" => Sopp [] <- [] Branch;
        // scalar memory
        "s_load_dword" => Smem [0] <- [1, 2];
        "s_load_dwordx2" => Smem [0] <- [1, 2];
        "s_load_dwordx4" => Smem [0] <- [1, 2];
        "s_load_dwordx8" => Smem [0] <- [1, 2];
        "s_buffer_load_dword" => Smem [0] <- [1, 2];
        "s_buffer_load_dwordx2" => Smem [0] <- [1, 2];
        "s_buffer_load_dwordx4" => Smem [0] <- [1, 2];
        // vector ALU, one source
        "v_mov_b32" => Vop1 [0] <- [1] @ 4;
        "v_not_b32" => Vop1 [0] <- [1] @ 4;
        "v_cvt_f32_i32" => Vop1 [0] <- [1] @ 4;
        "v_cvt_f32_u32" => Vop1 [0] <- [1] @ 4;
        "v_cvt_u32_f32" => Vop1 [0] <- [1] @ 4;
        "v_cvt_i32_f32" => Vop1 [0] <- [1] @ 4;
        "v_cvt_f16_f32" => Vop1 [0] <- [1] @ 4;
        "v_cvt_f32_f16" => Vop1 [0] <- [1] @ 4;
        "v_fract_f32" => Vop1 [0] <- [1] @ 4;
        "v_floor_f32" => Vop1 [0] <- [1] @ 4;
        "v_rcp_f32" => Vop1 [0] <- [1] @ 16;
        "v_rsq_f32" => Vop1 [0] <- [1] @ 16;
        "v_sqrt_f32" => Vop1 [0] <- [1] @ 16;
        "v_exp_f32" => Vop1 [0] <- [1] @ 16;
        "v_log_f32" => Vop1 [0] <- [1] @ 16;
        "v_sin_f32" => Vop1 [0] <- [1] @ 16;
        "v_cos_f32" => Vop1 [0] <- [1] @ 16;
        "v_readfirstlane_b32" => Vop1 [0] <- [1] @ 4;
        // vector ALU, two sources (VOP2, or VOP3 when encoded with modifiers)
        "v_add_f32" => Vop2 [0] <- [1, 2] @ 4;
        "v_sub_f32" => Vop2 [0] <- [1, 2] @ 4;
        "v_subrev_f32" => Vop2 [0] <- [1, 2] @ 4;
        "v_mul_f32" => Vop2 [0] <- [1, 2] @ 4;
        "v_min_f32" => Vop2 [0] <- [1, 2] @ 4;
        "v_max_f32" => Vop2 [0] <- [1, 2] @ 4;
        "v_add_f16" => Vop2 [0] <- [1, 2] @ 4;
        "v_mul_f16" => Vop2 [0] <- [1, 2] @ 4;
        "v_and_b32" => Vop2 [0] <- [1, 2] @ 4;
        "v_or_b32" => Vop2 [0] <- [1, 2] @ 4;
        "v_xor_b32" => Vop2 [0] <- [1, 2] @ 4;
        "v_lshlrev_b32" => Vop2 [0] <- [1, 2] @ 4;
        "v_lshrrev_b32" => Vop2 [0] <- [1, 2] @ 4;
        "v_ashrrev_i32" => Vop2 [0] <- [1, 2] @ 4;
        "v_cvt_pkrtz_f16_f32" => Vop2 [0] <- [1, 2] @ 4;
        "v_add_i32" => Vop2 [0, 1] <- [2, 3] @ 4;
        "v_add_u32" => Vop2 [0, 1] <- [2, 3] @ 4;
        "v_sub_u32" => Vop2 [0, 1] <- [2, 3] @ 4;
        "v_add_co_u32" => Vop2 [0, 1] <- [2, 3] @ 4;
        "v_addc_u32" => Vop2 [0, 1] <- [2, 3, 4] @ 4;
        "v_cndmask_b32" => Vop2 [0] <- [1, 2, 3] @ 4;
        "v_mac_f32" => Vop2 [0] <- [0, 1, 2] @ 4;
        // vector ALU, three sources
        "v_mad_f32" => Vop3 [0] <- [1, 2, 3] @ 4;
        "v_fma_f32" => Vop3 [0] <- [1, 2, 3] @ 4;
        "v_med3_f32" => Vop3 [0] <- [1, 2, 3] @ 4;
        "v_min3_f32" => Vop3 [0] <- [1, 2, 3] @ 4;
        "v_max3_f32" => Vop3 [0] <- [1, 2, 3] @ 4;
        "v_bfe_u32" => Vop3 [0] <- [1, 2, 3] @ 4;
        "v_mul_lo_u32" => Vop3 [0] <- [1, 2] @ 16;
        "v_mul_hi_u32" => Vop3 [0] <- [1, 2] @ 16;
        // vector compare, writing `vcc` or an SGPR pair
        "v_cmp_eq_f32" => Vopc [0] <- [1, 2] @ 4;
        "v_cmp_lt_f32" => Vopc [0] <- [1, 2] @ 4;
        "v_cmp_gt_f32" => Vopc [0] <- [1, 2] @ 4;
        "v_cmp_eq_u32" => Vopc [0] <- [1, 2] @ 4;
        "v_cmp_ne_u32" => Vopc [0] <- [1, 2] @ 4;
        "v_cmp_lt_u32" => Vopc [0] <- [1, 2] @ 4;
        "v_cmp_gt_i32" => Vopc [0] <- [1, 2] @ 4;
        "v_cmpx_gt_f32" => Vopc [0] <- [1, 2] @ 4;
        // parameter interpolation
        "v_interp_p1_f32" => Vintrp [0] <- [1, 2];
        "v_interp_p2_f32" => Vintrp [0] <- [0, 1, 2];
        "v_interp_mov_f32" => Vintrp [0] <- [1, 2];
        // local data share
        "ds_read_b32" => Ds [0] <- [1];
        "ds_read_b64" => Ds [0] <- [1];
        "ds_read2_b32" => Ds [0] <- [1];
        "ds_write_b32" => Ds [] <- [0, 1];
        "ds_write_b64" => Ds [] <- [0, 1];
        "ds_write2_b32" => Ds [] <- [0, 1, 2];
        "ds_add_u32" => Ds [] <- [0, 1];
        // buffer memory
        "buffer_load_dword" => Mubuf [0] <- [1, 2, 3];
        "buffer_load_dwordx2" => Mubuf [0] <- [1, 2, 3];
        "buffer_load_dwordx4" => Mubuf [0] <- [1, 2, 3];
        "buffer_store_dword" => Mubuf [] <- [0, 1, 2, 3];
        "buffer_store_dwordx2" => Mubuf [] <- [0, 1, 2, 3];
        "buffer_store_dwordx4" => Mubuf [] <- [0, 1, 2, 3];
        "buffer_atomic_add" => Mubuf [0] <- [0, 1, 2, 3];
        "tbuffer_load_format_x" => Mtbuf [0] <- [1, 2, 3];
        "tbuffer_load_format_xyzw" => Mtbuf [0] <- [1, 2, 3];
        "tbuffer_store_format_x" => Mtbuf [] <- [0, 1, 2, 3];
        // image memory
        "image_sample" => Mimg [0] <- [1, 2, 3];
        "image_sample_l" => Mimg [0] <- [1, 2, 3];
        "image_sample_lz" => Mimg [0] <- [1, 2, 3];
        "image_gather4" => Mimg [0] <- [1, 2, 3];
        "image_load" => Mimg [0] <- [1, 2];
        "image_store" => Mimg [] <- [0, 1, 2];
        // export
        "exp" => Exp [] <- [1, 2, 3, 4];
        // flat and global memory
        "flat_load_dword" => Flat [0] <- [1];
        "flat_load_dwordx2" => Flat [0] <- [1];
        "flat_load_dwordx4" => Flat [0] <- [1];
        "flat_store_dword" => Flat [] <- [0, 1];
        "global_load_dword" => Flat [0] <- [1, 2];
        "global_store_dword" => Flat [] <- [0, 1, 2];
    }
}
