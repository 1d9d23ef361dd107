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

//! Instructions, and the vector registers they access.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::ops::RangeInclusive;
use derivative::Derivative;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::opcode::{Access, InstrClass, OpcodeMetadata, OpcodeTable};

/// Index of a vector general purpose register (VGPR).
pub type Reg = u32;

/// A set of VGPRs.
pub type RegSet = BTreeSet<Reg>;

/// VGPRs read and written by some instructions.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct RegisterSet {
    /// Registers read.
    pub read: RegSet,
    /// Registers written.
    pub written: RegSet,
}

impl RegisterSet {
    /// Union of several register sets.
    pub fn merge<'a>(sets: impl IntoIterator<Item=&'a RegisterSet>) -> RegisterSet {
        let mut result = RegisterSet::default();
        for set in sets {
            result.read.extend(set.read.iter().copied());
            result.written.extend(set.written.iter().copied());
        }
        result
    }
}

impl Display for RegisterSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Written: {}, read: {}", self.written.len(), self.read.len())
    }
}

static VGPR: Lazy<Regex> = Lazy::new(|| {
    // v<n> or v[<start>:<end>]
    Regex::new(r"^v(?:(\d+)|\[(\d+):(\d+)\])$").unwrap()
});

/// Number of VGPRs addressable by a GCN wave: `v0` up to `v255`.
pub const MAX_VGPRS: Reg = 256;

/// VGPRs referenced by an operand, after stripping a negation and an `abs(...)` wrapper.
///
/// Anything other than a VGPR (scalar registers, constants, `vcc`, `vmcnt(0)`, ...) yields
/// [`None`]. So does a register index of [`MAX_VGPRS`] or above.
pub fn vgprs_of(operand: &str) -> Option<RangeInclusive<Reg>> {
    let operand = operand.strip_prefix('-').unwrap_or(operand);
    let operand = operand.strip_prefix("abs(")
        .and_then(|inner| inner.strip_suffix(')'))
        .unwrap_or(operand);
    if operand == "vcc" || operand.starts_with("vmcnt") { return None; }
    let captures = VGPR.captures(operand)?;
    let parse = |k: usize| captures.get(k).map(|m| m.as_str().parse::<Reg>());
    let range = match (parse(1), parse(2), parse(3)) {
        (Some(single), _, _) => single.ok().map(|r| r..=r),
        (None, Some(start), Some(end)) => Some(start.ok()?..=end.ok()?),
        _ => None,
    }?;
    if *range.start() >= MAX_VGPRS || *range.end() >= MAX_VGPRS {
        tracing::trace!(operand, "register index out of range, ignored");
        return None;
    }
    Some(range)
}

/// An instruction: an opcode, its operands, and an optional label if it starts a basic block.
///
/// The VGPRs accessed are computed once, upon construction.
#[derive(Derivative)]
#[derivative(Debug, Clone, Eq, PartialEq)]
pub struct Instruction {
    opcode: OpcodeMetadata,
    operands: Vec<String>,
    label: Option<String>,
    #[derivative(PartialEq = "ignore")]
    registers: RegisterSet,
}

impl Instruction {
    /// Create an instruction, looking up its opcode in `table`.
    ///
    /// For opcodes with both a VOP2 and a VOP3 encoding, the highest bit of the leading 32-bit
    /// word of `binary` decides the actual encoding.
    pub fn new(binary: Option<&str>, mnemonic: &str, operands: Vec<String>,
               label: Option<String>, table: &OpcodeTable) -> Instruction {
        let mut opcode = table.lookup(mnemonic);
        if opcode.class.is_dual_encoded() {
            if let Some(word) = binary.and_then(leading_word) {
                opcode.class = InstrClass::from_encoding(word);
            }
        }
        let registers = registers_of(&opcode, &operands);
        Instruction { opcode, operands, label, registers }
    }

    /// Metadata for the opcode.
    pub fn opcode(&self) -> &OpcodeMetadata { &self.opcode }
    /// Operands, as they appear in the source text.
    pub fn operands(&self) -> &[String] { &self.operands }
    /// The label, if any.
    pub fn label(&self) -> Option<&str> { self.label.as_deref() }
    /// Label this instruction.
    pub fn set_label(&mut self, label: String) { self.label = Some(label) }
    /// VGPRs read and written by this instruction.
    pub fn registers(&self) -> &RegisterSet { &self.registers }
    /// Conditional branch?
    pub fn is_branch(&self) -> bool { self.opcode.is_branch() }
    /// Unconditional jump?
    pub fn is_jump(&self) -> bool { self.opcode.is_jump() }
    /// Target label for branches and jumps: always the first operand.
    pub fn target(&self) -> Option<&str> { self.operands.first().map(String::as_str) }

    /// Display this instruction without its label.
    pub fn without_label(&self) -> WithoutLabel {
        WithoutLabel(self)
    }
}

fn leading_word(binary: &str) -> Option<u32> {
    let word = binary.split_whitespace().next()?;
    match u32::from_str_radix(word, 16) {
        Ok(word) => Some(word),
        Err(err) => {
            tracing::warn!(word, %err, "cannot decode binary encoding");
            None
        }
    }
}

fn registers_of(opcode: &OpcodeMetadata, operands: &[String]) -> RegisterSet {
    let mut result = RegisterSet::default();
    for (k, operand) in operands.iter().enumerate() {
        let (read, written) = match opcode.access(k) {
            Access::Read => (true, false),
            Access::Write => (false, true),
            Access::ReadWrite => (true, true),
            Access::Ignored => continue,
        };
        if let Some(regs) = vgprs_of(operand) {
            if read { result.read.extend(regs.clone()); }
            if written { result.written.extend(regs); }
        }
    }
    result
}

/// See [`Instruction::without_label`].
pub struct WithoutLabel<'a>(&'a Instruction);

impl<'a> Display for WithoutLabel<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let instr = self.0;
        write!(f, "{}", instr.opcode.name)?;
        if !instr.operands.is_empty() {
            write!(f, " {}", instr.operands.iter().format(", "))?;
        }
        Ok(())
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(label) = &self.label {
            write!(f, "{}: ", label)?;
        }
        write!(f, "{}", self.without_label())
    }
}

#[cfg(test)]
mod tests {
    use itertools::assert_equal;
    use crate::opcode::{InstrClass, OpcodeTable};
    use super::{Instruction, RegisterSet, vgprs_of};

    fn instr(binary: Option<&str>, mnemonic: &str, operands: &[&str]) -> Instruction {
        let operands = operands.iter().map(|s| s.to_string()).collect();
        Instruction::new(binary, mnemonic, operands, None, OpcodeTable::gcn())
    }

    #[test]
    fn test_vgprs_of() {
        assert_eq!(vgprs_of("v[2:5]"), Some(2..=5));
        assert_eq!(vgprs_of("v3"), Some(3..=3));
        assert_eq!(vgprs_of("abs(v3)"), Some(3..=3));
        assert_eq!(vgprs_of("-v3"), Some(3..=3));
        assert_eq!(vgprs_of("-abs(v7)"), Some(7..=7));
        for operand in ["vcc", "vcc_lo", "vmcnt(1)", "s4", "s[0:3]", "1.0", "0x3f800000",
                        "abs(", "v", "attr0.x", "exec"] {
            assert_eq!(vgprs_of(operand), None, "operand {}", operand);
        }
    }

    #[test]
    fn test_vgpr_index_limit() {
        assert_eq!(vgprs_of("v255"), Some(255..=255));
        assert_eq!(vgprs_of("v[252:255]"), Some(252..=255));
        for operand in ["v256", "v100000000", "v4294967295", "v99999999999",
                        "v[0:4000000000]", "v[255:256]", "-abs(v4294967295)"] {
            assert_eq!(vgprs_of(operand), None, "operand {}", operand);
        }
        let huge = instr(None, "v_mov_b32", &["v4294967295", "v[0:4000000000]"]);
        assert_eq!(huge.registers(), &RegisterSet::default());
    }

    #[test]
    fn test_registers() {
        let add = instr(None, "v_add_f32", &["v3", "-v1", "abs(v[4:5])"]);
        assert_equal(add.registers().read.iter().copied(), [1u32, 4, 5]);
        assert_equal(add.registers().written.iter().copied(), [3u32]);

        let mac = instr(None, "v_mac_f32", &["v0", "v1", "v2"]);
        assert_equal(mac.registers().read.iter().copied(), [0u32, 1, 2]);
        assert_equal(mac.registers().written.iter().copied(), [0u32]);

        let cmp = instr(None, "v_cmp_gt_f32", &["vcc", "v3", "v4"]);
        assert!(cmp.registers().written.is_empty());
        assert_equal(cmp.registers().read.iter().copied(), [3u32, 4]);

        let wait = instr(None, "s_waitcnt", &["vmcnt(1)"]);
        assert_eq!(wait.registers(), &RegisterSet::default());
    }

    #[test]
    fn test_unknown_opcode() {
        let foo = instr(None, "xyz_foo", &["v0", "v1"]);
        assert_eq!(foo.opcode().class, InstrClass::Unknown);
        assert!(foo.registers().read.is_empty());
        assert!(foo.registers().written.is_empty());
    }

    #[test]
    fn test_dual_encoding() {
        assert_eq!(instr(Some("02020500"), "v_add_f32", &["v1", "v0", "v2"]).opcode().class,
                   InstrClass::Vop2);
        assert_eq!(instr(Some("D1010003 00020501"), "v_add_f32", &["v1", "v0", "v2"])
                       .opcode().class, InstrClass::Vop3);
        assert_eq!(instr(None, "v_add_f32", &["v1", "v0", "v2"]).opcode().class,
                   InstrClass::Vop2);
        assert_eq!(instr(Some("zzzz"), "v_add_f32", &["v1", "v0", "v2"]).opcode().class,
                   InstrClass::Vop2);
        // only dual-encoded families are affected
        assert_eq!(instr(Some("D1010003"), "v_mov_b32", &["v1", "v0"]).opcode().class,
                   InstrClass::Vop1);
        // the table is never modified
        assert_eq!(OpcodeTable::gcn().lookup("v_add_f32").class, InstrClass::Vop2);
    }

    #[test]
    fn test_display() {
        let mut mov = instr(None, "v_mov_b32", &["v0", "v1"]);
        assert_eq!(mov.to_string(), "v_mov_b32 v0, v1");
        mov.set_label("label_0004".to_string());
        assert_eq!(mov.to_string(), "label_0004: v_mov_b32 v0, v1");
        assert_eq!(mov.without_label().to_string(), "v_mov_b32 v0, v1");
        assert_eq!(instr(None, "s_endpgm", &[]).to_string(), "s_endpgm");
    }

    #[test]
    fn test_merge() {
        let a = instr(None, "v_mov_b32", &["v0", "v1"]);
        let b = instr(None, "v_add_f32", &["v2", "v0", "v3"]);
        let merged = RegisterSet::merge([a.registers(), b.registers()]);
        assert_equal(merged.read.iter().copied(), [0u32, 1, 3]);
        assert_equal(merged.written.iter().copied(), [0u32, 2]);
        assert_eq!(merged.to_string(), "Written: 2, read: 3");
    }
}
