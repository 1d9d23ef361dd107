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

//! Format readers: locate the shader body in a disassembly dump, and split it into instructions.
//!
//! All formats share a first pass ([`get_lines`]) which drops comment lines, strips trailing
//! `//` comments (keeping the binary encoding some tools print there), and splits the rest into
//! whitespace-separated tokens. The formats differ only in how the shader body is delimited.

use displaydoc::Display as DisplayDoc;
use once_cell::sync::Lazy;
use parse_display::{Display, FromStr};
use regex::Regex;
use thiserror::Error;

use crate::instr::Instruction;
use crate::opcode::OpcodeTable;

/// Supported input formats.
#[derive(Debug, Display, FromStr, Copy, Clone, Eq, PartialEq)]
pub enum IsaFormat {
    /// Output from the HSAIL finaliser: `Disassembly for ...` up to `end`.
    #[display("HSAIL")]
    Hsail,
    /// Output from the shader analyser: `shader ...` up to `end`.
    #[display("ShaderAnalyzer")]
    ShaderAnalyzer,
    /// Output from driver shader dumps: a `Disassembly` separator up to `end`.
    #[display("ShaderDump")]
    ShaderDump,
    /// Bare instructions, up to and including the first `s_endpgm`.
    #[display("raw")]
    Raw,
    /// Guess from the first few bytes, see [`IsaFormat::detect`].
    #[display("auto")]
    Auto,
}

/// Number of bytes inspected by [`IsaFormat::detect`].
pub const PEEK_LENGTH: usize = 64;

/// Separator line preceding the shader body in [`IsaFormat::ShaderDump`].
pub const SHADER_DUMP_MARKER: &str = "; -------- Disassembly --------------------";

impl IsaFormat {
    /// Resolve [`IsaFormat::Auto`] by peeking at the beginning of the input. Other formats are
    /// returned unchanged.
    pub fn detect(self, text: &str) -> IsaFormat {
        if self != IsaFormat::Auto { return self; }
        let start = &text.as_bytes()[..text.len().min(PEEK_LENGTH)];
        if start.starts_with(b"AMD Kernel Code for") {
            IsaFormat::Hsail
        } else if start.starts_with(b";--------") {
            IsaFormat::ShaderDump
        } else {
            IsaFormat::ShaderAnalyzer
        }
    }
}

/// Structural errors in the input.
#[derive(Debug, DisplayDoc, Error, Eq, PartialEq)]
pub enum ParseError {
    /// mismatched `{found}` in line {line}
    MismatchedDelimiter {
        /// Line number (starting from 1).
        line: usize,
        /// The offending delimiter.
        found: String,
    },
    /// shader body starting in line {opened} is never closed by `end`
    UnterminatedBody {
        /// Line number of the opening delimiter.
        opened: usize,
    },
    /// no shader body found in {format} input
    MissingBody {
        /// The (detected) input format.
        format: IsaFormat,
    },
}

/// A non-blank line of input.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TokenLine {
    /// Line number (starting from 1).
    pub line: usize,
    /// Binary encoding found in the trailing comment, e.g. `D1190201 00000100`.
    pub binary: Option<String>,
    /// Whitespace-separated tokens, never empty.
    pub tokens: Vec<String>,
}

impl TokenLine {
    fn first(&self) -> &str { &self.tokens[0] }

    fn to_lowercase(&self) -> TokenLine {
        TokenLine {
            line: self.line,
            binary: self.binary.as_deref().map(str::to_lowercase),
            tokens: self.tokens.iter().map(|t| t.to_lowercase()).collect(),
        }
    }
}

static BINARY_ENCODING: Lazy<Regex> = Lazy::new(|| {
    // <offset>: <8 hex digits> [<8 hex digits>]
    Regex::new(r" *[0-9a-fA-F]+: *([0-9a-fA-F]{8})( *[0-9a-fA-F]{8})?").unwrap()
});

/// Find the binary encoding in a trailing comment:
///
/// ```text
/// 000000000130: D1190201 00000100
///               `--- bin code ---'
/// ```
pub fn binary_encoding(comment: &str) -> Option<String> {
    if !BINARY_ENCODING.is_match(comment) { return None; }
    let (_, code) = comment.split_once(':')?;
    Some(code.trim().to_string())
}

/// The common first pass over the input, shared by all the formats.
pub fn get_lines(text: &str) -> Vec<TokenLine> {
    let mut lines = Vec::new();
    for (line, k) in text.lines().zip(1..) {
        let line = line.trim();
        if line.starts_with(';') {
            // the only comment line with a meaning
            if line.split_whitespace().eq(SHADER_DUMP_MARKER.split_whitespace()) {
                let tokens = line.split_whitespace().map(String::from).collect();
                lines.push(TokenLine { line: k, binary: None, tokens });
            }
            continue;
        }
        let (code, comment) = match line.split_once("//") {
            Some((code, comment)) => (code, Some(comment)),
            None => (line, None),
        };
        let tokens: Vec<String> = code.split_whitespace().map(String::from).collect();
        if tokens.is_empty() { continue; }
        let binary = comment.and_then(binary_encoding);
        lines.push(TokenLine { line: k, binary, tokens });
    }
    lines
}

enum Delimiter {
    Open,
    Close,
    Body,
}

fn delimited_body(
    lines: Vec<TokenLine>,
    format: IsaFormat,
    classify: impl Fn(&TokenLine, bool) -> Result<Delimiter, ParseError>,
) -> Result<Vec<TokenLine>, ParseError> {
    let mut opened = None;
    let mut body = Vec::new();
    for line in lines {
        match classify(&line, opened.is_some())? {
            Delimiter::Open => { opened.get_or_insert(line.line); }
            Delimiter::Close => return Ok(body),
            Delimiter::Body if opened.is_some() => body.push(line),
            Delimiter::Body => {}
        }
    }
    Err(match opened {
        Some(opened) => ParseError::UnterminatedBody { opened },
        None => ParseError::MissingBody { format },
    })
}

fn mismatched(line: &TokenLine) -> ParseError {
    ParseError::MismatchedDelimiter { line: line.line, found: line.first().to_string() }
}

fn shader_analyzer_body(lines: Vec<TokenLine>) -> Result<Vec<TokenLine>, ParseError> {
    delimited_body(lines, IsaFormat::ShaderAnalyzer, |line, inside| match line.first() {
        "shader" if !inside => Ok(Delimiter::Open),
        "end" if inside => Ok(Delimiter::Close),
        "shader" | "end" => Err(mismatched(line)),
        _ => Ok(Delimiter::Body),
    })
}

fn hsail_body(lines: Vec<TokenLine>) -> Result<Vec<TokenLine>, ParseError> {
    delimited_body(lines, IsaFormat::Hsail, |line, inside| {
        match (line.first(), line.tokens.get(1).map(String::as_str)) {
            ("Disassembly", Some("for")) => Ok(Delimiter::Open),
            ("end", _) if inside => Ok(Delimiter::Close),
            ("end", _) => Err(mismatched(line)),
            _ => Ok(Delimiter::Body),
        }
    })
}

fn shader_dump_body(lines: Vec<TokenLine>) -> Result<Vec<TokenLine>, ParseError> {
    delimited_body(lines, IsaFormat::ShaderDump, |line, inside| {
        if line.tokens.join(" ") == SHADER_DUMP_MARKER {
            Ok(Delimiter::Open)
        } else if inside && line.first() == "end" {
            Ok(Delimiter::Close)
        } else {
            Ok(Delimiter::Body)
        }
    })
}

fn raw_body(lines: Vec<TokenLine>) -> Vec<TokenLine> {
    let mut body = Vec::new();
    for line in lines {
        let line = line.to_lowercase();
        let is_end = line.first() == "s_endpgm";
        body.push(line);
        if is_end { break; }
    }
    body
}

/// Locate the shader body in the input text.
pub fn read_lines(text: &str, format: IsaFormat) -> Result<Vec<TokenLine>, ParseError> {
    let format = format.detect(text);
    tracing::debug!(%format, "reading shader body");
    let lines = get_lines(text);
    match format {
        IsaFormat::Hsail => hsail_body(lines),
        IsaFormat::ShaderDump => shader_dump_body(lines),
        IsaFormat::Raw => Ok(raw_body(lines)),
        // `detect` never yields `Auto`
        IsaFormat::ShaderAnalyzer | IsaFormat::Auto => shader_analyzer_body(lines),
    }
}

fn is_metadata(token: &str) -> bool {
    token == "shader" || ["asic", "type", "@kernel"].iter().any(|p| token.starts_with(p))
}

/// Split the operands of an instruction: commas (not whitespace) separate the operands, and only
/// the first word of each operand is kept (e.g. `v3 done vm` becomes `v3`).
pub fn split_operands(tokens: &[String]) -> Vec<String> {
    tokens.join(" ")
        .split(',')
        .filter_map(|operand| operand.split_whitespace().next())
        .map(String::from)
        .collect()
}

/// Turn lines in the shader body into [`Instruction`]s.
///
/// A line consisting of a label (e.g. `label_0004:`) attaches that label to the next
/// instruction.
pub fn body_instructions(body: &[TokenLine], table: &OpcodeTable) -> Vec<Instruction> {
    let mut next_label = None;
    let mut result = Vec::new();
    for line in body {
        let first = line.first();
        if is_metadata(first) { continue; }
        if let Some(label) = first.strip_suffix(':') {
            next_label = Some(label.to_string());
            continue;
        }
        let operands = split_operands(&line.tokens[1..]);
        result.push(Instruction::new(
            line.binary.as_deref(), first, operands, next_label.take(), table));
    }
    result
}

/// Read all the [`Instruction`]s from some input text.
pub fn read_instructions(text: &str, format: IsaFormat, table: &OpcodeTable)
                         -> Result<Vec<Instruction>, ParseError> {
    let body = read_lines(text, format)?;
    let instructions = body_instructions(&body, table);
    tracing::debug!(count = instructions.len(), "instructions read");
    Ok(instructions)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use itertools::assert_equal;

    use crate::opcode::{InstrClass, OpcodeTable};
    use crate::samples;
    use super::{IsaFormat, ParseError, binary_encoding, get_lines, read_instructions,
                read_lines, split_operands};

    fn mnemonics(text: &str, format: IsaFormat) -> Vec<String> {
        read_instructions(text, format, OpcodeTable::gcn()).unwrap()
            .iter()
            .map(|instr| instr.opcode().name.to_string())
            .collect()
    }

    #[test]
    fn test_format_names() {
        assert_eq!("HSAIL".parse::<IsaFormat>().unwrap(), IsaFormat::Hsail);
        assert_eq!("raw".parse::<IsaFormat>().unwrap(), IsaFormat::Raw);
        assert_eq!(IsaFormat::ShaderDump.to_string(), "ShaderDump");
        assert!("GLSL".parse::<IsaFormat>().is_err());
    }

    #[test]
    fn test_detect() {
        assert_eq!(IsaFormat::Auto.detect(samples::HSAIL), IsaFormat::Hsail);
        assert_eq!(IsaFormat::Auto.detect(samples::SHADER_DUMP), IsaFormat::ShaderDump);
        assert_eq!(IsaFormat::Auto.detect(samples::LOOP), IsaFormat::ShaderAnalyzer);
        assert_eq!(IsaFormat::Auto.detect(""), IsaFormat::ShaderAnalyzer);
        assert_eq!(IsaFormat::Raw.detect(samples::HSAIL), IsaFormat::Raw);
    }

    #[test]
    fn test_binary_encoding() {
        assert_eq!(binary_encoding(" 000000000130: D1190201 00000100").as_deref(),
                   Some("D1190201 00000100"));
        assert_eq!(binary_encoding("000000000008: 02020500").as_deref(), Some("02020500"));
        assert_eq!(binary_encoding(" just a remark"), None);
        assert_eq!(binary_encoding(""), None);
    }

    #[test]
    fn test_get_lines() {
        let lines = get_lines(indoc! {"
            ; a comment
              v_mov_b32 v0, v1 // 000000000000: 7E000301

            s_endpgm // bye
        "});
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].line, 2);
        assert_eq!(lines[0].binary.as_deref(), Some("7E000301"));
        assert_equal(lines[0].tokens.iter(), ["v_mov_b32", "v0,", "v1"].iter());
        assert_eq!(lines[1].line, 4);
        assert_eq!(lines[1].binary, None);
    }

    #[test]
    fn test_split_operands() {
        let tokens = |s: &str| s.split_whitespace().map(String::from).collect::<Vec<_>>();
        assert_equal(split_operands(&tokens("mrt0, v5, v6, v7, v8 done vm")),
                     ["mrt0", "v5", "v6", "v7", "v8"].map(String::from));
        assert_equal(split_operands(&tokens("v[0:3], v4 , s[0:7]")),
                     ["v[0:3]", "v4", "s[0:7]"].map(String::from));
        assert!(split_operands(&[]).is_empty());
    }

    #[test]
    fn test_shader_analyzer() {
        assert_equal(mnemonics(samples::LOOP, IsaFormat::ShaderAnalyzer), [
            "s_mov_b32", "v_interp_p1_f32", "v_interp_p2_f32", "v_mov_b32", "v_add_f32",
            "v_cmp_gt_f32", "s_cbranch_vccnz", "v_mul_f32", "exp", "s_endpgm",
        ]);
        let instructions = read_instructions(samples::LOOP, IsaFormat::Auto, OpcodeTable::gcn())
            .unwrap();
        assert_eq!(instructions[4].label(), Some("label_0005"));
        assert!(instructions.iter().filter(|i| i.label().is_some()).count() == 1);
    }

    #[test]
    fn test_hsail() {
        let instructions = read_instructions(samples::HSAIL, IsaFormat::Auto, OpcodeTable::gcn())
            .unwrap();
        assert_equal(instructions.iter().map(|i| &*i.opcode().name),
                     ["s_load_dwordx4", "v_add_f32", "v_add_f32", "s_endpgm"]);
        assert_eq!(instructions[1].opcode().class, InstrClass::Vop2);
        assert_eq!(instructions[2].opcode().class, InstrClass::Vop3);
    }

    #[test]
    fn test_shader_dump() {
        assert_equal(mnemonics(samples::SHADER_DUMP, IsaFormat::Auto),
                     ["v_mov_b32", "v_mac_f32", "s_endpgm"]);
    }

    #[test]
    fn test_raw() {
        let text = indoc! {"
            V_MOV_B32 V0, V1
            S_ENDPGM
            v_mov_b32 v2, v3
        "};
        assert_equal(mnemonics(text, IsaFormat::Raw), ["v_mov_b32", "s_endpgm"]);
        let instructions = read_instructions(text, IsaFormat::Raw, OpcodeTable::gcn()).unwrap();
        assert_equal(instructions[0].registers().read.iter().copied(), [1u32]);
    }

    #[test]
    fn test_structural_errors() {
        assert_eq!(read_lines("shader\nv_mov_b32 v0, v1\n", IsaFormat::ShaderAnalyzer),
                   Err(ParseError::UnterminatedBody { opened: 1 }));
        assert_eq!(read_lines("end\n", IsaFormat::ShaderAnalyzer),
                   Err(ParseError::MismatchedDelimiter { line: 1, found: "end".to_string() }));
        assert_eq!(read_lines("shader a\nshader b\nend\n", IsaFormat::ShaderAnalyzer),
                   Err(ParseError::MismatchedDelimiter { line: 2, found: "shader".to_string() }));
        assert_eq!(read_lines("v_mov_b32 v0, v1\n", IsaFormat::ShaderAnalyzer),
                   Err(ParseError::MissingBody { format: IsaFormat::ShaderAnalyzer }));
        assert_eq!(read_lines("\n\nend\n", IsaFormat::Hsail),
                   Err(ParseError::MismatchedDelimiter { line: 3, found: "end".to_string() }));
        assert_eq!(read_lines("s_endpgm\nend\n", IsaFormat::ShaderDump),
                   Err(ParseError::MissingBody { format: IsaFormat::ShaderDump }));
        assert!(read_lines("s_endpgm\nend\n", IsaFormat::Raw).is_ok());
    }

    #[test]
    fn test_metadata_inside_body() {
        let text = indoc! {"
            shader main
              asic(VI)
              type(PS)
              @kernel main
              v_mov_b32 v0, v1
              s_endpgm
            end
        "};
        assert_equal(mnemonics(text, IsaFormat::ShaderAnalyzer), ["v_mov_b32", "s_endpgm"]);
    }

    #[test]
    fn test_unterminated_bodies() {
        let hsail = indoc! {"
            AMD Kernel Code for main
            Disassembly for main:
              v_mov_b32 v0, v1
              s_endpgm
        "};
        assert_eq!(read_lines(hsail, IsaFormat::Auto),
                   Err(ParseError::UnterminatedBody { opened: 2 }));
        let shader_dump = indoc! {"
            ;-------- header
            ; -------- Disassembly --------------------
              v_mov_b32 v0, v1
              s_endpgm
        "};
        assert_eq!(read_lines(shader_dump, IsaFormat::Auto),
                   Err(ParseError::UnterminatedBody { opened: 2 }));
    }

    #[test]
    fn test_error_messages() {
        let err = ParseError::MismatchedDelimiter { line: 7, found: "end".to_string() };
        assert_eq!(err.to_string(), "mismatched `end` in line 7");
        let err = ParseError::MissingBody { format: IsaFormat::Hsail };
        assert_eq!(err.to_string(), "no shader body found in HSAIL input");
    }
}
