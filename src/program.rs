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

//! Shader programs: from ISA dumps to basic blocks.

use displaydoc::Display as DisplayDoc;
use thiserror::Error;

use crate::block::{self, Blocks};
use crate::opcode::OpcodeTable;
use crate::reader::{self, IsaFormat};

/// Errors while reading a program. Either kind aborts the analysis.
#[derive(Debug, DisplayDoc, Error, Eq, PartialEq)]
pub enum Error {
    /// parse error: {0}
    InvalidInput(#[from] reader::ParseError),
    /// malformed program: {0}
    MalformedInput(#[from] block::Error),
}

/// Read a program from an ISA dump, using the built-in GCN opcode table.
pub fn read_program(text: &str, format: IsaFormat) -> Result<Blocks, Error> {
    read_program_with(text, format, OpcodeTable::gcn())
}

/// Read a program from an ISA dump, looking up opcodes in a custom table.
pub fn read_program_with(text: &str, format: IsaFormat, table: &OpcodeTable)
                         -> Result<Blocks, Error> {
    let instructions = reader::read_instructions(text, format, table)?;
    Ok(Blocks::build(instructions)?)
}

#[cfg(test)]
mod tests {
    use crate::block;
    use crate::opcode::{FlowKind, OpcodeMetadata, OpcodeTable};
    use crate::reader::{IsaFormat, ParseError};
    use super::{Error, read_program, read_program_with};

    #[test]
    fn test_errors() {
        let err = read_program("shader\n", IsaFormat::ShaderAnalyzer).unwrap_err();
        assert_eq!(err, Error::InvalidInput(ParseError::UnterminatedBody { opened: 1 }));
        assert_eq!(err.to_string(), "parse error: shader body starting in line 1 is never closed by `end`");
        let err = read_program("shader\ns_branch nowhere\nend\n", IsaFormat::Auto).unwrap_err();
        assert!(matches!(err, Error::MalformedInput(block::Error::UnresolvedTarget { .. })));
    }

    #[test]
    fn test_custom_table() {
        let text = "shader\n  my_jump label_y\nlabel_x:\n  s_nop 0\nlabel_y:\n  s_endpgm\nend\n";
        let blocks = read_program(text, IsaFormat::Auto).unwrap();
        assert_eq!(blocks.len(), 5);
        let label_x = blocks.index_of("label_x").unwrap();
        assert_eq!(blocks[1].successors.as_slice(), &[label_x]);

        let mut table = OpcodeTable::gcn().clone();
        let mut jump = OpcodeMetadata::unknown("my_jump");
        jump.flow = FlowKind::Jump;
        table.insert(jump);
        let blocks = read_program_with(text, IsaFormat::Auto, &table).unwrap();
        let label_y = blocks.index_of("label_y").unwrap();
        assert_eq!(blocks[1].successors.as_slice(), &[label_y]);
    }
}
