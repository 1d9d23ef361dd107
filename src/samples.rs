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

//! Sample shader dumps shared by the tests.

use indoc::indoc;

/// A small pixel shader with a loop, in ShaderAnalyzer format.
pub const LOOP: &str = indoc! {"
    ; pixel shader with a loop
    asic(VI)
    type(PS)
    shader main
      s_mov_b32 m0, s6
      v_interp_p1_f32 v2, v0, attr0.x
      v_interp_p2_f32 v2, v1, attr0.x
      v_mov_b32 v3, 0
    label_0005:
      v_add_f32 v3, v3, v2
      v_cmp_gt_f32 vcc, v3, v4
      s_cbranch_vccnz label_0005
      v_mul_f32 v5, v3, v2
      exp mrt0, v5, v5, v5, v5 done vm
      s_endpgm
    end
"};

/// Output from the HSAIL finaliser, with binary encodings.
pub const HSAIL: &str = indoc! {"
    AMD Kernel Code for main
    Disassembly for main:
      s_load_dwordx4 s[0:3], s[4:5], 0x0 // 000000000000: C00A0002 00000000
      v_add_f32 v1, v0, v2 // 000000000008: 02020500
      v_add_f32 v3, -v1, abs(v2) // 00000000000C: D1010003 00020501
      s_endpgm // 000000000014: BF810000
    end
"};

/// Shader dump from the driver, with a header before the disassembly.
pub const SHADER_DUMP: &str = indoc! {"
    ;-------- header
    ; asic VI
    ; -------- Disassembly --------------------
      v_mov_b32 v0, 1.0
      v_mac_f32 v0, v1, v2
      s_endpgm
    end
"};
