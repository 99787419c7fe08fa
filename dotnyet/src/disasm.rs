// Copyright 2026 the DotNyet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Linear disassembler for `.NYET` images.
//!
//! Walks an image from offset 0 using the same operand layout as the
//! function pre-scan. A byte with no defined opcode is rendered as a
//! `.byte` directive and decoding resumes at the next byte; truncated
//! operands are an error.

use alloc::string::String;
use core::fmt::Write as _;

use crate::format::{DecodeError, Reader};
use crate::opcode::{Opcode, OperandKind};
use crate::value::Value;

/// Renders `image` as one line per instruction.
pub fn disassemble(image: &[u8]) -> Result<String, DecodeError> {
    let mut out = String::new();
    let mut r = Reader::new(image);

    while r.peek_u8().is_some() {
        let at = r.offset();
        let byte = r.read_u8()?;
        let Some(op) = Opcode::from_byte(byte) else {
            let _ = writeln!(out, "{at:#06x}  .byte {byte:#04x}");
            continue;
        };

        match op.operand_kind() {
            OperandKind::None => {
                let _ = writeln!(out, "{at:#06x}  {}", op.mnemonic());
            }
            OperandKind::Addr => {
                let addr = r.read_u32_le()?;
                let _ = writeln!(out, "{at:#06x}  {} {addr:#x}", op.mnemonic());
            }
            OperandKind::Name => {
                let len = r.read_u32_le()? as usize;
                let name = r.read_str(len)?;
                let _ = writeln!(out, "{at:#06x}  {} \"{name}\"", op.mnemonic());
            }
            OperandKind::Literal => {
                let value = Value::decode(&mut r)?;
                match value {
                    Value::Null => {
                        let _ = writeln!(out, "{at:#06x}  {} null", op.mnemonic());
                    }
                    Value::Str(s) => {
                        let _ = writeln!(out, "{at:#06x}  {} string \"{s}\"", op.mnemonic());
                    }
                    v => {
                        let _ = writeln!(out, "{at:#06x}  {} {} {v}", op.mnemonic(), v.value_type());
                    }
                }
            }
        }
    }

    Ok(out)
}
