// Copyright 2026 the DotNyet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Image builder ("assembler") for `.NYET` bytecode.
//!
//! A small, public helper for constructing images without computing byte
//! offsets by hand. Jump targets are absolute byte offsets; the builder
//! tracks them through [`Label`]s and patches every jump site when the
//! image is finalized.

use alloc::vec::Vec;
use core::fmt;

use crate::format::Writer;
use crate::opcode::Opcode;
use crate::program::{MAGIC, VERSION};
use crate::value::{Value, ValueType};

/// A label for control-flow targets.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Label(u32);

/// An image builder error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AsmError {
    /// A label was referenced or placed but never allocated, or never
    /// placed before `finish`.
    UnresolvedLabel,
    /// A name or string literal does not fit its `u32` length prefix.
    OperandTooLong,
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedLabel => write!(f, "unresolved label"),
            Self::OperandTooLong => write!(f, "operand exceeds length prefix"),
        }
    }
}

impl core::error::Error for AsmError {}

#[derive(Clone, Copy, Debug)]
struct Fixup {
    at: usize,
    label: Label,
}

/// Image builder.
#[derive(Clone, Debug, Default)]
pub struct Asm {
    w: Writer,
    labels: Vec<Option<u32>>,
    fixups: Vec<Fixup>,
}

impl Asm {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current byte offset in the image.
    #[must_use]
    pub fn pc(&self) -> u32 {
        u32::try_from(self.w.as_slice().len()).unwrap_or(u32::MAX)
    }

    /// Allocates a new, unplaced label.
    #[must_use]
    pub fn label(&mut self) -> Label {
        let id = u32::try_from(self.labels.len()).unwrap_or(u32::MAX);
        self.labels.push(None);
        Label(id)
    }

    /// Places `label` at the current offset.
    pub fn place(&mut self, label: Label) -> Result<(), AsmError> {
        let pc = self.pc();
        let slot = self
            .labels
            .get_mut(label.0 as usize)
            .ok_or(AsmError::UnresolvedLabel)?;
        *slot = Some(pc);
        Ok(())
    }

    fn name_operand(&mut self, name: &str) -> Result<(), AsmError> {
        let len = u32::try_from(name.len()).map_err(|_| AsmError::OperandTooLong)?;
        self.w.write_u32_le(len);
        self.w.write_bytes(name.as_bytes());
        Ok(())
    }

    fn jump(&mut self, op: Opcode, label: Label) {
        self.w.write_u8(op.byte());
        self.fixups.push(Fixup {
            at: self.w.as_slice().len(),
            label,
        });
        self.w.write_u32_le(0);
    }

    /// Emits `NOP`.
    pub fn nop(&mut self) {
        self.w.write_u8(Opcode::Nop.byte());
    }

    /// Emits `PUSH` with an arbitrary literal.
    pub fn push(&mut self, value: &Value) -> Result<(), AsmError> {
        self.w.write_u8(Opcode::Push.byte());
        value
            .encode(&mut self.w)
            .map_err(|_| AsmError::OperandTooLong)
    }

    /// Emits `PUSH null`.
    pub fn push_null(&mut self) {
        self.w.write_u8(Opcode::Push.byte());
        self.w.write_u8(ValueType::Null.tag());
    }

    /// Emits `PUSH` with an integer literal.
    pub fn push_int(&mut self, v: i64) {
        self.w.write_u8(Opcode::Push.byte());
        self.w.write_u8(ValueType::Int.tag());
        self.w.write_i64_le(v);
    }

    /// Emits `PUSH` with a double literal.
    pub fn push_double(&mut self, v: f64) {
        self.w.write_u8(Opcode::Push.byte());
        self.w.write_u8(ValueType::Double.tag());
        self.w.write_f64_le(v);
    }

    /// Emits `PUSH` with a boolean literal.
    pub fn push_bool(&mut self, v: bool) {
        self.w.write_u8(Opcode::Push.byte());
        self.w.write_u8(ValueType::Bool.tag());
        self.w.write_u8(u8::from(v));
    }

    /// Emits `PUSH` with a string literal.
    pub fn push_str(&mut self, v: &str) -> Result<(), AsmError> {
        self.w.write_u8(Opcode::Push.byte());
        self.w.write_u8(ValueType::Str.tag());
        self.name_operand(v)
    }

    /// Emits `POP`.
    pub fn pop(&mut self) {
        self.w.write_u8(Opcode::Pop.byte());
    }

    /// Emits `CMP`.
    pub fn cmp(&mut self) {
        self.w.write_u8(Opcode::Cmp.byte());
    }

    /// Emits a `DEF` header. The next instruction is the entry point of
    /// `name`.
    pub fn def(&mut self, name: &str) -> Result<(), AsmError> {
        self.w.write_u8(Opcode::Def.byte());
        self.name_operand(name)
    }

    /// Emits `CALL name`.
    pub fn call(&mut self, name: &str) -> Result<(), AsmError> {
        self.w.write_u8(Opcode::Call.byte());
        self.name_operand(name)
    }

    /// Emits `RET`.
    pub fn ret(&mut self) {
        self.w.write_u8(Opcode::Ret.byte());
    }

    /// Emits `STORE addr`.
    pub fn store(&mut self, addr: u32) {
        self.w.write_u8(Opcode::Store.byte());
        self.w.write_u32_le(addr);
    }

    /// Emits `LOAD addr`.
    pub fn load(&mut self, addr: u32) {
        self.w.write_u8(Opcode::Load.byte());
        self.w.write_u32_le(addr);
    }

    /// Emits `JMP` to `label`.
    pub fn jmp(&mut self, label: Label) {
        self.jump(Opcode::Jmp, label);
    }

    /// Emits `JZ` to `label`.
    pub fn jz(&mut self, label: Label) {
        self.jump(Opcode::Jz, label);
    }

    /// Emits `JNZ` to `label`.
    pub fn jnz(&mut self, label: Label) {
        self.jump(Opcode::Jnz, label);
    }

    /// Emits `JMP` to a raw absolute offset.
    pub fn jmp_abs(&mut self, target: u32) {
        self.w.write_u8(Opcode::Jmp.byte());
        self.w.write_u32_le(target);
    }

    /// Emits `JZ` to a raw absolute offset.
    pub fn jz_abs(&mut self, target: u32) {
        self.w.write_u8(Opcode::Jz.byte());
        self.w.write_u32_le(target);
    }

    /// Emits `JNZ` to a raw absolute offset.
    pub fn jnz_abs(&mut self, target: u32) {
        self.w.write_u8(Opcode::Jnz.byte());
        self.w.write_u32_le(target);
    }

    /// Emits `HALT`.
    pub fn halt(&mut self) {
        self.w.write_u8(Opcode::Halt.byte());
    }

    /// Emits `PRINT`.
    pub fn print(&mut self) {
        self.w.write_u8(Opcode::Print.byte());
    }

    /// Emits `INPUT`.
    pub fn input(&mut self) {
        self.w.write_u8(Opcode::Input.byte());
    }

    /// Emits `ADD`.
    pub fn add(&mut self) {
        self.w.write_u8(Opcode::Add.byte());
    }

    /// Emits `SUB`.
    pub fn sub(&mut self) {
        self.w.write_u8(Opcode::Sub.byte());
    }

    /// Finalizes and returns the bare image, patching every jump site.
    pub fn finish(self) -> Result<Vec<u8>, AsmError> {
        let Self { w, labels, fixups } = self;
        let mut bytes = w.into_vec();
        for f in &fixups {
            let target = labels
                .get(f.label.0 as usize)
                .and_then(|slot| *slot)
                .ok_or(AsmError::UnresolvedLabel)?;
            bytes[f.at..f.at + 4].copy_from_slice(&target.to_le_bytes());
        }
        Ok(bytes)
    }

    /// Finalizes and returns the image wrapped in the file envelope.
    pub fn finish_enveloped(self) -> Result<Vec<u8>, AsmError> {
        let image = self.finish()?;
        let mut out = Vec::with_capacity(MAGIC.len() + 1 + image.len());
        out.extend_from_slice(&MAGIC);
        out.push(VERSION);
        out.extend_from_slice(&image);
        Ok(out)
    }
}
