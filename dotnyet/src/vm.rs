// Copyright 2026 the DotNyet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Interpreter for `.NYET` bytecode images.
//!
//! The VM executes a loaded [`Program`] with explicit limits on operand
//! stack depth, return stack depth, and memory entries. Every failure is a
//! [`Trap`] that aborts the run; side effects already emitted through the
//! [`Host`] stay observable.
//!
//! Bootstrap convention: `run` seeds the operand stack with the caller's
//! argument values, pushes the image length as the return-stack sentinel,
//! and enters the function named `main`. Execution ends at `HALT` or when
//! the instruction pointer reaches the sentinel offset.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

use hashbrown::HashMap;

use crate::format::{DecodeError, Reader};
use crate::host::{Host, HostError};
use crate::opcode::Opcode;
use crate::program::Program;
use crate::trace::{TraceEvent, TraceMask, TraceOutcome, TraceSink};
use crate::value::{TypeError, Value};

/// Execution limits for a VM run.
#[derive(Clone, Debug)]
pub struct Limits {
    /// Maximum operand-stack depth.
    pub max_stack_depth: usize,
    /// Maximum return-stack depth.
    pub max_return_depth: usize,
    /// Maximum number of live memory entries.
    pub max_memory_entries: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_stack_depth: 1 << 20,
            max_return_depth: 1 << 16,
            max_memory_entries: 1 << 20,
        }
    }
}

/// The resource whose bound was exceeded.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Resource {
    /// The operand stack.
    OperandStack,
    /// The return stack.
    ReturnStack,
    /// The keyed memory map.
    Memory,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperandStack => write!(f, "operand stack"),
            Self::ReturnStack => write!(f, "return stack"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// A runtime trap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Trap {
    /// The instruction stream could not be decoded.
    Malformed(DecodeError),
    /// The dispatched byte has no defined opcode.
    UnknownOpcode(u8),
    /// A `PUSH` literal tag was not in the defined range.
    UnknownTypeTag(u8),
    /// Pop or peek on an empty (or too shallow) operand stack.
    StackUnderflow,
    /// An operator was applied to an unsupported variant combination.
    Type(TypeError),
    /// `LOAD` from an address with no prior `STORE`.
    UnmappedLoad(u32),
    /// A jump target was not a valid in-range offset.
    BadJump(usize),
    /// The program defines no `main` function.
    NoMain,
    /// `CALL` named a function the pre-scan did not discover.
    UnknownFunction(String),
    /// `RET` with an empty return stack.
    ReturnUnderflow,
    /// A configured bound was exceeded.
    ResourceLimit(Resource),
    /// The host failed to service `PRINT` or `INPUT`.
    HostIo(HostError),
}

impl fmt::Display for Trap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(e) => write!(f, "malformed bytecode: {e}"),
            Self::UnknownOpcode(byte) => write!(f, "unknown opcode {byte:#04x}"),
            Self::UnknownTypeTag(tag) => write!(f, "unknown literal type tag {tag}"),
            Self::StackUnderflow => write!(f, "operand stack underflow"),
            Self::Type(e) => write!(f, "type error: {e}"),
            Self::UnmappedLoad(addr) => write!(f, "load from unmapped address {addr:#x}"),
            Self::BadJump(target) => write!(f, "jump target {target} out of range"),
            Self::NoMain => write!(f, "program defines no 'main' function"),
            Self::UnknownFunction(name) => write!(f, "call to unknown function '{name}'"),
            Self::ReturnUnderflow => write!(f, "return with empty return stack"),
            Self::ResourceLimit(r) => write!(f, "{r} limit exceeded"),
            Self::HostIo(e) => write!(f, "host i/o error: {e}"),
        }
    }
}

impl core::error::Error for Trap {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Malformed(e) => Some(e),
            Self::Type(e) => Some(e),
            Self::HostIo(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DecodeError> for Trap {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::UnknownOpcode { byte } => Self::UnknownOpcode(byte),
            DecodeError::UnknownTypeTag { tag } => Self::UnknownTypeTag(tag),
            other => Self::Malformed(other),
        }
    }
}

impl From<TypeError> for Trap {
    fn from(e: TypeError) -> Self {
        Self::Type(e)
    }
}

impl From<HostError> for Trap {
    fn from(e: HostError) -> Self {
        Self::HostIo(e)
    }
}

/// A trap annotated with location information.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrapInfo {
    /// Byte offset of the opcode that trapped.
    pub ip: usize,
    /// The opcode byte, when dispatch had fetched one.
    pub opcode: Option<u8>,
    /// Trap kind.
    pub trap: Trap,
}

impl fmt::Display for TrapInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.opcode {
            Some(byte) => write!(f, "trap at ip={} opcode={byte:#04x}: {}", self.ip, self.trap),
            None => write!(f, "trap at ip={}: {}", self.ip, self.trap),
        }
    }
}

impl core::error::Error for TrapInfo {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        Some(&self.trap)
    }
}

/// LIFO stack of operand [`Value`]s with a depth bound.
#[derive(Clone, Debug)]
pub struct OperandStack {
    values: Vec<Value>,
    max_depth: usize,
}

impl OperandStack {
    /// Creates an empty stack bounded at `max_depth` entries.
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self {
            values: Vec::new(),
            max_depth,
        }
    }

    /// Pushes `value`, trapping when the depth bound is reached.
    pub fn push(&mut self, value: Value) -> Result<(), Trap> {
        if self.values.len() >= self.max_depth {
            return Err(Trap::ResourceLimit(Resource::OperandStack));
        }
        self.values.push(value);
        Ok(())
    }

    /// Pops the top value, trapping on an empty stack.
    pub fn pop(&mut self) -> Result<Value, Trap> {
        self.values.pop().ok_or(Trap::StackUnderflow)
    }

    /// Returns the value `depth` slots below the top without removal.
    pub fn peek(&self, depth: usize) -> Result<&Value, Trap> {
        if depth >= self.values.len() {
            return Err(Trap::StackUnderflow);
        }
        Ok(&self.values[self.values.len() - 1 - depth])
    }

    /// Returns the current depth.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` when the stack holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Keyed value memory: a flat map from `u32` address to owned [`Value`].
///
/// `STORE` overwrites; `LOAD` copies. Addresses need not be contiguous.
#[derive(Clone, Debug)]
pub struct Memory {
    slots: HashMap<u32, Value>,
    max_entries: usize,
}

impl Memory {
    /// Creates an empty memory bounded at `max_entries` live addresses.
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            slots: HashMap::new(),
            max_entries,
        }
    }

    /// Assigns `value` to `addr`, trapping when a new entry would exceed
    /// the bound. Overwrites are always allowed.
    pub fn store(&mut self, addr: u32, value: Value) -> Result<(), Trap> {
        if !self.slots.contains_key(&addr) && self.slots.len() >= self.max_entries {
            return Err(Trap::ResourceLimit(Resource::Memory));
        }
        self.slots.insert(addr, value);
        Ok(())
    }

    /// Returns a copy of the value at `addr`, trapping when unmapped.
    pub fn load(&self, addr: u32) -> Result<Value, Trap> {
        self.slots
            .get(&addr)
            .cloned()
            .ok_or(Trap::UnmappedLoad(addr))
    }

    /// Returns the number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` when no address is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// The `.NYET` interpreter.
pub struct Vm<H: Host> {
    host: H,
    limits: Limits,
}

impl<H: Host> fmt::Debug for Vm<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl<H: Host> Vm<H> {
    /// Creates a new VM with `host` and `limits`.
    #[must_use]
    pub fn new(host: H, limits: Limits) -> Self {
        Self { host, limits }
    }

    /// Returns a reference to the host.
    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Consumes the VM and returns the host.
    #[must_use]
    pub fn into_host(self) -> H {
        self.host
    }

    /// Executes `program` from its `main` function.
    ///
    /// `args` is seeded onto the operand stack in order before `main`
    /// runs; the bundled CLI passes a single string holding the
    /// space-joined program arguments. Tracing is controlled by
    /// `trace_mask`; pass `None` for `trace` to disable it.
    pub fn run(
        &mut self,
        program: &Program,
        args: &[Value],
        trace_mask: TraceMask,
        mut trace: Option<&mut dyn TraceSink>,
    ) -> Result<(), TrapInfo> {
        if trace_mask.contains(TraceMask::RUN)
            && let Some(t) = trace.as_mut()
        {
            t.event(TraceEvent::RunStart {
                arg_count: args.len(),
            });
        }

        let result = self.run_body(program, args, trace_mask, &mut trace);

        if trace_mask.contains(TraceMask::RUN)
            && let Some(t) = trace.as_mut()
        {
            let outcome = match &result {
                Ok(()) => TraceOutcome::Ok,
                Err(e) => TraceOutcome::Trap(e),
            };
            t.event(TraceEvent::RunEnd { outcome });
        }

        result
    }

    fn run_body(
        &mut self,
        program: &Program,
        args: &[Value],
        trace_mask: TraceMask,
        trace: &mut Option<&mut dyn TraceSink>,
    ) -> Result<(), TrapInfo> {
        let image = program.image();
        let entry = program.entry("main").ok_or(TrapInfo {
            ip: 0,
            opcode: None,
            trap: Trap::NoMain,
        })?;

        let mut stack = OperandStack::new(self.limits.max_stack_depth);
        let mut rets: Vec<usize> = Vec::new();
        let mut memory = Memory::new(self.limits.max_memory_entries);

        for v in args {
            stack.push(v.clone()).map_err(|trap| TrapInfo {
                ip: entry,
                opcode: None,
                trap,
            })?;
        }

        // Returning to the image length ends the run.
        rets.push(image.len());
        let mut ip = entry;

        while ip < image.len() {
            let op_ip = ip;
            let mut r = Reader::at(image, ip);
            let byte = r.read_u8().map_err(|e| TrapInfo {
                ip: op_ip,
                opcode: None,
                trap: Trap::from(e),
            })?;
            let fail = move |trap: Trap| TrapInfo {
                ip: op_ip,
                opcode: Some(byte),
                trap,
            };
            let op = Opcode::from_byte(byte).ok_or_else(|| fail(Trap::UnknownOpcode(byte)))?;

            if trace_mask.contains(TraceMask::INSTR)
                && let Some(t) = trace.as_mut()
            {
                t.event(TraceEvent::Instr { ip: op_ip, opcode: byte });
            }

            match op {
                Opcode::Nop => {
                    ip = r.offset();
                }
                Opcode::Push => {
                    let v = Value::decode(&mut r).map_err(|e| fail(e.into()))?;
                    stack.push(v).map_err(fail)?;
                    ip = r.offset();
                }
                Opcode::Pop => {
                    stack.pop().map_err(fail)?;
                    ip = r.offset();
                }
                Opcode::Cmp => {
                    let b = stack.pop().map_err(fail)?;
                    let a = stack.pop().map_err(fail)?;
                    let eq = a.try_eq(&b).map_err(|e| fail(e.into()))?;
                    stack.push(Value::Bool(eq)).map_err(fail)?;
                    ip = r.offset();
                }
                Opcode::Def => {
                    // Runtime fall-through: skip the header, no effect.
                    let len = r.read_u32_le().map_err(|e| fail(e.into()))? as usize;
                    r.read_bytes(len).map_err(|e| fail(e.into()))?;
                    ip = r.offset();
                }
                Opcode::Call => {
                    let len = r.read_u32_le().map_err(|e| fail(e.into()))? as usize;
                    let name = r.read_str(len).map_err(|e| fail(e.into()))?;
                    let target = program
                        .entry(name)
                        .ok_or_else(|| fail(Trap::UnknownFunction(name.into())))?;
                    if rets.len() >= self.limits.max_return_depth {
                        return Err(fail(Trap::ResourceLimit(Resource::ReturnStack)));
                    }
                    rets.push(r.offset());
                    ip = target;
                }
                Opcode::Ret => {
                    ip = rets.pop().ok_or_else(|| fail(Trap::ReturnUnderflow))?;
                }
                Opcode::Store => {
                    let addr = r.read_u32_le().map_err(|e| fail(e.into()))?;
                    let v = stack.pop().map_err(fail)?;
                    memory.store(addr, v).map_err(fail)?;
                    ip = r.offset();
                }
                Opcode::Load => {
                    let addr = r.read_u32_le().map_err(|e| fail(e.into()))?;
                    let v = memory.load(addr).map_err(fail)?;
                    stack.push(v).map_err(fail)?;
                    ip = r.offset();
                }
                Opcode::Jmp => {
                    ip = jump_target(&mut r, image.len()).map_err(fail)?;
                }
                Opcode::Jz => {
                    let target = jump_target(&mut r, image.len()).map_err(fail)?;
                    let v = stack.pop().map_err(fail)?;
                    ip = if v.is_truthy() { r.offset() } else { target };
                }
                Opcode::Jnz => {
                    let target = jump_target(&mut r, image.len()).map_err(fail)?;
                    let v = stack.pop().map_err(fail)?;
                    ip = if v.is_truthy() { target } else { r.offset() };
                }
                Opcode::Halt => break,
                Opcode::Print => {
                    let v = stack.pop().map_err(fail)?;
                    self.host
                        .print(&v.to_string())
                        .map_err(|e| fail(e.into()))?;
                    ip = r.offset();
                }
                Opcode::Input => {
                    let line = self.host.read_line().map_err(|e| fail(e.into()))?;
                    stack.push(Value::Str(line)).map_err(fail)?;
                    ip = r.offset();
                }
                Opcode::Add => {
                    let b = stack.pop().map_err(fail)?;
                    let a = stack.pop().map_err(fail)?;
                    let v = a.add(b).map_err(|e| fail(e.into()))?;
                    stack.push(v).map_err(fail)?;
                    ip = r.offset();
                }
                Opcode::Sub => {
                    // The operand pushed first is the minuend.
                    let b = stack.pop().map_err(fail)?;
                    let a = stack.pop().map_err(fail)?;
                    let v = a.sub(b).map_err(|e| fail(e.into()))?;
                    stack.push(v).map_err(fail)?;
                    ip = r.offset();
                }
            }
        }

        Ok(())
    }
}

/// Reads a jump operand and validates it against the image length.
///
/// A target equal to the image length is in range; landing there ends the
/// run through the normal sentinel path.
fn jump_target(r: &mut Reader<'_>, image_len: usize) -> Result<usize, Trap> {
    let target = r.read_u32_le()? as usize;
    if target > image_len {
        return Err(Trap::BadJump(target));
    }
    Ok(target)
}
