// Copyright 2026 the DotNyet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `dotnyet`: a stack-based bytecode virtual machine for the `.NYET`
//! language.
//!
//! The crate loads a prefix-framed binary program, discovers its function
//! bodies in a pre-execution scan, and interprets a small dynamically
//! typed instruction set over an operand stack, a return stack, and a
//! keyed memory map. Side effects reach the embedder through the
//! [`host::Host`] trait; every failure is a structured trap.
//!
//! ## Example
//!
//! ```
//! use dotnyet::asm::Asm;
//! use dotnyet::host::{Host, HostError};
//! use dotnyet::program::Program;
//! use dotnyet::trace::TraceMask;
//! use dotnyet::vm::{Limits, Vm};
//!
//! struct Capture(String);
//!
//! impl Host for Capture {
//!     fn print(&mut self, text: &str) -> Result<(), HostError> {
//!         self.0.push_str(text);
//!         Ok(())
//!     }
//!
//!     fn read_line(&mut self) -> Result<String, HostError> {
//!         Err(HostError::Unsupported)
//!     }
//! }
//!
//! let mut a = Asm::new();
//! a.def("main")?;
//! a.push_int(2);
//! a.push_int(3);
//! a.add();
//! a.print();
//! a.halt();
//! let program = Program::load(&a.finish()?).unwrap();
//!
//! let mut vm = Vm::new(Capture(String::new()), Limits::default());
//! vm.run(&program, &[], TraceMask::NONE, None).unwrap();
//! assert_eq!(vm.host().0, "5");
//! # Ok::<(), dotnyet::asm::AsmError>(())
//! ```

#![no_std]

extern crate alloc;

pub mod asm;
pub mod disasm;
pub mod format;
pub mod host;
pub mod opcode;
pub mod program;
pub mod trace;
pub mod value;
pub mod vm;
