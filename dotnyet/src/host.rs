// Copyright 2026 the DotNyet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host ABI for the `.NYET` interpreter.
//!
//! `PRINT` and `INPUT` are the only opcodes with effects outside the VM;
//! both are routed through an embedder-provided [`Host`] so the core stays
//! free of platform I/O. The bundled CLI wires this to stdin/stdout; tests
//! use recording and scripted hosts.

use alloc::string::String;
use core::fmt;

/// Errors a host operation can return.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostError {
    /// The host cannot service the operation (e.g. no input source).
    Unsupported,
    /// The underlying stream failed.
    Io(String),
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported => write!(f, "operation not supported by host"),
            Self::Io(msg) => write!(f, "{msg}"),
        }
    }
}

impl core::error::Error for HostError {}

/// Side-effect interface between the interpreter and its embedder.
pub trait Host {
    /// Writes `text` to the host output. No newline is appended; programs
    /// that want one include it in the printed value.
    fn print(&mut self, text: &str) -> Result<(), HostError>;

    /// Reads one line from the host input, with the line terminator
    /// stripped. May block until input is available.
    fn read_line(&mut self) -> Result<String, HostError>;
}
