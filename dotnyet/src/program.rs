// Copyright 2026 the DotNyet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Program image loading and the function pre-scan.
//!
//! A program arrives as a raw byte buffer, optionally wrapped in the file
//! envelope (`NYET` magic plus a version byte). Loading strips the
//! envelope when present and then walks the image once, collecting every
//! `DEF` record into the function table without executing anything. The
//! scan sizes each instruction from its operand layout, so truncated or
//! unknown bytes inside a function body are load errors rather than
//! runtime surprises.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use hashbrown::HashMap;

use crate::format::{DecodeError, Reader};
use crate::opcode::{Opcode, OperandKind};
use crate::value::Value;

/// Magic bytes of the optional file envelope.
pub const MAGIC: [u8; 4] = *b"NYET";

/// Envelope version understood by this crate.
pub const VERSION: u8 = 0x01;

/// Splits the envelope off `bytes` when one is present.
///
/// Returns `Ok(Some(image))` for a well-formed envelope, `Ok(None)` when
/// the magic is absent (a bare image), and
/// [`DecodeError::UnsupportedVersion`] or [`DecodeError::UnexpectedEof`]
/// for an envelope this decoder cannot accept. Policy for the error cases
/// (refuse, or fall back to bare-image mode) belongs to the caller.
pub fn strip_envelope(bytes: &[u8]) -> Result<Option<&[u8]>, DecodeError> {
    if bytes.len() < MAGIC.len() || bytes[..MAGIC.len()] != MAGIC {
        return Ok(None);
    }
    let version = *bytes.get(MAGIC.len()).ok_or(DecodeError::UnexpectedEof)?;
    if version != VERSION {
        return Err(DecodeError::UnsupportedVersion { version });
    }
    Ok(Some(&bytes[MAGIC.len() + 1..]))
}

/// A loaded `.NYET` program: the read-only image plus the function table.
#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    image: Vec<u8>,
    functions: HashMap<String, usize>,
}

impl Program {
    /// Loads a program from `bytes`, stripping the envelope when present.
    ///
    /// An envelope with an unsupported version is an error here; use
    /// [`strip_envelope`] directly to implement a fallback policy.
    pub fn load(bytes: &[u8]) -> Result<Self, DecodeError> {
        match strip_envelope(bytes)? {
            Some(image) => Self::from_image(image.to_vec()),
            None => Self::from_image(bytes.to_vec()),
        }
    }

    /// Loads a program from a bare image (no envelope inspection).
    pub fn from_image(image: Vec<u8>) -> Result<Self, DecodeError> {
        let functions = scan_functions(&image)?;
        Ok(Self { image, functions })
    }

    /// Returns the program image.
    #[must_use]
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// Returns the image length in bytes.
    ///
    /// This doubles as the return-stack sentinel: returning to this offset
    /// ends the run.
    #[must_use]
    pub fn len(&self) -> usize {
        self.image.len()
    }

    /// Returns `true` for an empty image.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }

    /// Returns the entry offset of `name`: the first byte after its `DEF`
    /// header.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<usize> {
        self.functions.get(name).copied()
    }

    /// Iterates over `(name, entry offset)` pairs in arbitrary order.
    pub fn functions(&self) -> impl Iterator<Item = (&str, usize)> {
        self.functions.iter().map(|(name, at)| (name.as_str(), *at))
    }
}

/// Walks `image` from offset 0 collecting `DEF` records.
///
/// Each body is sized instruction by instruction and extends to the next
/// `DEF` or the end of the image. The scan stops at the first non-`DEF`
/// top-level opcode; trailing bytes stay in the image but belong to no
/// function.
fn scan_functions(image: &[u8]) -> Result<HashMap<String, usize>, DecodeError> {
    let mut functions = HashMap::new();
    let mut r = Reader::new(image);

    while r.peek_u8() == Some(Opcode::Def.byte()) {
        r.read_u8()?;
        let len = r.read_u32_le()? as usize;
        let name = r.read_str(len)?;
        if functions.contains_key(name) {
            return Err(DecodeError::DuplicateFunction {
                name: name.to_string(),
            });
        }
        functions.insert(name.to_string(), r.offset());

        // Skip the body, one instruction at a time.
        loop {
            match r.peek_u8() {
                None => break,
                Some(b) if b == Opcode::Def.byte() => break,
                Some(_) => skip_instruction(&mut r)?,
            }
        }
    }

    Ok(functions)
}

fn skip_instruction(r: &mut Reader<'_>) -> Result<(), DecodeError> {
    let byte = r.read_u8()?;
    let op = Opcode::from_byte(byte).ok_or(DecodeError::UnknownOpcode { byte })?;
    match op.operand_kind() {
        OperandKind::None => Ok(()),
        OperandKind::Addr => {
            r.read_u32_le()?;
            Ok(())
        }
        OperandKind::Name => {
            let len = r.read_u32_le()? as usize;
            r.read_bytes(len)?;
            Ok(())
        }
        OperandKind::Literal => Value::skip(r),
    }
}
