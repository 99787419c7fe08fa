// Copyright 2026 the DotNyet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Conformance suite for the `.NYET` virtual machine.
//!
//! The tests live in `tests/conformance.rs` and drive the public API of
//! the `dotnyet` crate end to end.
