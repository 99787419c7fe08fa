// Copyright 2026 the DotNyet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Micro-benchmarks for the `.NYET` virtual machine.
//!
//! The benchmarks live in `benches/vm.rs` and exercise the dispatch loop
//! on arithmetic chains, counted loops, and call overhead.
