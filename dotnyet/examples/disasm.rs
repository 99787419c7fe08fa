// Copyright 2026 the DotNyet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Disassembler example.
//!
//! Run with:
//! `cargo run -p dotnyet --example disasm`

use dotnyet::asm::Asm;
use dotnyet::disasm::disassemble;

fn main() {
    let mut a = Asm::new();
    a.def("main").unwrap();

    // if input is non-empty { print "hello " + input } else { print "who?" }
    a.input();
    a.store(0);
    a.load(0);
    let l_empty = a.label();
    a.jz(l_empty);
    a.push_str("hello ").unwrap();
    a.load(0);
    a.add();
    a.print();
    a.halt();
    a.place(l_empty).unwrap();
    a.push_str("who?").unwrap();
    a.print();
    a.halt();

    let image = a.finish().unwrap();
    println!("{}", disassemble(&image).unwrap());
}
