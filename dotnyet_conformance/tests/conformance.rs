// Copyright 2026 the DotNyet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

#![allow(missing_docs, reason = "integration test crate")]

use std::collections::VecDeque;

use dotnyet::asm::Asm;
use dotnyet::format::DecodeError;
use dotnyet::host::{Host, HostError};
use dotnyet::opcode::Opcode;
use dotnyet::program::{MAGIC, Program, VERSION, strip_envelope};
use dotnyet::trace::TraceMask;
use dotnyet::value::Value;
use dotnyet::vm::{Limits, Trap, TrapInfo, Vm};

/// Host that records output and serves scripted input lines.
#[derive(Default)]
struct ScriptHost {
    out: String,
    input: VecDeque<String>,
}

impl ScriptHost {
    fn with_input(lines: &[&str]) -> Self {
        Self {
            out: String::new(),
            input: lines.iter().map(|s| String::from(*s)).collect(),
        }
    }
}

impl Host for ScriptHost {
    fn print(&mut self, text: &str) -> Result<(), HostError> {
        self.out.push_str(text);
        Ok(())
    }

    fn read_line(&mut self) -> Result<String, HostError> {
        self.input.pop_front().ok_or(HostError::Unsupported)
    }
}

fn run_with(image: Vec<u8>, host: ScriptHost, args: &[Value]) -> Result<String, TrapInfo> {
    let program = Program::from_image(image).expect("image must load");
    let mut vm = Vm::new(host, Limits::default());
    vm.run(&program, args, TraceMask::NONE, None)?;
    Ok(vm.into_host().out)
}

fn run(image: Vec<u8>) -> Result<String, TrapInfo> {
    run_with(image, ScriptHost::default(), &[])
}

#[test]
fn golden_hello_image_bytes() {
    let mut a = Asm::new();
    a.def("main").unwrap();
    a.push_str("hello").unwrap();
    a.print();
    a.halt();
    let image = a.finish().unwrap();

    // This test is intentionally strict: it locks in the image encoding
    // as a regression signal for format changes.
    let expected: &[u8] = &[
        // DEF "main"
        0x10, 0x04, 0x00, 0x00, 0x00, b'm', b'a', b'i', b'n', // PUSH string "hello"
        0x01, 0x04, 0x05, 0x00, 0x00, 0x00, b'h', b'e', b'l', b'l', b'o', // PRINT, HALT
        0x50, 0x40,
    ];
    assert_eq!(image, expected);

    let program = Program::from_image(image).unwrap();
    assert_eq!(program.entry("main"), Some(9));
}

#[test]
fn golden_envelope_bytes() {
    let mut a = Asm::new();
    a.def("main").unwrap();
    a.halt();
    let framed = a.finish_enveloped().unwrap();

    assert_eq!(&framed[..4], b"NYET");
    assert_eq!(framed[4], 0x01);
    assert_eq!(strip_envelope(&framed), Ok(Some(&framed[5..])));

    let program = Program::load(&framed).unwrap();
    assert_eq!(program.entry("main"), Some(9));
}

#[test]
fn s1_hello() {
    let mut a = Asm::new();
    a.def("main").unwrap();
    a.push_str("hello").unwrap();
    a.print();
    a.halt();
    assert_eq!(run(a.finish().unwrap()).unwrap(), "hello");
}

#[test]
fn s2_arithmetic() {
    let mut a = Asm::new();
    a.def("main").unwrap();
    a.push_int(2);
    a.push_int(3);
    a.add();
    a.print();
    a.halt();
    assert_eq!(run(a.finish().unwrap()).unwrap(), "5");
}

#[test]
fn s3_conditional_takes_the_false_branch() {
    let mut a = Asm::new();
    a.def("main").unwrap();
    a.push_bool(false);
    let l_b = a.label();
    a.jz(l_b);
    a.push_str("A").unwrap();
    a.print();
    a.halt();
    a.place(l_b).unwrap();
    a.push_str("B").unwrap();
    a.print();
    a.halt();
    assert_eq!(run(a.finish().unwrap()).unwrap(), "B");
}

#[test]
fn s3_conditional_falls_through_on_truthy() {
    let mut a = Asm::new();
    a.def("main").unwrap();
    a.push_bool(true);
    let l_b = a.label();
    a.jz(l_b);
    a.push_str("A").unwrap();
    a.print();
    a.halt();
    a.place(l_b).unwrap();
    a.push_str("B").unwrap();
    a.print();
    a.halt();
    assert_eq!(run(a.finish().unwrap()).unwrap(), "A");
}

#[test]
fn s4_call_ret_discarding_the_result() {
    let mut a = Asm::new();
    a.def("greet").unwrap();
    a.push_str("hi").unwrap();
    a.ret();
    a.def("main").unwrap();
    a.call("greet").unwrap();
    a.pop();
    a.halt();
    assert_eq!(run(a.finish().unwrap()).unwrap(), "");
}

#[test]
fn s4_call_ret_printing_the_result() {
    let mut a = Asm::new();
    a.def("greet").unwrap();
    a.push_str("hi").unwrap();
    a.ret();
    a.def("main").unwrap();
    a.call("greet").unwrap();
    a.print();
    a.halt();
    assert_eq!(run(a.finish().unwrap()).unwrap(), "hi");
}

#[test]
fn s5_memory_store_load() {
    let mut a = Asm::new();
    a.def("main").unwrap();
    a.push_int(42);
    a.store(0x0000_0007);
    a.load(0x0000_0007);
    a.print();
    a.halt();
    assert_eq!(run(a.finish().unwrap()).unwrap(), "42");
}

#[test]
fn s6_unmapped_load_traps_with_no_output() {
    let mut a = Asm::new();
    a.def("main").unwrap();
    a.load(0x0000_0001);
    a.halt();
    let program = Program::from_image(a.finish().unwrap()).unwrap();

    let mut vm = Vm::new(ScriptHost::default(), Limits::default());
    let err = vm
        .run(&program, &[], TraceMask::NONE, None)
        .unwrap_err();
    assert_eq!(err.trap, Trap::UnmappedLoad(1));
    assert_eq!(err.opcode, Some(Opcode::Load.byte()));
    assert_eq!(vm.host().out, "");
}

#[test]
fn output_before_a_trap_stays_observable() {
    let mut a = Asm::new();
    a.def("main").unwrap();
    a.push_str("partial").unwrap();
    a.print();
    a.load(9);
    a.halt();
    let program = Program::from_image(a.finish().unwrap()).unwrap();

    let mut vm = Vm::new(ScriptHost::default(), Limits::default());
    assert!(vm.run(&program, &[], TraceMask::NONE, None).is_err());
    assert_eq!(vm.host().out, "partial");
}

#[test]
fn truncated_push_string_fails_to_load() {
    let mut a = Asm::new();
    a.def("main").unwrap();
    let mut image = a.finish().unwrap();
    image.push(Opcode::Push.byte());
    image.push(4); // string tag
    image.extend_from_slice(&100_u32.to_le_bytes());
    image.extend_from_slice(b"short");
    assert_eq!(
        Program::from_image(image),
        Err(DecodeError::UnexpectedEof)
    );
}

#[test]
fn unknown_literal_tag_fails_to_load() {
    let mut a = Asm::new();
    a.def("main").unwrap();
    let mut image = a.finish().unwrap();
    image.push(Opcode::Push.byte());
    image.push(0x09);
    assert_eq!(
        Program::from_image(image),
        Err(DecodeError::UnknownTypeTag { tag: 9 })
    );
}

#[test]
fn jump_one_past_the_image_end_traps() {
    let mut a = Asm::new();
    a.def("main").unwrap();
    let target = 9 + 5 + 1; // image length (def + jmp + halt) plus one
    a.jmp_abs(target as u32);
    a.halt();
    let image = a.finish().unwrap();
    assert_eq!(image.len() + 1, target);

    let err = run(image).unwrap_err();
    assert_eq!(err.trap, Trap::BadJump(target));
}

#[test]
fn empty_image_has_no_main() {
    let err = run(Vec::new()).unwrap_err();
    assert_eq!(err.trap, Trap::NoMain);
}

#[test]
fn duplicate_main_fails_to_load() {
    let mut a = Asm::new();
    a.def("main").unwrap();
    a.halt();
    a.def("main").unwrap();
    a.halt();
    assert_eq!(
        Program::from_image(a.finish().unwrap()),
        Err(DecodeError::DuplicateFunction {
            name: "main".into()
        })
    );
}

#[test]
fn launcher_argument_convention() {
    // The CLI pushes one string with the space-joined arguments; a
    // program that ignores them just pops the value.
    let mut a = Asm::new();
    a.def("main").unwrap();
    a.print();
    a.halt();
    let out = run_with(
        a.finish().unwrap(),
        ScriptHost::default(),
        &[Value::Str("alpha beta".into())],
    )
    .unwrap();
    assert_eq!(out, "alpha beta");

    let mut a = Asm::new();
    a.def("main").unwrap();
    a.pop();
    a.push_str("ok").unwrap();
    a.print();
    a.halt();
    let out = run_with(
        a.finish().unwrap(),
        ScriptHost::default(),
        &[Value::Str(String::new())],
    )
    .unwrap();
    assert_eq!(out, "ok");
}

#[test]
fn input_echo() {
    let mut a = Asm::new();
    a.def("main").unwrap();
    a.push_str("name?").unwrap();
    a.print();
    a.input();
    a.print();
    a.halt();
    let out = run_with(
        a.finish().unwrap(),
        ScriptHost::with_input(&["nyet"]),
        &[],
    )
    .unwrap();
    assert_eq!(out, "name?nyet");
}

#[test]
fn push_pop_roundtrip_for_every_literal_tag() {
    let values = [
        Value::Null,
        Value::Int(-7),
        Value::Double(0.125),
        Value::Bool(true),
        Value::Bool(false),
        Value::Str("åäö".into()),
    ];
    for v in values {
        let mut a = Asm::new();
        a.def("main").unwrap();
        a.push(&v).unwrap();
        a.print();
        a.halt();
        assert_eq!(run(a.finish().unwrap()).unwrap(), v.to_string());
    }
}

#[test]
fn integer_arithmetic_wraps() {
    let mut a = Asm::new();
    a.def("main").unwrap();
    a.push_int(i64::MAX);
    a.push_int(1);
    a.add();
    a.print();
    a.halt();
    assert_eq!(run(a.finish().unwrap()).unwrap(), i64::MIN.to_string());
}

#[test]
fn string_promotion_through_add() {
    let mut a = Asm::new();
    a.def("main").unwrap();
    a.push_str("v").unwrap();
    a.push_int(2);
    a.add();
    a.push_double(0.5);
    a.add();
    a.print();
    a.halt();
    assert_eq!(run(a.finish().unwrap()).unwrap(), "v20.5");
}

#[test]
fn add_on_null_traps_as_type_error() {
    let mut a = Asm::new();
    a.def("main").unwrap();
    a.push_null();
    a.push_int(1);
    a.add();
    a.halt();
    let err = run(a.finish().unwrap()).unwrap_err();
    assert!(matches!(err.trap, Trap::Type(_)));
}

#[test]
fn deep_pushes_hit_the_operand_stack_limit() {
    let mut a = Asm::new();
    a.def("main").unwrap();
    let l_loop = a.label();
    a.place(l_loop).unwrap();
    a.push_int(1);
    a.jmp(l_loop);
    let program = Program::from_image(a.finish().unwrap()).unwrap();

    let limits = Limits {
        max_stack_depth: 64,
        ..Limits::default()
    };
    let mut vm = Vm::new(ScriptHost::default(), limits);
    let err = vm
        .run(&program, &[], TraceMask::NONE, None)
        .unwrap_err();
    assert!(matches!(
        err.trap,
        Trap::ResourceLimit(dotnyet::vm::Resource::OperandStack)
    ));
}

#[test]
fn program_survives_non_contiguous_memory() {
    let mut a = Asm::new();
    a.def("main").unwrap();
    a.push_int(1);
    a.store(0);
    a.push_int(2);
    a.store(0xFFFF_FFFF);
    a.load(0xFFFF_FFFF);
    a.load(0);
    a.add();
    a.print();
    a.halt();
    assert_eq!(run(a.finish().unwrap()).unwrap(), "3");
}

#[test]
fn framed_and_bare_images_run_identically() {
    let build = || {
        let mut a = Asm::new();
        a.def("main").unwrap();
        a.push_str("same").unwrap();
        a.print();
        a.halt();
        a
    };
    let bare = build().finish().unwrap();
    let framed = build().finish_enveloped().unwrap();
    assert_eq!(&framed[..5], &[MAGIC[0], MAGIC[1], MAGIC[2], MAGIC[3], VERSION]);

    let bare_out = run(bare).unwrap();
    let program = Program::load(&framed).unwrap();
    let mut vm = Vm::new(ScriptHost::default(), Limits::default());
    vm.run(&program, &[], TraceMask::NONE, None).unwrap();
    assert_eq!(vm.host().out, bare_out);
}
