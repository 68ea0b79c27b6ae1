// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
use aerojs_wasm::{validate, DecodeError, Module};
use quickcheck::quickcheck;

const PREAMBLE: [u8; 8] = [0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];

#[test]
fn minimal_module_validates() {
    assert!(validate(&PREAMBLE));
    let module = Module::parse(&PREAMBLE).unwrap();
    assert!(module.exports.is_empty());
}

#[test]
fn truncated_preamble_rejected() {
    let bytes = [0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00];
    assert!(!validate(&bytes));
    assert_eq!(Module::parse(&bytes), Err(DecodeError::BadPreamble));
}

#[test]
fn empty_input_rejected() {
    assert!(!validate(&[]));
}

#[test]
fn garbage_after_preamble_rejected() {
    let mut bytes = PREAMBLE.to_vec();
    bytes.push(0xFF);
    assert!(!validate(&bytes));
}

#[test]
fn section_size_overrunning_module_rejected() {
    // A type section claiming 100 bytes of payload that are not there.
    let mut bytes = PREAMBLE.to_vec();
    bytes.extend_from_slice(&[0x01, 0x64, 0x00]);
    assert!(!validate(&bytes));
}

#[test]
fn realistic_module_accepted() {
    // (module
    //   (memory (export "mem") 1)
    //   (func (export "add") (param i32 i32) (result i32)
    //     local.get 0
    //     local.get 1
    //     i32.add))
    let wasm = hex::decode(concat!(
        "0061736d0100000001070160027f7f017f030201000503010001070d020361",
        "64640000036d656d02000a09010700200020016a0b",
    ))
    .unwrap();
    assert!(validate(&wasm));
    let module = Module::parse(&wasm).unwrap();
    assert_eq!(module.exports.len(), 2);
    assert_eq!(module.total_funcs(), 1);
    assert_eq!(module.total_memories(), 1);
}

#[test]
fn flipping_any_byte_never_panics() {
    let wasm = hex::decode(concat!(
        "0061736d0100000001070160027f7f017f030201000503010001070d020361",
        "64640000036d656d02000a09010700200020016a0b",
    ))
    .unwrap();
    for i in 0..wasm.len() {
        for bit in 0..8 {
            let mut mutated = wasm.clone();
            mutated[i] ^= 1 << bit;
            // Accept or reject, but never panic.
            let _ = validate(&mutated);
        }
    }
}

#[test]
fn truncating_anywhere_never_panics() {
    let wasm = hex::decode(concat!(
        "0061736d0100000001070160027f7f017f030201000503010001070d020361",
        "64640000036d656d02000a09010700200020016a0b",
    ))
    .unwrap();
    for len in 0..wasm.len() {
        let _ = validate(&wasm[..len]);
    }
}

quickcheck! {
    fn validation_is_total(bytes: Vec<u8>) -> bool {
        // Totality: any byte vector produces a boolean.
        let _ = validate(&bytes);
        true
    }

    fn validation_matches_parse(bytes: Vec<u8>) -> bool {
        validate(&bytes) == Module::parse(&bytes).is_ok()
    }

    fn preamble_prefixed_garbage_is_total(tail: Vec<u8>) -> bool {
        let mut bytes = PREAMBLE.to_vec();
        bytes.extend_from_slice(&tail);
        let _ = validate(&bytes);
        true
    }
}
