//! Builders for the synthetic story image the test modules share.

use std::cell::RefCell;
use std::rc::Rc;

use crate::io::{CaptureOutput, ScriptedInput};
use crate::text;
use crate::zmachine::ZMachine;
use crate::zrand::ZRand;

pub const GLOBALS: usize = 0x0100;
pub const OBJECT_TABLE: usize = 0x0200;
pub const DICTIONARY: usize = 0x0800;
pub const STATIC_BASE: usize = 0x4000;
pub const INITIAL_PC: usize = 0x5000;

pub fn set_word(image: &mut [u8], addr: usize, value: u16) {
    image[addr] = (value >> 8) as u8;
    image[addr + 1] = value as u8;
}

/// A minimal v3 image: header, three objects, a small vocabulary.
/// Tests write their program bytes at `INITIAL_PC` before constructing
/// the machine, since that region is static memory afterwards.
pub fn test_image() -> Vec<u8> {
    let mut image = vec![0u8; 0x6000];
    image[0x00] = 3;
    set_word(&mut image, 0x04, 0x1000); // high memory base
    set_word(&mut image, 0x06, INITIAL_PC as u16);
    set_word(&mut image, 0x08, DICTIONARY as u16);
    set_word(&mut image, 0x0A, OBJECT_TABLE as u16);
    set_word(&mut image, 0x0C, GLOBALS as u16);
    set_word(&mut image, 0x0E, STATIC_BASE as u16);
    set_word(&mut image, 0x18, 0x0040); // abbreviations (empty)

    build_objects(&mut image);
    build_dictionary(&mut image, &["go", "look", "take", "west"]);
    image
}

/// Objects: 1 is the parent of 2, 3 starts detached.
///
///   1: properties 12 (2 bytes, 0xBEEF) and 5 (1 byte, 0x42)
///   2: properties 20 (4 bytes) and 3 (2 bytes, 0x1234)
///   3: short name "box", property 7 (1 byte, 9)
///
/// The default for property 5 is 0x0505.
fn build_objects(image: &mut [u8]) {
    let objects = OBJECT_TABLE + 62;
    set_word(image, OBJECT_TABLE + (5 - 1) * 2, 0x0505);

    image[objects + 6] = 2; // child of object 1
    set_word(image, objects + 7, 0x0300);

    image[objects + 9 + 4] = 1; // parent of object 2
    set_word(image, objects + 9 + 7, 0x0330);

    set_word(image, objects + 18 + 7, 0x0360);

    image[0x0300] = 0; // no short name
    image[0x0301] = 0x2C; // property 12, 2 bytes
    set_word(image, 0x0302, 0xBEEF);
    image[0x0304] = 0x05; // property 5, 1 byte
    image[0x0305] = 0x42;
    image[0x0306] = 0;

    image[0x0330] = 0;
    image[0x0331] = 0x74; // property 20, 4 bytes
    image[0x0332..0x0336].copy_from_slice(&[1, 2, 3, 4]);
    image[0x0336] = 0x23; // property 3, 2 bytes
    set_word(image, 0x0337, 0x1234);
    image[0x0339] = 0;

    image[0x0360] = 1; // short name is one word
    set_word(image, 0x0361, 0x9E9D); // "box"
    image[0x0363] = 0x07; // property 7, 1 byte
    image[0x0364] = 9;
    image[0x0365] = 0;
}

fn build_dictionary(image: &mut [u8], words: &[&str]) {
    let mut keys: Vec<u32> = words
        .iter()
        .map(|w| text::encode_word(w.as_bytes()))
        .collect();
    keys.sort_unstable();

    image[DICTIONARY] = 2;
    image[DICTIONARY + 1] = b',';
    image[DICTIONARY + 2] = b'.';
    image[DICTIONARY + 3] = 7; // 4-byte key plus 3 data bytes
    set_word(image, DICTIONARY + 4, keys.len() as u16);
    let mut at = DICTIONARY + 6;
    for key in keys {
        image[at..at + 4].copy_from_slice(&key.to_be_bytes());
        at += 7;
    }
}

pub fn machine(image: Vec<u8>) -> (ZMachine, Rc<RefCell<String>>) {
    machine_with_input(image, &[])
}

pub fn machine_with_input(image: Vec<u8>, lines: &[&str]) -> (ZMachine, Rc<RefCell<String>>) {
    let (output, captured) = CaptureOutput::new();
    let machine = ZMachine::new(
        image,
        ZRand::new_seeded(0),
        Box::new(ScriptedInput::new(lines)),
        Box::new(output),
    )
    .unwrap();
    (machine, captured)
}
