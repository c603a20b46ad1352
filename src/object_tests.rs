//! Object tree behaviour: attributes, links, property walks.

use crate::error::ErrorCode;
use crate::test_utils::{machine, test_image, INITIAL_PC};
use crate::zmachine::ZMachine;

fn fresh() -> ZMachine {
    machine(test_image()).0
}

#[test]
fn attributes_set_test_and_clear() {
    let mut m = fresh();
    for attr in [0u16, 7, 8, 17, 31] {
        assert!(!m.test_attr(3, attr).unwrap());
        m.set_attr(3, attr).unwrap();
        assert!(m.test_attr(3, attr).unwrap());
    }
    // Neighbours of attribute 17 are untouched.
    assert!(!m.test_attr(3, 16).unwrap());
    assert!(!m.test_attr(3, 18).unwrap());

    m.clear_attr(3, 17).unwrap();
    assert!(!m.test_attr(3, 17).unwrap());
    assert!(m.test_attr(3, 8).unwrap());
}

#[test]
fn attribute_zero_is_the_top_bit() {
    let mut m = fresh();
    m.set_attr(1, 0).unwrap();
    let entry = m.object_addr(1).unwrap();
    assert_eq!(m.mem.read_byte(entry).unwrap(), 0x80);
}

#[test]
fn attribute_out_of_bounds_is_fatal() {
    let mut m = fresh();
    assert_eq!(
        m.test_attr(1, 32).unwrap_err().code(),
        ErrorCode::AttributeOutOfBounds
    );
    assert_eq!(
        m.set_attr(1, 99).unwrap_err().code(),
        ErrorCode::AttributeOutOfBounds
    );
}

#[test]
fn object_zero_and_out_of_range_are_fatal() {
    let m = fresh();
    assert_eq!(m.parent_of(0).unwrap_err().code(), ErrorCode::InvalidObject);
    assert_eq!(m.child_of(256).unwrap_err().code(), ErrorCode::InvalidObject);
}

#[test]
fn insert_makes_object_the_first_child() {
    let mut m = fresh();
    // Start: 2 is the only child of 1.
    assert_eq!(m.child_of(1).unwrap(), 2);
    assert_eq!(m.parent_of(2).unwrap(), 1);

    m.insert_object(3, 1).unwrap();
    assert_eq!(m.child_of(1).unwrap(), 3);
    assert_eq!(m.sibling_of(3).unwrap(), 2);
    assert_eq!(m.parent_of(3).unwrap(), 1);
    assert_eq!(m.parent_of(2).unwrap(), 1);

    // Object 3 appears exactly once in the chain.
    let mut chain = Vec::new();
    let mut at = m.child_of(1).unwrap();
    while at != 0 {
        chain.push(at);
        at = m.sibling_of(at).unwrap();
    }
    assert_eq!(chain, vec![3, 2]);
}

#[test]
fn remove_first_child_promotes_its_sibling() {
    let mut m = fresh();
    m.insert_object(3, 1).unwrap(); // chain: 3, 2
    m.unlink_object(3).unwrap();
    assert_eq!(m.child_of(1).unwrap(), 2);
    assert_eq!(m.parent_of(3).unwrap(), 0);
}

#[test]
fn remove_middle_child_repairs_the_chain() {
    let mut m = fresh();
    m.insert_object(3, 1).unwrap(); // chain: 3, 2
    m.unlink_object(2).unwrap();
    assert_eq!(m.child_of(1).unwrap(), 3);
    assert_eq!(m.sibling_of(3).unwrap(), 0);
    assert_eq!(m.parent_of(2).unwrap(), 0);
}

#[test]
fn reinserting_under_the_same_parent_is_a_no_op() {
    let mut m = fresh();
    m.insert_object(2, 1).unwrap();
    assert_eq!(m.child_of(1).unwrap(), 2);
    assert_eq!(m.sibling_of(2).unwrap(), 0);
}

#[test]
fn get_property_reads_both_widths() {
    let m = fresh();
    assert_eq!(m.get_property(1, 12).unwrap(), 0xBEEF);
    assert_eq!(m.get_property(1, 5).unwrap(), 0x42);
}

#[test]
fn missing_property_falls_back_to_default() {
    let m = fresh();
    assert_eq!(m.get_property(2, 5).unwrap(), 0x0505);
    // No default was set for property 9.
    assert_eq!(m.get_property(3, 9).unwrap(), 0);
}

#[test]
fn wide_properties_cannot_be_read_as_values() {
    let m = fresh();
    assert_eq!(
        m.get_property(2, 20).unwrap_err().code(),
        ErrorCode::BadPropertyWidth
    );
}

#[test]
fn property_addr_and_len() {
    let m = fresh();
    let addr = m.property_addr(2, 20).unwrap();
    assert_eq!(addr, 0x0332);
    // get_prop_len reads the size byte just before the data.
    assert_eq!((m.mem.read_byte(addr as u32 - 1).unwrap() >> 5) + 1, 4);
    assert_eq!(m.property_addr(2, 7).unwrap(), 0);
}

#[test]
fn next_property_walks_in_order() {
    let m = fresh();
    assert_eq!(m.next_property(1, 0).unwrap(), 12);
    assert_eq!(m.next_property(1, 12).unwrap(), 5);
    assert_eq!(m.next_property(1, 5).unwrap(), 0);
    assert_eq!(
        m.next_property(1, 9).unwrap_err().code(),
        ErrorCode::PropertyNotFound
    );
}

#[test]
fn put_property_writes_in_place() {
    let mut m = fresh();
    m.put_property(1, 5, 0x77).unwrap();
    assert_eq!(m.get_property(1, 5).unwrap(), 0x77);

    m.put_property(1, 12, 0x1234).unwrap();
    assert_eq!(m.get_property(1, 12).unwrap(), 0x1234);

    assert_eq!(
        m.put_property(1, 9, 1).unwrap_err().code(),
        ErrorCode::PropertyNotFound
    );
    assert_eq!(
        m.put_property(2, 20, 1).unwrap_err().code(),
        ErrorCode::BadPropertyWidth
    );
}

#[test]
fn print_obj_decodes_the_short_name() {
    let mut image = test_image();
    // print_obj #3, then quit.
    image[INITIAL_PC..INITIAL_PC + 2].copy_from_slice(&[0x9A, 3]);
    image[INITIAL_PC + 2] = 0xBA;

    let (mut m, out) = machine(image);
    m.run_with_limit(Some(5)).unwrap();
    assert_eq!(*out.borrow(), "box");
}

#[test]
fn jin_follows_the_parent_link() {
    let mut image = test_image();
    // jin 2 1 ?(+3): lands on the quit only when 1 is 2's parent.
    image[INITIAL_PC..INITIAL_PC + 4].copy_from_slice(&[0x06, 2, 1, 0xC3]);
    image[INITIAL_PC + 5] = 0xBA;

    let (mut m, _) = machine(image);
    m.run_with_limit(Some(5)).unwrap();
    assert!(m.done);
    assert_eq!(m.pc, (INITIAL_PC + 6) as u32);
}

#[test]
fn get_child_stores_and_branches() {
    let mut image = test_image();
    // get_child #1 -> sp ?(+4): short form 1OP small constant.
    image[INITIAL_PC..INITIAL_PC + 4].copy_from_slice(&[0x92, 1, 0x00, 0xC4]);
    image[INITIAL_PC + 6] = 0xBA;

    let (mut m, _) = machine(image);
    m.run_with_limit(Some(5)).unwrap();
    assert!(m.done);
    assert_eq!(m.stack.peek().unwrap(), 2);
}
