//! Assertions for labeled arrays.

use crate::array::{format_dims, format_shape, LabeledArray};
use crate::verify::{verify, Expectation};

/// Asserts that the array has exactly the given shape.
pub fn assert_shape(array: &LabeledArray, expected: &[usize]) {
    assert_eq!(
        array.shape(),
        expected,
        "Expected shape {}, got {}",
        format_shape(expected),
        format_shape(array.shape())
    );
}

/// Asserts that the array has exactly the given axis names, in order.
pub fn assert_dims(array: &LabeledArray, expected: &[&str]) {
    assert!(
        array.dims().iter().map(String::as_str).eq(expected.iter().copied()),
        "Expected dims {}, got {}",
        format_dims(expected),
        format_dims(array.dims())
    );
}

/// Asserts that the attribute `key` is a nested array with the given shape.
pub fn assert_attr_shape(array: &LabeledArray, key: &str, expected: &[usize]) {
    let attr = array.attr(key).unwrap_or_else(|| {
        panic!(
            "Expected attribute '{}', but it doesn't exist. Keys: {:?}",
            key,
            array.attrs().keys().collect::<Vec<_>>()
        )
    });
    let actual = attr
        .shape()
        .unwrap_or_else(|| panic!("Expected attribute '{}' to be an array, got {}", key, attr.kind()));
    assert_eq!(
        actual,
        expected,
        "Expected attribute '{}' shape {}, got {}",
        key,
        format_shape(expected),
        format_shape(actual)
    );
}

/// Asserts that the array satisfies a full contract.
pub fn assert_contract(array: &LabeledArray, expected: &Expectation) {
    if let Err(violation) = verify("assertion", array, expected) {
        panic!("{violation}");
    }
}
