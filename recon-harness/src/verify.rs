//! Shape, axis and attribute verification.
//!
//! One oracle is applied after every stage. It carries no stage-specific
//! logic, only the expected literals it is given.

use crate::array::{format_dims, format_shape, LabeledArray};
use crate::errors::{ContractViolation, Mismatch};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The expected output contract of one stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectation {
    /// Exact ordered shape.
    pub shape: Vec<usize>,
    /// Exact ordered axis names.
    pub dims: Vec<String>,
    /// Expected shapes of nested array attributes, by key.
    #[serde(default)]
    pub attr_shapes: BTreeMap<String, Vec<usize>>,
}

impl Expectation {
    /// Creates an expectation for a shape and axis names.
    #[must_use]
    pub fn new(
        shape: impl Into<Vec<usize>>,
        dims: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            shape: shape.into(),
            dims: dims.into_iter().map(Into::into).collect(),
            attr_shapes: BTreeMap::new(),
        }
    }

    /// Also expects a nested array attribute with the given shape.
    #[must_use]
    pub fn with_attr_shape(mut self, key: impl Into<String>, shape: impl Into<Vec<usize>>) -> Self {
        self.attr_shapes.insert(key.into(), shape.into());
        self
    }
}

/// Compares an array against its expected contract.
///
/// Shape comparison is exact over the ordered tuple, so permuting two
/// equal-sized axes is a mismatch. Every mismatching field is reported.
///
/// # Errors
///
/// Returns a [`ContractViolation`] listing actual vs. expected values.
pub fn verify(
    stage: &str,
    actual: &LabeledArray,
    expected: &Expectation,
) -> Result<(), ContractViolation> {
    let mut mismatches = Vec::new();

    if actual.shape().len() != actual.dims().len() {
        mismatches.push(Mismatch::new(
            "rank",
            format!("len(dims) == {}", actual.shape().len()),
            actual.dims().len().to_string(),
        ));
    }

    if actual.shape() != expected.shape.as_slice() {
        mismatches.push(Mismatch::new(
            "shape",
            format_shape(&expected.shape),
            format_shape(actual.shape()),
        ));
    }

    if actual.dims() != expected.dims.as_slice() {
        mismatches.push(Mismatch::new(
            "dims",
            format_dims(&expected.dims),
            format_dims(actual.dims()),
        ));
    }

    for (key, shape) in &expected.attr_shapes {
        let field = format!("attrs.{key}");
        match actual.attr(key) {
            None => mismatches.push(Mismatch::new(field, format_shape(shape), "<missing>")),
            Some(value) => match value.shape() {
                None => mismatches.push(Mismatch::new(
                    field,
                    format_shape(shape),
                    format!("<{}>", value.kind()),
                )),
                Some(found) if found != shape.as_slice() => mismatches.push(Mismatch::new(
                    field,
                    format_shape(shape),
                    format_shape(found),
                )),
                Some(_) => {}
            },
        }
    }

    if mismatches.is_empty() {
        Ok(())
    } else {
        Err(ContractViolation::new(stage, mismatches))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::AttrValue;
    use pretty_assertions::assert_eq;

    fn kspace() -> LabeledArray {
        let traj = LabeledArray::new(vec![2048, 64, 3], ["trace", "sample", "coord"]).unwrap();
        LabeledArray::new(
            vec![1, 1, 2048, 64, 4],
            ["volume", "slab", "trace", "sample", "channel"],
        )
        .unwrap()
        .with_attr("trajectory", AttrValue::Array(traj))
    }

    fn kspace_expectation() -> Expectation {
        Expectation::new(
            vec![1, 1, 2048, 64, 4],
            ["volume", "slab", "trace", "sample", "channel"],
        )
        .with_attr_shape("trajectory", vec![2048, 64, 3])
    }

    #[test]
    fn test_matching_contract_passes() {
        assert!(verify("kspace", &kspace(), &kspace_expectation()).is_ok());
    }

    #[test]
    fn test_permuted_equal_axes_fail() {
        let actual = LabeledArray::new(vec![64, 64, 64, 4], ["y", "z", "x", "channel"]).unwrap();
        let expected = Expectation::new(vec![64, 64, 64, 4], ["z", "y", "x", "channel"]);

        let violation = verify("sense", &actual, &expected).unwrap_err();
        assert!(violation.mismatch("shape").is_none());
        assert_eq!(
            violation.mismatch("dims").unwrap().actual,
            "('y', 'z', 'x', 'channel')"
        );
    }

    #[test]
    fn test_same_element_count_different_shape_fails() {
        let actual = LabeledArray::new(vec![1, 64, 64, 64, 1], ["volume", "z", "y", "x", "image"]).unwrap();
        let expected = Expectation::new(vec![1, 64, 64, 1, 64], ["volume", "z", "y", "x", "image"]);

        let violation = verify("image", &actual, &expected).unwrap_err();
        let shape = violation.mismatch("shape").unwrap();
        assert_eq!(shape.expected, "(1, 64, 64, 1, 64)");
        assert_eq!(shape.actual, "(1, 64, 64, 64, 1)");
    }

    #[test]
    fn test_missing_attribute_reported() {
        let actual = LabeledArray::new(
            vec![1, 1, 2048, 64, 4],
            ["volume", "slab", "trace", "sample", "channel"],
        )
        .unwrap();

        let violation = verify("kspace", &actual, &kspace_expectation()).unwrap_err();
        assert_eq!(violation.mismatches.len(), 1);
        assert_eq!(violation.mismatch("attrs.trajectory").unwrap().actual, "<missing>");
    }

    #[test]
    fn test_scalar_attribute_is_not_an_array() {
        let actual = kspace().with_attr("trajectory", AttrValue::Number(1.0));
        let violation = verify("kspace", &actual, &kspace_expectation()).unwrap_err();
        assert_eq!(violation.mismatch("attrs.trajectory").unwrap().actual, "<number>");
    }

    #[test]
    fn test_wrong_attribute_shape_reported() {
        let traj = LabeledArray::new(vec![1024, 64, 3], ["trace", "sample", "coord"]).unwrap();
        let actual = kspace().with_attr("trajectory", AttrValue::Array(traj));

        let violation = verify("kspace", &actual, &kspace_expectation()).unwrap_err();
        let m = violation.mismatch("attrs.trajectory").unwrap();
        assert_eq!(m.expected, "(2048, 64, 3)");
        assert_eq!(m.actual, "(1024, 64, 3)");
    }

    #[test]
    fn test_all_mismatches_collected() {
        let actual = LabeledArray::new(vec![2, 2], ["a", "b"]).unwrap();
        let violation = verify("kspace", &actual, &kspace_expectation()).unwrap_err();
        assert_eq!(violation.mismatches.len(), 3);
        assert_eq!(violation.stage, "kspace");
    }

    #[test]
    fn test_verify_is_idempotent() {
        let actual = kspace();
        let expected = kspace_expectation();
        let before = actual.clone();

        let first = verify("kspace", &actual, &expected).is_ok();
        let second = verify("kspace", &actual, &expected).is_ok();
        assert_eq!(first, second);
        assert_eq!(actual, before);
    }
}
