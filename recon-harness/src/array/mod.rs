//! Labeled arrays and the array reader seam.
//!
//! The pipeline persists every result as one labeled multi-dimensional
//! array. The harness only consumes the observable contract: the shape,
//! the ordered axis names and the attribute map.

// The H5Type derive expands to an unsafe impl.
#[cfg(feature = "hdf5")]
#[allow(unsafe_code)]
mod hdf5_reader;
mod memory;

#[cfg(feature = "hdf5")]
pub use hdf5_reader::Hdf5Reader;
pub use memory::MemoryArrayReader;

use crate::errors::HarnessError;
use ndarray::ArrayD;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Violations of the labeled array data model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArrayError {
    /// `shape` and `dims` have different lengths.
    #[error("shape has {shape} axes but dims names {dims}")]
    RankMismatch {
        /// Number of axes in the shape.
        shape: usize,
        /// Number of axis names.
        dims: usize,
    },

    /// The loaded values do not have the declared shape.
    #[error("values have shape {actual:?}, expected {expected:?}")]
    ValueShape {
        /// The declared shape.
        expected: Vec<usize>,
        /// The shape of the values.
        actual: Vec<usize>,
    },
}

/// A multi-dimensional array paired with named axes and metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledArray {
    shape: Vec<usize>,
    dims: Vec<String>,
    attrs: BTreeMap<String, AttrValue>,
    values: Option<ArrayD<f32>>,
}

impl LabeledArray {
    /// Creates a header-only labeled array.
    ///
    /// # Errors
    ///
    /// Returns [`ArrayError::RankMismatch`] if `len(shape) != len(dims)`.
    pub fn new(
        shape: impl Into<Vec<usize>>,
        dims: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, ArrayError> {
        let shape = shape.into();
        let dims: Vec<String> = dims.into_iter().map(Into::into).collect();
        if shape.len() != dims.len() {
            return Err(ArrayError::RankMismatch {
                shape: shape.len(),
                dims: dims.len(),
            });
        }
        Ok(Self {
            shape,
            dims,
            attrs: BTreeMap::new(),
            values: None,
        })
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attr(mut self, key: impl Into<String>, value: AttrValue) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }

    /// Attaches magnitude values.
    ///
    /// # Errors
    ///
    /// Returns [`ArrayError::ValueShape`] if the values do not match `shape`.
    pub fn with_values(mut self, values: ArrayD<f32>) -> Result<Self, ArrayError> {
        if values.shape() != self.shape.as_slice() {
            return Err(ArrayError::ValueShape {
                expected: self.shape.clone(),
                actual: values.shape().to_vec(),
            });
        }
        self.values = Some(values);
        Ok(self)
    }

    /// Drops loaded values, keeping the header.
    #[must_use]
    pub fn without_values(mut self) -> Self {
        self.values = None;
        self
    }

    /// Ordered per-axis sizes.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Ordered axis names.
    #[must_use]
    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    /// Attribute map.
    #[must_use]
    pub fn attrs(&self) -> &BTreeMap<String, AttrValue> {
        &self.attrs
    }

    /// Looks up one attribute.
    #[must_use]
    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.get(key)
    }

    /// Magnitude values, if they were loaded.
    #[must_use]
    pub fn values(&self) -> Option<&ArrayD<f32>> {
        self.values.as_ref()
    }

    /// Position of a named axis.
    #[must_use]
    pub fn axis(&self, name: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == name)
    }

    /// Total number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    /// Returns true if any axis has length zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An auxiliary value stored in the attribute map.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// A nested labeled array (e.g. the sampling trajectory).
    Array(LabeledArray),
    /// A numeric scalar.
    Number(f64),
    /// A text value.
    Text(String),
}

impl AttrValue {
    /// Shape of a nested array attribute.
    #[must_use]
    pub fn shape(&self) -> Option<&[usize]> {
        match self {
            Self::Array(array) => Some(array.shape()),
            _ => None,
        }
    }

    /// Short name of the variant, used in mismatch reports.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Array(_) => "array",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
        }
    }
}

/// How much of a file the reader should load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// Shape, dims and attributes only.
    #[default]
    Header,
    /// Header plus magnitude values, for visualization.
    WithValues,
}

/// Loads labeled arrays from persisted files.
///
/// Implementations are stateless per call. A missing file must be reported
/// as [`HarnessError::MissingFile`].
#[cfg_attr(test, mockall::automock)]
pub trait ArrayReader: Send + Sync {
    /// Reads the labeled array stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::MissingFile`] or [`HarnessError::Read`].
    fn read(&self, path: &Path, mode: ReadMode) -> Result<LabeledArray, HarnessError>;
}

/// Formats a shape the way it appears in mismatch reports: `(1, 64, 64)`.
#[must_use]
pub fn format_shape(shape: &[usize]) -> String {
    if shape.len() == 1 {
        return format!("({},)", shape[0]);
    }
    let parts: Vec<String> = shape.iter().map(ToString::to_string).collect();
    format!("({})", parts.join(", "))
}

/// Formats axis names as `('volume', 'z')`.
#[must_use]
pub fn format_dims<S: AsRef<str>>(dims: &[S]) -> String {
    let parts: Vec<String> = dims.iter().map(|d| format!("'{}'", d.as_ref())).collect();
    if parts.len() == 1 {
        return format!("({},)", parts[0]);
    }
    format!("({})", parts.join(", "))
}

impl fmt::Display for LabeledArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LabeledArray(shape={}, dims={}, attrs=[{}])",
            format_shape(&self.shape),
            format_dims(&self.dims),
            self.attrs.keys().cloned().collect::<Vec<_>>().join(", ")
        )
    }
}
