//! HDF5 array reader for riesling output files.
//!
//! A riesling file stores its main tensor as one dataset. Axis names come
//! from the dimension-scale `DIMENSION_LABELS` attribute, or failing that
//! from a `dims` string attribute. Other root datasets (such as
//! `trajectory`) are surfaced as nested array attributes.

use super::{ArrayReader, AttrValue, LabeledArray, ReadMode};
use crate::errors::HarnessError;
use hdf5::types::{VarLenAscii, VarLenUnicode};
use hdf5::{Attribute, Dataset, File, H5Type};
use ndarray::ArrayD;
use std::path::Path;
use tracing::debug;

const DEFAULT_DATASET: &str = "data";
/// Attributes that may name the axes, in lookup order.
const LABEL_ATTRS: [&str; 2] = ["DIMENSION_LABELS", "dims"];

/// Complex samples as riesling writes them.
#[derive(H5Type, Clone, Copy, Debug)]
#[repr(C)]
struct Complex32 {
    r: f32,
    i: f32,
}

/// Reads labeled arrays from HDF5 files.
#[derive(Debug, Clone)]
pub struct Hdf5Reader {
    dataset: String,
}

impl Default for Hdf5Reader {
    fn default() -> Self {
        Self {
            dataset: DEFAULT_DATASET.to_string(),
        }
    }
}

impl Hdf5Reader {
    /// Creates a reader for the default dataset name.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a different main dataset.
    #[must_use]
    pub fn with_dataset(mut self, name: impl Into<String>) -> Self {
        self.dataset = name.into();
        self
    }
}

impl ArrayReader for Hdf5Reader {
    fn read(&self, path: &Path, mode: ReadMode) -> Result<LabeledArray, HarnessError> {
        if !path.exists() {
            return Err(HarnessError::missing_file("", path));
        }
        let fail = |e: &dyn std::fmt::Display| HarnessError::read(path, e.to_string());

        let file = File::open(path).map_err(|e| fail(&e))?;
        let dataset = file.dataset(&self.dataset).map_err(|e| fail(&e))?;
        let mut array = labeled(&dataset).map_err(|e| fail(&e))?;

        for name in dataset.attr_names().map_err(|e| fail(&e))? {
            if LABEL_ATTRS.contains(&name.as_str()) {
                continue;
            }
            if let Some(value) = scalar_attr(&dataset, &name) {
                array = array.with_attr(name, value);
            }
        }

        for member in file.member_names().map_err(|e| fail(&e))? {
            if member == self.dataset {
                continue;
            }
            if let Ok(nested) = file.dataset(&member) {
                let nested = labeled(&nested).map_err(|e| fail(&e))?;
                array = array.with_attr(member, AttrValue::Array(nested));
            }
        }

        if mode == ReadMode::WithValues {
            let values = magnitudes(&dataset).map_err(|e| fail(&e))?;
            array = array.with_values(values).map_err(|e| fail(&e))?;
        }

        debug!(path = %path.display(), array = %array, "read array file");
        Ok(array)
    }
}

fn labeled(dataset: &Dataset) -> Result<LabeledArray, String> {
    let shape = dataset.shape();
    // Auxiliary datasets may be unlabeled.
    let dims = axis_labels(dataset, shape.len())
        .unwrap_or_else(|| (0..shape.len()).map(|i| format!("dim_{i}")).collect());
    LabeledArray::new(shape, dims).map_err(|e| e.to_string())
}

/// The first label attribute with one name per axis. Unset labels
/// become `dim_<i>`.
fn axis_labels(dataset: &Dataset, rank: usize) -> Option<Vec<String>> {
    LABEL_ATTRS.iter().find_map(|name| {
        let labels = read_strings(&dataset.attr(name).ok()?)?;
        if labels.len() != rank {
            debug!(attr = *name, labels = labels.len(), rank, "ignoring label attribute");
            return None;
        }
        Some(
            labels
                .into_iter()
                .enumerate()
                .map(|(i, label)| if label.is_empty() { format!("dim_{i}") } else { label })
                .collect(),
        )
    })
}

/// Variable-length strings, UTF-8 or ASCII.
fn read_strings(attr: &Attribute) -> Option<Vec<String>> {
    if let Ok(labels) = attr.read_raw::<VarLenUnicode>() {
        return Some(labels.iter().map(|l| l.as_str().to_string()).collect());
    }
    attr.read_raw::<VarLenAscii>()
        .ok()
        .map(|labels| labels.iter().map(|l| l.as_str().to_string()).collect())
}

fn scalar_attr(dataset: &Dataset, name: &str) -> Option<AttrValue> {
    let attr = dataset.attr(name).ok()?;
    if let Ok(number) = attr.read_scalar::<f64>() {
        return Some(AttrValue::Number(number));
    }
    attr.read_scalar::<VarLenUnicode>()
        .ok()
        .map(|text| AttrValue::Text(text.as_str().to_string()))
}

fn magnitudes(dataset: &Dataset) -> Result<ArrayD<f32>, String> {
    match dataset.read_dyn::<Complex32>() {
        Ok(complex) => Ok(complex.mapv(|c| c.r.hypot(c.i))),
        Err(_) => dataset
            .read_dyn::<f32>()
            .map(|real| real.mapv(f32::abs))
            .map_err(|e| e.to_string()),
    }
}
