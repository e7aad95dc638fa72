//! Reduction of an N-dimensional array to a 2D image.

use super::{AxisSelection, DisplaySpec, Image2D};
use crate::array::LabeledArray;
use crate::errors::RenderError;
use ndarray::{Array2, ArrayD, Axis};

/// Reduces an array to one 2D magnitude image.
///
/// Single-index selections drop their axis; list and range selections keep
/// it. After selection the display axes come first and every other axis is
/// linearised, last axis outermost, into the column axis.
///
/// # Errors
///
/// Returns a [`RenderError`] for missing values, unknown axes, out of
/// bounds indices, or a reduction that does not leave two axes.
pub fn reduce_to_image(array: &LabeledArray, spec: &DisplaySpec) -> Result<Image2D, RenderError> {
    let mut data: ArrayD<f32> = array.values().ok_or(RenderError::NoValues)?.mapv(f32::abs);
    let mut dims: Vec<String> = array.dims().to_vec();

    for (axis_name, selection) in &spec.selection {
        let axis = position(&dims, axis_name)?;
        let len = data.len_of(Axis(axis));
        let indices = selection.indices();
        if let Some(&bad) = indices.iter().find(|&&i| i >= len) {
            return Err(RenderError::OutOfBounds {
                axis: axis_name.clone(),
                index: bad,
                len,
            });
        }

        match selection {
            AxisSelection::Index(index) => {
                data = data.index_axis_move(Axis(axis), *index);
                dims.remove(axis);
            }
            AxisSelection::Indices(_) | AxisSelection::Range(_) => {
                if indices.is_empty() {
                    return Err(RenderError::NotDisplayable(format!(
                        "selection on '{axis_name}' is empty"
                    )));
                }
                data = data.select(Axis(axis), &indices);
            }
        }
    }

    if spec.row_axis == spec.col_axis {
        return Err(RenderError::NotDisplayable(format!(
            "row and column axis are both '{}'",
            spec.row_axis
        )));
    }
    let row = position(&dims, &spec.row_axis)?;
    let col = position(&dims, &spec.col_axis)?;

    // Row axis, then the rest outermost-first, then the column axis.
    let mut rest: Vec<usize> = (0..dims.len()).filter(|&a| a != row && a != col).collect();
    rest.reverse();
    let mut perm = Vec::with_capacity(dims.len());
    perm.push(row);
    perm.extend(&rest);
    perm.push(col);

    let col_label = if rest.is_empty() {
        dims[col].clone()
    } else {
        let stacked: Vec<&str> = rest
            .iter()
            .chain(std::iter::once(&col))
            .map(|&a| dims[a].as_str())
            .collect();
        format!("[{}]", stacked.join(", "))
    };
    let row_label = dims[row].clone();

    let nrows = data.len_of(Axis(row));
    let permuted = data.permuted_axes(perm);
    let ncols = if nrows == 0 { 0 } else { permuted.len() / nrows };
    let flat: Vec<f32> = permuted.iter().copied().collect();
    let pixels = Array2::from_shape_vec((nrows, ncols), flat)
        .map_err(|e| RenderError::NotDisplayable(e.to_string()))?;

    Ok(Image2D {
        pixels,
        row_label,
        col_label,
        title: spec.title.clone(),
    })
}

fn position(dims: &[String], name: &str) -> Result<usize, RenderError> {
    dims.iter()
        .position(|d| d == name)
        .ok_or_else(|| RenderError::UnknownAxis(name.to_string()))
}
