//! Diagnostic visualization of stage outputs.
//!
//! When enabled, an N-dimensional output is reduced to one 2D magnitude
//! image: selected axes are indexed or subset, the two display axes are
//! moved to the front and every remaining axis is stacked into the column
//! axis. Nothing in this module can fail a stage.

mod reduce;
#[cfg(feature = "plot")]
mod svg;

pub use reduce::reduce_to_image;
#[cfg(feature = "plot")]
pub use svg::SvgRenderer;

use crate::array::LabeledArray;
use crate::errors::RenderError;
use ndarray::Array2;
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Which indices of one axis to keep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AxisSelection {
    /// A single index; the axis is dropped.
    Index(usize),
    /// A list of indices; the axis is kept.
    Indices(Vec<usize>),
    /// A contiguous range; the axis is kept.
    Range(Range<usize>),
}

impl AxisSelection {
    fn indices(&self) -> Vec<usize> {
        match self {
            Self::Index(i) => vec![*i],
            Self::Indices(list) => list.clone(),
            Self::Range(range) => range.clone().collect(),
        }
    }
}

/// How to display one stage output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplaySpec {
    /// Axis drawn along image rows.
    pub row_axis: String,
    /// Axis drawn along image columns; remaining axes are stacked onto it.
    pub col_axis: String,
    /// Constraints on other axes.
    pub selection: BTreeMap<String, AxisSelection>,
    /// Image title, also used for the file name.
    pub title: String,
}

impl DisplaySpec {
    /// Creates a display spec with `row_axis` × `col_axis`.
    #[must_use]
    pub fn new(
        row_axis: impl Into<String>,
        col_axis: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            row_axis: row_axis.into(),
            col_axis: col_axis.into(),
            selection: BTreeMap::new(),
            title: title.into(),
        }
    }

    /// Fixes an axis at one index.
    #[must_use]
    pub fn index(mut self, axis: impl Into<String>, index: usize) -> Self {
        self.selection.insert(axis.into(), AxisSelection::Index(index));
        self
    }

    /// Keeps a list of indices of an axis.
    #[must_use]
    pub fn indices(mut self, axis: impl Into<String>, indices: impl Into<Vec<usize>>) -> Self {
        self.selection
            .insert(axis.into(), AxisSelection::Indices(indices.into()));
        self
    }

    /// Keeps a range of an axis.
    #[must_use]
    pub fn range(mut self, axis: impl Into<String>, range: Range<usize>) -> Self {
        self.selection.insert(axis.into(), AxisSelection::Range(range));
        self
    }
}

/// A 2D magnitude image ready to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct Image2D {
    /// Pixel magnitudes, `rows × cols`.
    pub pixels: Array2<f32>,
    /// Label of the row axis.
    pub row_label: String,
    /// Label of the (possibly stacked) column axis.
    pub col_label: String,
    /// Image title.
    pub title: String,
}

impl Image2D {
    /// Number of rows.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.pixels.nrows()
    }

    /// Number of columns.
    #[must_use]
    pub fn cols(&self) -> usize {
        self.pixels.ncols()
    }
}

/// A capability that turns images into something a person can look at.
pub trait Renderer: Send + Sync {
    /// Renders an image, returning where it was written, if anywhere.
    ///
    /// # Errors
    ///
    /// Returns a [`RenderError`] if the backend fails.
    fn render(&self, image: &Image2D) -> Result<Option<PathBuf>, RenderError>;

    /// Whether rendering does anything.
    fn is_active(&self) -> bool {
        true
    }
}

/// A renderer that draws nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpRenderer;

impl Renderer for NoOpRenderer {
    fn render(&self, _image: &Image2D) -> Result<Option<PathBuf>, RenderError> {
        Ok(None)
    }

    fn is_active(&self) -> bool {
        false
    }
}

/// The hook applied after a stage's contract check.
pub struct VisualizationHook {
    renderer: Box<dyn Renderer>,
}

impl std::fmt::Debug for VisualizationHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisualizationHook")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl Default for VisualizationHook {
    fn default() -> Self {
        Self::disabled()
    }
}

impl VisualizationHook {
    /// A hook that never renders.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            renderer: Box::new(NoOpRenderer),
        }
    }

    /// A hook using the given renderer.
    #[must_use]
    pub fn with_renderer(renderer: Box<dyn Renderer>) -> Self {
        Self { renderer }
    }

    /// Selects the renderer from the debug flag.
    ///
    /// Falls back to a no-op hook when plotting support is not compiled in.
    #[must_use]
    pub fn from_flag(enabled: bool, plot_dir: &Path) -> Self {
        if !enabled {
            return Self::disabled();
        }
        #[cfg(feature = "plot")]
        {
            Self::with_renderer(Box::new(SvgRenderer::new(plot_dir)))
        }
        #[cfg(not(feature = "plot"))]
        {
            warn!(
                plot_dir = %plot_dir.display(),
                "visualization requested but plotting support is not compiled in; skipping"
            );
            Self::disabled()
        }
    }

    /// Whether this hook will render anything.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.renderer.is_active()
    }

    /// Reduces and renders an array, swallowing every failure.
    pub fn show(&self, array: &LabeledArray, spec: &DisplaySpec) -> Option<PathBuf> {
        if !self.is_enabled() {
            return None;
        }

        let image = match reduce_to_image(array, spec) {
            Ok(image) => image,
            Err(err) => {
                warn!(title = %spec.title, error = %err, "skipping visualization");
                return None;
            }
        };

        let rendered = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.renderer.render(&image)
        }));

        match rendered {
            Ok(Ok(path)) => {
                if let Some(ref p) = path {
                    debug!(title = %spec.title, path = %p.display(), "rendered stage output");
                }
                path
            }
            Ok(Err(err)) => {
                warn!(title = %spec.title, error = %err, "renderer failed; skipping");
                None
            }
            Err(_) => {
                warn!(title = %spec.title, "renderer panicked; skipping");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    struct FailingRenderer;

    impl Renderer for FailingRenderer {
        fn render(&self, _image: &Image2D) -> Result<Option<PathBuf>, RenderError> {
            Err(RenderError::Backend("no display".to_string()))
        }
    }

    struct PanickingRenderer;

    impl Renderer for PanickingRenderer {
        fn render(&self, _image: &Image2D) -> Result<Option<PathBuf>, RenderError> {
            panic!("backend exploded")
        }
    }

    fn image_array() -> LabeledArray {
        LabeledArray::new(vec![1, 4, 4, 4, 1], ["volume", "z", "y", "x", "image"])
            .unwrap()
            .with_values(ArrayD::ones(IxDyn(&[1, 4, 4, 4, 1])))
            .unwrap()
    }

    fn spec() -> DisplaySpec {
        DisplaySpec::new("x", "y", "phantom")
            .index("volume", 0)
            .index("image", 0)
            .indices("z", vec![1, 2])
    }

    #[test]
    fn test_disabled_hook_is_noop() {
        let hook = VisualizationHook::disabled();
        assert!(!hook.is_enabled());
        assert_eq!(hook.show(&image_array(), &spec()), None);
    }

    #[test]
    fn test_renderer_failure_is_swallowed() {
        let hook = VisualizationHook::with_renderer(Box::new(FailingRenderer));
        assert!(hook.is_enabled());
        assert_eq!(hook.show(&image_array(), &spec()), None);
    }

    #[test]
    fn test_renderer_panic_is_swallowed() {
        let hook = VisualizationHook::with_renderer(Box::new(PanickingRenderer));
        assert_eq!(hook.show(&image_array(), &spec()), None);
    }

    #[test]
    fn test_missing_values_is_swallowed() {
        let hook = VisualizationHook::with_renderer(Box::new(FailingRenderer));
        let header_only = image_array().without_values();
        assert_eq!(hook.show(&header_only, &spec()), None);
    }

    #[test]
    fn test_from_flag_off_is_disabled() {
        let hook = VisualizationHook::from_flag(false, Path::new("plots"));
        assert!(!hook.is_enabled());
    }
}
