//! SVG renderer built on plotters.

use super::{Image2D, Renderer};
use crate::errors::RenderError;
use plotters::prelude::*;
use std::path::{Path, PathBuf};

const TARGET_EDGE: usize = 512;

/// Writes each image as a grayscale SVG heat map.
#[derive(Debug, Clone)]
pub struct SvgRenderer {
    dir: PathBuf,
}

impl SvgRenderer {
    /// Creates a renderer writing into `dir`.
    #[must_use]
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn file_for(&self, title: &str) -> PathBuf {
        let stem: String = title
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{stem}.svg"))
    }
}

impl Renderer for SvgRenderer {
    fn render(&self, image: &Image2D) -> Result<Option<PathBuf>, RenderError> {
        if image.rows() == 0 || image.cols() == 0 {
            return Err(RenderError::NotDisplayable("empty image".to_string()));
        }
        std::fs::create_dir_all(&self.dir)?;
        let path = self.file_for(&image.title);

        let cell = (TARGET_EDGE / image.rows().max(image.cols())).max(1);
        let width = u32::try_from(image.cols() * cell)
            .map_err(|e| RenderError::Backend(e.to_string()))?;
        let height = u32::try_from(image.rows() * cell)
            .map_err(|e| RenderError::Backend(e.to_string()))?;

        let peak = image.pixels.iter().copied().fold(0.0_f32, f32::max);
        let scale = if peak > 0.0 { 255.0 / peak } else { 0.0 };

        let root = SVGBackend::new(&path, (width, height)).into_drawing_area();
        root.fill(&BLACK)
            .map_err(|e| RenderError::Backend(e.to_string()))?;

        let step = i32::try_from(cell).map_err(|e| RenderError::Backend(e.to_string()))?;
        for ((r, c), &value) in image.pixels.indexed_iter() {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let level = (value * scale).clamp(0.0, 255.0) as u8;
            if level == 0 {
                continue;
            }
            let (x, y) = (
                i32::try_from(c).unwrap_or(i32::MAX) * step,
                i32::try_from(r).unwrap_or(i32::MAX) * step,
            );
            root.draw(&Rectangle::new(
                [(x, y), (x + step, y + step)],
                RGBColor(level, level, level).filled(),
            ))
            .map_err(|e| RenderError::Backend(e.to_string()))?;
        }

        root.present()
            .map_err(|e| RenderError::Backend(e.to_string()))?;
        drop(root);
        Ok(Some(path))
    }
}
