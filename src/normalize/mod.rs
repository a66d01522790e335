pub mod bounds;
pub mod resample;

use image::GrayImage;
use log::debug;

use crate::config::{NormalizerConfig, ResizeFilter};
use crate::models::{NormalizedVector, PixelBuffer};

/// Result of normalizing a drawing
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Vector(NormalizedVector),
    /// Nothing on the surface reached the ink threshold
    EmptyInput,
}

impl Normalized {
    pub fn into_vector(self) -> Option<NormalizedVector> {
        match self {
            Normalized::Vector(v) => Some(v),
            Normalized::EmptyInput => None,
        }
    }

    pub fn is_empty_input(&self) -> bool {
        matches!(self, Normalized::EmptyInput)
    }
}

/// Turns a hand drawing into the 28×28 classifier input
#[derive(Debug, Clone)]
pub struct Normalizer {
    pub padding: u32,
    pub ink_threshold: f32,
    pub filter: ResizeFilter,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::from_config(&NormalizerConfig::default())
    }

    pub fn from_config(config: &NormalizerConfig) -> Self {
        Self {
            padding: config.padding,
            ink_threshold: config.ink_threshold,
            filter: config.filter,
        }
    }

    pub fn normalize(&self, buffer: &PixelBuffer) -> Normalized {
        match self.grid(buffer) {
            Some(grid) => Normalized::Vector(NormalizedVector::from_grid(&grid)),
            None => Normalized::EmptyInput,
        }
    }

    /// The resampled 28×28 grid before inversion, `None` when there is no ink
    pub fn grid(&self, buffer: &PixelBuffer) -> Option<GrayImage> {
        let img = buffer.as_image();
        let ink = bounds::find_ink_bounds(img, self.ink_threshold)?;
        let region = ink.padded(self.padding, img.width(), img.height());

        debug!(
            "ink at ({}, {})-({}, {}), padded to {}x{} from ({}, {})",
            ink.min_x, ink.min_y, ink.max_x, ink.max_y,
            region.width(), region.height(), region.min_x, region.min_y
        );

        let canvas = resample::square_canvas(img, &region);
        Some(resample::downsample_to_grid(&canvas, self.filter.into()))
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize with the default padding, threshold and filter
pub fn normalize(buffer: &PixelBuffer) -> Normalized {
    Normalizer::new().normalize(buffer)
}
