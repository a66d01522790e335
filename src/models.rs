use image::{DynamicImage, GrayImage, RgbaImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Side of the square grid the classifier expects
pub const GRID_SIZE: u32 = 28;

/// Number of values in a normalized vector (28 × 28)
pub const VECTOR_LEN: usize = (GRID_SIZE * GRID_SIZE) as usize;

#[derive(Debug, Error)]
pub enum BufferError {
    #[error("pixel buffer of {width}x{height} needs {expected} bytes, got {actual}")]
    LengthMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// Raw RGBA drawing surface handed over by the capture layer
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    image: RgbaImage,
}

impl PixelBuffer {
    /// Wrap raw RGBA bytes (row-major, 4 bytes per pixel)
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, BufferError> {
        let expected = width as usize * height as usize * 4;
        let actual = data.len();
        match RgbaImage::from_raw(width, height, data) {
            Some(image) if actual == expected => Ok(Self { image }),
            _ => Err(BufferError::LengthMismatch {
                width,
                height,
                expected,
                actual,
            }),
        }
    }

    /// A buffer filled with opaque white, like a freshly cleared canvas
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, image::Rgba([255, 255, 255, 255])),
        }
    }

    pub fn from_image(img: &DynamicImage) -> Self {
        Self {
            image: img.to_rgba8(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn as_image_mut(&mut self) -> &mut RgbaImage {
        &mut self.image
    }
}

/// Inclusive box around the ink in buffer coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl BoundingBox {
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    /// Grow by `padding` on every side without leaving `[0, width) × [0, height)`
    pub fn padded(&self, padding: u32, width: u32, height: u32) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.saturating_sub(padding),
            min_y: self.min_y.saturating_sub(padding),
            max_x: self.max_x.saturating_add(padding).min(width.saturating_sub(1)),
            max_y: self.max_y.saturating_add(padding).min(height.saturating_sub(1)),
        }
    }
}

/// 28×28 inverted grayscale digit, row-major, values in [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NormalizedVector(Vec<f32>);

// always VECTOR_LEN long; an empty drawing is `Normalized::EmptyInput`, never a short vector
#[allow(clippy::len_without_is_empty)]
impl NormalizedVector {
    /// Invert and scale a [`GRID_SIZE`]² grayscale grid (ink dark, background white)
    pub(crate) fn from_grid(grid: &GrayImage) -> Self {
        debug_assert_eq!(grid.dimensions(), (GRID_SIZE, GRID_SIZE));
        Self(
            grid.pixels()
                .map(|p| (255 - p[0]) as f32 / 255.0)
                .collect(),
        )
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Value of the cell at column `x`, row `y`
    pub fn cell(&self, x: u32, y: u32) -> Option<f32> {
        if x >= GRID_SIZE || y >= GRID_SIZE {
            return None;
        }
        self.0.get((y * GRID_SIZE + x) as usize).copied()
    }

    /// Count of cells carrying any ink at all
    pub fn ink_cells(&self) -> usize {
        self.0.iter().filter(|v| **v > 0.0).count()
    }

    /// Ink-weighted center of mass as (column, row), `None` for a blank grid
    pub fn centroid(&self) -> Option<(f32, f32)> {
        let mut total = 0.0f32;
        let mut cx = 0.0f32;
        let mut cy = 0.0f32;
        for (i, v) in self.0.iter().enumerate() {
            let x = (i as u32 % GRID_SIZE) as f32;
            let y = (i as u32 / GRID_SIZE) as f32;
            total += v;
            cx += v * x;
            cy += v * y;
        }
        (total > 0.0).then(|| (cx / total, cy / total))
    }
}

/// Label and confidence reported for a run, confidence clamped to [0, 100]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: u32,
    pub confidence: Option<f32>,
}

impl Prediction {
    pub fn new(label: u32, confidence: Option<f32>) -> Self {
        Self {
            label,
            confidence: confidence.filter(|c| !c.is_nan()).map(|c| c.clamp(0.0, 100.0)),
        }
    }
}
