use image::{Rgba, RgbaImage};
use crate::models::BoundingBox;

/// Mean of the color channels, alpha ignored
pub fn brightness(pixel: &Rgba<u8>) -> f32 {
    (pixel[0] as f32 + pixel[1] as f32 + pixel[2] as f32) / 3.0
}

pub fn is_ink(pixel: &Rgba<u8>, threshold: f32) -> bool {
    brightness(pixel) < threshold
}

/// Bounding box of every pixel darker than `threshold`, `None` for a blank surface
pub fn find_ink_bounds(img: &RgbaImage, threshold: f32) -> Option<BoundingBox> {
    let mut bounds: Option<BoundingBox> = None;

    for (x, y, pixel) in img.enumerate_pixels() {
        if !is_ink(pixel, threshold) {
            continue;
        }
        bounds = Some(match bounds {
            Some(b) => BoundingBox {
                min_x: b.min_x.min(x),
                min_y: b.min_y.min(y),
                max_x: b.max_x.max(x),
                max_y: b.max_y.max(y),
            },
            None => BoundingBox {
                min_x: x,
                min_y: y,
                max_x: x,
                max_y: y,
            },
        });
    }

    bounds
}
