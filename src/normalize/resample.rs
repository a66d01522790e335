use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgba, RgbaImage};
use crate::models::{BoundingBox, GRID_SIZE};

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Crop `region` out of `img` and center it on a white square so the later
/// resize scales both axes by the same factor
pub fn square_canvas(img: &RgbaImage, region: &BoundingBox) -> RgbaImage {
    let (width, height) = (region.width(), region.height());
    let side = width.max(height);

    let crop = imageops::crop_imm(img, region.min_x, region.min_y, width, height).to_image();

    let mut canvas = RgbaImage::from_pixel(side, side, BACKGROUND);
    let offset_x = (side - width) / 2;
    let offset_y = (side - height) / 2;

    // replace, not overlay: the crop is copied verbatim, no alpha blending
    imageops::replace(&mut canvas, &crop, offset_x.into(), offset_y.into());

    canvas
}

/// Resample the square canvas to the classifier grid and keep the red channel
pub fn downsample_to_grid(canvas: &RgbaImage, filter: FilterType) -> GrayImage {
    let scaled = imageops::resize(canvas, GRID_SIZE, GRID_SIZE, filter);
    GrayImage::from_fn(GRID_SIZE, GRID_SIZE, |x, y| Luma([scaled.get_pixel(x, y)[0]]))
}
