/// Image preprocessing: decode a bitmap, treat dark pixels as ink and
/// down-sample it to the fixed network input resolution.
use std::path::Path;

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};

use crate::error::{NetError, Result};

/// Side length of the square input grid.
pub const INPUT_RESOLUTION: u32 = 32;

/// Length of the vector produced by [`bitmap_to_input`].
pub const INPUT_SIZE: usize = (INPUT_RESOLUTION * INPUT_RESOLUTION) as usize;

/// Converts a grayscale bitmap of any size into a row-major
/// `INPUT_RESOLUTION × INPUT_RESOLUTION` vector.
///
/// The bitmap is centred on a square white canvas, then area-averaged down
/// (or nearest-neighbour scaled up) to the input grid.  Ink is
/// `1 - luma/255`, so black strokes on white paper become 1.0.
pub fn bitmap_to_input(bitmap: &GrayImage) -> Vec<f64> {
    let (w, h) = bitmap.dimensions();
    let side = w.max(h);
    if side == 0 {
        return vec![0.0; INPUT_SIZE];
    }

    let mut canvas = GrayImage::from_pixel(side, side, Luma([u8::MAX]));
    imageops::overlay(&mut canvas, bitmap, ((side - w) / 2) as i64, ((side - h) / 2) as i64);

    let grid = if side >= INPUT_RESOLUTION {
        imageops::thumbnail(&canvas, INPUT_RESOLUTION, INPUT_RESOLUTION)
    } else {
        imageops::resize(&canvas, INPUT_RESOLUTION, INPUT_RESOLUTION, FilterType::Nearest)
    };
    grid.pixels().map(|p| 1.0 - p.0[0] as f64 / 255.0).collect()
}

/// Decodes image bytes (PNG/JPEG/BMP/GIF) into a network input vector.
pub fn image_bytes_to_input(bytes: &[u8]) -> Result<Vec<f64>> {
    let img = image::load_from_memory(bytes).map_err(|e| NetError::Image(e.to_string()))?;
    Ok(bitmap_to_input(&img.to_luma8()))
}

/// Opens an image file and converts it into a network input vector.
pub fn load_image_input<P: AsRef<Path>>(path: P) -> Result<Vec<f64>> {
    let path = path.as_ref();
    let img = image::open(path).map_err(|e| NetError::Image(format!("{}: {}", path.display(), e)))?;
    Ok(bitmap_to_input(&img.to_luma8()))
}
