use image::GrayImage;
use ndarray::Array2;

/// Linear modality transform carried by DICOM headers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rescale {
    pub slope: f32,
    pub intercept: f32,
}

impl Rescale {
    pub fn apply(&self, value: f32) -> f32 {
        value * self.slope + self.intercept
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("pixel buffer is empty")]
    Empty,
    #[error("pixel buffer contains a non-finite value")]
    NonFinite,
    #[error("pixel buffer dimensions {0}x{1} do not fit an image")]
    Dimensions(usize, usize),
}

/// Stretches a raw pixel buffer to 8-bit grayscale.
///
/// The optional rescale is applied first, then the buffer's value range is
/// mapped linearly onto `0..=255` and truncated. A constant buffer has no
/// range to stretch and comes out all zeros.
pub fn normalize_to_gray(
    pixels: &Array2<f32>,
    rescale: Option<Rescale>,
) -> Result<GrayImage, NormalizeError> {
    let (rows, cols) = pixels.dim();
    if pixels.is_empty() {
        return Err(NormalizeError::Empty);
    }
    let width = u32::try_from(cols).map_err(|_| NormalizeError::Dimensions(rows, cols))?;
    let height = u32::try_from(rows).map_err(|_| NormalizeError::Dimensions(rows, cols))?;

    let values = match rescale {
        Some(rescale) => pixels.mapv(|v| rescale.apply(v)),
        None => pixels.clone(),
    };

    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &v in values.iter() {
        if !v.is_finite() {
            return Err(NormalizeError::NonFinite);
        }
        min = min.min(v);
        max = max.max(v);
    }

    // f32 range overflows for extreme finite values
    let (min, max) = (f64::from(min), f64::from(max));
    let range = max - min;
    let mut out = GrayImage::new(width, height);
    if range <= 0.0 {
        return Ok(out);
    }

    for ((row, col), &v) in values.indexed_iter() {
        let scaled = ((f64::from(v) - min) / range * 255.0).clamp(0.0, 255.0) as u8;
        out.put_pixel(col as u32, row as u32, image::Luma([scaled]));
    }
    Ok(out)
}
