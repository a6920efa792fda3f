use std::path::Path;

use dicom_dictionary_std::tags;
use dicom_object::{DefaultDicomObject, open_file};
use dicom_pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder};
use ndarray::Array2;

use super::normalize::{NormalizeError, normalize_to_gray};

#[derive(Debug, thiserror::Error)]
pub enum DicomError {
    #[error("failed to read DICOM file: {0}")]
    Read(String),
    #[error("failed to decode pixel data: {0}")]
    PixelData(String),
    #[error("unsupported pixel layout: {0}")]
    UnsupportedLayout(String),
    #[error("pixel data is truncated: expected {expected} samples, found {found}")]
    Truncated { expected: usize, found: usize },
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error("failed to write PNG: {0}")]
    Write(#[from] image::ImageError),
}

/// Largest Rows x Columns accepted before any pixel data is decoded.
pub const DEFAULT_MAX_PIXELS: u64 = 8192 * 8192;

/// First frame of a grayscale DICOM image, in modality units.
///
/// Rescale slope and intercept are applied by the decoder together with
/// Bits Stored masking and sign extension.
#[derive(Debug)]
pub struct DicomPixels {
    pub pixels: Array2<f32>,
}

/// Reads and converts DICOM uploads, refusing headers that claim more pixels than allowed.
#[derive(Debug, Clone, Copy)]
pub struct DicomConverter {
    max_pixels: u64,
}

impl DicomConverter {
    pub fn new(max_pixels: u64) -> Self {
        Self { max_pixels }
    }

    pub fn read(&self, path: &Path) -> Result<DicomPixels, DicomError> {
        let object = open_file(path).map_err(|e| DicomError::Read(e.to_string()))?;
        self.check_dimensions(&object)?;

        let decoded = object
            .decode_pixel_data_frame(0)
            .map_err(|e| DicomError::PixelData(e.to_string()))?;

        let samples = decoded.samples_per_pixel();
        if samples != 1 {
            return Err(DicomError::UnsupportedLayout(format!(
                "{} samples per pixel, expected grayscale",
                samples
            )));
        }

        let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::Default);
        let frame = decoded
            .to_ndarray_with_options::<f32>(&options)
            .map_err(|e| DicomError::PixelData(e.to_string()))?;

        let rows = decoded.rows() as usize;
        let cols = decoded.columns() as usize;
        let expected = rows * cols;
        let values: Vec<f32> = frame.iter().copied().take(expected).collect();
        if values.len() < expected {
            return Err(DicomError::Truncated {
                expected,
                found: values.len(),
            });
        }
        let pixels = Array2::from_shape_vec((rows, cols), values)
            .map_err(|e| DicomError::UnsupportedLayout(e.to_string()))?;

        Ok(DicomPixels { pixels })
    }

    /// Converts a DICOM file into an 8-bit PNG at `png_path`.
    pub fn convert_to_png(&self, dicom_path: &Path, png_path: &Path) -> Result<(), DicomError> {
        let DicomPixels { pixels } = self.read(dicom_path)?;
        log::debug!(
            "DICOM {} has {}x{} pixels",
            dicom_path.display(),
            pixels.ncols(),
            pixels.nrows()
        );
        let gray = normalize_to_gray(&pixels, None)?;
        gray.save_with_format(png_path, image::ImageFormat::Png)?;
        Ok(())
    }

    fn check_dimensions(&self, object: &DefaultDicomObject) -> Result<(), DicomError> {
        let rows = read_u32(object, tags::ROWS)
            .ok_or_else(|| DicomError::UnsupportedLayout("missing Rows".into()))?;
        let cols = read_u32(object, tags::COLUMNS)
            .ok_or_else(|| DicomError::UnsupportedLayout("missing Columns".into()))?;
        let pixels = u64::from(rows) * u64::from(cols);
        if pixels == 0 || pixels > self.max_pixels {
            return Err(DicomError::UnsupportedLayout(format!(
                "{}x{} image is outside the 1..={} pixel limit",
                cols, rows, self.max_pixels
            )));
        }
        Ok(())
    }
}

impl Default for DicomConverter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PIXELS)
    }
}

fn read_u32(object: &DefaultDicomObject, tag: dicom_core::Tag) -> Option<u32> {
    object.get(tag).and_then(|element| element.to_int::<u32>().ok())
}
