use crate::errors::{HistogramError, Result};
use image::{DynamicImage, RgbaImage};

const BYTES_PER_PIXEL: usize = 4;

/// Read-only RGBA8 image data handed to the binning stage.
///
/// Samples are stored unconverted: whatever transfer function the source used is what the
/// binning stage sees, and the `is_linear` flag decides whether it is decoded.
#[derive(Debug, Clone)]
pub struct HistogramTexture {
    image: RgbaImage,
}

impl HistogramTexture {
    /// Zero-filled texture, to be filled later with one of the `fill_*` methods.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    pub fn from_rgba8(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = expected_len(width, height);
        let actual = data.len();
        let mismatch = HistogramError::TextureSizeMismatch {
            width,
            height,
            expected,
            actual,
        };
        if actual != expected {
            return Err(mismatch);
        }
        let image = RgbaImage::from_raw(width, height, data).ok_or(mismatch)?;
        Ok(Self { image })
    }

    /// Tightly packed BGRA8 data, the layout camera frames usually arrive in.
    pub fn from_bgra8(width: u32, height: u32, data: &[u8]) -> Result<Self> {
        let mut texture = Self::new(width, height);
        texture.fill_bgra8(data, None)?;
        Ok(texture)
    }

    pub fn from_image(image: &DynamicImage) -> Self {
        Self {
            image: image.to_rgba8(),
        }
    }

    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let image = image::open(path.as_ref())?;
        Ok(Self::from_image(&image))
    }

    /// Replaces the contents with BGRA8 rows of `bytes_per_row` bytes each.
    ///
    /// `bytes_per_row` defaults to `4 * width`; a larger stride skips the row padding.
    pub fn fill_bgra8(&mut self, data: &[u8], bytes_per_row: Option<usize>) -> Result<()> {
        let (width, height) = self.image.dimensions();
        let row_len = width as usize * BYTES_PER_PIXEL;
        let stride = bytes_per_row.unwrap_or(row_len);
        let required = if height == 0 {
            0
        } else {
            stride * (height as usize - 1) + row_len
        };

        if stride < row_len || data.len() < required {
            return Err(HistogramError::TextureSizeMismatch {
                width,
                height,
                expected: required.max(expected_len(width, height)),
                actual: data.len(),
            });
        }
        if self.is_empty() {
            return Ok(());
        }

        for (y, row) in self.image.rows_mut().enumerate() {
            let src = &data[y * stride..y * stride + row_len];
            for (pixel, bgra) in row.zip(src.chunks_exact(BYTES_PER_PIXEL)) {
                pixel.0 = [bgra[2], bgra[1], bgra[0], bgra[3]];
            }
        }
        Ok(())
    }

    pub fn fill_rgba8(&mut self, data: &[u8]) -> Result<()> {
        let (width, height) = self.image.dimensions();
        if data.len() != self.image.len() {
            return Err(HistogramError::TextureSizeMismatch {
                width,
                height,
                expected: self.image.len(),
                actual: data.len(),
            });
        }
        self.image.copy_from_slice(data);
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn pixel_count(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.pixel_count() == 0
    }

    /// Rejects textures the pipeline cannot dispatch over.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(HistogramError::EmptyTexture {
                width: self.width(),
                height: self.height(),
            });
        }
        Ok(())
    }

    /// RGBA of the pixel at `(x, y)`, or `None` outside the texture.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.image.get_pixel_checked(x, y).map(|p| p.0)
    }

    /// Raw RGBA8 bytes, row-major and tightly packed.
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }
}

impl From<RgbaImage> for HistogramTexture {
    fn from(image: RgbaImage) -> Self {
        Self { image }
    }
}

fn expected_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * BYTES_PER_PIXEL
}
