use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, GenericImageView};
use thiserror::Error;

pub const DEFAULT_THUMBNAIL_WIDTH: u32 = 640;
pub const DEFAULT_THUMBNAIL_QUALITY: u8 = 90;

#[derive(Error, Debug)]
pub enum ThumbnailError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("image has zero width")]
    Empty,
}

/// Produces a derivative image for an uploaded picture.
///
/// The attachment manager only decides whether a derivative should exist and
/// what it is called; how the pixels are produced is up to the implementor.
pub trait Thumbnailer: Send + Sync {
    fn make_thumbnail(&self, source: &Path, dest: &Path) -> Result<(), ThumbnailError>;
}

/// Rotates according to the EXIF orientation, scales to a fixed width keeping
/// the aspect ratio, and writes a JPEG.
#[derive(Debug, Clone)]
pub struct ImageThumbnailer {
    width: u32,
    quality: u8,
}

impl ImageThumbnailer {
    pub fn new(width: u32, quality: u8) -> Self {
        Self {
            width: width.max(1),
            quality: quality.clamp(1, 100),
        }
    }
}

impl Default for ImageThumbnailer {
    fn default() -> Self {
        Self::new(DEFAULT_THUMBNAIL_WIDTH, DEFAULT_THUMBNAIL_QUALITY)
    }
}

impl Thumbnailer for ImageThumbnailer {
    fn make_thumbnail(&self, source: &Path, dest: &Path) -> Result<(), ThumbnailError> {
        let orientation = read_orientation(source);
        let img = apply_orientation(image::open(source)?, orientation);

        let (w, h) = img.dimensions();
        if w == 0 {
            return Err(ThumbnailError::Empty);
        }
        let height = ((u64::from(h) * u64::from(self.width)) / u64::from(w)).max(1) as u32;
        let rgb = img
            .resize_exact(self.width, height, FilterType::Triangle)
            .to_rgb8();

        let mut out = BufWriter::new(File::create(dest)?);
        JpegEncoder::new_with_quality(&mut out, self.quality).encode(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            ColorType::Rgb8,
        )?;
        Ok(())
    }
}

/// EXIF orientation tag value, 1 (upright) when absent or unreadable.
fn read_orientation(path: &Path) -> u32 {
    let Ok(file) = File::open(path) else {
        return 1;
    };
    let mut reader = BufReader::new(file);
    exif::Reader::new()
        .read_from_container(&mut reader)
        .ok()
        .and_then(|data| {
            data.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
                .and_then(|field| field.value.get_uint(0))
        })
        .unwrap_or(1)
}

fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        3 => img.rotate180(),
        6 => img.rotate90(),
        8 => img.rotate270(),
        _ => img,
    }
}
