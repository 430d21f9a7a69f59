// ============================================================================
// IMAGE I/O — decode to RGBA8, encode filtered results
// ============================================================================

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageEncoder, ImageError, ImageFormat, RgbaImage};

/// Output formats the batch tool can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveFormat {
    Png,
    Jpeg,
    Webp,
    Bmp,
    Tga,
    Tiff,
}

impl SaveFormat {
    pub fn extension(self) -> &'static str {
        match self {
            SaveFormat::Png => "png",
            SaveFormat::Jpeg => "jpg",
            SaveFormat::Webp => "webp",
            SaveFormat::Bmp => "bmp",
            SaveFormat::Tga => "tga",
            SaveFormat::Tiff => "tiff",
        }
    }

    /// Parse a format name or file extension.  Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "png" => Some(SaveFormat::Png),
            "jpeg" | "jpg" => Some(SaveFormat::Jpeg),
            "webp" => Some(SaveFormat::Webp),
            "bmp" => Some(SaveFormat::Bmp),
            "tga" => Some(SaveFormat::Tga),
            "tiff" | "tif" => Some(SaveFormat::Tiff),
            _ => None,
        }
    }

    /// Choose from `--format`, else the output extension, else PNG.
    pub fn resolve(format_arg: Option<&str>, output: Option<&Path>) -> Self {
        format_arg
            .and_then(Self::from_name)
            .or_else(|| {
                output
                    .and_then(|p| p.extension())
                    .and_then(|e| e.to_str())
                    .and_then(Self::from_name)
            })
            .unwrap_or(SaveFormat::Png)
    }
}

/// Decode any format the `image` crate understands into RGBA8.
pub fn load_rgba(path: &Path) -> Result<RgbaImage, String> {
    Ok(image::open(path).map_err(|e| e.to_string())?.to_rgba8())
}

/// Encode `image` to `path`.  `quality` only affects JPEG.
pub fn encode_and_write(image: &RgbaImage, path: &Path, format: SaveFormat, quality: u8) -> Result<(), ImageError> {
    match format {
        SaveFormat::Png => {
            let mut writer = BufWriter::new(File::create(path)?);
            PngEncoder::new(&mut writer).write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        SaveFormat::Jpeg => {
            // JPEG has no alpha channel.
            let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut writer = BufWriter::new(File::create(path)?);
            JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100)).write_image(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                image::ColorType::Rgb8,
            )?;
        }
        SaveFormat::Bmp => {
            let mut writer = BufWriter::new(File::create(path)?);
            BmpEncoder::new(&mut writer).write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        SaveFormat::Webp => image.save_with_format(path, ImageFormat::WebP)?,
        SaveFormat::Tga => image.save_with_format(path, ImageFormat::Tga)?,
        SaveFormat::Tiff => image.save_with_format(path, ImageFormat::Tiff)?,
    }
    Ok(())
}
