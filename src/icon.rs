//! Icon conversion utilities
//!
//! This module provides automatic icon format conversion and multi-resolution ICO generation.
//!
//! ## Features
//!
//! - Automatic format detection (PNG, JPG, ICO)
//! - PNG/JPG to multi-resolution ICO conversion
//! - PNG data extraction for shortcut icons on non-Windows targets
//! - Standard ICO sizes: 16x16, 24x24, 32x32, 48x48, 64x64, 128x128, 256x256

use crate::error::{SetupError, SetupResult};
use image::{DynamicImage, ImageFormat};
use std::fs;
use std::io::Cursor;
use std::path::Path;

/// Standard ICO sizes for multi-resolution icons
const ICO_SIZES: &[u32] = &[16, 24, 32, 48, 64, 128, 256];

/// Icon data with both ICO and PNG representations
#[derive(Debug, Clone)]
pub struct IconData {
    /// Multi-resolution ICO data (for Windows shortcuts)
    pub ico_data: Vec<u8>,
    /// PNG data (for .desktop entries and previews)
    pub png_data: Vec<u8>,
    /// Original format
    pub original_format: IconFormat,
}

/// Supported icon formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconFormat {
    Png,
    Jpeg,
    Ico,
}

impl IconFormat {
    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "ico" => Some(Self::Ico),
            _ => None,
        }
    }

    /// Detect format from magic bytes
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 4 {
            return None;
        }

        // PNG magic: 89 50 4E 47
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
            return Some(Self::Png);
        }

        // JPEG magic: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        // ICO magic: 00 00 01 00
        if data.starts_with(&[0x00, 0x00, 0x01, 0x00]) {
            return Some(Self::Ico);
        }

        None
    }
}

/// Load and convert icon from file path
///
/// Supports PNG, JPG, and ICO formats. Automatically converts to:
/// - Multi-resolution ICO for Windows shortcuts
/// - PNG for freedesktop .desktop entries
pub fn load_icon(path: &Path) -> SetupResult<IconData> {
    let data = fs::read(path).map_err(|e| {
        SetupError::Icon(format!(
            "Failed to read icon file {}: {}",
            path.display(),
            e
        ))
    })?;

    // Detect format
    let format = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(IconFormat::from_extension)
        .or_else(|| IconFormat::from_bytes(&data))
        .ok_or_else(|| {
            SetupError::Icon(format!(
                "Unknown icon format for {}: supported formats are PNG, JPG, ICO",
                path.display()
            ))
        })?;

    convert_icon_data(&data, format)
}

/// Convert icon data to both ICO and PNG formats
pub fn convert_icon_data(data: &[u8], format: IconFormat) -> SetupResult<IconData> {
    match format {
        IconFormat::Ico => {
            // Already ICO, extract PNG for non-Windows shortcut icons
            let png_data = extract_png_from_ico(data)?;
            Ok(IconData {
                ico_data: data.to_vec(),
                png_data,
                original_format: format,
            })
        }
        IconFormat::Png | IconFormat::Jpeg => {
            // Convert to multi-resolution ICO
            let img = load_image(data, format)?;
            let ico_data = create_multi_resolution_ico(&img)?;
            let png_data = if format == IconFormat::Png {
                data.to_vec()
            } else {
                // Convert JPEG to PNG
                image_to_png(&img)?
            };
            Ok(IconData {
                ico_data,
                png_data,
                original_format: format,
            })
        }
    }
}

/// Load image from bytes
fn load_image(data: &[u8], format: IconFormat) -> SetupResult<DynamicImage> {
    let img_format = match format {
        IconFormat::Png => ImageFormat::Png,
        IconFormat::Jpeg => ImageFormat::Jpeg,
        IconFormat::Ico => ImageFormat::Ico,
    };

    image::load_from_memory_with_format(data, img_format)
        .map_err(|e| SetupError::Icon(format!("Failed to load image: {}", e)))
}

/// Create multi-resolution ICO from image
fn create_multi_resolution_ico(img: &DynamicImage) -> SetupResult<Vec<u8>> {
    let mut icon_dir = ico::IconDir::new(ico::ResourceType::Icon);

    for &size in ICO_SIZES {
        // Resize image to target size
        let resized = img.resize_exact(size, size, image::imageops::FilterType::Lanczos3);

        // Convert to RGBA
        let rgba = resized.to_rgba8();
        let (width, height) = rgba.dimensions();

        // Create ICO image entry
        let ico_image = ico::IconImage::from_rgba_data(width, height, rgba.into_raw());

        icon_dir.add_entry(ico::IconDirEntry::encode(&ico_image).map_err(|e| {
            SetupError::Icon(format!(
                "Failed to encode ICO entry for size {}: {}",
                size, e
            ))
        })?);
    }

    // Write ICO to buffer
    let mut buffer = Vec::new();
    icon_dir
        .write(&mut buffer)
        .map_err(|e| SetupError::Icon(format!("Failed to write ICO: {}", e)))?;

    tracing::debug!(
        "Created multi-resolution ICO with sizes: {:?} ({} bytes)",
        ICO_SIZES,
        buffer.len()
    );

    Ok(buffer)
}

/// Extract PNG data from ICO file (uses largest image)
fn extract_png_from_ico(data: &[u8]) -> SetupResult<Vec<u8>> {
    let cursor = Cursor::new(data);
    let icon_dir = ico::IconDir::read(cursor)
        .map_err(|e| SetupError::Icon(format!("Failed to read ICO: {}", e)))?;

    // Find entry with largest dimensions
    let entries = icon_dir.entries();
    let best_entry = entries
        .iter()
        .max_by_key(|e| e.width() * e.height())
        .ok_or_else(|| SetupError::Icon("ICO file has no entries".to_string()))?;

    // Decode the entry
    let ico_image = best_entry
        .decode()
        .map_err(|e| SetupError::Icon(format!("Failed to decode ICO entry: {}", e)))?;

    // Convert to PNG
    let width = ico_image.width();
    let height = ico_image.height();
    let rgba_data = ico_image.rgba_data();

    let img = image::RgbaImage::from_raw(width, height, rgba_data.to_vec())
        .ok_or_else(|| SetupError::Icon("Failed to create image from ICO data".to_string()))?;

    let mut png_buffer = Vec::new();
    let mut cursor = Cursor::new(&mut png_buffer);
    img.write_to(&mut cursor, ImageFormat::Png)
        .map_err(|e| SetupError::Icon(format!("Failed to encode PNG: {}", e)))?;

    tracing::debug!(
        "Extracted {}x{} PNG from ICO ({} bytes)",
        width,
        height,
        png_buffer.len()
    );

    Ok(png_buffer)
}

/// Convert DynamicImage to PNG bytes
fn image_to_png(img: &DynamicImage) -> SetupResult<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut cursor = Cursor::new(&mut buffer);
    img.write_to(&mut cursor, ImageFormat::Png)
        .map_err(|e| SetupError::Icon(format!("Failed to encode PNG: {}", e)))?;
    Ok(buffer)
}
