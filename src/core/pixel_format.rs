//! Decoder pixel format to canonical image layout mapping.

use std::fmt;
use std::str::FromStr;

/// Pixel format reported by the decoder for a frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DecoderPixelFormat {
    Gray8,
    Rgb24,
    Bgr24,
    Rgba,
    Argb,
    Bgra,
    I420,
    Nv12,
    /// Anything the decoder reports that has no named variant
    Other(String),
}

/// Canonical in-memory pixel arrangement handed to the recognition engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Gray8U,
    Rgb8U,
    Rgba8U,
    Argb8U,
    Unknown,
}

impl DecoderPixelFormat {
    /// Maps the decoder format onto the canonical layout.
    ///
    /// Never fails: formats without a canonical layout map to
    /// [`ImageLayout::Unknown`] and are still forwarded to the engine.
    pub fn layout(&self) -> ImageLayout {
        match self {
            Self::Gray8 => ImageLayout::Gray8U,
            Self::Rgb24 | Self::Bgr24 => ImageLayout::Rgb8U,
            Self::Rgba => ImageLayout::Rgba8U,
            Self::Argb => ImageLayout::Argb8U,
            Self::Bgra | Self::I420 | Self::Nv12 | Self::Other(_) => ImageLayout::Unknown,
        }
    }

    /// Bytes per pixel for packed formats, `None` for planar or unknown ones.
    pub fn bytes_per_pixel(&self) -> Option<usize> {
        match self {
            Self::Gray8 => Some(1),
            Self::Rgb24 | Self::Bgr24 => Some(3),
            Self::Rgba | Self::Argb | Self::Bgra => Some(4),
            Self::I420 | Self::Nv12 | Self::Other(_) => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Gray8 => "gray8",
            Self::Rgb24 => "rgb24",
            Self::Bgr24 => "bgr24",
            Self::Rgba => "rgba",
            Self::Argb => "argb",
            Self::Bgra => "bgra",
            Self::I420 => "i420",
            Self::Nv12 => "nv12",
            Self::Other(name) => name,
        }
    }
}

/// Free-function form of [`DecoderPixelFormat::layout`].
pub fn map_pixel_format(format: &DecoderPixelFormat) -> ImageLayout {
    format.layout()
}

impl fmt::Display for DecoderPixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DecoderPixelFormat {
    type Err = std::convert::Infallible;

    /// Parses decoder format names. Accepts both the short names used here and
    /// the GStreamer caps names (`GRAY8`, `RGB`, `BGR`, `RGBA`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let format = match s.to_ascii_lowercase().as_str() {
            "gray8" | "gray" => Self::Gray8,
            "rgb24" | "rgb" => Self::Rgb24,
            "bgr24" | "bgr" => Self::Bgr24,
            "rgba" => Self::Rgba,
            "argb" => Self::Argb,
            "bgra" => Self::Bgra,
            "i420" => Self::I420,
            "nv12" => Self::Nv12,
            _ => Self::Other(s.to_string()),
        };
        Ok(format)
    }
}
