//! Core types for resize operations.

use bytes::Bytes;
use std::fmt;
use std::time::SystemTime;
use thiserror::Error;

/// Largest value accepted for any resize dimension parameter.
pub const MAX_SIDE: u32 = 5000;

/// Upper bound on `width * height` of a transformation result.
pub const TOTAL_PIXEL_LIMIT: u64 = 25_000_000;

/// Image formats supported by shrimp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageFormat {
    /// Parse a format from a file extension or a `target-format` query
    /// parameter, case-insensitively.
    ///
    /// Returns `None` for anything other than `jpg|jpeg|png|gif|webp`.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            "gif" => Some(ImageFormat::Gif),
            "webp" => Some(ImageFormat::Webp),
            _ => None,
        }
    }

    /// Value for the `Content-Type` header.
    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Webp => "image/webp",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
        };
        f.write_str(name)
    }
}

/// Resize operation parameters.
///
/// Exactly one dimension constraint may be given. If only the width is
/// set the image is scaled to that width, keeping the aspect ratio. The
/// same logic applies to the height. `ByLongestSide` scales the image so
/// that its longest side has the given length. With no constraint the
/// image is re-encoded at its original size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResizeParams {
    ByWidth(u32),
    ByHeight(u32),
    ByLongestSide(u32),
    KeepOriginal,
}

impl ResizeParams {
    /// Build resize parameters from optional query-string values.
    ///
    /// All values absent means `KeepOriginal`. More than one value set,
    /// a zero, or a value above [`MAX_SIDE`] is rejected.
    pub fn from_options(
        width: Option<u32>,
        height: Option<u32>,
        max_side: Option<u32>,
    ) -> Result<Self, ParamsError> {
        let count = [width, height, max_side].iter().flatten().count();
        if count == 0 {
            return Ok(ResizeParams::KeepOriginal);
        }
        if count != 1 {
            return Err(ParamsError::MoreThanOneDimension);
        }

        let (name, value, make): (_, _, fn(u32) -> ResizeParams) = if let Some(w) = width {
            ("width", w, ResizeParams::ByWidth)
        } else if let Some(h) = height {
            ("height", h, ResizeParams::ByHeight)
        } else {
            ("max", max_side.unwrap_or_default(), ResizeParams::ByLongestSide)
        };

        if value == 0 {
            return Err(ParamsError::Zero { name });
        }
        if value > MAX_SIDE {
            return Err(ParamsError::TooBig {
                name,
                value,
                max: MAX_SIDE,
            });
        }

        Ok(make(value))
    }
}

impl fmt::Display for ResizeParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResizeParams::ByWidth(w) => write!(f, "width={w}"),
            ResizeParams::ByHeight(h) => write!(f, "height={h}"),
            ResizeParams::ByLongestSide(m) => write!(f, "max={m}"),
            ResizeParams::KeepOriginal => f.write_str("original"),
        }
    }
}

/// Errors from validating resize parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamsError {
    #[error("exactly one of width/height/max may be given")]
    MoreThanOneDimension,

    #[error("{name} cannot be 0")]
    Zero { name: &'static str },

    #[error("{name} ({value}) is too big, max possible value is {max}")]
    TooBig {
        name: &'static str,
        value: u32,
        max: u32,
    },
}

/// The compound key identifying a transformation output.
///
/// Two requests with equal keys produce byte-identical results, which is
/// what makes coalescing and content-addressed caching sound.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResizeRequestKey {
    path: String,
    format: ImageFormat,
    params: ResizeParams,
}

impl ResizeRequestKey {
    pub fn new(path: impl Into<String>, format: ImageFormat, params: ResizeParams) -> Self {
        Self {
            path: path.into(),
            format,
            params,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn params(&self) -> ResizeParams {
        self.params
    }
}

impl fmt::Display for ResizeRequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{} {} {}}}", self.path, self.format, self.params)
    }
}

/// An encoded image held in memory.
///
/// The payload is reference-counted, so cloning a blob and sharing it
/// across many concurrent responses does not copy the bytes. The creation
/// timestamp becomes the `Last-Modified` header value.
#[derive(Debug, Clone)]
pub struct Blob {
    data: Bytes,
    created_at: SystemTime,
}

impl Blob {
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            created_at: SystemTime::now(),
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }
}

/// Errors raised while performing a transformation.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("cannot read image: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot decode image: {0}")]
    Decode(image::ImageError),

    #[error("exceeding total pixel limit: ({width},{height}) ~ {pixels} pixels (limit: {limit})")]
    PixelLimitExceeded {
        width: u32,
        height: u32,
        pixels: u64,
        limit: u64,
    },

    #[error("cannot encode image: {0}")]
    Encode(image::ImageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_extension_is_case_insensitive() {
        assert_eq!(ImageFormat::from_extension("JPG"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_extension("jpeg"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_extension("Png"), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::from_extension("gif"), Some(ImageFormat::Gif));
        assert_eq!(ImageFormat::from_extension("WEBP"), Some(ImageFormat::Webp));
    }

    #[test]
    fn format_from_extension_rejects_unknown() {
        assert_eq!(ImageFormat::from_extension("bmp"), None);
        assert_eq!(ImageFormat::from_extension(""), None);
        assert_eq!(ImageFormat::from_extension("jpg "), None);
    }

    #[test]
    fn params_all_absent_keeps_original() {
        let params = ResizeParams::from_options(None, None, None).unwrap();
        assert_eq!(params, ResizeParams::KeepOriginal);
    }

    #[test]
    fn params_single_dimension_accepted() {
        assert_eq!(
            ResizeParams::from_options(Some(200), None, None).unwrap(),
            ResizeParams::ByWidth(200)
        );
        assert_eq!(
            ResizeParams::from_options(None, Some(300), None).unwrap(),
            ResizeParams::ByHeight(300)
        );
        assert_eq!(
            ResizeParams::from_options(None, None, Some(400)).unwrap(),
            ResizeParams::ByLongestSide(400)
        );
    }

    #[test]
    fn params_two_dimensions_rejected() {
        let err = ResizeParams::from_options(Some(200), Some(300), None).unwrap_err();
        assert_eq!(err, ParamsError::MoreThanOneDimension);
    }

    #[test]
    fn params_zero_rejected() {
        let err = ResizeParams::from_options(Some(0), None, None).unwrap_err();
        assert_eq!(err, ParamsError::Zero { name: "width" });
    }

    #[test]
    fn params_above_max_side_rejected() {
        let err = ResizeParams::from_options(None, Some(MAX_SIDE + 1), None).unwrap_err();
        assert_eq!(
            err,
            ParamsError::TooBig {
                name: "height",
                value: MAX_SIDE + 1,
                max: MAX_SIDE,
            }
        );
    }

    #[test]
    fn params_boundary_values_accepted() {
        assert!(ResizeParams::from_options(Some(1), None, None).is_ok());
        assert!(ResizeParams::from_options(None, None, Some(MAX_SIDE)).is_ok());
    }

    #[test]
    fn request_key_equality_is_structural() {
        let a = ResizeRequestKey::new("/a.png", ImageFormat::Png, ResizeParams::ByWidth(200));
        let b = ResizeRequestKey::new("/a.png", ImageFormat::Png, ResizeParams::ByWidth(200));
        let c = ResizeRequestKey::new("/a.png", ImageFormat::Png, ResizeParams::ByWidth(201));
        let d = ResizeRequestKey::new("/a.png", ImageFormat::Jpeg, ResizeParams::ByWidth(200));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn blob_shares_bytes_between_clones() {
        let blob = Blob::new(Bytes::from(vec![1u8, 2, 3]));
        let copy = blob.clone();

        assert_eq!(blob.len(), 3);
        assert_eq!(copy.data(), blob.data());
        assert_eq!(copy.created_at(), blob.created_at());
    }
}
