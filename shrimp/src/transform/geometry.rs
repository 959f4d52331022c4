//! Result geometry for resize operations.

use super::types::{ResizeParams, TransformError, TOTAL_PIXEL_LIMIT};

/// Scale `other_source_len` by the same ratio as `dest_len / source_len`,
/// never returning less than 1.
pub fn scale_second_component(source_len: u32, dest_len: u32, other_source_len: u32) -> u32 {
    let scale = f64::from(dest_len) / f64::from(source_len);
    let scaled = (f64::from(other_source_len) * scale).round() as u32;
    scaled.max(1)
}

/// Compute the dimensions of the transformation result.
///
/// The fixed side comes straight from the parameters; the other side is
/// scaled to preserve the aspect ratio. `KeepOriginal` returns the source
/// dimensions unchanged.
pub fn result_dimensions(src_w: u32, src_h: u32, params: ResizeParams) -> (u32, u32) {
    match params {
        ResizeParams::ByWidth(w) => (w, scale_second_component(src_w, w, src_h)),
        ResizeParams::ByHeight(h) => (scale_second_component(src_h, h, src_w), h),
        ResizeParams::ByLongestSide(m) => {
            if src_w > src_h {
                (m, scale_second_component(src_w, m, src_h))
            } else {
                (scale_second_component(src_h, m, src_w), m)
            }
        }
        ResizeParams::KeepOriginal => (src_w, src_h),
    }
}

/// Reject result sizes whose pixel count exceeds [`TOTAL_PIXEL_LIMIT`].
pub fn check_result_size(width: u32, height: u32) -> Result<(), TransformError> {
    let pixels = u64::from(width) * u64::from(height);
    if pixels > TOTAL_PIXEL_LIMIT {
        return Err(TransformError::PixelLimitExceeded {
            width,
            height,
            pixels,
            limit: TOTAL_PIXEL_LIMIT,
        });
    }
    Ok(())
}
