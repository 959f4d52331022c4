//! Resize parameters, request keys, and result geometry.

mod geometry;
mod types;

pub use geometry::{check_result_size, result_dimensions, scale_second_component};
pub use types::{
    Blob, ImageFormat, ParamsError, ResizeParams, ResizeRequestKey, TransformError, MAX_SIDE,
    TOTAL_PIXEL_LIMIT,
};
