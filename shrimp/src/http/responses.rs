//! Response construction shared by the HTTP handlers.

use crate::manager::ProcessingTiming;
use crate::transform::ImageFormat;
use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{header, HeaderValue, StatusCode};
use std::time::{Duration, SystemTime};

/// Value of the `Server` header.
pub const SERVER_NAME: &str = "shrimp";

const EXPOSED_HEADERS: &str = "Shrimp-Processing-Time, Shrimp-Image-Src";

const IMAGE_SRC_HEADER: &str = "Shrimp-Image-Src";
const PROCESSING_TIME_HEADER: &str = "Shrimp-Processing-Time";
const RESIZE_TIME_HEADER: &str = "Shrimp-Resize-Time";
const ENCODING_TIME_HEADER: &str = "Shrimp-Encoding-Time";

/// Where a served image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    Cache,
    Transform,
    Sendfile,
}

impl ImageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSource::Cache => "cache",
            ImageSource::Transform => "transform",
            ImageSource::Sendfile => "sendfile",
        }
    }
}

/// Processing-time header contents for an image response.
#[derive(Debug)]
pub(crate) enum ImageTiming {
    /// No timing headers (files served straight from disk).
    None,
    /// `Shrimp-Processing-Time: 0` (cache hits).
    Zero,
    /// Full timing breakdown (fresh transformations).
    Measured(ProcessingTiming),
}

pub(crate) struct ImageResponseParts {
    pub format: ImageFormat,
    pub source: ImageSource,
    pub last_modified: SystemTime,
    pub timing: ImageTiming,
    pub body: Bytes,
}

/// Format a `SystemTime` as an RFC 1123 HTTP date.
pub(crate) fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Milliseconds with fractional precision from a microsecond measurement.
fn millis_with_fraction(duration: Duration) -> String {
    format!("{}", duration.as_micros() as f64 / 1000.0)
}

/// A 200 carrying encoded image bytes and the shrimp header set.
pub(crate) fn image_response(parts: ImageResponseParts) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::SERVER, SERVER_NAME)
        .header(header::DATE, http_date(SystemTime::now()))
        .header(header::CONTENT_TYPE, parts.format.content_type())
        .header(header::LAST_MODIFIED, http_date(parts.last_modified))
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(header::ACCESS_CONTROL_EXPOSE_HEADERS, EXPOSED_HEADERS)
        .header(IMAGE_SRC_HEADER, parts.source.as_str());

    match parts.timing {
        ImageTiming::None => {}
        ImageTiming::Zero => {
            builder = builder.header(PROCESSING_TIME_HEADER, "0");
        }
        ImageTiming::Measured(timing) => {
            builder = builder
                .header(PROCESSING_TIME_HEADER, millis_with_fraction(timing.total()))
                .header(RESIZE_TIME_HEADER, millis_with_fraction(timing.resize))
                .header(ENCODING_TIME_HEADER, millis_with_fraction(timing.encoding));
        }
    }

    finish(builder, Body::from(parts.body))
}

/// An empty response that keeps the connection open.
pub(crate) fn status_response(status: StatusCode) -> Response {
    let builder = Response::builder()
        .status(status)
        .header(header::SERVER, SERVER_NAME)
        .header(header::DATE, http_date(SystemTime::now()));
    finish(builder, Body::empty())
}

/// An empty response that closes the connection (overload and timeout).
pub(crate) fn closing_response(status: StatusCode) -> Response {
    let builder = Response::builder()
        .status(status)
        .header(header::SERVER, SERVER_NAME)
        .header(header::DATE, http_date(SystemTime::now()))
        .header(header::CONNECTION, "close");
    finish(builder, Body::empty())
}

/// A plain-text response.
pub(crate) fn text_response(status: StatusCode, body: &str) -> Response {
    let builder = Response::builder()
        .status(status)
        .header(header::SERVER, SERVER_NAME)
        .header(header::DATE, http_date(SystemTime::now()))
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8");
    finish(builder, Body::from(body.to_string()))
}

fn finish(builder: http::response::Builder, body: Body) -> Response {
    // All header values above are either static or ASCII-formatted; the
    // builder cannot fail on them.
    builder.body(body).unwrap_or_else(|_| {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
            .headers_mut()
            .insert(header::SERVER, HeaderValue::from_static(SERVER_NAME));
        response
    })
}
