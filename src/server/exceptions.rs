//! Error responses.
//!
//! Every [`TileError`] maps to one HTTP status. The plain endpoints answer
//! with a JSON body; the OGC-style endpoints wrap the same information in
//! the XML document their protocol defines:
//!
//! - TMS: `TileMapServerError`
//! - WMTS: OWS `ExceptionReport`
//! - WMS: `ServiceExceptionReport`

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::error::{IoError, TiffError, TileError};

// =============================================================================
// Error Classification
// =============================================================================

/// Status, machine-readable kind and message of an error.
#[derive(Debug, Clone)]
pub struct ErrorDetails {
    pub status: StatusCode,
    /// Short snake_case kind used in JSON bodies
    pub kind: &'static str,
    /// OGC exception code used in XML documents
    pub ogc_code: &'static str,
    pub message: String,
}

impl ErrorDetails {
    pub fn new(
        status: StatusCode,
        kind: &'static str,
        ogc_code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            kind,
            ogc_code,
            message: message.into(),
        }
    }

    /// The requested tile does not exist.
    pub fn tile_not_found() -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "not_found",
            "TileOutOfRange",
            "Tile not found",
        )
    }

    /// Log at a level matching the severity.
    fn log(&self) {
        if self.status.is_server_error() {
            error!(
                error_type = self.kind,
                status = self.status.as_u16(),
                "Server error: {}",
                self.message
            );
        } else if self.status == StatusCode::NOT_FOUND || self.kind == "cancelled" {
            debug!(
                error_type = self.kind,
                status = self.status.as_u16(),
                "Request ended: {}",
                self.message
            );
        } else {
            warn!(
                error_type = self.kind,
                status = self.status.as_u16(),
                "Client error: {}",
                self.message
            );
        }
    }
}

fn io_details(err: &IoError) -> ErrorDetails {
    match err {
        IoError::NotFound(path) => ErrorDetails::new(
            StatusCode::NOT_FOUND,
            "not_found",
            "NotFound",
            format!("Resource not found: {}", path),
        ),
        _ => ErrorDetails::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "io_error",
            "NoApplicableCode",
            format!("I/O error: {}", err),
        ),
    }
}

impl From<&TileError> for ErrorDetails {
    fn from(err: &TileError) -> Self {
        match err {
            TileError::SourceNotFound { id } => ErrorDetails::new(
                StatusCode::NOT_FOUND,
                "not_found",
                "LayerNotDefined",
                format!("Layer not found: {}", id),
            ),

            TileError::InvalidRequest { message } => ErrorDetails::new(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                "InvalidParameterValue",
                message.clone(),
            ),

            TileError::UnsupportedFormat { message } => ErrorDetails::new(
                StatusCode::BAD_REQUEST,
                "unsupported_format",
                "InvalidFormat",
                message.clone(),
            ),

            TileError::Upstream { message } => ErrorDetails::new(
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                "NoApplicableCode",
                message.clone(),
            ),

            TileError::Io(io_err) => io_details(io_err),
            TileError::Raster(TiffError::Io(io_err)) => io_details(io_err),

            TileError::Raster(tiff_err) => ErrorDetails::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "raster_error",
                "NoApplicableCode",
                tiff_err.to_string(),
            ),

            TileError::Store(store_err) => ErrorDetails::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "store_error",
                "NoApplicableCode",
                store_err.to_string(),
            ),

            TileError::Database { message } => ErrorDetails::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "database_error",
                "NoApplicableCode",
                message.clone(),
            ),

            TileError::DecodeError { message } => ErrorDetails::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "decode_error",
                "NoApplicableCode",
                format!("Failed to decode tile: {}", message),
            ),

            TileError::EncodeError { message } => ErrorDetails::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "encode_error",
                "NoApplicableCode",
                format!("Failed to encode image: {}", message),
            ),

            TileError::Cancelled => ErrorDetails::new(
                StatusCode::REQUEST_TIMEOUT,
                "cancelled",
                "NoApplicableCode",
                "Request cancelled",
            ),
        }
    }
}

// =============================================================================
// JSON Errors
// =============================================================================

/// JSON error body of the plain endpoints.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl From<ErrorDetails> for ErrorResponse {
    fn from(details: ErrorDetails) -> Self {
        Self {
            error: details.kind.to_string(),
            message: details.message,
            status: Some(details.status.as_u16()),
        }
    }
}

impl IntoResponse for ErrorDetails {
    fn into_response(self) -> Response {
        self.log();
        let status = self.status;
        (status, Json(ErrorResponse::from(self))).into_response()
    }
}

impl IntoResponse for TileError {
    fn into_response(self) -> Response {
        ErrorDetails::from(&self).into_response()
    }
}

// =============================================================================
// Protocol Errors
// =============================================================================

/// OGC-style protocol whose error document to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tms,
    Wmts,
    Wms,
}

/// An error answered with the XML document of its protocol.
#[derive(Debug)]
pub struct ProtocolError {
    pub protocol: Protocol,
    pub details: ErrorDetails,
    /// Offending parameter, reported by WMTS as `locator`
    pub locator: Option<&'static str>,
}

impl ProtocolError {
    pub fn new(protocol: Protocol, err: TileError) -> Self {
        Self {
            protocol,
            details: ErrorDetails::from(&err),
            locator: None,
        }
    }

    /// A missing or malformed request parameter.
    pub fn parameter(protocol: Protocol, name: &'static str, message: impl Into<String>) -> Self {
        Self {
            protocol,
            details: ErrorDetails::new(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                "InvalidParameterValue",
                message,
            ),
            locator: Some(name),
        }
    }

    /// A parameter the request must carry.
    pub fn missing(protocol: Protocol, name: &'static str) -> Self {
        let mut err = Self::parameter(protocol, name, format!("Missing parameter {}", name));
        err.details.ogc_code = "MissingParameterValue";
        err
    }

    /// An operation this server does not implement.
    pub fn unsupported_operation(protocol: Protocol, request: &str) -> Self {
        Self {
            protocol,
            details: ErrorDetails::new(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                "OperationNotSupported",
                format!("Unsupported request '{}'", request),
            ),
            locator: Some("REQUEST"),
        }
    }

    /// The requested tile does not exist.
    pub fn tile_not_found(protocol: Protocol) -> Self {
        Self {
            protocol,
            details: ErrorDetails::tile_not_found(),
            locator: None,
        }
    }

    fn document(&self) -> String {
        let message = escape_xml(&self.details.message);
        let code = self.details.ogc_code;
        match self.protocol {
            Protocol::Tms => format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
                 <TileMapServerError>\n  <Message>{}</Message>\n</TileMapServerError>\n",
                message
            ),
            Protocol::Wmts => {
                let locator = self
                    .locator
                    .map(|l| format!(" locator=\"{}\"", l))
                    .unwrap_or_default();
                format!(
                    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
                     <ExceptionReport xmlns=\"http://www.opengis.net/ows/1.1\" version=\"1.0.0\">\n  \
                     <Exception exceptionCode=\"{}\"{}>\n    \
                     <ExceptionText>{}</ExceptionText>\n  \
                     </Exception>\n</ExceptionReport>\n",
                    code, locator, message
                )
            }
            Protocol::Wms => format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
                 <ServiceExceptionReport version=\"1.1.1\">\n  \
                 <ServiceException code=\"{}\">{}</ServiceException>\n\
                 </ServiceExceptionReport>\n",
                code, message
            ),
        }
    }

    fn content_type(&self) -> &'static str {
        match self.protocol {
            Protocol::Wms => "application/vnd.ogc.se_xml",
            Protocol::Tms | Protocol::Wmts => "application/xml",
        }
    }
}

impl IntoResponse for ProtocolError {
    fn into_response(self) -> Response {
        self.details.log();
        (
            self.details.status,
            [(header::CONTENT_TYPE, self.content_type())],
            self.document(),
        )
            .into_response()
    }
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
