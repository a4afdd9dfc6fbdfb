//! HTTP request handlers for the tile API.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /slides` - List available slides
//! - `GET /slides/{slide_id}` - Slide metadata
//! - `GET /tiles/{slide_id}/{layer}/{col}/{row}.jpg` - Serve a tile

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{ContainerError, IoError, TileError};
use crate::region::MAX_LAYER;
use crate::slide::SlideSource;
use crate::tile::{TileRequest, TileService};

/// Response header reporting whether a tile came from the cache.
pub const CACHE_HIT_HEADER: HeaderName = HeaderName::from_static("x-tile-cache-hit");

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the tile service.
pub struct AppState<S: SlideSource> {
    pub tile_service: Arc<TileService<S>>,

    /// Cache-Control max-age for tiles, in seconds
    pub cache_max_age: u32,
}

impl<S: SlideSource> AppState<S> {
    /// Create a new application state with a one hour cache max-age.
    pub fn new(tile_service: TileService<S>) -> Self {
        Self::with_cache_max_age(tile_service, 3600)
    }

    pub fn with_cache_max_age(tile_service: TileService<S>, cache_max_age: u32) -> Self {
        Self {
            tile_service: Arc::new(tile_service),
            cache_max_age,
        }
    }
}

impl<S: SlideSource> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            tile_service: Arc::clone(&self.tile_service),
            cache_max_age: self.cache_max_age,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Path parameters for tile requests.
///
/// Extracted from `/tiles/{slide_id}/{layer}/{col}/{filename}` where
/// filename is `{row}` or `{row}.jpg`.
#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    pub slide_id: String,
    pub layer: u32,
    pub col: u32,
    pub filename: String,
}

impl TilePathParams {
    /// Parse the row from the filename, stripping any .jpg extension.
    pub fn row(&self) -> Result<u32, std::num::ParseIntError> {
        let row = self.filename.strip_suffix(".jpg").unwrap_or(&self.filename);
        row.parse()
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_layer")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SlidesResponse {
    pub slides: Vec<String>,
}

/// Metadata for a single layer, in units of served tiles.
#[derive(Debug, Serialize, Deserialize)]
pub struct LayerMetadataResponse {
    pub layer: u32,
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,
    /// Downsample factor relative to layer 0
    pub downsample: f64,
}

/// Response from the slide metadata endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct SlideMetadataResponse {
    pub slide_id: String,

    /// Full-resolution width derived from the tile directory
    pub width: u32,
    pub height: u32,

    /// Microns per pixel at full resolution
    pub mpp: f32,

    /// Stored scanner tile size
    pub source_tile_width: u32,
    pub source_tile_height: u32,
    pub overlap: u32,
    pub z_stacks: i8,
    pub tile_count: usize,

    pub layer_count: usize,
    pub layers: Vec<LayerMetadataResponse>,
}

// =============================================================================
// Error Mapping
// =============================================================================

fn io_status(io_err: &IoError) -> (StatusCode, &'static str) {
    match io_err {
        IoError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        IoError::File(_) | IoError::RangeOutOfBounds { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "io_error")
        }
    }
}

fn error_response(status: StatusCode, error_type: &str, message: String) -> Response {
    if status.is_server_error() {
        error!(error_type, status = status.as_u16(), "Server error: {}", message);
    } else if status == StatusCode::NOT_FOUND {
        debug!(error_type, status = status.as_u16(), "Resource not found: {}", message);
    } else {
        warn!(error_type, status = status.as_u16(), "Client error: {}", message);
    }

    let body = ErrorResponse::with_status(error_type, message, status);
    (status, Json(body)).into_response()
}

/// Convert TileError to HTTP response.
///
/// 4xx errors are logged at WARN (404 at DEBUG), 5xx errors at ERROR.
impl IntoResponse for TileError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            TileError::SlideNotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            TileError::InvalidLayer { .. } => (StatusCode::BAD_REQUEST, "invalid_layer"),
            TileError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "invalid_argument"),
            TileError::Container(ContainerError::Io(io_err)) | TileError::Io(io_err) => {
                io_status(io_err)
            }
            TileError::Container(ContainerError::Task(_)) | TileError::Task(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
            TileError::Container(_) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_format"),
            TileError::EncodeError { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "encode_error"),
        };

        error_response(status, error_type, self.to_string())
    }
}

/// Wrapper for slide listing errors.
pub struct SlidesError(pub IoError);

impl IntoResponse for SlidesError {
    fn into_response(self) -> Response {
        let (status, error_type) = io_status(&self.0);
        error_response(status, error_type, self.0.to_string())
    }
}

impl From<IoError> for SlidesError {
    fn from(err: IoError) -> Self {
        SlidesError(err)
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle tile requests.
///
/// `GET /tiles/{slide_id}/{layer}/{col}/{row}.jpg`
///
/// # Response
///
/// - `200 OK`: JPEG tile with `Cache-Control` and `X-Tile-Cache-Hit` headers
/// - `400 Bad Request`: Invalid layer or row
/// - `404 Not Found`: Slide not found
/// - `415 Unsupported Media Type`: File is not a readable container
/// - `500 Internal Server Error`: Processing error
pub async fn tile_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
    Path(params): Path<TilePathParams>,
) -> Result<Response, TileError> {
    let row = params.row().map_err(|_| {
        TileError::InvalidArgument(format!("invalid tile row: {}", params.filename))
    })?;

    let request = TileRequest::new(&params.slide_id, params.layer, row, params.col);
    let response = state.tile_service.get_tile(request).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/jpeg".to_string()),
            (
                header::CACHE_CONTROL,
                format!("public, max-age={}", state.cache_max_age),
            ),
            (CACHE_HIT_HEADER, response.cache_hit.to_string()),
        ],
        response.data,
    )
        .into_response())
}

/// Handle health check requests.
///
/// `GET /health` returns `{"status": "healthy", "version": "..."}`.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle slide listing requests.
///
/// `GET /slides` returns `{"slides": ["a.dpt", "nested/b.dpt"]}`.
pub async fn slides_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
) -> Result<Json<SlidesResponse>, SlidesError> {
    let slides = state.tile_service.registry().source().list_slides().await?;
    Ok(Json(SlidesResponse { slides }))
}

/// Handle slide metadata requests.
///
/// `GET /slides/{slide_id}`
///
/// Layer sizes and tile counts are reported for the server's output tile size.
pub async fn slide_metadata_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
    Path(slide_id): Path<String>,
) -> Result<Json<SlideMetadataResponse>, TileError> {
    let slide = state.tile_service.registry().get_slide(&slide_id).await?;
    let tile_size = state.tile_service.tile_size();

    let layers: Vec<LayerMetadataResponse> = (0..=MAX_LAYER)
        .filter_map(|layer| {
            slide
                .layer_info(layer, tile_size)
                .map(|info| LayerMetadataResponse {
                    layer,
                    width: info.width,
                    height: info.height,
                    tile_width: info.tile_width,
                    tile_height: info.tile_height,
                    tiles_x: info.tiles_x,
                    tiles_y: info.tiles_y,
                    downsample: info.downsample,
                })
        })
        .collect();

    let index = slide.index();
    let (width, height) = slide.dimensions();
    let (source_tile_width, source_tile_height) = index.tile_size();

    Ok(Json(SlideMetadataResponse {
        slide_id,
        width,
        height,
        mpp: index.mpp(),
        source_tile_width,
        source_tile_height,
        overlap: index.overlap(),
        z_stacks: index.z_stacks(),
        tile_count: index.tile_count(),
        layer_count: layers.len(),
        layers,
    }))
}
