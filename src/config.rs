//! Configuration management.
//!
//! Settings come from command-line arguments or from environment variables
//! with the `DPT_` prefix, with defaults for everything except the slides
//! directory.
//!
//! # Environment Variables
//!
//! - `DPT_HOST` - Server bind address (default: 0.0.0.0)
//! - `DPT_PORT` - Server port (default: 3000)
//! - `DPT_SLIDES_DIR` - Directory holding `*.dpt` slides (required)
//! - `DPT_CACHE_SLIDES` - Max open slides to keep (default: 100)
//! - `DPT_CACHE_TILES` - Tile cache size in bytes (default: 100MB)
//! - `DPT_CACHE_TILE_ENTRIES` - Max cached tiles (default: 10000)
//! - `DPT_TILE_SIZE` - Output tile edge in pixels (default: 512)
//! - `DPT_JPEG_QUALITY` - JPEG quality (default: 80)
//! - `DPT_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)
//! - `DPT_CORS_ORIGINS` - Comma-separated allowed origins (default: any)

use std::path::PathBuf;

use clap::Parser;

use crate::tile::{
    TileServiceOptions, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_ENTRIES, DEFAULT_TILE_CACHE_CAPACITY,
    DEFAULT_TILE_SIZE,
};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default number of open slides to keep.
pub const DEFAULT_SLIDE_CACHE_CAPACITY: usize = 100;

/// Default HTTP cache max-age in seconds (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

/// Largest accepted output tile edge.
pub const MAX_TILE_SIZE: u32 = 4096;

// =============================================================================
// CLI Arguments
// =============================================================================

/// DPT Streamer - serves seamless tiles from DPTWSI whole-slide containers.
#[derive(Parser, Debug, Clone)]
#[command(name = "dpt-streamer")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "DPT_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "DPT_PORT")]
    pub port: u16,

    /// Directory containing the `*.dpt` slide files.
    #[arg(long, env = "DPT_SLIDES_DIR")]
    pub slides_dir: PathBuf,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Maximum number of open slides to keep.
    #[arg(long, default_value_t = DEFAULT_SLIDE_CACHE_CAPACITY, env = "DPT_CACHE_SLIDES")]
    pub cache_slides: usize,

    /// Tile cache capacity in bytes.
    #[arg(long, default_value_t = DEFAULT_TILE_CACHE_CAPACITY, env = "DPT_CACHE_TILES")]
    pub cache_tiles: usize,

    /// Maximum number of cached tiles.
    #[arg(long, default_value_t = DEFAULT_MAX_ENTRIES, env = "DPT_CACHE_TILE_ENTRIES")]
    pub cache_tile_entries: usize,

    // =========================================================================
    // Tile Configuration
    // =========================================================================
    /// Output tile edge length in pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "DPT_TILE_SIZE")]
    pub tile_size: u32,

    /// JPEG quality for tile encoding (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "DPT_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "DPT_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "DPT_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.slides_dir.as_os_str().is_empty() {
            return Err(
                "Slides directory is required. Set --slides-dir or DPT_SLIDES_DIR".to_string(),
            );
        }

        if self.cache_slides == 0 {
            return Err("cache_slides must be greater than 0".to_string());
        }
        if self.cache_tiles == 0 {
            return Err("cache_tiles must be greater than 0".to_string());
        }
        if self.cache_tile_entries == 0 {
            return Err("cache_tile_entries must be greater than 0".to_string());
        }

        if self.tile_size == 0 || self.tile_size > MAX_TILE_SIZE {
            return Err(format!("tile_size must be between 1 and {}", MAX_TILE_SIZE));
        }

        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Tile service settings derived from this configuration.
    pub fn tile_service_options(&self) -> TileServiceOptions {
        TileServiceOptions {
            tile_size: self.tile_size,
            jpeg_quality: self.jpeg_quality,
            cache_capacity: self.cache_tiles,
            cache_max_entries: self.cache_tile_entries,
            ..TileServiceOptions::default()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
