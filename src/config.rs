//! Configuration management for pmtiles-edge.
//!
//! This module provides a flexible configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `TILES_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Example
//!
//! ```ignore
//! use pmtiles_edge::config::{Cli, Command};
//!
//! // Parse from command line and environment
//! let cli = Cli::parse();
//!
//! match cli.into_command() {
//!     Command::Serve(config) => println!("Listening on {}", config.bind_address()),
//!     Command::Check(config) => println!("Checking {:?}", config.origin()),
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `TILES_HOST` - Server bind address (default: 0.0.0.0)
//! - `TILES_PORT` - Server port (default: 8080)
//! - `TILES_ORIGIN_URL` - HTTP(S) base URL holding the archives
//! - `TILES_S3_BUCKET` - S3 bucket holding the archives (instead of a URL)
//! - `TILES_S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `TILES_S3_REGION` - AWS region (default: us-east-1)
//! - `TILES_ARCHIVE_PREFIX` - Key prefix in front of every archive name
//! - `TILES_API_KEYS` - Comma-separated API key allow-list
//! - `TILES_AUTH_ENABLED` - Enable the API key gate (default: true)
//! - `TILES_PUBLIC_URL` - Origin written into TileJSON tile URLs
//! - `TILES_DIRECTORY_CACHE` - Cached headers/directories, 0 disables (default: 0)
//! - `TILES_ORIGIN_TIMEOUT` - Per-request origin timeout in seconds (default: 10)
//! - `TILES_ORIGIN_RETRY` - Retry once on transient origin failures (default: true)

use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};
use url::Url;

use crate::server::access::parse_api_keys;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default per-request origin timeout in seconds.
pub const DEFAULT_ORIGIN_TIMEOUT_SECS: u64 = 10;

/// Default directory cache capacity (disabled).
pub const DEFAULT_DIRECTORY_CACHE: usize = 0;

// =============================================================================
// CLI Arguments
// =============================================================================

/// pmtiles-edge - An edge tile server for PMTiles archives.
///
/// Serves vector tiles and TileJSON straight out of PMTiles archives stored
/// behind an HTTP origin or in S3, using HTTP range requests.
#[derive(Parser, Debug, Clone)]
#[command(name = "pmtiles-edge")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Options for the default `serve` command
    #[command(flatten)]
    pub serve: Config,
}

impl Cli {
    /// Resolve the command to run; `serve` when none was given.
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Serve(self.serve))
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the tile server (default)
    Serve(Config),

    /// Open every dataset archive and print a header summary
    Check(Config),
}

/// Server and origin configuration.
#[derive(clap::Args, Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "TILES_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "TILES_PORT")]
    pub port: u16,

    /// Public origin of this service, used in TileJSON tile URLs.
    ///
    /// If not specified, derived from X-Forwarded-Proto and Host.
    #[arg(long, env = "TILES_PUBLIC_URL")]
    pub public_url: Option<String>,

    // =========================================================================
    // Origin Configuration
    // =========================================================================
    /// HTTP(S) base URL holding the archives.
    #[arg(long, env = "TILES_ORIGIN_URL")]
    pub origin_url: Option<String>,

    /// S3 bucket holding the archives (alternative to --origin-url).
    #[arg(long, env = "TILES_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "TILES_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "TILES_S3_REGION")]
    pub s3_region: String,

    /// Key prefix in front of every archive name.
    #[arg(long, env = "TILES_ARCHIVE_PREFIX")]
    pub archive_prefix: Option<String>,

    /// Per-request origin timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_ORIGIN_TIMEOUT_SECS, env = "TILES_ORIGIN_TIMEOUT")]
    pub origin_timeout_secs: u64,

    /// Retry once on connection and timeout failures.
    #[arg(long, default_value_t = true, action = ArgAction::Set, env = "TILES_ORIGIN_RETRY")]
    pub origin_retry: bool,

    // =========================================================================
    // Access Configuration
    // =========================================================================
    /// Comma-separated API key allow-list.
    #[arg(long, env = "TILES_API_KEYS")]
    pub api_keys: Option<String>,

    /// Enable the API key gate.
    ///
    /// WARNING: Only disable in development/testing.
    #[arg(long, default_value_t = true, action = ArgAction::Set, env = "TILES_AUTH_ENABLED")]
    pub auth_enabled: bool,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Number of archive headers and leaf directories to keep in memory.
    ///
    /// 0 disables caching: every request re-reads header and directories.
    #[arg(long, default_value_t = DEFAULT_DIRECTORY_CACHE, env = "TILES_DIRECTORY_CACHE")]
    pub directory_cache: usize,

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

/// Where the archives live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Http {
        url: String,
    },
    S3 {
        bucket: String,
        endpoint: Option<String>,
        region: String,
    },
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.validate_origin()?;

        if self.auth_enabled && self.api_key_list().is_empty() {
            return Err(
                "Authentication is enabled but no API keys provided. \
                 Set --api-keys or TILES_API_KEYS, or disable auth with --auth-enabled=false"
                    .to_string(),
            );
        }

        if let Some(ref public_url) = self.public_url {
            Url::parse(public_url)
                .map_err(|e| format!("Invalid public URL '{}': {}", public_url, e))?;
        }

        Ok(())
    }

    /// Validate only what is needed to reach the origin.
    pub fn validate_origin(&self) -> Result<(), String> {
        match (&self.origin_url, &self.s3_bucket) {
            (None, None) => {
                return Err("No origin configured. Set --origin-url or --s3-bucket".to_string())
            }
            (Some(_), Some(_)) => {
                return Err("Set only one of --origin-url and --s3-bucket".to_string())
            }
            (Some(url), None) => {
                Url::parse(url).map_err(|e| format!("Invalid origin URL '{}': {}", url, e))?;
            }
            (None, Some(bucket)) if bucket.is_empty() => {
                return Err("S3 bucket name must not be empty".to_string());
            }
            (None, Some(_)) => {}
        }

        if self.origin_timeout_secs == 0 {
            return Err("origin_timeout_secs must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Resolve the origin (call validate() first).
    pub fn origin(&self) -> Option<Origin> {
        match (&self.origin_url, &self.s3_bucket) {
            (Some(url), None) => Some(Origin::Http { url: url.clone() }),
            (None, Some(bucket)) => Some(Origin::S3 {
                bucket: bucket.clone(),
                endpoint: self.s3_endpoint.clone(),
                region: self.s3_region.clone(),
            }),
            _ => None,
        }
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Parsed API key allow-list.
    pub fn api_key_list(&self) -> Vec<String> {
        self.api_keys
            .as_deref()
            .map(parse_api_keys)
            .unwrap_or_default()
    }

    pub fn origin_timeout(&self) -> Duration {
        Duration::from_secs(self.origin_timeout_secs)
    }
}

// =============================================================================
// Tests
// =============================================================================
