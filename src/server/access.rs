//! API key access gate.
//!
//! Every request except `OPTIONS` must carry a `key` query parameter that
//! matches one entry of a configured allow-list:
//!
//! ```text
//! /clu/12/1024/1536.mvt?key=dev
//! ```
//!
//! The gate runs before any routing decision, so unknown datasets and
//! unmatched paths are only revealed to callers holding a valid key.
//!
//! # Security Properties
//!
//! - **Constant-time comparison**: every allowed key is compared with
//!   `subtle`, and the loop never exits early
//! - **No key logging**: rejected and accepted keys are logged as a short
//!   SHA-256 fingerprint, never verbatim

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use sha2::{Digest, Sha256};
use subtle::{Choice, ConstantTimeEq};
use tracing::{debug, warn};
use url::form_urlencoded;

use super::handlers::ErrorResponse;

/// Query parameter carrying the API key.
pub const API_KEY_PARAM: &str = "key";

/// Body message of every 401 response.
pub const UNAUTHORIZED_MESSAGE: &str = "Invalid or missing API key";

// =============================================================================
// Errors
// =============================================================================

/// Reasons a request is turned away by the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No `key` parameter, or an empty one
    MissingKey,

    /// Key not on the allow-list (carries its fingerprint)
    InvalidKey { fingerprint: String },
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingKey => write!(f, "Missing API key"),
            AuthError::InvalidKey { fingerprint } => {
                write!(f, "Unknown API key (fingerprint {})", fingerprint)
            }
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        // A wrong key may be probing; a missing one is usually a misconfigured
        // client
        match &self {
            AuthError::InvalidKey { .. } => {
                warn!(status = 401, "Authentication failed: {}", self);
            }
            AuthError::MissingKey => {
                debug!(status = 401, "Authentication failed: {}", self);
            }
        }

        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new(UNAUTHORIZED_MESSAGE)),
        )
            .into_response()
    }
}

// =============================================================================
// Access Gate
// =============================================================================

/// API key allow-list check.
#[derive(Clone)]
pub struct AccessGate {
    keys: Arc<Vec<String>>,
    enabled: bool,
}

impl AccessGate {
    /// Create an enabled gate accepting exactly `keys`.
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            keys: Arc::new(keys),
            enabled: true,
        }
    }

    /// Create an enabled gate from a comma-separated allow-list.
    pub fn from_list(list: &str) -> Self {
        Self::new(parse_api_keys(list))
    }

    /// Create a gate that lets every request through.
    ///
    /// **Warning**: This should only be used for development/testing.
    pub fn disabled() -> Self {
        Self {
            keys: Arc::new(Vec::new()),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of keys on the allow-list.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Check a request's key.
    pub fn check(&self, api_key: Option<&str>) -> Result<(), AuthError> {
        if !self.enabled {
            return Ok(());
        }

        let key = match api_key {
            Some(key) if !key.is_empty() => key,
            _ => return Err(AuthError::MissingKey),
        };

        if validate(key, &self.keys) {
            debug!(key = %key_fingerprint(key), "API key accepted");
            Ok(())
        } else {
            Err(AuthError::InvalidKey {
                fingerprint: key_fingerprint(key),
            })
        }
    }
}

/// Parse a comma-separated allow-list, trimming entries and dropping empties.
///
/// `" dev , abc "` yields `["dev", "abc"]`.
pub fn parse_api_keys(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether `api_key` is on `allow_list`.
///
/// Every entry is compared in constant time and the scan never stops early.
/// An empty key never matches.
pub fn validate(api_key: &str, allow_list: &[String]) -> bool {
    if api_key.is_empty() {
        return false;
    }

    let mut found = Choice::from(0u8);
    for allowed in allow_list {
        found |= allowed.as_bytes().ct_eq(api_key.as_bytes());
    }
    found.into()
}

/// Short, non-reversible identifier of a key for logs.
pub fn key_fingerprint(api_key: &str) -> String {
    let digest = Sha256::digest(api_key.as_bytes());
    hex::encode(&digest[..4])
}

/// Extract the `key` query parameter from a raw query string.
pub fn api_key_from_query(query: Option<&str>) -> Option<String> {
    let query = query?;
    form_urlencoded::parse(query.as_bytes())
        .find(|(name, _)| name == API_KEY_PARAM)
        .map(|(_, value)| value.into_owned())
}

// =============================================================================
// Middleware
// =============================================================================

/// Axum middleware enforcing the access gate.
///
/// `OPTIONS` requests pass through untouched.
pub async fn access_middleware(
    State(gate): State<AccessGate>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if request.method() == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let key = api_key_from_query(request.uri().query());
    gate.check(key.as_deref())?;

    Ok(next.run(request).await)
}
