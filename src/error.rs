// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for Colloquy
//!
//! This module defines all error types used throughout the engine.

use thiserror::Error;

/// Main error type for Colloquy operations
#[derive(Error, Debug)]
pub enum ColloquyError {
    /// API-related errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Turn was cancelled by the caller or the system
    #[error("Turn cancelled")]
    Cancelled,

    /// The caller closed the output channel mid-turn
    #[error("Output channel closed by caller")]
    ChannelClosed,

    /// Markup extraction errors
    #[error("Markup error: {0}")]
    Markup(String),

    /// Tool execution errors
    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(String),

    /// Internal invariant violations
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ColloquyError {
    /// Whether this error ends a turn without being a failure.
    ///
    /// Cancellation and a caller-closed output channel terminate the stream
    /// but must not mark the turn as a hard error or fire the error callback.
    pub fn is_benign(&self) -> bool {
        matches!(self, ColloquyError::Cancelled | ColloquyError::ChannelClosed)
    }
}

/// API-specific error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Rate limited by the backend
    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u32),

    /// Context window exceeded
    #[error("Context too long: {current} tokens exceeds limit of {limit}")]
    ContextTooLong { current: u32, limit: u32 },

    /// Network connectivity error
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid response from the backend
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Backend returned an error
    #[error("API error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Timeout waiting for response
    #[error("Request timed out")]
    Timeout,

    /// Streaming error
    #[error("Streaming error: {0}")]
    StreamError(String),
}

/// Result type alias for Colloquy operations
pub type Result<T> = std::result::Result<T, ColloquyError>;

impl From<toml::de::Error> for ColloquyError {
    fn from(err: toml::de::Error) -> Self {
        ColloquyError::Toml(err.to_string())
    }
}

impl From<toml::ser::Error> for ColloquyError {
    fn from(err: toml::ser::Error) -> Self {
        ColloquyError::Toml(err.to_string())
    }
}
