// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the capture event model.

use thiserror::Error;

/// Errors that can occur while building or encoding capture events.
#[derive(Debug, Error)]
pub enum CaptureError {
	#[error("invalid level: {0}")]
	InvalidLevel(String),

	#[error("invalid event type: {0}")]
	InvalidEventType(String),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

/// Result type for capture model operations.
pub type Result<T> = std::result::Result<T, CaptureError>;
