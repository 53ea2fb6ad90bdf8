// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the capture SDK.

use loom_capture_core::CaptureError;
use thiserror::Error;

/// Result type alias for capture operations.
pub type Result<T> = std::result::Result<T, CaptureSdkError>;

/// Errors that can occur in the capture SDK.
#[derive(Debug, Error)]
pub enum CaptureSdkError {
	/// The DSN could not be parsed.
	#[error("invalid DSN: {0}")]
	InvalidDsn(String),

	/// A configuration value is out of range.
	#[error("invalid option: {0}")]
	InvalidOption(String),

	/// HTTP request failed.
	#[error("HTTP request failed: {0}")]
	RequestFailed(#[from] reqwest::Error),

	/// Server returned an error.
	#[error("server error (status {status}): {message}")]
	ServerError {
		/// HTTP status code.
		status: u16,
		/// Error message from server.
		message: String,
	},

	/// Rate limited by server.
	#[error("rate limited, retry after {retry_after_secs:?} seconds")]
	RateLimited {
		/// Optional retry-after header value.
		retry_after_secs: Option<u64>,
	},

	/// The async callback reported a failure.
	#[error("async callback failed: {0}")]
	Callback(String),

	/// Event model error.
	#[error(transparent)]
	Core(#[from] CaptureError),
}
