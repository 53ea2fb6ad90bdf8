// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-capture dispatch metadata. Never serialized into the event.

/// Transient metadata consumed by [`crate::CaptureClient`] for one capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchHint {
	/// Deliver through the background worker when one is available.
	pub background: bool,
	/// Name of the integration that produced the event.
	pub integration: Option<String>,
}

impl Default for DispatchHint {
	fn default() -> Self {
		Self {
			background: true,
			integration: None,
		}
	}
}

impl DispatchHint {
	/// A hint that forces delivery on the calling task.
	pub fn foreground() -> Self {
		Self {
			background: false,
			..Default::default()
		}
	}

	pub fn with_integration(mut self, name: impl Into<String>) -> Self {
		self.integration = Some(name.into());
		self
	}
}
