// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Breadcrumbs: the trail of events leading up to a capture.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::level::Level;

/// A breadcrumb recorded before an event was captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breadcrumb {
	pub timestamp: DateTime<Utc>,
	/// "http", "navigation", "query", "log"
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub category: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	#[serde(default)]
	pub level: Level,
	#[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
	pub ty: Option<String>,
	#[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
	pub data: serde_json::Map<String, serde_json::Value>,
}

impl Default for Breadcrumb {
	fn default() -> Self {
		Self {
			timestamp: Utc::now(),
			category: None,
			message: None,
			level: Level::Info,
			ty: None,
			data: serde_json::Map::new(),
		}
	}
}

impl Breadcrumb {
	/// Creates an info breadcrumb with a category and message.
	pub fn new(category: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			category: Some(category.into()),
			message: Some(message.into()),
			..Default::default()
		}
	}

	pub fn with_level(mut self, level: Level) -> Self {
		self.level = level;
		self
	}
}
