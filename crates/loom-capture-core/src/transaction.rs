// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Completed performance traces handed over for capture.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::context::TraceContext;
use crate::event::epoch_seconds;

/// A child span of a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanRecord {
	pub trace_id: String,
	pub span_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub parent_span_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub op: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<String>,
	pub start_timestamp: f64,
	/// End time; `None` while the span is still running.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub timestamp: Option<f64>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub tags: BTreeMap<String, String>,
	#[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
	pub data: serde_json::Map<String, serde_json::Value>,
}

impl SpanRecord {
	/// A span started now under `parent`.
	pub fn child_of(parent: &TraceContext, op: impl Into<String>) -> Self {
		Self {
			trace_id: parent.trace_id.clone(),
			span_id: crate::context::new_span_id(),
			parent_span_id: Some(parent.span_id.clone()),
			op: Some(op.into()),
			description: None,
			status: None,
			start_timestamp: epoch_seconds(Utc::now()),
			timestamp: None,
			tags: BTreeMap::new(),
			data: serde_json::Map::new(),
		}
	}

	pub fn finish(&mut self) {
		self.timestamp = Some(epoch_seconds(Utc::now()));
	}

	pub fn is_finished(&self) -> bool {
		self.timestamp.is_some()
	}
}

/// A finished transaction and the spans recorded under it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedTransaction {
	pub name: String,
	pub trace: TraceContext,
	pub start: DateTime<Utc>,
	pub end: DateTime<Utc>,
	pub spans: Vec<SpanRecord>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn child_span_inherits_trace() {
		let root = TraceContext::new("http.server");
		let mut span = SpanRecord::child_of(&root, "db.query");
		assert_eq!(span.trace_id, root.trace_id);
		assert_eq!(span.parent_span_id.as_deref(), Some(root.span_id.as_str()));
		assert!(!span.is_finished());

		span.finish();
		assert!(span.is_finished());
		assert!(span.timestamp.unwrap() >= span.start_timestamp);
	}
}
