// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SDK, thread and trace context records.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::stacktrace::Stacktrace;

/// SDK name for identification.
pub const SDK_NAME: &str = "loom-capture-rust";
/// SDK version for identification.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name and version of the SDK (or integration) that produced an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkInfo {
	pub name: String,
	pub version: String,
}

impl SdkInfo {
	pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			version: version.into(),
		}
	}
}

impl Default for SdkInfo {
	fn default() -> Self {
		Self::new(SDK_NAME, SDK_VERSION)
	}
}

/// One thread at capture time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadInfo {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default)]
	pub crashed: bool,
	#[serde(default)]
	pub current: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stacktrace: Option<Stacktrace>,
}

/// Threads at capture time. Only the capturing thread is recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadsSnapshot {
	pub values: Vec<ThreadInfo>,
}

impl ThreadsSnapshot {
	/// Snapshot of the calling thread.
	pub fn current(crashed: bool, stacktrace: Option<Stacktrace>) -> Self {
		let thread = std::thread::current();
		let info = ThreadInfo {
			id: thread_id_number(thread.id()),
			name: thread.name().map(str::to_string),
			crashed,
			current: true,
			stacktrace: stacktrace.filter(|st| !st.is_empty()),
		};
		Self { values: vec![info] }
	}
}

/// `ThreadId` only exposes its number through `Debug` ("ThreadId(7)").
fn thread_id_number(id: std::thread::ThreadId) -> Option<u64> {
	let debug = format!("{id:?}");
	let digits: String = debug.chars().filter(char::is_ascii_digit).collect();
	digits.parse().ok()
}

/// Trace identity of a transaction or span, stored under `contexts.trace`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
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
}

impl TraceContext {
	/// Starts a new trace with a fresh root span.
	pub fn new(op: impl Into<String>) -> Self {
		Self {
			trace_id: new_trace_id(),
			span_id: new_span_id(),
			parent_span_id: None,
			op: Some(op.into()),
			description: None,
			status: None,
		}
	}
}

/// 32 hex digits.
pub fn new_trace_id() -> String {
	Uuid::new_v4().simple().to_string()
}

/// 16 hex digits.
pub fn new_span_id() -> String {
	let mut id = Uuid::new_v4().simple().to_string();
	id.truncate(16);
	id
}
