// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error chains: capture from `std::error::Error` sources and flattening into
//! the ordered, deduplicated exception list sent to the collector.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error as StdError;

use crate::stacktrace::{RawBacktrace, Stacktrace};

/// Maximum size of an exception value in bytes.
pub const MAX_VALUE_BYTES: usize = 8192;

/// Maximum number of causes followed from a leaf error.
const MAX_CAUSES: usize = 64;

/// One error of a chain, as sent to the collector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExceptionRecord {
	#[serde(rename = "type")]
	pub ty: String,
	#[serde(default)]
	pub value: String,
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub module: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stacktrace: Option<Stacktrace>,
}

/// Errors of a chain, root cause first and the most recently raised last.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExceptionChain {
	pub values: Vec<ExceptionRecord>,
}

impl ExceptionChain {
	/// Flattens a captured error into records.
	///
	/// A backtrace shared by several links is normalized once and attached to
	/// the first record (in root-first order) that references it.
	pub fn extract<F>(error: &CapturedError, mut normalize: F) -> Self
	where
		F: FnMut(&RawBacktrace) -> Stacktrace,
	{
		let mut seen = HashSet::new();
		let mut values = Vec::with_capacity(error.links.len());

		for link in error.links.iter().rev() {
			let stacktrace = match &link.backtrace {
				Some(backtrace) if seen.insert(backtrace.id()) => {
					Some(normalize(backtrace)).filter(|st| !st.is_empty())
				}
				_ => None,
			};

			values.push(ExceptionRecord {
				ty: link.ty.clone(),
				value: truncate(&link.value, MAX_VALUE_BYTES),
				module: module_from_type(&link.ty),
				stacktrace,
			});
		}

		Self { values }
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}
}

/// A single link of an error chain before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorLink {
	pub ty: String,
	pub value: String,
	pub backtrace: Option<RawBacktrace>,
	/// Supplementary data merged into the event's `extra`.
	pub context: serde_json::Map<String, serde_json::Value>,
}

impl ErrorLink {
	pub fn new(ty: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			ty: ty.into(),
			value: value.into(),
			backtrace: None,
			context: serde_json::Map::new(),
		}
	}

	pub fn with_backtrace(mut self, backtrace: RawBacktrace) -> Self {
		self.backtrace = Some(backtrace);
		self
	}

	pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
		self.context.insert(key.into(), value);
		self
	}

	fn from_dyn(error: &(dyn StdError + 'static)) -> Self {
		Self::new(type_name_from_debug(error), error.to_string())
	}
}

/// An error and its causes, leaf (most recently raised) first.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedError {
	links: Vec<ErrorLink>,
}

impl CapturedError {
	pub fn new(leaf: ErrorLink) -> Self {
		Self { links: vec![leaf] }
	}

	/// Appends the next underlying cause.
	pub fn caused_by(mut self, cause: ErrorLink) -> Self {
		self.links.push(cause);
		self
	}

	/// Captures a typed error; the leaf gets the fully-qualified type name.
	pub fn from_error<E>(error: &E) -> Self
	where
		E: StdError + 'static,
	{
		let leaf = ErrorLink::new(std::any::type_name::<E>(), error.to_string());
		Self::with_sources(leaf, error.source())
	}

	/// Captures a type-erased error; type names come from `Debug` output.
	pub fn from_dyn(error: &(dyn StdError + 'static)) -> Self {
		Self::with_sources(ErrorLink::from_dyn(error), error.source())
	}

	fn with_sources(leaf: ErrorLink, mut source: Option<&(dyn StdError + 'static)>) -> Self {
		let mut captured = Self::new(leaf);
		while let Some(cause) = source {
			if captured.links.len() > MAX_CAUSES {
				break;
			}
			captured.links.push(ErrorLink::from_dyn(cause));
			source = cause.source();
		}
		captured
	}

	/// Attaches a backtrace to the leaf error.
	pub fn with_backtrace(mut self, backtrace: RawBacktrace) -> Self {
		self.links[0].backtrace = Some(backtrace);
		self
	}

	pub fn leaf(&self) -> &ErrorLink {
		&self.links[0]
	}

	pub fn links(&self) -> &[ErrorLink] {
		&self.links
	}
}

/// Namespace part of a type name: `core::num::ParseIntError` -> `core::num`.
pub fn module_from_type(ty: &str) -> String {
	let path = ty.split('<').next().unwrap_or(ty);
	path.rfind("::")
		.map(|idx| path[..idx].to_string())
		.unwrap_or_default()
}

/// Best-effort type name from a value's `Debug` representation.
pub fn type_name_from_debug(error: &dyn StdError) -> String {
	let debug = format!("{error:?}");
	let name = debug
		.split([' ', '(', '{', '\r', '\n'])
		.next()
		.unwrap_or_default()
		.trim();
	if name.is_empty() {
		"Error".to_string()
	} else {
		name.to_string()
	}
}

/// Truncate a string to at most `max_len` bytes, ending with an ellipsis.
pub fn truncate(s: &str, max_len: usize) -> String {
	if s.len() <= max_len {
		return s.to_string();
	}
	let mut end = max_len.saturating_sub(3);
	while !s.is_char_boundary(end) {
		end -= 1;
	}
	format!("{}...", &s[..end])
}
