// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Stack frames in both their raw (as captured) and normalized forms.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_BACKTRACE_ID: AtomicU64 = AtomicU64::new(1);

/// A normalized stack frame as sent to the collector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub function: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub module: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub filename: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub abs_path: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub lineno: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub colno: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub context_line: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub pre_context: Vec<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub post_context: Vec<String>,
	#[serde(default)]
	pub in_app: bool,
}

/// An ordered list of frames, most recent call first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stacktrace {
	pub frames: Vec<Frame>,
}

impl Stacktrace {
	pub fn is_empty(&self) -> bool {
		self.frames.is_empty()
	}
}

/// One entry of a backtrace as the runtime produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFrame {
	pub file: Option<String>,
	pub line: Option<u32>,
	pub column: Option<u32>,
	pub function: Option<String>,
}

impl RawFrame {
	pub fn new(file: impl Into<String>, line: u32, function: impl Into<String>) -> Self {
		Self {
			file: Some(file.into()),
			line: Some(line),
			column: None,
			function: Some(function.into()),
		}
	}
}

/// Identity token for a captured backtrace.
///
/// Every freshly constructed [`RawBacktrace`] gets a new id; clones keep it,
/// so an error re-raised with the same trace can be recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BacktraceId(u64);

/// Order of the frames in a [`RawBacktrace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOrder {
	/// Outermost call (e.g. `main`) first.
	OldestFirst,
	/// Capture point first, as `std::backtrace` and the `backtrace` crate produce.
	MostRecentFirst,
}

/// A backtrace in the runtime's native order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBacktrace {
	id: BacktraceId,
	order: CallOrder,
	frames: Vec<RawFrame>,
}

impl RawBacktrace {
	pub fn new(order: CallOrder, frames: Vec<RawFrame>) -> Self {
		Self {
			id: BacktraceId(NEXT_BACKTRACE_ID.fetch_add(1, Ordering::Relaxed)),
			order,
			frames,
		}
	}

	pub fn oldest_first(frames: Vec<RawFrame>) -> Self {
		Self::new(CallOrder::OldestFirst, frames)
	}

	pub fn most_recent_first(frames: Vec<RawFrame>) -> Self {
		Self::new(CallOrder::MostRecentFirst, frames)
	}

	pub fn id(&self) -> BacktraceId {
		self.id
	}

	pub fn order(&self) -> CallOrder {
		self.order
	}

	pub fn frames(&self) -> &[RawFrame] {
		&self.frames
	}

	/// Iterates frames most recent call first regardless of the native order.
	pub fn most_recent_first_iter(&self) -> Box<dyn Iterator<Item = &RawFrame> + '_> {
		match self.order {
			CallOrder::MostRecentFirst => Box::new(self.frames.iter()),
			CallOrder::OldestFirst => Box::new(self.frames.iter().rev()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fresh_backtraces_get_distinct_ids() {
		let a = RawBacktrace::oldest_first(vec![]);
		let b = RawBacktrace::oldest_first(vec![]);
		assert_ne!(a.id(), b.id());
	}

	#[test]
	fn clones_share_the_id() {
		let a = RawBacktrace::oldest_first(vec![RawFrame::new("src/main.rs", 3, "app::main")]);
		let b = a.clone();
		assert_eq!(a.id(), b.id());
	}

	#[test]
	fn iteration_is_most_recent_first() {
		let frames = vec![
			RawFrame::new("src/main.rs", 1, "app::main"),
			RawFrame::new("src/lib.rs", 2, "app::run"),
		];
		let oldest = RawBacktrace::oldest_first(frames.clone());
		let names: Vec<_> = oldest
			.most_recent_first_iter()
			.map(|f| f.function.as_deref().unwrap())
			.collect();
		assert_eq!(names, vec!["app::run", "app::main"]);

		let recent = RawBacktrace::most_recent_first(frames);
		let names: Vec<_> = recent
			.most_recent_first_iter()
			.map(|f| f.function.as_deref().unwrap())
			.collect();
		assert_eq!(names, vec!["app::main", "app::run"]);
	}

	#[test]
	fn frame_omits_unset_fields() {
		let frame = Frame {
			function: Some("app::main".to_string()),
			in_app: true,
			..Default::default()
		};
		let value = serde_json::to_value(&frame).unwrap();
		let object = value.as_object().unwrap();
		assert_eq!(object.len(), 2);
		assert_eq!(object["in_app"], true);
	}
}
