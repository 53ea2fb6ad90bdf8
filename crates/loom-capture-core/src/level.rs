// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Severity levels shared by events and breadcrumbs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CaptureError;

/// Severity of an event or breadcrumb.
///
/// The set is closed: parsing accepts the five names plus the `warn` alias
/// and rejects anything else with [`CaptureError::InvalidLevel`], so an event
/// never carries a level the collector does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
	Debug,
	Info,
	Warning,
	#[default]
	Error,
	Fatal,
}

impl Level {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Debug => "debug",
			Self::Info => "info",
			Self::Warning => "warning",
			Self::Error => "error",
			Self::Fatal => "fatal",
		}
	}
}

impl fmt::Display for Level {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Level {
	type Err = CaptureError;

	/// Parses a level name. `"warn"` is accepted as an alias for `warning`.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"debug" => Ok(Self::Debug),
			"info" => Ok(Self::Info),
			"warn" | "warning" => Ok(Self::Warning),
			"error" => Ok(Self::Error),
			"fatal" => Ok(Self::Fatal),
			_ => Err(CaptureError::InvalidLevel(s.to_string())),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn warn_normalizes_to_warning() {
		let level: Level = "warn".parse().unwrap();
		assert_eq!(level, Level::Warning);
		assert_eq!(level.to_string(), "warning");
	}

	#[test]
	fn unknown_level_is_rejected() {
		let result = "verbose".parse::<Level>();
		assert!(matches!(result, Err(CaptureError::InvalidLevel(s)) if s == "verbose"));
	}

	#[test]
	fn default_level_is_error() {
		assert_eq!(Level::default(), Level::Error);
	}

	#[test]
	fn serializes_lowercase() {
		assert_eq!(serde_json::to_string(&Level::Fatal).unwrap(), "\"fatal\"");
	}

	proptest! {
		#[test]
		fn level_roundtrip(level in prop_oneof![
			Just(Level::Debug),
			Just(Level::Info),
			Just(Level::Warning),
			Just(Level::Error),
			Just(Level::Fatal),
		]) {
			let s = level.to_string();
			let parsed: Level = s.parse().unwrap();
			prop_assert_eq!(level, parsed);
			prop_assert_eq!(parsed.as_str(), s.as_str());
		}
	}
}
