// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Source line lookup for frame context.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

/// Lines surrounding a frame's current line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContext {
	pub pre_context: Vec<String>,
	pub context_line: String,
	pub post_context: Vec<String>,
}

/// Provides source lines for frames.
pub trait SourceCache: Send + Sync {
	/// Returns up to `count` lines before and after the 1-based `line` of `path`.
	fn file_context(&self, path: &Path, line: u32, count: usize) -> Option<FileContext>;
}

type CachedLines = Option<Arc<Vec<String>>>;

/// Reads source files from disk once and keeps their lines in memory.
///
/// Files that cannot be read are remembered as missing.
#[derive(Debug, Default)]
pub struct LineCache {
	files: Mutex<HashMap<PathBuf, CachedLines>>,
}

impl LineCache {
	pub fn new() -> Self {
		Self::default()
	}

	fn files(&self) -> MutexGuard<'_, HashMap<PathBuf, CachedLines>> {
		match self.files.lock() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		}
	}

	fn lines(&self, path: &Path) -> CachedLines {
		if let Some(cached) = self.files().get(path) {
			return cached.clone();
		}

		let lines = match std::fs::read_to_string(path) {
			Ok(contents) => Some(Arc::new(contents.lines().map(str::to_string).collect())),
			Err(e) => {
				debug!(path = %path.display(), error = %e, "Source file unavailable for context");
				None
			}
		};
		self.files().insert(path.to_path_buf(), lines.clone());
		lines
	}
}

impl SourceCache for LineCache {
	fn file_context(&self, path: &Path, line: u32, count: usize) -> Option<FileContext> {
		let lines = self.lines(path)?;
		let idx = (line as usize).checked_sub(1)?;
		let context_line = lines.get(idx)?.clone();

		let pre_start = idx.saturating_sub(count);
		let post_end = (idx + 1 + count).min(lines.len());

		Some(FileContext {
			pre_context: lines[pre_start..idx].to_vec(),
			context_line,
			post_context: lines[idx + 1..post_end].to_vec(),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	fn source_file() -> tempfile::NamedTempFile {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		for i in 1..=10 {
			writeln!(file, "line {i}").unwrap();
		}
		file
	}

	#[test]
	fn returns_surrounding_lines() {
		let file = source_file();
		let cache = LineCache::new();
		let context = cache.file_context(file.path(), 5, 2).unwrap();
		assert_eq!(context.pre_context, vec!["line 3", "line 4"]);
		assert_eq!(context.context_line, "line 5");
		assert_eq!(context.post_context, vec!["line 6", "line 7"]);
	}

	#[test]
	fn clamps_at_file_edges() {
		let file = source_file();
		let cache = LineCache::new();

		let first = cache.file_context(file.path(), 1, 3).unwrap();
		assert!(first.pre_context.is_empty());
		assert_eq!(first.post_context.len(), 3);

		let last = cache.file_context(file.path(), 10, 3).unwrap();
		assert_eq!(last.pre_context.len(), 3);
		assert!(last.post_context.is_empty());
	}

	#[test]
	fn out_of_range_and_missing_files_yield_none() {
		let file = source_file();
		let cache = LineCache::new();
		assert!(cache.file_context(file.path(), 0, 2).is_none());
		assert!(cache.file_context(file.path(), 11, 2).is_none());
		assert!(cache
			.file_context(Path::new("/definitely/not/here.rs"), 1, 2)
			.is_none());
	}

	#[test]
	fn file_is_read_once() {
		let file = source_file();
		let cache = LineCache::new();
		assert!(cache.file_context(file.path(), 2, 1).is_some());

		std::fs::write(file.path(), "changed\n").unwrap();
		let context = cache.file_context(file.path(), 2, 1).unwrap();
		assert_eq!(context.context_line, "line 2");
	}
}
