// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Backtrace capture and normalization into collector frames.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use loom_capture_core::{module_from_type, Frame, RawBacktrace, RawFrame, Stacktrace};
use rustc_demangle::try_demangle;

use crate::source::{LineCache, SourceCache};

/// Frames from these crates belong to the capture machinery itself.
const SDK_PREFIXES: &[&str] = &["backtrace::", "loom_capture::", "<loom_capture::"];

/// Directory markers for dependency sources that never count as application code.
const DEPENDENCY_MARKERS: &[&str] = &["vendor", ".cargo"];

/// Capture the current call stack, most recent call first.
///
/// Frames belonging to the capture machinery are skipped.
pub fn capture_backtrace() -> RawBacktrace {
	let backtrace = backtrace::Backtrace::new();
	let mut frames = Vec::new();

	for frame in backtrace.frames() {
		for symbol in frame.symbols() {
			let function = symbol.name().map(|name| format!("{name:#}"));
			if function
				.as_deref()
				.is_some_and(|f| SDK_PREFIXES.iter().any(|p| f.starts_with(p)))
			{
				continue;
			}

			frames.push(RawFrame {
				file: symbol.filename().map(|p| p.display().to_string()),
				line: symbol.lineno(),
				column: symbol.colno(),
				function,
			});
		}
	}

	RawBacktrace::most_recent_first(frames)
}

/// Turns raw frames into collector frames with paths, `in_app` flags and
/// optional source context.
#[derive(Clone)]
pub struct BacktraceNormalizer {
	project_root: Option<PathBuf>,
	context_lines: Option<usize>,
	source_cache: Arc<dyn SourceCache>,
}

impl std::fmt::Debug for BacktraceNormalizer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BacktraceNormalizer")
			.field("project_root", &self.project_root)
			.field("context_lines", &self.context_lines)
			.finish_non_exhaustive()
	}
}

impl Default for BacktraceNormalizer {
	fn default() -> Self {
		Self::new(None, None, Arc::new(LineCache::new()))
	}
}

impl BacktraceNormalizer {
	pub fn new(
		project_root: Option<PathBuf>,
		context_lines: Option<usize>,
		source_cache: Arc<dyn SourceCache>,
	) -> Self {
		Self {
			project_root,
			context_lines,
			source_cache,
		}
	}

	/// Normalize a raw backtrace. The result is ordered most recent call first.
	pub fn normalize(&self, backtrace: &RawBacktrace) -> Stacktrace {
		let frames = backtrace
			.most_recent_first_iter()
			.filter_map(|raw| self.normalize_frame(raw))
			.collect();
		Stacktrace { frames }
	}

	fn normalize_frame(&self, raw: &RawFrame) -> Option<Frame> {
		let file = raw.file.as_deref().map(str::trim).filter(|f| !f.is_empty())?;
		let abs_path = self.absolute_path(Path::new(file));

		let function = raw.function.as_deref().map(demangle_function);
		let module = function
			.as_deref()
			.filter(|f| !f.starts_with('<'))
			.map(module_from_type)
			.filter(|m| !m.is_empty());

		let in_app = match &self.project_root {
			Some(root) => abs_path.starts_with(root) && !is_dependency_path(&abs_path, root),
			None => function.as_deref().is_some_and(is_in_app_function),
		};

		let mut frame = Frame {
			function,
			module,
			filename: Some(self.relative_filename(&abs_path)),
			abs_path: Some(abs_path.display().to_string()),
			lineno: raw.line,
			colno: raw.column,
			in_app,
			..Default::default()
		};

		if let (Some(count), Some(line)) = (self.context_lines, raw.line) {
			if let Some(context) = self.source_cache.file_context(&abs_path, line, count) {
				frame.pre_context = context.pre_context;
				frame.context_line = Some(context.context_line);
				frame.post_context = context.post_context;
			}
		}

		Some(frame)
	}

	fn absolute_path(&self, path: &Path) -> PathBuf {
		match &self.project_root {
			Some(root) if path.is_relative() => root.join(path),
			_ => path.to_path_buf(),
		}
	}

	fn relative_filename(&self, abs_path: &Path) -> String {
		if let Some(root) = &self.project_root {
			if let Ok(rel) = abs_path.strip_prefix(root) {
				if !is_dependency_path(abs_path, root) {
					return rel.display().to_string();
				}
			}
		}
		match registry_relative(abs_path) {
			Some(rel) => rel.display().to_string(),
			None => abs_path.display().to_string(),
		}
	}
}

fn is_dependency_path(abs_path: &Path, root: &Path) -> bool {
	abs_path
		.strip_prefix(root)
		.map(|rel| {
			rel.components().any(|c| match c {
				Component::Normal(name) => DEPENDENCY_MARKERS.iter().any(|m| name == *m),
				_ => false,
			})
		})
		.unwrap_or(false)
}

/// Path of a registry or git dependency file relative to its crate source root.
///
/// `~/.cargo/registry/src/index.crates.io-xxxx/serde-1.0.0/src/de.rs` becomes
/// `serde-1.0.0/src/de.rs`.
fn registry_relative(abs_path: &Path) -> Option<PathBuf> {
	let components: Vec<_> = abs_path.components().collect();
	let idx = components.windows(2).position(|pair| {
		matches!(
			(pair[0], pair[1]),
			(Component::Normal(a), Component::Normal(b))
				if (a == "registry" && b == "src") || (a == "git" && b == "checkouts")
		)
	})?;
	// Skip the marker pair and the index/checkout directory.
	let rest = components.get(idx + 3..)?;
	if rest.is_empty() {
		return None;
	}
	Some(rest.iter().collect())
}

fn demangle_function(function: &str) -> String {
	match try_demangle(function) {
		Ok(demangled) => format!("{demangled:#}"),
		Err(_) => function.to_string(),
	}
}

/// Function-name heuristic used when no project root is configured.
fn is_in_app_function(function: &str) -> bool {
	const SYSTEM_PREFIXES: &[&str] = &[
		"std::",
		"core::",
		"alloc::",
		"<std::",
		"<core::",
		"<alloc::",
		"tokio::",
		"<tokio::",
		"futures::",
		"<futures::",
		"async_trait::",
		"tracing::",
		"<tracing::",
		"backtrace::",
		"<backtrace::",
		"panic_unwind::",
		"rust_begin_unwind",
		"rust_panic",
		"__rust_",
		"_rust_",
	];

	const SYSTEM_CONTAINS: &[&str] = &["::panicking::", "::rt::", "::sys_common::"];

	!SYSTEM_PREFIXES.iter().any(|p| function.starts_with(p))
		&& !SYSTEM_CONTAINS.iter().any(|c| function.contains(c))
}
